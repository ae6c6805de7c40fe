use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub business: BusinessConfig,
    pub pdf: PdfConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    pub access_token_ttl_minutes: u64,
    pub refresh_token_ttl_minutes: u64,
    pub initial_admin_username: String,
    pub initial_admin_email: String,
    pub initial_admin_password: SecretString,
}

#[derive(Clone, Debug)]
pub struct BusinessConfig {
    pub company_name: String,
    pub currency_symbol: String,
    /// ISV percentage applied to new sales unless the request names another rate.
    pub default_tax_rate: Decimal,
}

#[derive(Clone, Debug)]
pub struct PdfConfig {
    pub template_dir: PathBuf,
    pub converter: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub jwt_secret: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://rotu.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            auth: AuthConfig {
                jwt_secret: String::new().into(),
                access_token_ttl_minutes: 60,
                refresh_token_ttl_minutes: 1440,
                initial_admin_username: "admin".to_string(),
                initial_admin_email: "admin@rotuprinters.local".to_string(),
                initial_admin_password: secret_value("admin123".to_string()),
            },
            business: BusinessConfig {
                company_name: "RotuPrinters".to_string(),
                currency_symbol: "L".to_string(),
                default_tax_rate: Decimal::new(1500, 2),
            },
            pdf: PdfConfig {
                template_dir: PathBuf::from("templates"),
                converter: "wkhtmltopdf".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("rotu.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Address string handed to the TCP listener.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(jwt_secret_value) = auth.jwt_secret {
                self.auth.jwt_secret = secret_value(jwt_secret_value);
            }
            if let Some(minutes) = auth.access_token_ttl_minutes {
                self.auth.access_token_ttl_minutes = minutes;
            }
            if let Some(minutes) = auth.refresh_token_ttl_minutes {
                self.auth.refresh_token_ttl_minutes = minutes;
            }
            if let Some(username) = auth.initial_admin_username {
                self.auth.initial_admin_username = username;
            }
            if let Some(email) = auth.initial_admin_email {
                self.auth.initial_admin_email = email;
            }
            if let Some(password_value) = auth.initial_admin_password {
                self.auth.initial_admin_password = secret_value(password_value);
            }
        }

        if let Some(business) = patch.business {
            if let Some(company_name) = business.company_name {
                self.business.company_name = company_name;
            }
            if let Some(currency_symbol) = business.currency_symbol {
                self.business.currency_symbol = currency_symbol;
            }
            if let Some(rate) = business.default_tax_rate {
                self.business.default_tax_rate = parse_decimal("business.default_tax_rate", &rate)?;
            }
        }

        if let Some(pdf) = patch.pdf {
            if let Some(template_dir) = pdf.template_dir {
                self.pdf.template_dir = template_dir;
            }
            if let Some(converter) = pdf.converter {
                self.pdf.converter = converter;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ROTU_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ROTU_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("ROTU_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ROTU_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ROTU_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ROTU_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ROTU_SERVER_PORT") {
            self.server.port = parse_u16("ROTU_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("ROTU_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("ROTU_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("ROTU_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = secret_value(value);
        }
        if let Some(value) = read_env("ROTU_AUTH_ACCESS_TOKEN_TTL_MINUTES") {
            self.auth.access_token_ttl_minutes =
                parse_u64("ROTU_AUTH_ACCESS_TOKEN_TTL_MINUTES", &value)?;
        }
        if let Some(value) = read_env("ROTU_AUTH_REFRESH_TOKEN_TTL_MINUTES") {
            self.auth.refresh_token_ttl_minutes =
                parse_u64("ROTU_AUTH_REFRESH_TOKEN_TTL_MINUTES", &value)?;
        }
        if let Some(value) = read_env("ROTU_INITIAL_ADMIN_USERNAME") {
            self.auth.initial_admin_username = value;
        }
        if let Some(value) = read_env("ROTU_INITIAL_ADMIN_EMAIL") {
            self.auth.initial_admin_email = value;
        }
        if let Some(value) = read_env("ROTU_INITIAL_ADMIN_PASSWORD") {
            self.auth.initial_admin_password = secret_value(value);
        }

        if let Some(value) = read_env("ROTU_BUSINESS_COMPANY_NAME") {
            self.business.company_name = value;
        }
        if let Some(value) = read_env("ROTU_BUSINESS_CURRENCY_SYMBOL") {
            self.business.currency_symbol = value;
        }
        if let Some(value) = read_env("ROTU_BUSINESS_DEFAULT_TAX_RATE") {
            self.business.default_tax_rate = parse_decimal("ROTU_BUSINESS_DEFAULT_TAX_RATE", &value)?;
        }

        if let Some(value) = read_env("ROTU_PDF_TEMPLATE_DIR") {
            self.pdf.template_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("ROTU_PDF_CONVERTER") {
            self.pdf.converter = value;
        }

        let log_level = read_env("ROTU_LOGGING_LEVEL").or_else(|| read_env("ROTU_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("ROTU_LOGGING_FORMAT").or_else(|| read_env("ROTU_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(jwt_secret) = overrides.jwt_secret {
            self.auth.jwt_secret = secret_value(jwt_secret);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_business(&self.business)?;
        validate_pdf(&self.pdf)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Effective configuration as JSON with every secret replaced by a marker.
    pub fn redacted_json(&self) -> serde_json::Value {
        serde_json::json!({
            "database": {
                "url": self.database.url,
                "max_connections": self.database.max_connections,
                "timeout_secs": self.database.timeout_secs,
            },
            "server": {
                "bind_address": self.server.bind_address,
                "port": self.server.port,
                "graceful_shutdown_secs": self.server.graceful_shutdown_secs,
            },
            "auth": {
                "jwt_secret": redact(&self.auth.jwt_secret),
                "access_token_ttl_minutes": self.auth.access_token_ttl_minutes,
                "refresh_token_ttl_minutes": self.auth.refresh_token_ttl_minutes,
                "initial_admin_username": self.auth.initial_admin_username,
                "initial_admin_email": self.auth.initial_admin_email,
                "initial_admin_password": redact(&self.auth.initial_admin_password),
            },
            "business": {
                "company_name": self.business.company_name,
                "currency_symbol": self.business.currency_symbol,
                "default_tax_rate": self.business.default_tax_rate.to_string(),
            },
            "pdf": {
                "template_dir": self.pdf.template_dir.display().to_string(),
                "converter": self.pdf.converter,
            },
            "logging": {
                "level": self.logging.level,
                "format": self.logging.format,
            },
        })
    }
}

fn redact(secret: &SecretString) -> &'static str {
    if secret.expose_secret().is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("rotu.toml"), PathBuf::from("config/rotu.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let secret = auth.jwt_secret.expose_secret();
    if secret.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.jwt_secret is required. Set ROTU_AUTH_JWT_SECRET or [auth].jwt_secret"
                .to_string(),
        ));
    }
    if secret.len() < 16 {
        return Err(ConfigError::Validation(
            "auth.jwt_secret must be at least 16 characters long".to_string(),
        ));
    }

    if auth.access_token_ttl_minutes == 0 {
        return Err(ConfigError::Validation(
            "auth.access_token_ttl_minutes must be greater than zero".to_string(),
        ));
    }
    if auth.refresh_token_ttl_minutes < auth.access_token_ttl_minutes {
        return Err(ConfigError::Validation(
            "auth.refresh_token_ttl_minutes must not be shorter than the access token ttl"
                .to_string(),
        ));
    }

    if auth.initial_admin_username.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.initial_admin_username must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_business(business: &BusinessConfig) -> Result<(), ConfigError> {
    if business.company_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "business.company_name must not be empty".to_string(),
        ));
    }

    let rate = business.default_tax_rate;
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(ConfigError::Validation(
            "business.default_tax_rate must be in range 0..=100".to_string(),
        ));
    }

    Ok(())
}

fn validate_pdf(pdf: &PdfConfig) -> Result<(), ConfigError> {
    if pdf.converter.trim().is_empty() {
        return Err(ConfigError::Validation("pdf.converter must not be empty".to_string()));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    business: Option<BusinessPatch>,
    pdf: Option<PdfPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    jwt_secret: Option<String>,
    access_token_ttl_minutes: Option<u64>,
    refresh_token_ttl_minutes: Option<u64>,
    initial_admin_username: Option<String>,
    initial_admin_email: Option<String>,
    initial_admin_password: Option<String>,
}

// Tax rates are read as strings so `15.00` survives without a float round trip.
#[derive(Debug, Default, Deserialize)]
struct BusinessPatch {
    company_name: Option<String>,
    currency_symbol: Option<String>,
    default_tax_rate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PdfPatch {
    template_dir: Option<PathBuf>,
    converter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
