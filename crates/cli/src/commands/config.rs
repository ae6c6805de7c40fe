use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rotu_core::config::{AppConfig, LoadOptions};
use serde_json::{json, Map, Value};

use crate::commands::CommandResult;

/// Config keys paired with the environment variable that overrides each.
const FIELDS: &[(&str, &str)] = &[
    ("database.url", "ROTU_DATABASE_URL"),
    ("database.max_connections", "ROTU_DATABASE_MAX_CONNECTIONS"),
    ("database.timeout_secs", "ROTU_DATABASE_TIMEOUT_SECS"),
    ("server.bind_address", "ROTU_SERVER_BIND_ADDRESS"),
    ("server.port", "ROTU_SERVER_PORT"),
    ("server.graceful_shutdown_secs", "ROTU_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ("auth.jwt_secret", "ROTU_AUTH_JWT_SECRET"),
    ("auth.access_token_ttl_minutes", "ROTU_AUTH_ACCESS_TOKEN_TTL_MINUTES"),
    ("auth.refresh_token_ttl_minutes", "ROTU_AUTH_REFRESH_TOKEN_TTL_MINUTES"),
    ("auth.initial_admin_username", "ROTU_INITIAL_ADMIN_USERNAME"),
    ("auth.initial_admin_email", "ROTU_INITIAL_ADMIN_EMAIL"),
    ("auth.initial_admin_password", "ROTU_INITIAL_ADMIN_PASSWORD"),
    ("business.company_name", "ROTU_BUSINESS_COMPANY_NAME"),
    ("business.currency_symbol", "ROTU_BUSINESS_CURRENCY_SYMBOL"),
    ("business.default_tax_rate", "ROTU_BUSINESS_DEFAULT_TAX_RATE"),
    ("pdf.template_dir", "ROTU_PDF_TEMPLATE_DIR"),
    ("pdf.converter", "ROTU_PDF_CONVERTER"),
    ("logging.level", "ROTU_LOGGING_LEVEL"),
    ("logging.format", "ROTU_LOGGING_FORMAT"),
];

/// Effective configuration with secrets redacted, plus where each value came from.
pub fn run(options: LoadOptions) -> CommandResult {
    let explicit_path = options.config_path.clone();
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let config_file_path = detect_config_path(explicit_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let sources: Map<String, Value> = FIELDS
        .iter()
        .map(|(key, env_key)| {
            let source = field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
            (key.to_string(), Value::String(source))
        })
        .collect();

    CommandResult::success_with(
        "config",
        "effective config (source precedence: env > file > default)",
        Some(json!({ "config": config.redacted_json(), "sources": sources })),
    )
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("rotu.toml"), PathBuf::from("config/rotu.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<toml::Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<toml::Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&toml::Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &toml::Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
