use std::env;
use std::sync::{Mutex, OnceLock};

use rotu_cli::commands::create_user::{self, CreateUserArgs};
use rotu_cli::commands::{config, doctor, migrate, seed};
use rotu_core::config::LoadOptions;
use serde_json::Value;

const SECRET: (&str, &str) = ("ROTU_AUTH_JWT_SECRET", "cli-runtime-test-secret");

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);
    with_env(&[SECRET, ("ROTU_DATABASE_URL", &url)], || {
        let result = migrate::run(LoadOptions::default());
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert!(payload["details"]["applied"].as_u64().expect("applied") > 0);

        let again = parse_payload(&migrate::run(LoadOptions::default()).output);
        assert_eq!(again["details"]["applied"], 0);
    });
}

#[test]
fn migrate_returns_config_failure_without_a_secret() {
    with_env(&[], || {
        let result = migrate::run(LoadOptions::default());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);
    with_env(&[SECRET, ("ROTU_DATABASE_URL", &url)], || {
        let first = seed::run(LoadOptions::default());
        assert_eq!(first.exit_code, 0, "expected first seed invocation success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["details"]["admin_created"], true);
        assert_eq!(first_payload["details"]["categories_created"].as_array().map(Vec::len), Some(5));

        let second = seed::run(LoadOptions::default());
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["status"], "ok");
        assert_eq!(second_payload["details"]["admin_created"], false);
        assert_eq!(second_payload["message"], "baseline data already present");
    });
}

#[test]
fn config_redacts_secrets_and_reports_sources() {
    with_env(&[SECRET], || {
        let result = config::run(LoadOptions::default());
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["details"]["config"]["auth"]["jwt_secret"], "<redacted>");
        assert_eq!(payload["details"]["sources"]["auth.jwt_secret"], "env (ROTU_AUTH_JWT_SECRET)");
        assert_eq!(payload["details"]["sources"]["server.port"], "default");
        assert!(!result.output.contains("cli-runtime-test-secret"));
    });
}

#[test]
fn create_user_then_duplicate_conflicts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);
    with_env(&[SECRET, ("ROTU_DATABASE_URL", &url)], || {
        let args = CreateUserArgs {
            username: "vendedora".to_string(),
            email: "vendedora@rotuprinters.local".to_string(),
            password: "vendedora-pass".to_string(),
            role: "seller".to_string(),
            first_name: String::new(),
            last_name: String::new(),
        };

        let created = create_user::run(LoadOptions::default(), args.clone());
        assert_eq!(created.exit_code, 0, "{}", created.output);
        assert_eq!(parse_payload(&created.output)["details"]["role"], "SELLER");

        let duplicate = create_user::run(LoadOptions::default(), args);
        assert_ne!(duplicate.exit_code, 0);
        assert_eq!(parse_payload(&duplicate.output)["error_class"], "conflict");
    });
}

#[test]
fn create_user_rejects_unknown_roles() {
    with_env(&[SECRET], || {
        let result = create_user::run(
            LoadOptions::default(),
            CreateUserArgs {
                username: "otro".to_string(),
                email: "otro@rotuprinters.local".to_string(),
                password: "otro-password".to_string(),
                role: "manager".to_string(),
                first_name: String::new(),
                last_name: String::new(),
            },
        );
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_input");
    });
}

#[test]
fn doctor_reports_pending_migrations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir);
    with_env(&[SECRET, ("ROTU_DATABASE_URL", &url)], || {
        let result = doctor::run(LoadOptions::default(), true);
        assert_eq!(result.exit_code, 1, "fresh database should fail the migrations check");

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "fail");
        let migrations = report["checks"]
            .as_array()
            .and_then(|checks| checks.iter().find(|check| check["name"] == "migrations"))
            .expect("migrations check");
        assert_eq!(migrations["status"], "fail");

        assert_eq!(migrate::run(LoadOptions::default()).exit_code, 0);
        let report = parse_payload(&doctor::run(LoadOptions::default(), true).output);
        assert_ne!(report["overall_status"], "fail", "{report}");
    });
}

fn database_url(dir: &tempfile::TempDir) -> String {
    format!("sqlite://{}", dir.path().join("rotu.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "ROTU_DATABASE_URL",
        "ROTU_DATABASE_MAX_CONNECTIONS",
        "ROTU_DATABASE_TIMEOUT_SECS",
        "ROTU_SERVER_BIND_ADDRESS",
        "ROTU_SERVER_PORT",
        "ROTU_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "ROTU_AUTH_JWT_SECRET",
        "ROTU_AUTH_ACCESS_TOKEN_TTL_MINUTES",
        "ROTU_AUTH_REFRESH_TOKEN_TTL_MINUTES",
        "ROTU_INITIAL_ADMIN_USERNAME",
        "ROTU_INITIAL_ADMIN_EMAIL",
        "ROTU_INITIAL_ADMIN_PASSWORD",
        "ROTU_BUSINESS_COMPANY_NAME",
        "ROTU_BUSINESS_CURRENCY_SYMBOL",
        "ROTU_BUSINESS_DEFAULT_TAX_RATE",
        "ROTU_PDF_TEMPLATE_DIR",
        "ROTU_PDF_CONVERTER",
        "ROTU_LOGGING_LEVEL",
        "ROTU_LOGGING_FORMAT",
        "ROTU_LOG_LEVEL",
        "ROTU_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
