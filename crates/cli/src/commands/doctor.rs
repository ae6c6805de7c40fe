use std::path::Path;

use rotu_core::config::{AppConfig, LoadOptions, PdfConfig};
use rotu_db::{connect_with_settings, migrations, ping};
use serde::Serialize;

use crate::commands::CommandResult;

/// Templates every printable document needs.
const REQUIRED_TEMPLATES: &[&str] = &[
    "base.html.tera",
    "quotation.html.tera",
    "invoice.html.tera",
    "sales_report.html.tera",
    "expenses_report.html.tera",
    "daily_sales.html.tera",
    "total_sales.html.tera",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// A missing PDF converter only warns: documents are then served as HTML.
pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.extend(check_database(&config));
            checks.push(check_pdf_converter(&config.pdf));
            checks.push(check_templates(&config.pdf.template_dir));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["database_connectivity", "migrations", "pdf_converter", "pdf_templates"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status != CheckStatus::Pass);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {error}"),
                    },
                    DoctorCheck {
                        name: "migrations",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let connectivity = match ping(&pool).await {
            Ok(()) => DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Pass,
                details: format!("connected using `{}`", config.database.url),
            },
            Err(error) => DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("database did not answer: {error}"),
            },
        };

        let migration_state = match migrations::status(&pool).await {
            Ok(status) if status.pending() == 0 => DoctorCheck {
                name: "migrations",
                status: CheckStatus::Pass,
                details: format!("{} of {} migrations applied", status.applied, status.available),
            },
            Ok(status) => DoctorCheck {
                name: "migrations",
                status: CheckStatus::Fail,
                details: format!("{} pending migration(s); run `rotu migrate`", status.pending()),
            },
            Err(error) => DoctorCheck {
                name: "migrations",
                status: CheckStatus::Fail,
                details: format!("could not read migration state: {error}"),
            },
        };

        pool.close().await;
        vec![connectivity, migration_state]
    })
}

fn check_pdf_converter(pdf: &PdfConfig) -> DoctorCheck {
    match which::which(&pdf.converter) {
        Ok(path) => DoctorCheck {
            name: "pdf_converter",
            status: CheckStatus::Pass,
            details: format!("found `{}`", path.display()),
        },
        Err(_) => DoctorCheck {
            name: "pdf_converter",
            status: CheckStatus::Warn,
            details: format!("`{}` not found on PATH; documents will be served as HTML", pdf.converter),
        },
    }
}

fn check_templates(template_dir: &Path) -> DoctorCheck {
    if !template_dir.is_dir() {
        return DoctorCheck {
            name: "pdf_templates",
            status: CheckStatus::Pass,
            details: format!("`{}` not present; built-in templates will be used", template_dir.display()),
        };
    }

    let missing: Vec<&str> =
        REQUIRED_TEMPLATES.iter().copied().filter(|name| !template_dir.join(name).is_file()).collect();
    if missing.is_empty() {
        DoctorCheck {
            name: "pdf_templates",
            status: CheckStatus::Pass,
            details: format!("all templates present in `{}`", template_dir.display()),
        }
    } else {
        DoctorCheck {
            name: "pdf_templates",
            status: CheckStatus::Fail,
            details: format!("missing from `{}`: {}", template_dir.display(), missing.join(", ")),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
