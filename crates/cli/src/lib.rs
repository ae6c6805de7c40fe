pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rotu_core::config::LoadOptions;

use crate::commands::create_user::CreateUserArgs;

#[derive(Debug, Parser)]
#[command(
    name = "rotu",
    about = "Rotu operator CLI",
    long_about = "Operate the Rotu backend: migrations, baseline data, config inspection, readiness checks and user provisioning.",
    after_help = "Examples:\n  rotu migrate\n  rotu seed\n  rotu doctor --json\n  rotu create-user --username ana --email ana@example.com --password s3cret-pass --role seller"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file to load instead of rotu.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and report how many ran")]
    Migrate,
    #[command(about = "Ensure the initial administrator and default categories exist")]
    Seed,
    #[command(about = "Print the effective configuration with secrets redacted")]
    Config,
    #[command(about = "Check config, database, migrations, PDF converter and templates")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Create a user account with the given role")]
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "seller", help = "admin, seller or designer")]
        role: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        ..LoadOptions::default()
    };

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Seed => commands::seed::run(options),
        Command::Config => commands::config::run(options),
        Command::Doctor { json } => commands::doctor::run(options, json),
        Command::CreateUser { username, email, password, role, first_name, last_name } => {
            commands::create_user::run(
                options,
                CreateUserArgs { username, email, password, role, first_name, last_name },
            )
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
