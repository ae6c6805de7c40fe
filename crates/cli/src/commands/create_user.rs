use anyhow::Context;
use rotu_core::config::LoadOptions;
use rotu_core::credentials::hash_password;
use rotu_core::domain::user::{NewUser, Role};
use rotu_db::migrations;
use rotu_db::repositories::{RepositoryError, SqlUserRepository, UserRepository};
use serde_json::json;

use crate::commands::{open_pool, prepare, CommandResult};

#[derive(Clone, Debug)]
pub struct CreateUserArgs {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
}

pub fn run(options: LoadOptions, args: CreateUserArgs) -> CommandResult {
    let role: Role = match args.role.parse() {
        Ok(role) => role,
        Err(error) => return CommandResult::failure("create-user", "invalid_input", error.to_string(), 2),
    };
    let user = NewUser {
        username: args.username,
        email: args.email,
        password: args.password,
        first_name: args.first_name,
        last_name: args.last_name,
        phone: String::new(),
        role,
    };
    if let Err(error) = user.validate() {
        return CommandResult::failure("create-user", "invalid_input", error.to_string(), 2);
    }

    let (config, runtime) = match prepare("create-user", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await.map_err(|(_, message, _)| anyhow::anyhow!(message))?;
        migrations::run_pending(&pool).await.context("applying migrations")?;

        let password_hash = hash_password(&user.password)?;
        let created = SqlUserRepository::new(pool.clone()).create(&user, &password_hash).await;
        pool.close().await;
        Ok::<_, anyhow::Error>(created?)
    });

    match result {
        Ok(created) => CommandResult::success_with(
            "create-user",
            format!("created user `{}`", created.username),
            Some(json!({ "id": created.id, "username": created.username, "role": created.role })),
        ),
        Err(error) => {
            let (error_class, exit_code) = match error.downcast_ref::<RepositoryError>() {
                Some(RepositoryError::Conflict(_)) => ("conflict", 6),
                Some(RepositoryError::Domain(_)) => ("invalid_input", 2),
                _ => ("execution", 5),
            };
            CommandResult::failure("create-user", error_class, format!("{error:#}"), exit_code)
        }
    }
}
