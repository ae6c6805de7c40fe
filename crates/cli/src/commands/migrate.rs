use rotu_core::config::LoadOptions;
use rotu_db::migrations;
use serde_json::json;

use crate::commands::{open_pool, prepare, CommandFailure, CommandResult};

pub fn run(options: LoadOptions) -> CommandResult {
    let (config, runtime) = match prepare("migrate", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let before = migrations::status(&pool)
            .await
            .map_err(|error| ("migration_status", error.to_string(), 5u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<_, CommandFailure>(before)
    });

    match result {
        Ok(before) => {
            let applied = before.pending();
            CommandResult::success_with(
                "migrate",
                format!("applied {applied} pending migration(s)"),
                Some(json!({ "applied": applied, "available": before.available })),
            )
        }
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}
