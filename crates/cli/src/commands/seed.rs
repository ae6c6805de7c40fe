use rotu_core::config::LoadOptions;
use rotu_core::credentials::hash_password;
use rotu_db::{migrations, AdminSeed, SeedDataset};
use secrecy::ExposeSecret;
use serde_json::json;

use crate::commands::{open_pool, prepare, CommandFailure, CommandResult};

/// Ensures the initial administrator and the default categories exist. Safe to repeat.
pub fn run(options: LoadOptions) -> CommandResult {
    let (config, runtime) = match prepare("seed", options) {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let password_hash = hash_password(config.auth.initial_admin_password.expose_secret())
            .map_err(|error| ("credentials", error.to_string(), 5u8))?;
        let admin = AdminSeed {
            username: config.auth.initial_admin_username.clone(),
            email: config.auth.initial_admin_email.clone(),
            password_hash,
        };

        let seed_result = SeedDataset::load(&pool, &admin)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = SeedDataset::verify(&pool, &admin.username)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        pool.close().await;

        if !verification.all_present {
            let failed = failed_checks(&verification.checks);
            return Err(("seed_verification", verification_message(&failed), 6u8));
        }
        Ok::<_, CommandFailure>(seed_result)
    });

    match result {
        Ok(seeded) => {
            let message = if seeded.admin_created || !seeded.categories_created.is_empty() {
                "baseline data loaded"
            } else {
                "baseline data already present"
            };
            CommandResult::success_with(
                "seed",
                message,
                Some(json!({
                    "admin_username": config.auth.initial_admin_username,
                    "admin_created": seeded.admin_created,
                    "categories_created": seeded.categories_created,
                })),
            )
        }
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn failed_checks<'a>(checks: &[(&'a str, bool)]) -> Vec<&'a str> {
    checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect()
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::{failed_checks, verification_message};

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [("admin_user", true), ("Viniles", false), ("Tintas", false)];
        let failed = failed_checks(&checks);
        assert_eq!(verification_message(&failed), "Seed verification failed for checks: Viniles, Tintas");
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let checks = [("admin_user", true), ("Papel", true)];
        assert_eq!(verification_message(&failed_checks(&checks)), "Some seed data failed to load");
    }
}
