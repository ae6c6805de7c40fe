use chrono::Utc;

use rotu_core::domain::user::Role;

use crate::connection::{begin_write, DbPool};
use crate::repositories::codec::encode_timestamp;
use crate::repositories::RepositoryError;

/// Categories every fresh installation starts with.
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Viniles", "Viniles adhesivos y de corte"),
    ("Lonas", "Lonas para impresión de gran formato"),
    ("Papel", "Papel y cartulina"),
    ("Tintas", "Tintas y consumibles de impresión"),
    ("Otros", "Materiales varios"),
];

/// Initial administrator account. The password arrives already hashed.
#[derive(Clone, Debug)]
pub struct AdminSeed {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Baseline data required by a fresh installation: the initial administrator and the
/// default product categories. Loading is idempotent; existing rows are left alone.
pub struct SeedDataset;

impl SeedDataset {
    pub async fn load(pool: &DbPool, admin: &AdminSeed) -> Result<SeedResult, RepositoryError> {
        let mut tx = begin_write(pool).await?;
        let now = encode_timestamp(Utc::now());

        let admin_created = sqlx::query(
            "INSERT OR IGNORE INTO users (username, email, password_hash, role, is_active,
                                          created_at, updated_at)
             VALUES (?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(admin.username.trim())
        .bind(admin.email.trim())
        .bind(&admin.password_hash)
        .bind(Role::Admin.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        let mut categories_created = Vec::new();
        for (name, description) in DEFAULT_CATEGORIES {
            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO categories (name, description, created_at, updated_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(*name)
            .bind(*description)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if inserted > 0 {
                categories_created.push(*name);
            }
        }
        tx.commit().await?;

        tracing::info!(
            event_name = "seed.loaded",
            admin_created,
            categories_created = categories_created.len(),
            "baseline data ensured"
        );
        Ok(SeedResult { admin_created, categories_created })
    }

    pub async fn verify(pool: &DbPool, admin_username: &str) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(DEFAULT_CATEGORIES.len() + 1);

        let admins: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ? AND role = ?")
                .bind(admin_username.trim())
                .bind(Role::Admin.as_str())
                .fetch_one(pool)
                .await?;
        checks.push(("admin_user", admins == 1));

        for (name, _) in DEFAULT_CATEGORIES {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE name = ?")
                .bind(*name)
                .fetch_one(pool)
                .await?;
            checks.push((*name, count == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub admin_created: bool,
    pub categories_created: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_with_settings, migrations};

    fn admin() -> AdminSeed {
        AdminSeed {
            username: "admin".to_string(),
            email: "admin@rotuprinters.local".to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
        }
    }

    #[tokio::test]
    async fn seed_is_idempotent_and_verifiable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");

        let first = SeedDataset::load(&pool, &admin()).await.expect("first seed");
        assert!(first.admin_created);
        assert_eq!(first.categories_created.len(), DEFAULT_CATEGORIES.len());

        let second = SeedDataset::load(&pool, &admin()).await.expect("second seed");
        assert!(!second.admin_created);
        assert!(second.categories_created.is_empty());

        let verification = SeedDataset::verify(&pool, "admin").await.expect("verify");
        assert!(verification.all_present, "{:?}", verification.checks);
    }

    #[tokio::test]
    async fn verify_reports_missing_rows_on_empty_database() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");

        let verification = SeedDataset::verify(&pool, "admin").await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, present)| !present));
    }
}
