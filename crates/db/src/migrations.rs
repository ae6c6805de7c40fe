use sqlx::migrate::{MigrateError, Migrator};
use sqlx::Row;

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Applied and known migration counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MigrationStatus {
    pub applied: usize,
    pub available: usize,
}

impl MigrationStatus {
    pub fn pending(&self) -> usize {
        self.available.saturating_sub(self.applied)
    }
}

pub async fn status(pool: &DbPool) -> Result<MigrationStatus, sqlx::Error> {
    let available = MIGRATOR.iter().filter(|migration| migration.migration_type.is_up_migration()).count();
    let tracked = sqlx::query(
        "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?
    .get::<i64, _>("count");

    let applied = if tracked == 0 {
        0
    } else {
        sqlx::query("SELECT COUNT(*) AS count FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?
            .get::<i64, _>("count")
    };

    Ok(MigrationStatus { applied: usize::try_from(applied).unwrap_or_default(), available })
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{run_pending, status};
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "users",
        "clients",
        "categories",
        "products",
        "stock_movements",
        "simple_products",
        "simple_movements",
        "quotations",
        "quotation_items",
        "sales",
        "sale_items",
        "expenses",
        "idx_users_role",
        "idx_clients_name",
        "idx_products_category_id",
        "idx_stock_movements_product_id",
        "idx_simple_movements_product_id",
        "idx_quotations_client_id",
        "idx_quotations_status",
        "idx_quotation_items_quotation_id",
        "idx_sales_client_id",
        "idx_sales_status",
        "idx_sales_created_at",
        "idx_sale_items_sale_id",
        "idx_expenses_date",
    ];

    #[tokio::test]
    async fn migrations_create_every_table() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let signature = managed_schema_signature(&pool).await;
        assert_eq!(signature.len(), MANAGED_SCHEMA_OBJECTS.len());

        let migration_status = status(&pool).await.expect("status");
        assert_eq!(migration_status.pending(), 0);
        assert_eq!(migration_status.applied, 7);
    }

    #[tokio::test]
    async fn status_reports_everything_pending_on_a_fresh_database() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");

        let migration_status = status(&pool).await.expect("status");
        assert_eq!(migration_status.applied, 0);
        assert_eq!(migration_status.pending(), 7);
    }

    #[tokio::test]
    async fn document_numbers_are_unique() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let sql = sqlx::query(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'sales'",
        )
        .fetch_one(&pool)
        .await
        .expect("sales table")
        .get::<String, _>("sql");

        assert!(sql.contains("invoice_number TEXT NOT NULL UNIQUE"));
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let after_down_signature = managed_schema_signature(&pool).await;
        assert!(
            after_down_signature.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");

        let after_second_up_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            after_second_up_signature, initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
