use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use rotu_core::domain::client::{Client, ClientId, ClientInput, ClientStats};

use super::codec::{
    decode_decimal, decode_timestamp, encode_timestamp, is_foreign_key_violation, like_pattern,
};
use super::{ClientRepository, RepositoryError};
use crate::DbPool;

const SELECT_CLIENT: &str = "SELECT id, name, company, phone, email, address, rtn, notes, is_active,
        created_at, updated_at
 FROM clients";

#[derive(Clone, Debug, Default)]
pub struct ClientFilter {
    pub is_active: Option<bool>,
    /// Matches name, company, phone, email or RTN.
    pub search: Option<String>,
}

pub struct SqlClientRepository {
    pool: DbPool,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn client_from_row(row: &SqliteRow) -> Result<Client, RepositoryError> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Client {
        id: ClientId(row.try_get("id")?),
        name: row.try_get("name")?,
        company: row.try_get("company")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        address: row.try_get("address")?,
        rtn: row.try_get("rtn")?,
        notes: row.try_get("notes")?,
        is_active: row.try_get("is_active")?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl ClientRepository for SqlClientRepository {
    async fn create(&self, input: &ClientInput) -> Result<Client, RepositoryError> {
        let now = encode_timestamp(Utc::now());
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO clients (name, company, phone, email, address, rtn, notes, is_active,
                                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(input.name.trim())
        .bind(input.company.trim())
        .bind(input.phone.trim())
        .bind(input.email.trim())
        .bind(input.address.trim())
        .bind(input.rtn.trim())
        .bind(&input.notes)
        .bind(input.is_active)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        self.find_by_id(ClientId(id)).await?.ok_or_else(|| RepositoryError::not_found("client", id))
    }

    async fn find_by_id(&self, id: ClientId) -> Result<Option<Client>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_CLIENT} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(client_from_row).transpose()
    }

    async fn list(&self, filter: &ClientFilter) -> Result<Vec<Client>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_CLIENT);
        query.push(" WHERE 1 = 1");
        if let Some(is_active) = filter.is_active {
            query.push(" AND is_active = ").push_bind(is_active);
        }
        if let Some(pattern) = like_pattern(filter.search.as_deref()) {
            query.push(" AND (");
            let mut columns = query.separated(" OR ");
            for column in ["name", "company", "phone", "email", "rtn"] {
                columns.push(format!("{column} LIKE ")).push_bind_unseparated(pattern.clone());
            }
            query.push(")");
        }
        query.push(" ORDER BY name ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(client_from_row).collect()
    }

    async fn update(&self, id: ClientId, input: &ClientInput) -> Result<Client, RepositoryError> {
        let result = sqlx::query(
            "UPDATE clients
             SET name = ?, company = ?, phone = ?, email = ?, address = ?, rtn = ?, notes = ?,
                 is_active = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(input.name.trim())
        .bind(input.company.trim())
        .bind(input.phone.trim())
        .bind(input.email.trim())
        .bind(input.address.trim())
        .bind(input.rtn.trim())
        .bind(&input.notes)
        .bind(input.is_active)
        .bind(encode_timestamp(Utc::now()))
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("client", id));
        }
        self.find_by_id(id).await?.ok_or_else(|| RepositoryError::not_found("client", id))
    }

    async fn delete(&self, id: ClientId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                if is_foreign_key_violation(&error) {
                    RepositoryError::Conflict(format!(
                        "client {id} has quotations or sales and cannot be deleted"
                    ))
                } else {
                    error.into()
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("client", id));
        }
        Ok(())
    }

    async fn stats(&self, id: ClientId) -> Result<ClientStats, RepositoryError> {
        let sale_totals: Vec<String> = sqlx::query_scalar(
            "SELECT total_amount FROM sales WHERE client_id = ? AND status = 'COMPLETED'",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;
        let total_quotations: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM quotations WHERE client_id = ?")
                .bind(id.0)
                .fetch_one(&self.pool)
                .await?;

        let mut total_sales = Decimal::ZERO;
        for total in &sale_totals {
            total_sales += decode_decimal("total_amount", total)?;
        }
        Ok(ClientStats { total_sales, total_quotations })
    }
}
