use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use rotu_core::domain::expense::{Expense, ExpenseId, ExpenseInput};
use rotu_core::domain::user::UserId;

use super::codec::{
    decode_date, decode_decimal, decode_timestamp, encode_date, encode_timestamp, like_pattern,
};
use super::quotation::in_clause;
use super::{ExpenseRepository, RepositoryError};
use crate::DbPool;

const SELECT_EXPENSE: &str = "SELECT e.id, e.description, e.date, e.amount, e.created_by,
        u.username AS created_by_username, e.created_at, e.updated_at
 FROM expenses e
 LEFT JOIN users u ON u.id = e.created_by";

#[derive(Clone, Debug, Default)]
pub struct ExpenseFilter {
    /// Inclusive.
    pub start_date: Option<NaiveDate>,
    /// Inclusive.
    pub end_date: Option<NaiveDate>,
    pub search: Option<String>,
}

pub struct SqlExpenseRepository {
    pool: DbPool,
}

impl SqlExpenseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn expense_from_row(row: &SqliteRow) -> Result<Expense, RepositoryError> {
    let date: String = row.try_get("date")?;
    let amount: String = row.try_get("amount")?;
    let created_by: Option<i64> = row.try_get("created_by")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Expense {
        id: ExpenseId(row.try_get("id")?),
        description: row.try_get("description")?,
        date: decode_date("date", &date)?,
        amount: decode_decimal("amount", &amount)?,
        created_by: created_by.map(UserId),
        created_by_username: row.try_get("created_by_username")?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl ExpenseRepository for SqlExpenseRepository {
    async fn create(
        &self,
        input: &ExpenseInput,
        created_by: Option<UserId>,
    ) -> Result<Expense, RepositoryError> {
        input.validate()?;
        let now = encode_timestamp(Utc::now());
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO expenses (description, date, amount, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(input.description.trim())
        .bind(encode_date(input.date))
        .bind(input.amount.to_string())
        .bind(created_by.map(|id| id.0))
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        self.find_by_id(ExpenseId(id)).await?.ok_or_else(|| RepositoryError::not_found("expense", id))
    }

    async fn find_by_id(&self, id: ExpenseId) -> Result<Option<Expense>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_EXPENSE} WHERE e.id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(expense_from_row).transpose()
    }

    async fn list(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_EXPENSE);
        query.push(" WHERE 1 = 1");
        if let Some(start) = filter.start_date {
            query.push(" AND e.date >= ").push_bind(encode_date(start));
        }
        if let Some(end) = filter.end_date {
            query.push(" AND e.date <= ").push_bind(encode_date(end));
        }
        if let Some(pattern) = like_pattern(filter.search.as_deref()) {
            query.push(" AND e.description LIKE ").push_bind(pattern);
        }
        query.push(" ORDER BY e.date DESC, e.created_at DESC, e.id DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(expense_from_row).collect()
    }

    async fn update(
        &self,
        id: ExpenseId,
        input: &ExpenseInput,
    ) -> Result<Expense, RepositoryError> {
        input.validate()?;
        let result = sqlx::query(
            "UPDATE expenses SET description = ?, date = ?, amount = ?, updated_at = ? WHERE id = ?",
        )
        .bind(input.description.trim())
        .bind(encode_date(input.date))
        .bind(input.amount.to_string())
        .bind(encode_timestamp(Utc::now()))
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("expense", id));
        }
        self.find_by_id(id).await?.ok_or_else(|| RepositoryError::not_found("expense", id))
    }

    async fn delete(&self, id: ExpenseId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM expenses WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("expense", id));
        }
        Ok(())
    }

    async fn delete_many(&self, ids: &[ExpenseId]) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM expenses WHERE id IN");
        in_clause(&mut query, ids.iter().map(|id| id.0));
        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
