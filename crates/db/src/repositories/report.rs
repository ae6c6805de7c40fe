use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use rotu_core::domain::client::ClientId;
use rotu_core::domain::inventory::ProductId;
use rotu_core::reports::{QuotationFact, SaleFact, SaleItemFact};

use super::codec::{
    decode_decimal, decode_label, decode_optional_timestamp, decode_quantity, decode_timestamp,
    encode_date,
};
use super::{ReportRepository, RepositoryError};
use crate::DbPool;

/// Inclusive calendar-day bounds on a sale's `created_at` (UTC day).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    fn push_bounds(&self, query: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(start) = self.start {
            query.push(" AND substr(s.created_at, 1, 10) >= ").push_bind(encode_date(start));
        }
        if let Some(end) = self.end {
            query.push(" AND substr(s.created_at, 1, 10) <= ").push_bind(encode_date(end));
        }
    }
}

const SELECT_SALE_FACT: &str = "SELECT s.client_id, s.status, s.payment_method, s.total_amount,
        s.created_at, s.completed_at
 FROM sales s";

pub struct SqlReportRepository {
    pool: DbPool,
}

impl SqlReportRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn sale_fact_from_row(row: &SqliteRow) -> Result<SaleFact, RepositoryError> {
    let status: String = row.try_get("status")?;
    let payment_method: String = row.try_get("payment_method")?;
    let total_amount: String = row.try_get("total_amount")?;
    let created_at: String = row.try_get("created_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(SaleFact {
        client_id: ClientId(row.try_get("client_id")?),
        status: decode_label("status", &status)?,
        payment_method: decode_label("payment_method", &payment_method)?,
        total_amount: decode_decimal("total_amount", &total_amount)?,
        created_at: decode_timestamp("created_at", &created_at)?,
        completed_at: decode_optional_timestamp("completed_at", completed_at)?,
    })
}

#[async_trait::async_trait]
impl ReportRepository for SqlReportRepository {
    async fn sale_facts(&self) -> Result<Vec<SaleFact>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_SALE_FACT} ORDER BY s.created_at ASC, s.id ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(sale_fact_from_row).collect()
    }

    async fn completed_sale_facts(
        &self,
        range: &DateRange,
    ) -> Result<Vec<SaleFact>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_SALE_FACT);
        query.push(" WHERE s.status = 'COMPLETED'");
        range.push_bounds(&mut query);
        query.push(" ORDER BY s.created_at ASC, s.id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(sale_fact_from_row).collect()
    }

    async fn completed_item_facts(
        &self,
        range: &DateRange,
    ) -> Result<Vec<SaleItemFact>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT i.product_id, p.name AS product_name, i.quantity, i.total
             FROM sale_items i
             JOIN sales s ON s.id = i.sale_id
             JOIN products p ON p.id = i.product_id
             WHERE s.status = 'COMPLETED'",
        );
        range.push_bounds(&mut query);
        query.push(" ORDER BY i.id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<SaleItemFact, RepositoryError> {
                let total: String = row.try_get("total")?;
                Ok(SaleItemFact {
                    product_id: ProductId(row.try_get("product_id")?),
                    product_name: row.try_get("product_name")?,
                    quantity: decode_quantity("quantity", row.try_get("quantity")?)?,
                    total: decode_decimal("total", &total)?,
                })
            })
            .collect()
    }

    async fn quotation_facts(&self) -> Result<Vec<QuotationFact>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT c.name AS client_name, q.status, q.total_amount
             FROM quotations q
             JOIN clients c ON c.id = q.client_id
             ORDER BY q.id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<QuotationFact, RepositoryError> {
                let status: String = row.try_get("status")?;
                let total_amount: String = row.try_get("total_amount")?;
                Ok(QuotationFact {
                    client_name: row.try_get("client_name")?,
                    status: decode_label("status", &status)?,
                    total_amount: decode_decimal("total_amount", &total_amount)?,
                })
            })
            .collect()
    }
}
