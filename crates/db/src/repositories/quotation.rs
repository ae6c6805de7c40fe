use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use rotu_core::documents::{DocumentSeries, DocumentTotals, QuotationLine};
use rotu_core::domain::client::ClientId;
use rotu_core::domain::inventory::ProductId;
use rotu_core::domain::quotation::{
    Quotation, QuotationDraft, QuotationId, QuotationItem, QuotationItemId, QuotationStatus,
};
use rotu_core::domain::user::UserId;

use super::codec::{
    decode_date, decode_decimal, decode_label, decode_quantity, decode_timestamp, encode_date,
    encode_timestamp, is_foreign_key_violation, is_unique_violation, like_pattern,
};
use super::{QuotationRepository, RepositoryError, MAX_NUMBER_ATTEMPTS};
use crate::{begin_write, DbPool};

const SELECT_QUOTATION: &str = "SELECT q.id, q.quotation_number, q.client_id, c.name AS client_name,
        q.created_by, u.username AS created_by_username, q.status, q.discount_percentage,
        q.apply_tax, q.tax_rate, q.subtotal, q.discount_amount, q.tax_amount, q.total_amount,
        q.notes, q.valid_until, q.created_at, q.updated_at
 FROM quotations q
 JOIN clients c ON c.id = q.client_id
 LEFT JOIN users u ON u.id = q.created_by";

const SELECT_ITEM: &str = "SELECT i.id, i.quotation_id, i.product_id, p.name AS product_name,
        i.description, i.width_inches, i.height_inches, i.square_inches,
        i.price_per_square_inch, i.quantity, i.total
 FROM quotation_items i
 JOIN products p ON p.id = i.product_id";

#[derive(Clone, Debug, Default)]
pub struct QuotationFilter {
    pub client_id: Option<ClientId>,
    pub status: Option<QuotationStatus>,
    pub created_by: Option<UserId>,
    /// Matches the quotation number or the client's name or company.
    pub search: Option<String>,
}

pub struct SqlQuotationRepository {
    pool: DbPool,
}

impl SqlQuotationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn totals_from_row(row: &SqliteRow) -> Result<DocumentTotals, RepositoryError> {
    let subtotal: String = row.try_get("subtotal")?;
    let discount_amount: String = row.try_get("discount_amount")?;
    let tax_amount: String = row.try_get("tax_amount")?;
    let total_amount: String = row.try_get("total_amount")?;

    Ok(DocumentTotals {
        subtotal: decode_decimal("subtotal", &subtotal)?,
        discount_amount: decode_decimal("discount_amount", &discount_amount)?,
        tax_amount: decode_decimal("tax_amount", &tax_amount)?,
        total_amount: decode_decimal("total_amount", &total_amount)?,
    })
}

fn quotation_from_row(row: &SqliteRow) -> Result<Quotation, RepositoryError> {
    let status: String = row.try_get("status")?;
    let discount_percentage: String = row.try_get("discount_percentage")?;
    let tax_rate: String = row.try_get("tax_rate")?;
    let created_by: Option<i64> = row.try_get("created_by")?;
    let valid_until: Option<String> = row.try_get("valid_until")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Quotation {
        id: QuotationId(row.try_get("id")?),
        quotation_number: row.try_get("quotation_number")?,
        client_id: ClientId(row.try_get("client_id")?),
        client_name: row.try_get("client_name")?,
        created_by: created_by.map(UserId),
        created_by_username: row.try_get("created_by_username")?,
        status: decode_label("status", &status)?,
        discount_percentage: decode_decimal("discount_percentage", &discount_percentage)?,
        apply_tax: row.try_get("apply_tax")?,
        tax_rate: decode_decimal("tax_rate", &tax_rate)?,
        totals: totals_from_row(row)?,
        notes: row.try_get("notes")?,
        valid_until: valid_until.as_deref().map(|value| decode_date("valid_until", value)).transpose()?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
        items: Vec::new(),
    })
}

fn item_from_row(row: &SqliteRow) -> Result<QuotationItem, RepositoryError> {
    let width_inches: String = row.try_get("width_inches")?;
    let height_inches: String = row.try_get("height_inches")?;
    let square_inches: String = row.try_get("square_inches")?;
    let price_per_square_inch: String = row.try_get("price_per_square_inch")?;
    let total: String = row.try_get("total")?;

    Ok(QuotationItem {
        id: QuotationItemId(row.try_get("id")?),
        quotation_id: QuotationId(row.try_get("quotation_id")?),
        product_name: row.try_get("product_name")?,
        line: QuotationLine {
            product_id: ProductId(row.try_get("product_id")?),
            description: row.try_get("description")?,
            width_inches: decode_decimal("width_inches", &width_inches)?,
            height_inches: decode_decimal("height_inches", &height_inches)?,
            square_inches: decode_decimal("square_inches", &square_inches)?,
            price_per_square_inch: decode_decimal("price_per_square_inch", &price_per_square_inch)?,
            quantity: decode_quantity("quantity", row.try_get("quantity")?)?,
            total: decode_decimal("total", &total)?,
        },
    })
}

/// The quotation with its items, in item insertion order.
pub(crate) async fn load_quotation(
    conn: &mut SqliteConnection,
    id: QuotationId,
) -> Result<Option<Quotation>, RepositoryError> {
    let row = sqlx::query(&format!("{SELECT_QUOTATION} WHERE q.id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut quotation = quotation_from_row(&row)?;
    let items = sqlx::query(&format!("{SELECT_ITEM} WHERE i.quotation_id = ? ORDER BY i.id ASC"))
        .bind(id.0)
        .fetch_all(&mut *conn)
        .await?;
    quotation.items = items.iter().map(item_from_row).collect::<Result<_, _>>()?;
    Ok(Some(quotation))
}

async fn require_quotation(
    conn: &mut SqliteConnection,
    id: QuotationId,
) -> Result<Quotation, RepositoryError> {
    load_quotation(conn, id).await?.ok_or_else(|| RepositoryError::not_found("quotation", id))
}

async fn insert_lines(
    conn: &mut SqliteConnection,
    id: QuotationId,
    lines: &[QuotationLine],
) -> Result<(), RepositoryError> {
    for line in lines {
        insert_line(conn, id, line).await?;
    }
    Ok(())
}

async fn insert_line(
    conn: &mut SqliteConnection,
    id: QuotationId,
    line: &QuotationLine,
) -> Result<QuotationItemId, RepositoryError> {
    let item_id: i64 = sqlx::query_scalar(
        "INSERT INTO quotation_items (quotation_id, product_id, description, width_inches,
                                      height_inches, square_inches, price_per_square_inch,
                                      quantity, total)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(id.0)
    .bind(line.product_id.0)
    .bind(&line.description)
    .bind(line.width_inches.to_string())
    .bind(line.height_inches.to_string())
    .bind(line.square_inches.to_string())
    .bind(line.price_per_square_inch.to_string())
    .bind(i64::from(line.quantity))
    .bind(line.total.to_string())
    .fetch_one(&mut *conn)
    .await
    .map_err(|error| missing_product(error, line.product_id))?;
    Ok(QuotationItemId(item_id))
}

pub(crate) fn missing_product(error: sqlx::Error, product_id: ProductId) -> RepositoryError {
    if is_foreign_key_violation(&error) {
        RepositoryError::not_found("product", product_id)
    } else {
        error.into()
    }
}

async fn write_totals(
    conn: &mut SqliteConnection,
    id: QuotationId,
    totals: &DocumentTotals,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE quotations
         SET subtotal = ?, discount_amount = ?, tax_amount = ?, total_amount = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(totals.subtotal.to_string())
    .bind(totals.discount_amount.to_string())
    .bind(totals.tax_amount.to_string())
    .bind(totals.total_amount.to_string())
    .bind(encode_timestamp(Utc::now()))
    .bind(id.0)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Re-derives the stored totals from the current items.
async fn recompute(conn: &mut SqliteConnection, id: QuotationId) -> Result<(), RepositoryError> {
    let quotation = require_quotation(conn, id).await?;
    let totals = quotation.totals_for(quotation.lines())?;
    write_totals(conn, id, &totals).await
}

pub(crate) async fn next_number(
    conn: &mut SqliteConnection,
    series: DocumentSeries,
) -> Result<String, RepositoryError> {
    let sql = match series {
        DocumentSeries::Quotation => "SELECT quotation_number FROM quotations ORDER BY id DESC LIMIT 1",
        DocumentSeries::Invoice => "SELECT invoice_number FROM sales ORDER BY id DESC LIMIT 1",
    };
    let last: Option<String> = sqlx::query_scalar(sql).fetch_optional(&mut *conn).await?;
    Ok(series.next_after(last.as_deref()))
}

pub(crate) fn in_clause(query: &mut QueryBuilder<'_, Sqlite>, ids: impl IntoIterator<Item = i64>) {
    query.push(" (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    query.push(")");
}

#[async_trait::async_trait]
impl QuotationRepository for SqlQuotationRepository {
    async fn create(
        &self,
        draft: &QuotationDraft,
        created_by: Option<UserId>,
    ) -> Result<Quotation, RepositoryError> {
        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            let mut tx = begin_write(&self.pool).await?;
            let number = next_number(&mut tx, DocumentSeries::Quotation).await?;
            let now = encode_timestamp(Utc::now());
            let header = &draft.header;

            let inserted: Result<i64, sqlx::Error> = sqlx::query_scalar(
                "INSERT INTO quotations (quotation_number, client_id, created_by, status,
                                         discount_percentage, apply_tax, tax_rate, subtotal,
                                         discount_amount, tax_amount, total_amount, notes,
                                         valid_until, created_at, updated_at)
                 VALUES (?, ?, ?, 'PENDING', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 RETURNING id",
            )
            .bind(&number)
            .bind(header.client_id.0)
            .bind(created_by.map(|id| id.0))
            .bind(header.discount_percentage.to_string())
            .bind(header.apply_tax)
            .bind(header.tax_rate.to_string())
            .bind(draft.totals.subtotal.to_string())
            .bind(draft.totals.discount_amount.to_string())
            .bind(draft.totals.tax_amount.to_string())
            .bind(draft.totals.total_amount.to_string())
            .bind(&header.notes)
            .bind(header.valid_until.map(encode_date))
            .bind(&now)
            .bind(&now)
            .fetch_one(&mut *tx)
            .await;

            let id = match inserted {
                Ok(id) => QuotationId(id),
                Err(error) if is_unique_violation(&error) => {
                    tracing::warn!(
                        event_name = "quotation.number.retry",
                        attempt,
                        number = %number,
                        "quotation number taken by a concurrent writer, retrying"
                    );
                    continue;
                }
                Err(error) if is_foreign_key_violation(&error) => {
                    return Err(RepositoryError::not_found("client", header.client_id));
                }
                Err(error) => return Err(error.into()),
            };

            insert_lines(&mut tx, id, &draft.lines).await?;
            let quotation = require_quotation(&mut tx, id).await?;
            tx.commit().await?;

            tracing::info!(
                event_name = "quotation.created",
                quotation_id = id.0,
                quotation_number = %quotation.quotation_number,
                total = %quotation.totals.total_amount,
                "quotation created"
            );
            return Ok(quotation);
        }

        Err(RepositoryError::Conflict(format!(
            "could not allocate a quotation number after {MAX_NUMBER_ATTEMPTS} attempts"
        )))
    }

    async fn find_by_id(&self, id: QuotationId) -> Result<Option<Quotation>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_quotation(&mut conn, id).await
    }

    async fn list(&self, filter: &QuotationFilter) -> Result<Vec<Quotation>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_QUOTATION);
        query.push(" WHERE 1 = 1");
        if let Some(client_id) = filter.client_id {
            query.push(" AND q.client_id = ").push_bind(client_id.0);
        }
        if let Some(status) = filter.status {
            query.push(" AND q.status = ").push_bind(status.as_str());
        }
        if let Some(created_by) = filter.created_by {
            query.push(" AND q.created_by = ").push_bind(created_by.0);
        }
        if let Some(pattern) = like_pattern(filter.search.as_deref()) {
            query
                .push(" AND (q.quotation_number LIKE ")
                .push_bind(pattern.clone())
                .push(" OR c.name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR c.company LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        query.push(" ORDER BY q.created_at DESC, q.id DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut quotations: Vec<Quotation> =
            rows.iter().map(quotation_from_row).collect::<Result<_, _>>()?;
        if quotations.is_empty() {
            return Ok(quotations);
        }

        let mut items_query = QueryBuilder::<Sqlite>::new(SELECT_ITEM);
        items_query.push(" WHERE i.quotation_id IN");
        in_clause(&mut items_query, quotations.iter().map(|quotation| quotation.id.0));
        items_query.push(" ORDER BY i.id ASC");
        let item_rows = items_query.build().fetch_all(&self.pool).await?;

        let mut grouped: BTreeMap<QuotationId, Vec<QuotationItem>> = BTreeMap::new();
        for row in &item_rows {
            let item = item_from_row(row)?;
            grouped.entry(item.quotation_id).or_default().push(item);
        }
        for quotation in &mut quotations {
            quotation.items = grouped.remove(&quotation.id).unwrap_or_default();
        }
        Ok(quotations)
    }

    async fn update(
        &self,
        id: QuotationId,
        draft: &QuotationDraft,
    ) -> Result<Quotation, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        let current = require_quotation(&mut tx, id).await?;
        current.ensure_editable()?;
        let header = &draft.header;

        sqlx::query(
            "UPDATE quotations
             SET client_id = ?, discount_percentage = ?, apply_tax = ?, tax_rate = ?, notes = ?,
                 valid_until = ?, subtotal = ?, discount_amount = ?, tax_amount = ?,
                 total_amount = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(header.client_id.0)
        .bind(header.discount_percentage.to_string())
        .bind(header.apply_tax)
        .bind(header.tax_rate.to_string())
        .bind(&header.notes)
        .bind(header.valid_until.map(encode_date))
        .bind(draft.totals.subtotal.to_string())
        .bind(draft.totals.discount_amount.to_string())
        .bind(draft.totals.tax_amount.to_string())
        .bind(draft.totals.total_amount.to_string())
        .bind(encode_timestamp(Utc::now()))
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            if is_foreign_key_violation(&error) {
                RepositoryError::not_found("client", header.client_id)
            } else {
                error.into()
            }
        })?;

        sqlx::query("DELETE FROM quotation_items WHERE quotation_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        insert_lines(&mut tx, id, &draft.lines).await?;

        let quotation = require_quotation(&mut tx, id).await?;
        tx.commit().await?;
        Ok(quotation)
    }

    async fn transition(
        &self,
        id: QuotationId,
        next: QuotationStatus,
    ) -> Result<Quotation, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        let mut quotation = require_quotation(&mut tx, id).await?;
        let previous = quotation.status;
        quotation.transition_to(next)?;
        if previous == next {
            return Ok(quotation);
        }

        sqlx::query("UPDATE quotations SET status = ?, updated_at = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(encode_timestamp(Utc::now()))
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        let quotation = require_quotation(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            event_name = "quotation.status.changed",
            quotation_id = id.0,
            from = previous.as_str(),
            to = next.as_str(),
            "quotation status changed"
        );
        Ok(quotation)
    }

    async fn delete(&self, id: QuotationId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM quotations WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("quotation", id));
        }
        Ok(())
    }

    async fn delete_many(&self, ids: &[QuotationId]) -> Result<Vec<String>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = begin_write(&self.pool).await?;

        let mut select =
            QueryBuilder::<Sqlite>::new("SELECT quotation_number FROM quotations WHERE id IN");
        in_clause(&mut select, ids.iter().map(|id| id.0));
        select.push(" ORDER BY id ASC");
        let numbers: Vec<String> = select
            .build()
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| row.try_get("quotation_number"))
            .collect::<Result<_, _>>()?;

        let mut delete = QueryBuilder::<Sqlite>::new("DELETE FROM quotations WHERE id IN");
        in_clause(&mut delete, ids.iter().map(|id| id.0));
        delete.build().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(numbers)
    }

    async fn find_item(
        &self,
        id: QuotationItemId,
    ) -> Result<Option<QuotationItem>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_ITEM} WHERE i.id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn list_items(
        &self,
        quotation_id: Option<QuotationId>,
    ) -> Result<Vec<QuotationItem>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_ITEM);
        if let Some(quotation_id) = quotation_id {
            query.push(" WHERE i.quotation_id = ").push_bind(quotation_id.0);
        }
        query.push(" ORDER BY i.quotation_id ASC, i.id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn add_item(
        &self,
        quotation_id: QuotationId,
        line: &QuotationLine,
    ) -> Result<QuotationItem, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        require_quotation(&mut tx, quotation_id).await?.ensure_editable()?;
        let item_id = insert_line(&mut tx, quotation_id, line).await?;
        recompute(&mut tx, quotation_id).await?;
        tx.commit().await?;

        self.find_item(item_id).await?.ok_or_else(|| RepositoryError::not_found("quotation item", item_id))
    }

    async fn update_item(
        &self,
        id: QuotationItemId,
        line: &QuotationLine,
    ) -> Result<QuotationItem, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        let quotation_id: Option<i64> =
            sqlx::query_scalar("SELECT quotation_id FROM quotation_items WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await?;
        let quotation_id =
            QuotationId(quotation_id.ok_or_else(|| RepositoryError::not_found("quotation item", id))?);
        require_quotation(&mut tx, quotation_id).await?.ensure_editable()?;

        sqlx::query(
            "UPDATE quotation_items
             SET product_id = ?, description = ?, width_inches = ?, height_inches = ?,
                 square_inches = ?, price_per_square_inch = ?, quantity = ?, total = ?
             WHERE id = ?",
        )
        .bind(line.product_id.0)
        .bind(&line.description)
        .bind(line.width_inches.to_string())
        .bind(line.height_inches.to_string())
        .bind(line.square_inches.to_string())
        .bind(line.price_per_square_inch.to_string())
        .bind(i64::from(line.quantity))
        .bind(line.total.to_string())
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(|error| missing_product(error, line.product_id))?;
        recompute(&mut tx, quotation_id).await?;
        tx.commit().await?;

        self.find_item(id).await?.ok_or_else(|| RepositoryError::not_found("quotation item", id))
    }

    async fn delete_item(&self, id: QuotationItemId) -> Result<(), RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        let quotation_id: Option<i64> =
            sqlx::query_scalar("SELECT quotation_id FROM quotation_items WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await?;
        let quotation_id =
            QuotationId(quotation_id.ok_or_else(|| RepositoryError::not_found("quotation item", id))?);
        require_quotation(&mut tx, quotation_id).await?.ensure_editable()?;

        sqlx::query("DELETE FROM quotation_items WHERE id = ?").bind(id.0).execute(&mut *tx).await?;
        recompute(&mut tx, quotation_id).await?;
        tx.commit().await?;
        Ok(())
    }
}
