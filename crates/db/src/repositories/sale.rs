use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use rotu_core::documents::{DocumentSeries, DocumentTotals, SaleLine};
use rotu_core::domain::client::ClientId;
use rotu_core::domain::inventory::{ProductId, StockMovementInput};
use rotu_core::domain::quotation::{QuotationId, QuotationStatus};
use rotu_core::domain::sale::{
    PaymentMethod, Sale, SaleDraft, SaleFromQuotation, SaleId, SaleItem, SaleItemId, SaleStatus,
};
use rotu_core::domain::user::UserId;
use rotu_core::stock::MovementKind;

use super::codec::{
    decode_decimal, decode_label, decode_optional_timestamp, decode_quantity, decode_timestamp,
    encode_timestamp, is_foreign_key_violation, is_unique_violation, like_pattern,
};
use super::inventory::apply_stock_movement;
use super::quotation::{in_clause, load_quotation, missing_product, next_number, totals_from_row};
use super::{RepositoryError, SaleRepository, MAX_NUMBER_ATTEMPTS};
use crate::{begin_write, DbPool};

const SELECT_SALE: &str = "SELECT s.id, s.invoice_number, s.client_id, c.name AS client_name,
        s.quotation_id, s.created_by, u.username AS created_by_username, s.status,
        s.payment_method, s.discount_percentage, s.tax_rate, s.subtotal, s.discount_amount,
        s.tax_amount, s.total_amount, s.notes, s.created_at, s.updated_at, s.completed_at
 FROM sales s
 JOIN clients c ON c.id = s.client_id
 LEFT JOIN users u ON u.id = s.created_by";

const SELECT_ITEM: &str = "SELECT i.id, i.sale_id, i.product_id, p.name AS product_name,
        i.description, i.width_inches, i.height_inches, i.square_inches, i.unit_price,
        i.quantity, i.quantity_used, i.total
 FROM sale_items i
 JOIN products p ON p.id = i.product_id";

#[derive(Clone, Debug, Default)]
pub struct SaleFilter {
    pub client_id: Option<ClientId>,
    pub status: Option<SaleStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub created_by: Option<UserId>,
    /// Matches the invoice number or the client's name or company.
    pub search: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

pub struct SqlSaleRepository {
    pool: DbPool,
}

impl SqlSaleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn sale_from_row(row: &SqliteRow) -> Result<Sale, RepositoryError> {
    let status: String = row.try_get("status")?;
    let payment_method: String = row.try_get("payment_method")?;
    let discount_percentage: String = row.try_get("discount_percentage")?;
    let tax_rate: String = row.try_get("tax_rate")?;
    let quotation_id: Option<i64> = row.try_get("quotation_id")?;
    let created_by: Option<i64> = row.try_get("created_by")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(Sale {
        id: SaleId(row.try_get("id")?),
        invoice_number: row.try_get("invoice_number")?,
        client_id: ClientId(row.try_get("client_id")?),
        client_name: row.try_get("client_name")?,
        quotation_id: quotation_id.map(QuotationId),
        created_by: created_by.map(UserId),
        created_by_username: row.try_get("created_by_username")?,
        status: decode_label("status", &status)?,
        payment_method: decode_label("payment_method", &payment_method)?,
        discount_percentage: decode_decimal("discount_percentage", &discount_percentage)?,
        tax_rate: decode_decimal("tax_rate", &tax_rate)?,
        totals: totals_from_row(row)?,
        notes: row.try_get("notes")?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
        completed_at: decode_optional_timestamp("completed_at", completed_at)?,
        items: Vec::new(),
    })
}

fn item_from_row(row: &SqliteRow) -> Result<SaleItem, RepositoryError> {
    let width_inches: String = row.try_get("width_inches")?;
    let height_inches: String = row.try_get("height_inches")?;
    let square_inches: String = row.try_get("square_inches")?;
    let unit_price: String = row.try_get("unit_price")?;
    let quantity_used: String = row.try_get("quantity_used")?;
    let total: String = row.try_get("total")?;

    Ok(SaleItem {
        id: SaleItemId(row.try_get("id")?),
        sale_id: SaleId(row.try_get("sale_id")?),
        product_name: row.try_get("product_name")?,
        line: SaleLine {
            product_id: ProductId(row.try_get("product_id")?),
            description: row.try_get("description")?,
            width_inches: decode_decimal("width_inches", &width_inches)?,
            height_inches: decode_decimal("height_inches", &height_inches)?,
            square_inches: decode_decimal("square_inches", &square_inches)?,
            unit_price: decode_decimal("unit_price", &unit_price)?,
            quantity: decode_quantity("quantity", row.try_get("quantity")?)?,
            quantity_used: decode_decimal("quantity_used", &quantity_used)?,
            total: decode_decimal("total", &total)?,
        },
    })
}

async fn load_sale(
    conn: &mut SqliteConnection,
    id: SaleId,
) -> Result<Option<Sale>, RepositoryError> {
    let row = sqlx::query(&format!("{SELECT_SALE} WHERE s.id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut sale = sale_from_row(&row)?;
    let items = sqlx::query(&format!("{SELECT_ITEM} WHERE i.sale_id = ? ORDER BY i.id ASC"))
        .bind(id.0)
        .fetch_all(&mut *conn)
        .await?;
    sale.items = items.iter().map(item_from_row).collect::<Result<_, _>>()?;
    Ok(Some(sale))
}

async fn require_sale(conn: &mut SqliteConnection, id: SaleId) -> Result<Sale, RepositoryError> {
    load_sale(conn, id).await?.ok_or_else(|| RepositoryError::not_found("sale", id))
}

async fn insert_line(
    conn: &mut SqliteConnection,
    id: SaleId,
    line: &SaleLine,
) -> Result<SaleItemId, RepositoryError> {
    let item_id: i64 = sqlx::query_scalar(
        "INSERT INTO sale_items (sale_id, product_id, description, width_inches, height_inches,
                                 square_inches, unit_price, quantity, quantity_used, total)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(id.0)
    .bind(line.product_id.0)
    .bind(&line.description)
    .bind(line.width_inches.to_string())
    .bind(line.height_inches.to_string())
    .bind(line.square_inches.to_string())
    .bind(line.unit_price.to_string())
    .bind(i64::from(line.quantity))
    .bind(line.quantity_used.to_string())
    .bind(line.total.to_string())
    .fetch_one(&mut *conn)
    .await
    .map_err(|error| missing_product(error, line.product_id))?;
    Ok(SaleItemId(item_id))
}

async fn write_totals(
    conn: &mut SqliteConnection,
    id: SaleId,
    totals: &DocumentTotals,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE sales
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

async fn recompute(conn: &mut SqliteConnection, id: SaleId) -> Result<(), RepositoryError> {
    let sale = require_sale(conn, id).await?;
    let totals = sale.totals_for(sale.lines())?;
    write_totals(conn, id, &totals).await
}

async fn parent_of(conn: &mut SqliteConnection, id: SaleItemId) -> Result<SaleId, RepositoryError> {
    let sale_id: Option<i64> = sqlx::query_scalar("SELECT sale_id FROM sale_items WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    sale_id.map(SaleId).ok_or_else(|| RepositoryError::not_found("sale item", id))
}

async fn mark_converted(
    conn: &mut SqliteConnection,
    quotation_id: QuotationId,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE quotations SET status = ?, updated_at = ? WHERE id = ?")
        .bind(QuotationStatus::Converted.as_str())
        .bind(encode_timestamp(Utc::now()))
        .bind(quotation_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

enum Inserted {
    Stored(SaleId),
    NumberTaken,
}

/// Inserts the sale header and lines under `number`. A taken number is reported
/// instead of failing so the caller can retry with a fresh one.
async fn insert_sale(
    conn: &mut SqliteConnection,
    number: &str,
    draft: &SaleDraft,
    created_by: Option<UserId>,
) -> Result<Inserted, RepositoryError> {
    let now = encode_timestamp(Utc::now());
    let header = &draft.header;

    let inserted: Result<i64, sqlx::Error> = sqlx::query_scalar(
        "INSERT INTO sales (invoice_number, client_id, quotation_id, created_by, status,
                            payment_method, discount_percentage, tax_rate, subtotal,
                            discount_amount, tax_amount, total_amount, notes, created_at,
                            updated_at)
         VALUES (?, ?, ?, ?, 'PENDING', ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(number)
    .bind(header.client_id.0)
    .bind(header.quotation_id.map(|id| id.0))
    .bind(created_by.map(|id| id.0))
    .bind(header.payment_method.as_str())
    .bind(header.discount_percentage.to_string())
    .bind(header.tax_rate.to_string())
    .bind(draft.totals.subtotal.to_string())
    .bind(draft.totals.discount_amount.to_string())
    .bind(draft.totals.tax_amount.to_string())
    .bind(draft.totals.total_amount.to_string())
    .bind(&header.notes)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *conn)
    .await;

    let id = match inserted {
        Ok(id) => SaleId(id),
        Err(error) if is_unique_violation(&error) => return Ok(Inserted::NumberTaken),
        Err(error) if is_foreign_key_violation(&error) => {
            return Err(RepositoryError::not_found("client", header.client_id));
        }
        Err(error) => return Err(error.into()),
    };

    for line in &draft.lines {
        insert_line(conn, id, line).await?;
    }
    Ok(Inserted::Stored(id))
}

fn number_exhausted() -> RepositoryError {
    RepositoryError::Conflict(format!(
        "could not allocate an invoice number after {MAX_NUMBER_ATTEMPTS} attempts"
    ))
}

#[async_trait::async_trait]
impl SaleRepository for SqlSaleRepository {
    async fn create(
        &self,
        draft: &SaleDraft,
        created_by: Option<UserId>,
    ) -> Result<Sale, RepositoryError> {
        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            let mut tx = begin_write(&self.pool).await?;
            if let Some(quotation_id) = draft.header.quotation_id {
                if load_quotation(&mut tx, quotation_id).await?.is_none() {
                    return Err(RepositoryError::not_found("quotation", quotation_id));
                }
            }
            let number = next_number(&mut tx, DocumentSeries::Invoice).await?;
            let id = match insert_sale(&mut tx, &number, draft, created_by).await? {
                Inserted::Stored(id) => id,
                Inserted::NumberTaken => {
                    tracing::warn!(
                        event_name = "sale.number.retry",
                        attempt,
                        number = %number,
                        "invoice number taken by a concurrent writer, retrying"
                    );
                    continue;
                }
            };
            let sale = require_sale(&mut tx, id).await?;
            tx.commit().await?;

            tracing::info!(
                event_name = "sale.created",
                sale_id = id.0,
                invoice_number = %sale.invoice_number,
                total = %sale.totals.total_amount,
                "sale created"
            );
            return Ok(sale);
        }

        Err(number_exhausted())
    }

    async fn create_from_quotation(
        &self,
        request: &SaleFromQuotation,
        default_tax_rate: Decimal,
        created_by: Option<UserId>,
    ) -> Result<Sale, RepositoryError> {
        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            let mut tx = begin_write(&self.pool).await?;
            let quotation = load_quotation(&mut tx, request.quotation_id)
                .await?
                .ok_or_else(|| RepositoryError::not_found("quotation", request.quotation_id))?;
            let draft = request.draft_from(&quotation, default_tax_rate)?;

            let number = next_number(&mut tx, DocumentSeries::Invoice).await?;
            let id = match insert_sale(&mut tx, &number, &draft, created_by).await? {
                Inserted::Stored(id) => id,
                Inserted::NumberTaken => {
                    tracing::warn!(
                        event_name = "sale.number.retry",
                        attempt,
                        number = %number,
                        "invoice number taken by a concurrent writer, retrying"
                    );
                    continue;
                }
            };
            mark_converted(&mut tx, quotation.id).await?;
            let sale = require_sale(&mut tx, id).await?;
            tx.commit().await?;

            tracing::info!(
                event_name = "quotation.converted",
                quotation_id = quotation.id.0,
                quotation_number = %quotation.quotation_number,
                sale_id = id.0,
                invoice_number = %sale.invoice_number,
                "quotation converted to sale"
            );
            return Ok(sale);
        }

        Err(number_exhausted())
    }

    async fn find_by_id(&self, id: SaleId) -> Result<Option<Sale>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_sale(&mut conn, id).await
    }

    async fn list(&self, filter: &SaleFilter) -> Result<Vec<Sale>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_SALE);
        query.push(" WHERE 1 = 1");
        if let Some(client_id) = filter.client_id {
            query.push(" AND s.client_id = ").push_bind(client_id.0);
        }
        if let Some(status) = filter.status {
            query.push(" AND s.status = ").push_bind(status.as_str());
        }
        if let Some(payment_method) = filter.payment_method {
            query.push(" AND s.payment_method = ").push_bind(payment_method.as_str());
        }
        if let Some(created_by) = filter.created_by {
            query.push(" AND s.created_by = ").push_bind(created_by.0);
        }
        if let Some(from) = filter.created_from {
            query.push(" AND s.created_at >= ").push_bind(encode_timestamp(from));
        }
        if let Some(to) = filter.created_to {
            query.push(" AND s.created_at < ").push_bind(encode_timestamp(to));
        }
        if let Some(pattern) = like_pattern(filter.search.as_deref()) {
            query
                .push(" AND (s.invoice_number LIKE ")
                .push_bind(pattern.clone())
                .push(" OR c.name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR c.company LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        query.push(" ORDER BY s.created_at DESC, s.id DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut sales: Vec<Sale> = rows.iter().map(sale_from_row).collect::<Result<_, _>>()?;
        if sales.is_empty() {
            return Ok(sales);
        }

        let mut items_query = QueryBuilder::<Sqlite>::new(SELECT_ITEM);
        items_query.push(" WHERE i.sale_id IN");
        in_clause(&mut items_query, sales.iter().map(|sale| sale.id.0));
        items_query.push(" ORDER BY i.id ASC");
        let item_rows = items_query.build().fetch_all(&self.pool).await?;

        let mut grouped: BTreeMap<SaleId, Vec<SaleItem>> = BTreeMap::new();
        for row in &item_rows {
            let item = item_from_row(row)?;
            grouped.entry(item.sale_id).or_default().push(item);
        }
        for sale in &mut sales {
            sale.items = grouped.remove(&sale.id).unwrap_or_default();
        }
        Ok(sales)
    }

    async fn update(&self, id: SaleId, draft: &SaleDraft) -> Result<Sale, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        require_sale(&mut tx, id).await?.ensure_editable()?;
        let header = &draft.header;

        sqlx::query(
            "UPDATE sales
             SET client_id = ?, quotation_id = ?, payment_method = ?, discount_percentage = ?,
                 tax_rate = ?, notes = ?, subtotal = ?, discount_amount = ?, tax_amount = ?,
                 total_amount = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(header.client_id.0)
        .bind(header.quotation_id.map(|id| id.0))
        .bind(header.payment_method.as_str())
        .bind(header.discount_percentage.to_string())
        .bind(header.tax_rate.to_string())
        .bind(&header.notes)
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
                RepositoryError::Conflict(
                    "the sale references a client or quotation that does not exist".to_string(),
                )
            } else {
                error.into()
            }
        })?;

        sqlx::query("DELETE FROM sale_items WHERE sale_id = ?").bind(id.0).execute(&mut *tx).await?;
        for line in &draft.lines {
            insert_line(&mut tx, id, line).await?;
        }

        let sale = require_sale(&mut tx, id).await?;
        tx.commit().await?;
        Ok(sale)
    }

    async fn complete(
        &self,
        id: SaleId,
        completed_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Sale, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        let mut sale = require_sale(&mut tx, id).await?;
        let exits = sale.complete(now)?;

        sqlx::query("UPDATE sales SET status = ?, completed_at = ?, updated_at = ? WHERE id = ?")
            .bind(SaleStatus::Completed.as_str())
            .bind(encode_timestamp(now))
            .bind(encode_timestamp(now))
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        for exit in &exits {
            let movement = StockMovementInput {
                product_id: exit.product_id,
                movement_type: MovementKind::Exit,
                quantity: exit.quantity,
                reference: sale.invoice_number.clone(),
                notes: exit.notes.clone(),
            };
            apply_stock_movement(&mut tx, &movement, completed_by).await?;
        }
        if let Some(quotation_id) = sale.quotation_id {
            mark_converted(&mut tx, quotation_id).await?;
        }

        let sale = require_sale(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            event_name = "sale.completed",
            sale_id = id.0,
            invoice_number = %sale.invoice_number,
            stock_exits = exits.len(),
            total = %sale.totals.total_amount,
            "sale completed"
        );
        Ok(sale)
    }

    async fn cancel(&self, id: SaleId) -> Result<Sale, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        let mut sale = require_sale(&mut tx, id).await?;
        sale.cancel()?;

        sqlx::query("UPDATE sales SET status = ?, updated_at = ? WHERE id = ?")
            .bind(SaleStatus::Cancelled.as_str())
            .bind(encode_timestamp(Utc::now()))
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        let sale = require_sale(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(
            event_name = "sale.cancelled",
            sale_id = id.0,
            invoice_number = %sale.invoice_number,
            "sale cancelled"
        );
        Ok(sale)
    }

    async fn delete(&self, id: SaleId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM sales WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("sale", id));
        }
        Ok(())
    }

    async fn delete_many(&self, ids: &[SaleId]) -> Result<Vec<String>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = begin_write(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT invoice_number FROM sales WHERE id IN");
        in_clause(&mut select, ids.iter().map(|id| id.0));
        select.push(" ORDER BY id ASC");
        let numbers: Vec<String> = select
            .build()
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| row.try_get("invoice_number"))
            .collect::<Result<_, _>>()?;

        let mut delete = QueryBuilder::<Sqlite>::new("DELETE FROM sales WHERE id IN");
        in_clause(&mut delete, ids.iter().map(|id| id.0));
        delete.build().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(numbers)
    }

    async fn find_item(&self, id: SaleItemId) -> Result<Option<SaleItem>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_ITEM} WHERE i.id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn list_items(&self, sale_id: Option<SaleId>) -> Result<Vec<SaleItem>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_ITEM);
        if let Some(sale_id) = sale_id {
            query.push(" WHERE i.sale_id = ").push_bind(sale_id.0);
        }
        query.push(" ORDER BY i.sale_id ASC, i.id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn add_item(&self, sale_id: SaleId, line: &SaleLine) -> Result<SaleItem, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        require_sale(&mut tx, sale_id).await?.ensure_editable()?;
        let item_id = insert_line(&mut tx, sale_id, line).await?;
        recompute(&mut tx, sale_id).await?;
        tx.commit().await?;

        self.find_item(item_id).await?.ok_or_else(|| RepositoryError::not_found("sale item", item_id))
    }

    async fn update_item(
        &self,
        id: SaleItemId,
        line: &SaleLine,
    ) -> Result<SaleItem, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        let sale_id = parent_of(&mut tx, id).await?;
        require_sale(&mut tx, sale_id).await?.ensure_editable()?;

        sqlx::query(
            "UPDATE sale_items
             SET product_id = ?, description = ?, width_inches = ?, height_inches = ?,
                 square_inches = ?, unit_price = ?, quantity = ?, quantity_used = ?, total = ?
             WHERE id = ?",
        )
        .bind(line.product_id.0)
        .bind(&line.description)
        .bind(line.width_inches.to_string())
        .bind(line.height_inches.to_string())
        .bind(line.square_inches.to_string())
        .bind(line.unit_price.to_string())
        .bind(i64::from(line.quantity))
        .bind(line.quantity_used.to_string())
        .bind(line.total.to_string())
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(|error| missing_product(error, line.product_id))?;
        recompute(&mut tx, sale_id).await?;
        tx.commit().await?;

        self.find_item(id).await?.ok_or_else(|| RepositoryError::not_found("sale item", id))
    }

    async fn delete_item(&self, id: SaleItemId) -> Result<(), RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        let sale_id = parent_of(&mut tx, id).await?;
        require_sale(&mut tx, sale_id).await?.ensure_editable()?;

        sqlx::query("DELETE FROM sale_items WHERE id = ?").bind(id.0).execute(&mut *tx).await?;
        recompute(&mut tx, sale_id).await?;
        tx.commit().await?;
        Ok(())
    }
}
