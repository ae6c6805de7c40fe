use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use rotu_core::documents::SkuSeries;
use rotu_core::domain::simple_inventory::{
    SimpleMovement, SimpleMovementId, SimpleMovementInput, SimpleProduct, SimpleProductId,
    SimpleProductInput, StockAdjustment,
};
use rotu_core::domain::user::UserId;
use rotu_core::stock::{apply_simple_movement, plan_adjustment, SimpleMovementKind};

use super::codec::{decode_label, decode_timestamp, encode_timestamp, is_unique_violation, like_pattern};
use super::{RepositoryError, SimpleInventoryRepository};
use crate::{begin_write, DbPool};

const SELECT_PRODUCT: &str = "SELECT id, name, sku, description, quantity, created_by, created_at,
        updated_at
 FROM simple_products";

const SELECT_MOVEMENT: &str = "SELECT m.id, m.product_id, p.name AS product_name, m.movement_type,
        m.quantity, m.notes, m.created_by, m.created_at
 FROM simple_movements m
 JOIN simple_products p ON p.id = m.product_id";

const SKU_ATTEMPTS: usize = 3;

#[derive(Clone, Debug, Default)]
pub struct SimpleProductFilter {
    /// Matches name, SKU or description.
    pub search: Option<String>,
    pub sku: Option<String>,
    pub min_quantity: Option<i64>,
    pub max_quantity: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct SimpleMovementFilter {
    pub product_id: Option<SimpleProductId>,
    pub movement_type: Option<SimpleMovementKind>,
}

pub struct SqlSimpleInventoryRepository {
    pool: DbPool,
}

impl SqlSimpleInventoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn product_from_row(row: &SqliteRow) -> Result<SimpleProduct, RepositoryError> {
    let created_by: Option<i64> = row.try_get("created_by")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(SimpleProduct {
        id: SimpleProductId(row.try_get("id")?),
        name: row.try_get("name")?,
        sku: row.try_get("sku")?,
        description: row.try_get("description")?,
        quantity: row.try_get("quantity")?,
        created_by: created_by.map(UserId),
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

fn movement_from_row(row: &SqliteRow) -> Result<SimpleMovement, RepositoryError> {
    let movement_type: String = row.try_get("movement_type")?;
    let created_by: Option<i64> = row.try_get("created_by")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(SimpleMovement {
        id: SimpleMovementId(row.try_get("id")?),
        product_id: SimpleProductId(row.try_get("product_id")?),
        product_name: row.try_get("product_name")?,
        movement_type: decode_label("movement_type", &movement_type)?,
        quantity: row.try_get("quantity")?,
        notes: row.try_get("notes")?,
        created_by: created_by.map(UserId),
        created_at: decode_timestamp("created_at", &created_at)?,
    })
}

async fn current_quantity(
    conn: &mut SqliteConnection,
    id: SimpleProductId,
) -> Result<i64, RepositoryError> {
    let quantity: Option<i64> = sqlx::query_scalar("SELECT quantity FROM simple_products WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    quantity.ok_or_else(|| RepositoryError::not_found("simple product", id))
}

/// Writes the movement and the resulting clamped quantity. Callers own the transaction.
async fn apply_movement(
    conn: &mut SqliteConnection,
    input: &SimpleMovementInput,
    created_by: Option<UserId>,
) -> Result<SimpleMovementId, RepositoryError> {
    let current = current_quantity(conn, input.product_id).await?;
    let updated = apply_simple_movement(current, input.movement_type, input.quantity);
    let now = encode_timestamp(Utc::now());

    sqlx::query("UPDATE simple_products SET quantity = ?, updated_at = ? WHERE id = ?")
        .bind(updated)
        .bind(&now)
        .bind(input.product_id.0)
        .execute(&mut *conn)
        .await?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO simple_movements (product_id, movement_type, quantity, notes, created_by,
                                       created_at)
         VALUES (?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(input.product_id.0)
    .bind(input.movement_type.as_str())
    .bind(input.quantity)
    .bind(&input.notes)
    .bind(created_by.map(|id| id.0))
    .bind(&now)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        event_name = "stock.simple_movement.applied",
        product_id = input.product_id.0,
        movement_type = input.movement_type.as_str(),
        quantity = input.quantity,
        previous = current,
        updated,
        "manual stock movement applied"
    );

    Ok(SimpleMovementId(id))
}

#[async_trait::async_trait]
impl SimpleInventoryRepository for SqlSimpleInventoryRepository {
    async fn create_product(
        &self,
        input: &SimpleProductInput,
        created_by: Option<UserId>,
    ) -> Result<SimpleProduct, RepositoryError> {
        let requested = input.requested_sku();
        let attempts = if requested.is_some() { 1 } else { SKU_ATTEMPTS };

        for _ in 0..attempts {
            let sku = requested.clone().unwrap_or_else(|| SkuSeries::SimpleProduct.generate());
            let now = encode_timestamp(Utc::now());
            let inserted: Result<i64, sqlx::Error> = sqlx::query_scalar(
                "INSERT INTO simple_products (name, sku, description, quantity, created_by,
                                              created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 RETURNING id",
            )
            .bind(input.name.trim())
            .bind(&sku)
            .bind(&input.description)
            .bind(input.quantity)
            .bind(created_by.map(|id| id.0))
            .bind(&now)
            .bind(&now)
            .fetch_one(&self.pool)
            .await;

            match inserted {
                Ok(id) => {
                    return self
                        .find_product(SimpleProductId(id))
                        .await?
                        .ok_or_else(|| RepositoryError::not_found("simple product", id));
                }
                Err(error) if is_unique_violation(&error) && requested.is_none() => continue,
                Err(error) if is_unique_violation(&error) => {
                    return Err(RepositoryError::Conflict(format!(
                        "a product with SKU `{sku}` already exists"
                    )));
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(RepositoryError::Conflict("could not generate a unique SKU".to_string()))
    }

    async fn find_product(
        &self,
        id: SimpleProductId,
    ) -> Result<Option<SimpleProduct>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_PRODUCT} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_products(
        &self,
        filter: &SimpleProductFilter,
    ) -> Result<Vec<SimpleProduct>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_PRODUCT);
        query.push(" WHERE 1 = 1");
        if let Some(pattern) = like_pattern(filter.search.as_deref()) {
            query
                .push(" AND (name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR sku LIKE ")
                .push_bind(pattern.clone())
                .push(" OR description LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(sku) = filter.sku.as_deref().map(str::trim).filter(|sku| !sku.is_empty()) {
            query.push(" AND sku = ").push_bind(sku.to_string());
        }
        if let Some(min_quantity) = filter.min_quantity {
            query.push(" AND quantity >= ").push_bind(min_quantity);
        }
        if let Some(max_quantity) = filter.max_quantity {
            query.push(" AND quantity <= ").push_bind(max_quantity);
        }
        query.push(" ORDER BY name ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn update_product(
        &self,
        id: SimpleProductId,
        input: &SimpleProductInput,
    ) -> Result<SimpleProduct, RepositoryError> {
        let current = self
            .find_product(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("simple product", id))?;
        let sku = input.requested_sku().unwrap_or(current.sku);

        sqlx::query(
            "UPDATE simple_products
             SET name = ?, sku = ?, description = ?, quantity = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(input.name.trim())
        .bind(&sku)
        .bind(&input.description)
        .bind(input.quantity)
        .bind(encode_timestamp(Utc::now()))
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                RepositoryError::Conflict(format!("a product with SKU `{sku}` already exists"))
            } else {
                error.into()
            }
        })?;

        self.find_product(id).await?.ok_or_else(|| RepositoryError::not_found("simple product", id))
    }

    async fn delete_product(&self, id: SimpleProductId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM simple_products WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("simple product", id));
        }
        Ok(())
    }

    async fn record_movement(
        &self,
        input: &SimpleMovementInput,
        created_by: Option<UserId>,
    ) -> Result<SimpleMovement, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        let id = apply_movement(&mut tx, input, created_by).await?;
        tx.commit().await?;

        self.find_movement(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("simple movement", id))
    }

    async fn adjust_stock(
        &self,
        id: SimpleProductId,
        adjustment: &StockAdjustment,
        created_by: Option<UserId>,
    ) -> Result<(SimpleProduct, SimpleMovement), RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        let current = current_quantity(&mut tx, id).await?;
        let (movement_type, quantity) = plan_adjustment(current, adjustment.quantity)?;

        let notes = if adjustment.notes.trim().is_empty() {
            "Ajuste de inventario".to_string()
        } else {
            adjustment.notes.clone()
        };
        let input = SimpleMovementInput { product_id: id, movement_type, quantity, notes };
        let movement_id = apply_movement(&mut tx, &input, created_by).await?;
        tx.commit().await?;

        let product = self
            .find_product(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("simple product", id))?;
        let movement = self
            .find_movement(movement_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("simple movement", movement_id))?;
        Ok((product, movement))
    }

    async fn find_movement(
        &self,
        id: SimpleMovementId,
    ) -> Result<Option<SimpleMovement>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_MOVEMENT} WHERE m.id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(movement_from_row).transpose()
    }

    async fn list_movements(
        &self,
        filter: &SimpleMovementFilter,
    ) -> Result<Vec<SimpleMovement>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_MOVEMENT);
        query.push(" WHERE 1 = 1");
        if let Some(product_id) = filter.product_id {
            query.push(" AND m.product_id = ").push_bind(product_id.0);
        }
        if let Some(movement_type) = filter.movement_type {
            query.push(" AND m.movement_type = ").push_bind(movement_type.as_str());
        }
        query.push(" ORDER BY m.created_at DESC, m.id DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(movement_from_row).collect()
    }
}
