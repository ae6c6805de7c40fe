use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use rotu_core::documents::SkuSeries;
use rotu_core::domain::inventory::{
    Category, CategoryId, CategoryInput, Product, ProductId, ProductInput, StockMovement,
    StockMovementId, StockMovementInput, UnitMeasure,
};
use rotu_core::domain::user::UserId;
use rotu_core::stock::{apply_movement, MovementKind};

use super::codec::{
    decode_decimal, decode_label, decode_timestamp, encode_timestamp, is_foreign_key_violation,
    is_unique_violation, like_pattern,
};
use super::{InventoryRepository, RepositoryError};
use crate::{begin_write, DbPool};

const SELECT_CATEGORY: &str = "SELECT c.id, c.name, c.description, c.created_at, c.updated_at,
        (SELECT COUNT(*) FROM products p WHERE p.category_id = c.id) AS product_count
 FROM categories c";

const SELECT_PRODUCT: &str = "SELECT p.id, p.name, p.sku, p.category_id, c.name AS category_name,
        p.description, p.unit_measure, p.quantity_available, p.unit_cost, p.unit_price,
        p.price_per_square_inch, p.supplier, p.minimum_stock, p.is_active, p.created_at,
        p.updated_at
 FROM products p
 JOIN categories c ON c.id = p.category_id";

const SELECT_MOVEMENT: &str = "SELECT m.id, m.product_id, p.name AS product_name, m.movement_type,
        m.quantity, m.reference, m.notes, m.created_by, m.created_at
 FROM stock_movements m
 JOIN products p ON p.id = m.product_id";

const SKU_ATTEMPTS: usize = 3;

#[derive(Clone, Debug, Default)]
pub struct ProductFilter {
    pub category_id: Option<CategoryId>,
    pub is_active: Option<bool>,
    pub unit_measure: Option<UnitMeasure>,
    /// Matches name, SKU, description or supplier.
    pub search: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub movement_type: Option<MovementKind>,
}

pub struct SqlInventoryRepository {
    pool: DbPool,
}

impl SqlInventoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn category_from_row(row: &SqliteRow) -> Result<Category, RepositoryError> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Category {
        id: CategoryId(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        product_count: row.try_get("product_count")?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

pub(crate) fn product_from_row(row: &SqliteRow) -> Result<Product, RepositoryError> {
    let unit_measure: String = row.try_get("unit_measure")?;
    let quantity_available: String = row.try_get("quantity_available")?;
    let unit_cost: String = row.try_get("unit_cost")?;
    let unit_price: String = row.try_get("unit_price")?;
    let price_per_square_inch: String = row.try_get("price_per_square_inch")?;
    let minimum_stock: String = row.try_get("minimum_stock")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Product {
        id: ProductId(row.try_get("id")?),
        name: row.try_get("name")?,
        sku: row.try_get("sku")?,
        category_id: CategoryId(row.try_get("category_id")?),
        category_name: row.try_get("category_name")?,
        description: row.try_get("description")?,
        unit_measure: decode_label("unit_measure", &unit_measure)?,
        quantity_available: decode_decimal("quantity_available", &quantity_available)?,
        unit_cost: decode_decimal("unit_cost", &unit_cost)?,
        unit_price: decode_decimal("unit_price", &unit_price)?,
        price_per_square_inch: decode_decimal("price_per_square_inch", &price_per_square_inch)?,
        supplier: row.try_get("supplier")?,
        minimum_stock: decode_decimal("minimum_stock", &minimum_stock)?,
        is_active: row.try_get("is_active")?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

fn movement_from_row(row: &SqliteRow) -> Result<StockMovement, RepositoryError> {
    let movement_type: String = row.try_get("movement_type")?;
    let quantity: String = row.try_get("quantity")?;
    let created_by: Option<i64> = row.try_get("created_by")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(StockMovement {
        id: StockMovementId(row.try_get("id")?),
        product_id: ProductId(row.try_get("product_id")?),
        product_name: row.try_get("product_name")?,
        movement_type: decode_label("movement_type", &movement_type)?,
        quantity: decode_decimal("quantity", &quantity)?,
        reference: row.try_get("reference")?,
        notes: row.try_get("notes")?,
        created_by: created_by.map(UserId),
        created_at: decode_timestamp("created_at", &created_at)?,
    })
}

fn duplicate_name(error: sqlx::Error, name: &str) -> RepositoryError {
    if is_unique_violation(&error) {
        RepositoryError::Conflict(format!("a category named `{name}` already exists"))
    } else {
        error.into()
    }
}

/// Applies one movement to the product's on-hand quantity and stores the movement row.
/// Callers own the transaction.
pub(crate) async fn apply_stock_movement(
    conn: &mut SqliteConnection,
    input: &StockMovementInput,
    created_by: Option<UserId>,
) -> Result<StockMovementId, RepositoryError> {
    let current: Option<String> =
        sqlx::query_scalar("SELECT quantity_available FROM products WHERE id = ?")
            .bind(input.product_id.0)
            .fetch_optional(&mut *conn)
            .await?;
    let current = current.ok_or_else(|| RepositoryError::not_found("product", input.product_id))?;
    let current = decode_decimal("quantity_available", &current)?;
    let updated = apply_movement(current, input.movement_type, input.quantity);
    let now = encode_timestamp(Utc::now());

    sqlx::query("UPDATE products SET quantity_available = ?, updated_at = ? WHERE id = ?")
        .bind(updated.to_string())
        .bind(&now)
        .bind(input.product_id.0)
        .execute(&mut *conn)
        .await?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO stock_movements (product_id, movement_type, quantity, reference, notes,
                                      created_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(input.product_id.0)
    .bind(input.movement_type.as_str())
    .bind(input.quantity.to_string())
    .bind(input.reference.trim())
    .bind(&input.notes)
    .bind(created_by.map(|id| id.0))
    .bind(&now)
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(
        event_name = "stock.movement.applied",
        product_id = input.product_id.0,
        movement_type = input.movement_type.as_str(),
        quantity = %input.quantity,
        previous = %current,
        updated = %updated,
        "stock movement applied"
    );

    Ok(StockMovementId(id))
}

#[async_trait::async_trait]
impl InventoryRepository for SqlInventoryRepository {
    async fn create_category(&self, input: &CategoryInput) -> Result<Category, RepositoryError> {
        let now = encode_timestamp(Utc::now());
        let name = input.name.trim();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO categories (name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(name)
        .bind(&input.description)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| duplicate_name(error, name))?;

        self.find_category(CategoryId(id))
            .await?
            .ok_or_else(|| RepositoryError::not_found("category", id))
    }

    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_CATEGORY} WHERE c.id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(category_from_row).transpose()
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_CATEGORY} ORDER BY c.name ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(category_from_row).collect()
    }

    async fn update_category(
        &self,
        id: CategoryId,
        input: &CategoryInput,
    ) -> Result<Category, RepositoryError> {
        let name = input.name.trim();
        let result =
            sqlx::query("UPDATE categories SET name = ?, description = ?, updated_at = ? WHERE id = ?")
                .bind(name)
                .bind(&input.description)
                .bind(encode_timestamp(Utc::now()))
                .bind(id.0)
                .execute(&self.pool)
                .await
                .map_err(|error| duplicate_name(error, name))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("category", id));
        }
        self.find_category(id).await?.ok_or_else(|| RepositoryError::not_found("category", id))
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                if is_foreign_key_violation(&error) {
                    RepositoryError::Conflict(format!(
                        "category {id} still has products and cannot be deleted"
                    ))
                } else {
                    error.into()
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("category", id));
        }
        Ok(())
    }

    async fn create_product(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let requested = input.requested_sku();
        let attempts = if requested.is_some() { 1 } else { SKU_ATTEMPTS };

        for _ in 0..attempts {
            let sku = requested.clone().unwrap_or_else(|| SkuSeries::Product.generate());
            let now = encode_timestamp(Utc::now());
            let inserted: Result<i64, sqlx::Error> = sqlx::query_scalar(
                "INSERT INTO products (name, sku, category_id, description, unit_measure,
                                       quantity_available, unit_cost, unit_price,
                                       price_per_square_inch, supplier, minimum_stock, is_active,
                                       created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 RETURNING id",
            )
            .bind(input.name.trim())
            .bind(&sku)
            .bind(input.category_id.0)
            .bind(&input.description)
            .bind(input.unit_measure.as_str())
            .bind(input.quantity_available.to_string())
            .bind(input.unit_cost.to_string())
            .bind(input.unit_price.to_string())
            .bind(input.price_per_square_inch.to_string())
            .bind(input.supplier.trim())
            .bind(input.minimum_stock.to_string())
            .bind(input.is_active)
            .bind(&now)
            .bind(&now)
            .fetch_one(&self.pool)
            .await;

            match inserted {
                Ok(id) => {
                    return self
                        .find_product(ProductId(id))
                        .await?
                        .ok_or_else(|| RepositoryError::not_found("product", id));
                }
                Err(error) if is_unique_violation(&error) && requested.is_none() => continue,
                Err(error) if is_unique_violation(&error) => {
                    return Err(RepositoryError::Conflict(format!(
                        "a product with SKU `{sku}` already exists"
                    )));
                }
                Err(error) if is_foreign_key_violation(&error) => {
                    return Err(RepositoryError::not_found("category", input.category_id));
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(RepositoryError::Conflict("could not generate a unique SKU".to_string()))
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_PRODUCT} WHERE p.id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_PRODUCT);
        query.push(" WHERE 1 = 1");
        if let Some(category_id) = filter.category_id {
            query.push(" AND p.category_id = ").push_bind(category_id.0);
        }
        if let Some(is_active) = filter.is_active {
            query.push(" AND p.is_active = ").push_bind(is_active);
        }
        if let Some(unit_measure) = filter.unit_measure {
            query.push(" AND p.unit_measure = ").push_bind(unit_measure.as_str());
        }
        if let Some(pattern) = like_pattern(filter.search.as_deref()) {
            query.push(" AND (");
            let mut columns = query.separated(" OR ");
            for column in ["p.name", "p.sku", "p.description", "p.supplier"] {
                columns.push(format!("{column} LIKE ")).push_bind_unseparated(pattern.clone());
            }
            query.push(")");
        }
        query.push(" ORDER BY p.name ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn update_product(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let current = self.find_product(id).await?.ok_or_else(|| RepositoryError::not_found("product", id))?;
        let sku = input.requested_sku().unwrap_or(current.sku);

        sqlx::query(
            "UPDATE products
             SET name = ?, sku = ?, category_id = ?, description = ?, unit_measure = ?,
                 unit_cost = ?, unit_price = ?, price_per_square_inch = ?, supplier = ?,
                 minimum_stock = ?, is_active = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(input.name.trim())
        .bind(&sku)
        .bind(input.category_id.0)
        .bind(&input.description)
        .bind(input.unit_measure.as_str())
        .bind(input.unit_cost.to_string())
        .bind(input.unit_price.to_string())
        .bind(input.price_per_square_inch.to_string())
        .bind(input.supplier.trim())
        .bind(input.minimum_stock.to_string())
        .bind(input.is_active)
        .bind(encode_timestamp(Utc::now()))
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                RepositoryError::Conflict(format!("a product with SKU `{sku}` already exists"))
            } else if is_foreign_key_violation(&error) {
                RepositoryError::not_found("category", input.category_id)
            } else {
                error.into()
            }
        })?;

        self.find_product(id).await?.ok_or_else(|| RepositoryError::not_found("product", id))
    }

    async fn deactivate_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(encode_timestamp(Utc::now()))
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("product", id));
        }
        Ok(())
    }

    async fn record_movement(
        &self,
        input: &StockMovementInput,
        created_by: Option<UserId>,
    ) -> Result<StockMovement, RepositoryError> {
        let mut tx = begin_write(&self.pool).await?;
        let id = apply_stock_movement(&mut tx, input, created_by).await?;
        tx.commit().await?;

        self.find_movement(id).await?.ok_or_else(|| RepositoryError::not_found("stock movement", id))
    }

    async fn find_movement(
        &self,
        id: StockMovementId,
    ) -> Result<Option<StockMovement>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_MOVEMENT} WHERE m.id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(movement_from_row).transpose()
    }

    async fn list_movements(
        &self,
        filter: &MovementFilter,
    ) -> Result<Vec<StockMovement>, RepositoryError> {
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
