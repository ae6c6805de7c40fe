use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use rotu_core::domain::inventory::{
    Category, CategoryId, CategoryInput, ProductId, ProductInput, ProductView, StockMovement,
    StockMovementId, StockMovementInput, UnitMeasure,
};
use rotu_core::errors::ApplicationError;
use rotu_core::stock::{MovementKind, StockStatus};
use rotu_core::Capability;
use rotu_db::repositories::{InventoryRepository, MovementFilter, ProductFilter};
use serde::Deserialize;

use super::{non_blank, ApiJson, ApiQuery};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            get(retrieve_category).put(update_category).delete(destroy_category),
        )
        .route("/products", get(list_products).post(create_product))
        .route("/products/low_stock", get(low_stock))
        .route("/products/out_of_stock", get(out_of_stock))
        .route("/products/{id}", get(retrieve_product).put(update_product).delete(destroy_product))
        .route("/movements", get(list_movements).post(create_movement))
        .route("/movements/{id}", get(retrieve_movement))
}

async fn list_categories(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Category>>> {
    auth.require(Capability::ViewCatalog)?;
    Ok(Json(state.inventory().list_categories().await?))
}

async fn create_category(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<CategoryInput>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    auth.require(Capability::EditCatalog)?;
    input.validate()?;
    Ok((StatusCode::CREATED, Json(state.inventory().create_category(&input).await?)))
}

async fn retrieve_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Category>> {
    auth.require(Capability::ViewCatalog)?;
    let category = state
        .inventory()
        .find_category(CategoryId(id))
        .await?
        .ok_or_else(|| ApplicationError::not_found("category", id))?;
    Ok(Json(category))
}

async fn update_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<CategoryInput>,
) -> ApiResult<Json<Category>> {
    auth.require(Capability::EditCatalog)?;
    input.validate()?;
    Ok(Json(state.inventory().update_category(CategoryId(id), &input).await?))
}

async fn destroy_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    auth.require(Capability::EditCatalog)?;
    state.inventory().delete_category(CategoryId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<i64>,
    pub is_active: Option<bool>,
    pub unit_measure: Option<UnitMeasure>,
    pub search: Option<String>,
}

async fn list_products(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> ApiResult<Json<Vec<ProductView>>> {
    auth.require(Capability::ViewCatalog)?;
    let filter = ProductFilter {
        category_id: query.category.map(CategoryId),
        // Soft-deleted products stay hidden unless asked for with `is_active=false`.
        is_active: Some(query.is_active.unwrap_or(true)),
        unit_measure: query.unit_measure,
        search: non_blank(query.search),
    };
    let products = state.inventory().list_products(&filter).await?;
    Ok(Json(products.into_iter().map(ProductView::from).collect()))
}

async fn active_products_where(
    state: &AppState,
    keep: impl Fn(&ProductView) -> bool,
) -> ApiResult<Vec<ProductView>> {
    let filter = ProductFilter { is_active: Some(true), ..ProductFilter::default() };
    let products = state.inventory().list_products(&filter).await?;
    Ok(products.into_iter().map(ProductView::from).filter(|view| keep(view)).collect())
}

async fn low_stock(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Vec<ProductView>>> {
    auth.require(Capability::ViewCatalog)?;
    Ok(Json(active_products_where(&state, |view| view.is_low_stock).await?))
}

async fn out_of_stock(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<ProductView>>> {
    auth.require(Capability::ViewCatalog)?;
    Ok(Json(active_products_where(&state, |view| view.stock_status == StockStatus::OutOfStock).await?))
}

async fn create_product(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<ProductInput>,
) -> ApiResult<(StatusCode, Json<ProductView>)> {
    auth.require(Capability::EditCatalog)?;
    input.validate()?;
    let product = state.inventory().create_product(&input).await?;
    tracing::info!(event_name = "product.created", product_id = %product.id, sku = %product.sku, "product created");
    Ok((StatusCode::CREATED, Json(ProductView::from(product))))
}

async fn retrieve_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ProductView>> {
    auth.require(Capability::ViewCatalog)?;
    let product = state
        .inventory()
        .find_product(ProductId(id))
        .await?
        .ok_or_else(|| ApplicationError::not_found("product", id))?;
    Ok(Json(ProductView::from(product)))
}

async fn update_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<ProductInput>,
) -> ApiResult<Json<ProductView>> {
    auth.require(Capability::EditCatalog)?;
    input.validate()?;
    let product = state.inventory().update_product(ProductId(id), &input).await?;
    Ok(Json(ProductView::from(product)))
}

/// Products are only deactivated; sale and quotation lines keep pointing at them.
async fn destroy_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    auth.require(Capability::EditCatalog)?;
    state.inventory().deactivate_product(ProductId(id)).await?;
    tracing::info!(event_name = "product.deactivated", product_id = id, "product deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementQuery {
    pub product_id: Option<i64>,
    pub movement_type: Option<MovementKind>,
}

async fn list_movements(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<MovementQuery>,
) -> ApiResult<Json<Vec<StockMovement>>> {
    auth.require(Capability::OperateSales)?;
    let filter = MovementFilter {
        product_id: query.product_id.map(ProductId),
        movement_type: query.movement_type,
    };
    Ok(Json(state.inventory().list_movements(&filter).await?))
}

async fn create_movement(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<StockMovementInput>,
) -> ApiResult<(StatusCode, Json<StockMovement>)> {
    auth.require(Capability::OperateSales)?;
    input.validate()?;
    let movement = state.inventory().record_movement(&input, Some(auth.id())).await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

async fn retrieve_movement(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<StockMovement>> {
    auth.require(Capability::OperateSales)?;
    let movement = state
        .inventory()
        .find_movement(StockMovementId(id))
        .await?
        .ok_or_else(|| ApplicationError::not_found("stock movement", id))?;
    Ok(Json(movement))
}
