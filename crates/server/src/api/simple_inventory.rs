use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rotu_core::domain::simple_inventory::{
    SimpleMovement, SimpleMovementId, SimpleMovementInput, SimpleProduct, SimpleProductId,
    SimpleProductInput, StockAdjustment,
};
use rotu_core::errors::ApplicationError;
use rotu_core::stock::SimpleMovementKind;
use rotu_core::Capability;
use rotu_db::repositories::{SimpleInventoryRepository, SimpleMovementFilter, SimpleProductFilter};
use serde::{Deserialize, Serialize};

use super::{non_blank, ApiJson, ApiQuery};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/{id}", get(retrieve_product).put(update_product).delete(destroy_product))
        .route("/products/{id}/adjust_stock", post(adjust_stock))
        .route("/stock-movements", get(list_movements).post(create_movement))
        .route("/stock-movements/{id}", get(retrieve_movement))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub sku: Option<String>,
    pub min_quantity: Option<i64>,
    pub max_quantity: Option<i64>,
}

async fn list_products(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> ApiResult<Json<Vec<SimpleProduct>>> {
    auth.require(Capability::ViewSimpleInventory)?;
    let filter = SimpleProductFilter {
        search: non_blank(query.search),
        sku: non_blank(query.sku),
        min_quantity: query.min_quantity,
        max_quantity: query.max_quantity,
    };
    Ok(Json(state.simple_inventory().list_products(&filter).await?))
}

async fn create_product(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<SimpleProductInput>,
) -> ApiResult<(StatusCode, Json<SimpleProduct>)> {
    auth.require(Capability::EditSimpleInventory)?;
    input.validate()?;
    let product = state.simple_inventory().create_product(&input, Some(auth.id())).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn retrieve_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<SimpleProduct>> {
    auth.require(Capability::ViewSimpleInventory)?;
    let product = state
        .simple_inventory()
        .find_product(SimpleProductId(id))
        .await?
        .ok_or_else(|| ApplicationError::not_found("product", id))?;
    Ok(Json(product))
}

async fn update_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<SimpleProductInput>,
) -> ApiResult<Json<SimpleProduct>> {
    auth.require(Capability::EditSimpleInventory)?;
    input.validate()?;
    Ok(Json(state.simple_inventory().update_product(SimpleProductId(id), &input).await?))
}

async fn destroy_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    auth.require(Capability::EditSimpleInventory)?;
    state.simple_inventory().delete_product(SimpleProductId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct AdjustmentResult {
    pub product: SimpleProduct,
    pub movement: SimpleMovement,
}

async fn adjust_stock(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(adjustment): ApiJson<StockAdjustment>,
) -> ApiResult<Json<AdjustmentResult>> {
    auth.require(Capability::EditSimpleInventory)?;
    let (product, movement) = state
        .simple_inventory()
        .adjust_stock(SimpleProductId(id), &adjustment, Some(auth.id()))
        .await?;
    Ok(Json(AdjustmentResult { product, movement }))
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementQuery {
    pub product_id: Option<i64>,
    pub movement_type: Option<SimpleMovementKind>,
}

async fn list_movements(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<MovementQuery>,
) -> ApiResult<Json<Vec<SimpleMovement>>> {
    auth.require(Capability::EditSimpleInventory)?;
    let filter = SimpleMovementFilter {
        product_id: query.product_id.map(SimpleProductId),
        movement_type: query.movement_type,
    };
    Ok(Json(state.simple_inventory().list_movements(&filter).await?))
}

async fn create_movement(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<SimpleMovementInput>,
) -> ApiResult<(StatusCode, Json<SimpleMovement>)> {
    auth.require(Capability::EditSimpleInventory)?;
    input.validate()?;
    let movement = state.simple_inventory().record_movement(&input, Some(auth.id())).await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

async fn retrieve_movement(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<SimpleMovement>> {
    auth.require(Capability::EditSimpleInventory)?;
    let movement = state
        .simple_inventory()
        .find_movement(SimpleMovementId(id))
        .await?
        .ok_or_else(|| ApplicationError::not_found("stock movement", id))?;
    Ok(Json(movement))
}
