use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rotu_core::documents::QuotationItemInput;
use rotu_core::domain::client::ClientId;
use rotu_core::domain::quotation::{
    Quotation, QuotationId, QuotationInput, QuotationItem, QuotationItemId, QuotationStatus,
};
use rotu_core::domain::sale::{PaymentMethod, Sale, SaleFromQuotation};
use rotu_core::domain::user::UserId;
use rotu_core::errors::ApplicationError;
use rotu_core::Capability;
use rotu_db::repositories::{ClientRepository, QuotationFilter, QuotationRepository, SaleRepository};
use serde::Deserialize;

use super::{non_blank, ApiJson, ApiQuery, BulkIds, Deleted};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::pdf::DocumentTemplate;
use crate::printing::{base_context, quotation_context};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/delete_bulk", post(delete_bulk))
        .route("/items", get(list_items).post(create_item))
        .route("/items/{id}", get(retrieve_item).put(update_item).delete(destroy_item))
        .route("/{id}", get(retrieve).put(update).delete(destroy))
        .route("/{id}/approve", post(approve))
        .route("/{id}/reject", post(reject))
        .route("/{id}/convert_to_sale", post(convert_to_sale))
        .route("/{id}/generate_pdf", get(generate_pdf))
}

#[derive(Debug, Default, Deserialize)]
pub struct QuotationQuery {
    pub client: Option<i64>,
    pub status: Option<QuotationStatus>,
    pub created_by: Option<i64>,
    pub search: Option<String>,
}

async fn load(state: &AppState, id: i64) -> ApiResult<Quotation> {
    state
        .quotations()
        .find_by_id(QuotationId(id))
        .await?
        .ok_or_else(|| ApplicationError::not_found("quotation", id).into())
}

async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<QuotationQuery>,
) -> ApiResult<Json<Vec<Quotation>>> {
    auth.require(Capability::OperateSales)?;
    let filter = QuotationFilter {
        client_id: query.client.map(ClientId),
        status: query.status,
        created_by: query.created_by.map(UserId),
        search: non_blank(query.search),
    };
    Ok(Json(state.quotations().list(&filter).await?))
}

async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<QuotationInput>,
) -> ApiResult<(StatusCode, Json<Quotation>)> {
    auth.require(Capability::OperateSales)?;
    let draft = input.into_draft(state.default_tax_rate())?;
    let quotation = state.quotations().create(&draft, Some(auth.id())).await?;
    Ok((StatusCode::CREATED, Json(quotation)))
}

async fn retrieve(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Quotation>> {
    auth.require(Capability::OperateSales)?;
    Ok(Json(load(&state, id).await?))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<QuotationInput>,
) -> ApiResult<Json<Quotation>> {
    auth.require(Capability::OperateSales)?;
    let current = load(&state, id).await?;
    let draft = input.into_replacement(&current)?;
    Ok(Json(state.quotations().update(current.id, &draft).await?))
}

async fn destroy(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    auth.require(Capability::DeleteRecords)?;
    state.quotations().delete(QuotationId(id)).await?;
    tracing::info!(event_name = "quotation.deleted", quotation_id = id, deleted_by = %auth.id(), "quotation deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_bulk(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<BulkIds>,
) -> ApiResult<Json<Deleted>> {
    auth.require(Capability::DeleteRecords)?;
    let ids: Vec<QuotationId> = body.require_ids()?.into_iter().map(QuotationId).collect();
    let numbers = state.quotations().delete_many(&ids).await?;
    tracing::info!(
        event_name = "quotation.bulk_deleted",
        deleted = numbers.len(),
        deleted_by = %auth.id(),
        "quotations deleted"
    );
    Ok(Json(Deleted { deleted: numbers.len() as u64 }))
}

async fn approve(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Quotation>> {
    auth.require(Capability::OperateSales)?;
    Ok(Json(state.quotations().transition(QuotationId(id), QuotationStatus::Approved).await?))
}

async fn reject(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Quotation>> {
    auth.require(Capability::OperateSales)?;
    Ok(Json(state.quotations().transition(QuotationId(id), QuotationStatus::Rejected).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ConvertRequest {
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The body is optional; an empty POST converts with cash payment.
async fn convert_to_sale(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Sale>)> {
    auth.require(Capability::OperateSales)?;
    let request: ConvertRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ConvertRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|error| ApiError::bad_request(error.to_string()))?
    };

    let conversion = SaleFromQuotation {
        quotation_id: QuotationId(id),
        payment_method: request.payment_method,
        notes: request.notes,
    };
    let sale = state
        .sales()
        .create_from_quotation(&conversion, state.default_tax_rate(), Some(auth.id()))
        .await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

async fn generate_pdf(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    auth.require(Capability::OperateSales)?;
    let quotation = load(&state, id).await?;
    let client = state.clients().find_by_id(quotation.client_id).await?;

    let business = &state.config.business;
    let mut context = base_context(&business.company_name, &business.currency_symbol, Utc::now());
    quotation_context(&mut context, &quotation, client.as_ref());

    let document = state.pdf.render(DocumentTemplate::Quotation, &context).await?;
    Ok(document.into_download(&format!("Cotizacion_{}.pdf", quotation.quotation_number)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemQuery {
    pub quotation_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ItemCreate {
    pub quotation_id: i64,
    #[serde(flatten)]
    pub item: QuotationItemInput,
}

async fn list_items(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<ItemQuery>,
) -> ApiResult<Json<Vec<QuotationItem>>> {
    auth.require(Capability::OperateSales)?;
    Ok(Json(state.quotations().list_items(query.quotation_id.map(QuotationId)).await?))
}

async fn create_item(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<ItemCreate>,
) -> ApiResult<(StatusCode, Json<QuotationItem>)> {
    auth.require(Capability::OperateSales)?;
    let line = body.item.calculate()?;
    let item = state.quotations().add_item(QuotationId(body.quotation_id), &line).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn retrieve_item(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<QuotationItem>> {
    auth.require(Capability::OperateSales)?;
    let item = state
        .quotations()
        .find_item(QuotationItemId(id))
        .await?
        .ok_or_else(|| ApplicationError::not_found("quotation item", id))?;
    Ok(Json(item))
}

async fn update_item(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<QuotationItemInput>,
) -> ApiResult<Json<QuotationItem>> {
    auth.require(Capability::OperateSales)?;
    let line = input.calculate()?;
    Ok(Json(state.quotations().update_item(QuotationItemId(id), &line).await?))
}

async fn destroy_item(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    auth.require(Capability::OperateSales)?;
    state.quotations().delete_item(QuotationItemId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
