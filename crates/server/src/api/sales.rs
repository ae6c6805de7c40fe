use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{Days, NaiveDate, Utc};
use rotu_core::documents::SaleItemInput;
use rotu_core::domain::client::ClientId;
use rotu_core::domain::sale::{
    PaymentMethod, Sale, SaleFromQuotation, SaleId, SaleInput, SaleItem, SaleItemId, SaleStatus,
};
use rotu_core::domain::user::UserId;
use rotu_core::errors::ApplicationError;
use rotu_core::Capability;
use rotu_db::repositories::{ClientRepository, SaleFilter, SaleRepository};
use serde::{Deserialize, Serialize};

use super::{local_display, local_midnight, non_blank, ApiJson, ApiQuery, BulkIds};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::pdf::DocumentTemplate;
use crate::printing::{base_context, invoice_context, range_label, sales_export_context};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/from_quotation", post(from_quotation))
        .route("/export_pdf", get(export_pdf))
        .route("/delete_bulk", post(delete_bulk))
        .route("/items", get(list_items).post(create_item))
        .route("/items/{id}", get(retrieve_item).put(update_item).delete(destroy_item))
        .route("/{id}", get(retrieve).put(update).delete(destroy))
        .route("/{id}/complete", post(complete))
        .route("/{id}/cancel", post(cancel))
        .route("/{id}/generate_pdf", get(generate_pdf))
}

#[derive(Debug, Default, Deserialize)]
pub struct SaleQuery {
    pub client: Option<i64>,
    pub status: Option<SaleStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub created_by: Option<i64>,
    pub search: Option<String>,
    /// Export only: first local day to include.
    pub date_from: Option<NaiveDate>,
    /// Export only: last local day to include.
    pub date_to: Option<NaiveDate>,
}

impl SaleQuery {
    fn filter(&self) -> SaleFilter {
        SaleFilter {
            client_id: self.client.map(ClientId),
            status: self.status,
            payment_method: self.payment_method,
            created_by: self.created_by.map(UserId),
            search: non_blank(self.search.clone()),
            ..SaleFilter::default()
        }
    }

    fn export_filter(&self) -> SaleFilter {
        SaleFilter {
            created_from: self.date_from.and_then(local_midnight),
            created_to: self
                .date_to
                .and_then(|date| date.checked_add_days(Days::new(1)))
                .and_then(local_midnight),
            ..self.filter()
        }
    }
}

async fn load(state: &AppState, id: i64) -> ApiResult<Sale> {
    state
        .sales()
        .find_by_id(SaleId(id))
        .await?
        .ok_or_else(|| ApplicationError::not_found("sale", id).into())
}

async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<SaleQuery>,
) -> ApiResult<Json<Vec<Sale>>> {
    auth.require(Capability::OperateSales)?;
    Ok(Json(state.sales().list(&query.filter()).await?))
}

async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<SaleInput>,
) -> ApiResult<(StatusCode, Json<Sale>)> {
    auth.require(Capability::OperateSales)?;
    let draft = input.into_draft(state.default_tax_rate())?;
    let sale = state.sales().create(&draft, Some(auth.id())).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

async fn from_quotation(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(request): ApiJson<SaleFromQuotation>,
) -> ApiResult<(StatusCode, Json<Sale>)> {
    auth.require(Capability::OperateSales)?;
    let sale = state
        .sales()
        .create_from_quotation(&request, state.default_tax_rate(), Some(auth.id()))
        .await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

async fn retrieve(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Sale>> {
    auth.require(Capability::OperateSales)?;
    Ok(Json(load(&state, id).await?))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<SaleInput>,
) -> ApiResult<Json<Sale>> {
    auth.require(Capability::OperateSales)?;
    let current = load(&state, id).await?;
    let draft = input.into_replacement(&current)?;
    Ok(Json(state.sales().update(current.id, &draft).await?))
}

async fn destroy(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    auth.require(Capability::DeleteRecords)?;
    state.sales().delete(SaleId(id)).await?;
    tracing::info!(event_name = "sale.deleted", sale_id = id, deleted_by = %auth.id(), "sale deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct SalesDeleted {
    pub deleted: u64,
    pub invoice_numbers: Vec<String>,
}

async fn delete_bulk(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<BulkIds>,
) -> ApiResult<Json<SalesDeleted>> {
    auth.require(Capability::DeleteRecords)?;
    let ids: Vec<SaleId> = body.require_ids()?.into_iter().map(SaleId).collect();
    let invoice_numbers = state.sales().delete_many(&ids).await?;
    tracing::info!(
        event_name = "sale.bulk_deleted",
        deleted = invoice_numbers.len(),
        deleted_by = %auth.id(),
        "sales deleted"
    );
    Ok(Json(SalesDeleted { deleted: invoice_numbers.len() as u64, invoice_numbers }))
}

async fn complete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Sale>> {
    auth.require(Capability::OperateSales)?;
    Ok(Json(state.sales().complete(SaleId(id), Some(auth.id()), Utc::now()).await?))
}

async fn cancel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Sale>> {
    auth.require(Capability::OperateSales)?;
    Ok(Json(state.sales().cancel(SaleId(id)).await?))
}

async fn generate_pdf(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    auth.require(Capability::OperateSales)?;
    let sale = load(&state, id).await?;
    let client = state.clients().find_by_id(sale.client_id).await?;

    let business = &state.config.business;
    let mut context = base_context(&business.company_name, &business.currency_symbol, Utc::now());
    invoice_context(&mut context, &sale, client.as_ref());

    let document = state.pdf.render(DocumentTemplate::Invoice, &context).await?;
    Ok(document.into_download(&format!("Factura_{}.pdf", sale.invoice_number)))
}

async fn export_pdf(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<SaleQuery>,
) -> ApiResult<Response> {
    auth.require(Capability::OperateSales)?;
    let sales = state.sales().list(&query.export_filter()).await?;

    let now = Utc::now();
    let label = range_label(
        query.date_from.map(|date| date.to_string()),
        query.date_to.map(|date| date.to_string()),
        &local_display(now, "%Y-%m-%d"),
    );
    let business = &state.config.business;
    let mut context = base_context(&business.company_name, &business.currency_symbol, now);
    sales_export_context(&mut context, &sales, label);

    tracing::info!(event_name = "sale.exported", rows = sales.len(), "sales export rendered");
    let document = state.pdf.render(DocumentTemplate::SalesReport, &context).await?;
    Ok(document.into_download(&format!("Ventas_{}.pdf", local_display(now, "%Y%m%d_%H%M"))))
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemQuery {
    pub sale_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ItemCreate {
    pub sale_id: i64,
    #[serde(flatten)]
    pub item: SaleItemInput,
}

async fn list_items(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<ItemQuery>,
) -> ApiResult<Json<Vec<SaleItem>>> {
    auth.require(Capability::OperateSales)?;
    Ok(Json(state.sales().list_items(query.sale_id.map(SaleId)).await?))
}

async fn create_item(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<ItemCreate>,
) -> ApiResult<(StatusCode, Json<SaleItem>)> {
    auth.require(Capability::OperateSales)?;
    let line = body.item.calculate()?;
    let item = state.sales().add_item(SaleId(body.sale_id), &line).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn retrieve_item(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<SaleItem>> {
    auth.require(Capability::OperateSales)?;
    let item = state
        .sales()
        .find_item(SaleItemId(id))
        .await?
        .ok_or_else(|| ApplicationError::not_found("sale item", id))?;
    Ok(Json(item))
}

async fn update_item(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<SaleItemInput>,
) -> ApiResult<Json<SaleItem>> {
    auth.require(Capability::OperateSales)?;
    let line = input.calculate()?;
    Ok(Json(state.sales().update_item(SaleItemId(id), &line).await?))
}

async fn destroy_item(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    auth.require(Capability::OperateSales)?;
    state.sales().delete_item(SaleItemId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
