use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use rotu_core::domain::expense::{Expense, ExpenseId, ExpenseInput};
use rotu_core::errors::ApplicationError;
use rotu_core::Capability;
use rotu_db::repositories::{ExpenseFilter, ExpenseRepository};
use serde::Deserialize;

use super::{local_display, non_blank, ApiJson, ApiQuery, BulkIds, Deleted};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::pdf::DocumentTemplate;
use crate::printing::{base_context, expenses_export_context, range_label};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/export_pdf", get(export_pdf))
        .route("/delete_bulk", post(delete_bulk))
        .route("/{id}", get(retrieve).put(update).delete(destroy))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpenseQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub search: Option<String>,
}

impl ExpenseQuery {
    fn filter(&self) -> ExpenseFilter {
        ExpenseFilter {
            start_date: self.start_date,
            end_date: self.end_date,
            search: non_blank(self.search.clone()),
        }
    }
}

async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<ExpenseQuery>,
) -> ApiResult<Json<Vec<Expense>>> {
    auth.require(Capability::OperateSales)?;
    Ok(Json(state.expenses().list(&query.filter()).await?))
}

async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<ExpenseInput>,
) -> ApiResult<(StatusCode, Json<Expense>)> {
    auth.require(Capability::OperateSales)?;
    let expense = state.expenses().create(&input, Some(auth.id())).await?;
    tracing::info!(event_name = "expense.created", expense_id = %expense.id, amount = %expense.amount, "expense recorded");
    Ok((StatusCode::CREATED, Json(expense)))
}

async fn retrieve(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Expense>> {
    auth.require(Capability::OperateSales)?;
    let expense = state
        .expenses()
        .find_by_id(ExpenseId(id))
        .await?
        .ok_or_else(|| ApplicationError::not_found("expense", id))?;
    Ok(Json(expense))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<ExpenseInput>,
) -> ApiResult<Json<Expense>> {
    auth.require(Capability::OperateSales)?;
    Ok(Json(state.expenses().update(ExpenseId(id), &input).await?))
}

async fn destroy(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    auth.require(Capability::DeleteRecords)?;
    state.expenses().delete(ExpenseId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_bulk(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(body): ApiJson<BulkIds>,
) -> ApiResult<Json<Deleted>> {
    auth.require(Capability::DeleteRecords)?;
    let ids: Vec<ExpenseId> = body.require_ids()?.into_iter().map(ExpenseId).collect();
    let deleted = state.expenses().delete_many(&ids).await?;
    tracing::info!(event_name = "expense.bulk_deleted", deleted, deleted_by = %auth.id(), "expenses deleted");
    Ok(Json(Deleted { deleted }))
}

async fn export_pdf(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<ExpenseQuery>,
) -> ApiResult<Response> {
    auth.require(Capability::OperateSales)?;
    let expenses = state.expenses().list(&query.filter()).await?;

    let now = Utc::now();
    let label = range_label(
        query.start_date.map(|date| date.to_string()),
        query.end_date.map(|date| date.to_string()),
        &local_display(now, "%Y-%m-%d"),
    );
    let business = &state.config.business;
    let mut context = base_context(&business.company_name, &business.currency_symbol, now);
    expenses_export_context(&mut context, &expenses, label);

    let document = state.pdf.render(DocumentTemplate::ExpensesReport, &context).await?;
    Ok(document.into_download(&format!("Gastos_{}.pdf", local_display(now, "%Y%m%d_%H%M"))))
}
