use axum::{extract::State, response::Response, routing::get, Json, Router};
use chrono::{Days, NaiveDate, Utc};
use rotu_core::domain::sale::SaleStatus;
use rotu_core::reports::{
    self, ClientsReport, DashboardStats, InventoryReport, QuotationsReport, SalesReport,
};
use rotu_core::Capability;
use rotu_db::repositories::{
    ClientFilter, ClientRepository, DateRange, InventoryRepository, ProductFilter,
    ReportRepository, SaleFilter, SaleRepository,
};
use serde::Deserialize;

use super::{local_display, local_today_start, ApiQuery};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::pdf::DocumentTemplate;
use crate::printing::{base_context, daily_sales_context, total_sales_context};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/sales", get(sales))
        .route("/inventory", get(inventory))
        .route("/quotations", get(quotations))
        .route("/clients", get(clients))
        .route("/daily-sales-pdf", get(daily_sales_pdf))
        .route("/total-sales-pdf", get(total_sales_pdf))
}

fn active_clients() -> ClientFilter {
    ClientFilter { is_active: Some(true), ..ClientFilter::default() }
}

fn active_products() -> ProductFilter {
    ProductFilter { is_active: Some(true), ..ProductFilter::default() }
}

async fn dashboard(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<DashboardStats>> {
    auth.require(Capability::ViewReports)?;
    let report_rows = state.reports();
    let sales = report_rows.sale_facts().await?;
    let quotations = report_rows.quotation_facts().await?;
    let products = state.inventory().list_products(&active_products()).await?;
    let clients = state.clients().list(&active_clients()).await?;

    let now = Utc::now();
    Ok(Json(reports::dashboard(
        &sales,
        &quotations,
        &products,
        clients.len() as i64,
        now,
        local_today_start(now),
    )))
}

#[derive(Debug, Default, Deserialize)]
pub struct SalesReportQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

async fn sales(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<SalesReportQuery>,
) -> ApiResult<Json<SalesReport>> {
    auth.require(Capability::ViewReports)?;
    let range = DateRange { start: query.start_date, end: query.end_date };
    let report_rows = state.reports();
    let completed = report_rows.completed_sale_facts(&range).await?;
    let items = report_rows.completed_item_facts(&range).await?;
    Ok(Json(reports::sales_report(&completed, &items)))
}

async fn inventory(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<InventoryReport>> {
    auth.require(Capability::ViewReports)?;
    let catalog = state.inventory();
    let products = catalog.list_products(&active_products()).await?;
    let categories = catalog.list_categories().await?;
    Ok(Json(reports::inventory_report(&products, &categories)))
}

async fn quotations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<QuotationsReport>> {
    auth.require(Capability::ViewReports)?;
    let facts = state.reports().quotation_facts().await?;
    Ok(Json(reports::quotations_report(&facts)))
}

async fn clients(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<ClientsReport>> {
    auth.require(Capability::ViewReports)?;
    let active = state.clients().list(&active_clients()).await?;
    let sales = state.reports().sale_facts().await?;
    Ok(Json(reports::clients_report(&active, &sales)))
}

/// Every sale created since local midnight, whatever its status.
async fn daily_sales_pdf(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Response> {
    auth.require(Capability::ViewReports)?;
    let now = Utc::now();
    let today_start = local_today_start(now);
    let filter = SaleFilter {
        created_from: Some(today_start),
        created_to: today_start.checked_add_days(Days::new(1)),
        ..SaleFilter::default()
    };
    let sales = state.sales().list(&filter).await?;

    let business = &state.config.business;
    let mut context = base_context(&business.company_name, &business.currency_symbol, now);
    daily_sales_context(&mut context, &sales, &local_display(now, "%d/%m/%Y"));

    let document = state.pdf.render(DocumentTemplate::DailySales, &context).await?;
    Ok(document.into_download(&format!("Ventas_Dia_{}.pdf", local_display(now, "%Y%m%d"))))
}

async fn total_sales_pdf(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Response> {
    auth.require(Capability::ViewReports)?;
    let filter = SaleFilter { status: Some(SaleStatus::Completed), ..SaleFilter::default() };
    let mut completed = state.sales().list(&filter).await?;
    completed.sort_by(|a, b| {
        b.completed_at.unwrap_or(b.created_at).cmp(&a.completed_at.unwrap_or(a.created_at))
    });

    let now = Utc::now();
    let business = &state.config.business;
    let mut context = base_context(&business.company_name, &business.currency_symbol, now);
    total_sales_context(&mut context, &completed);

    let document = state.pdf.render(DocumentTemplate::TotalSales, &context).await?;
    Ok(document.into_download(&format!("Ventas_Totales_{}.pdf", local_display(now, "%Y%m%d"))))
}
