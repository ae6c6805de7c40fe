//! Report aggregation over rows loaded by the repositories.
//!
//! Sums are formed here with `Decimal` so money never passes through floating point.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::documents::line_item::round_money;
use crate::domain::client::{Client, ClientId};
use crate::domain::inventory::{Category, Product, ProductId};
use crate::domain::quotation::QuotationStatus;
use crate::domain::sale::{PaymentMethod, SaleStatus};
use crate::stock::StockStatus;

pub const TOP_PRODUCTS: usize = 10;
pub const TOP_QUOTING_CLIENTS: usize = 10;
pub const TOP_BUYING_CLIENTS: usize = 20;
pub const RECENT_SALES_DAYS: i64 = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleFact {
    pub client_id: ClientId,
    pub status: SaleStatus,
    pub payment_method: PaymentMethod,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleItemFact {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotationFact {
    pub client_name: String,
    pub status: QuotationStatus,
    pub total_amount: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SalesTally {
    pub total_amount: Decimal,
    pub count: i64,
    pub completed_count: i64,
    pub pending_count: i64,
    pub cancelled_count: i64,
    pub average: Decimal,
}

pub fn tally<'a, I>(sales: I) -> SalesTally
where
    I: IntoIterator<Item = &'a SaleFact>,
{
    let mut tally = SalesTally::default();
    for sale in sales {
        tally.total_amount += sale.total_amount;
        tally.count += 1;
        match sale.status {
            SaleStatus::Completed => tally.completed_count += 1,
            SaleStatus::Pending => tally.pending_count += 1,
            SaleStatus::Cancelled => tally.cancelled_count += 1,
        }
    }
    tally.average = average(tally.total_amount, tally.count);
    tally
}

pub fn average(total: Decimal, count: i64) -> Decimal {
    if count == 0 {
        Decimal::ZERO
    } else {
        round_money(total / Decimal::from(count))
    }
}

/// Share of `part` in `whole` as a percentage with two decimals.
pub fn percentage(part: i64, whole: i64) -> Decimal {
    if whole == 0 {
        Decimal::ZERO
    } else {
        round_money(Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardSales {
    pub total_amount: Decimal,
    pub total_count: i64,
    pub pending_count: i64,
    pub recent_30_days: Decimal,
    pub today_amount: Decimal,
    pub today_count: i64,
    pub today_completed_amount: Decimal,
    pub today_completed_count: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardQuotations {
    pub active: i64,
    pub total: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardInventory {
    pub low_stock: i64,
    pub out_of_stock: i64,
    pub total_products: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardClients {
    pub total: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub sales: DashboardSales,
    pub quotations: DashboardQuotations,
    pub inventory: DashboardInventory,
    pub clients: DashboardClients,
}

/// `active_products` must already exclude soft-deleted products.
pub fn dashboard(
    sales: &[SaleFact],
    quotations: &[QuotationFact],
    active_products: &[Product],
    active_clients: i64,
    now: DateTime<Utc>,
    today_start: DateTime<Utc>,
) -> DashboardStats {
    let recent_start = now - Duration::days(RECENT_SALES_DAYS);
    let mut stats = DashboardStats::default();

    for sale in sales {
        let completed = sale.status == SaleStatus::Completed;
        if completed {
            stats.sales.total_amount += sale.total_amount;
            stats.sales.total_count += 1;
        }
        if sale.status == SaleStatus::Pending {
            stats.sales.pending_count += 1;
        }
        if sale.created_at >= today_start {
            stats.sales.today_amount += sale.total_amount;
            stats.sales.today_count += 1;
        }
        if let Some(completed_at) = sale.completed_at.filter(|_| completed) {
            if completed_at >= recent_start {
                stats.sales.recent_30_days += sale.total_amount;
            }
            if completed_at >= today_start {
                stats.sales.today_completed_amount += sale.total_amount;
                stats.sales.today_completed_count += 1;
            }
        }
    }

    stats.quotations.total = quotations.len() as i64;
    stats.quotations.active = quotations
        .iter()
        .filter(|q| matches!(q.status, QuotationStatus::Pending | QuotationStatus::Approved))
        .count() as i64;

    stats.inventory.total_products = active_products.len() as i64;
    stats.inventory.low_stock = active_products.iter().filter(|p| p.is_low_stock()).count() as i64;
    stats.inventory.out_of_stock = active_products
        .iter()
        .filter(|p| p.stock_status() == StockStatus::OutOfStock)
        .count() as i64;

    stats.clients.total = active_clients;
    stats
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub total_sales: Decimal,
    pub total_count: i64,
    pub average_sale: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeriodTotal {
    /// `YYYY-MM`.
    pub period: String,
    pub total: Decimal,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProductSales {
    pub product: String,
    pub quantity: i64,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MethodTotal {
    pub method: PaymentMethod,
    pub total: Decimal,
    pub count: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SalesReport {
    pub summary: SalesSummary,
    pub sales_by_period: Vec<PeriodTotal>,
    pub top_products: Vec<ProductSales>,
    pub sales_by_payment_method: Vec<MethodTotal>,
}

/// `completed` holds completed sales already narrowed to the requested date range and
/// `items` the lines of those same sales.
pub fn sales_report(completed: &[SaleFact], items: &[SaleItemFact]) -> SalesReport {
    let mut summary = SalesSummary::default();
    let mut by_month: BTreeMap<String, (Decimal, i64)> = BTreeMap::new();
    let mut by_method: BTreeMap<&'static str, (PaymentMethod, Decimal, i64)> = BTreeMap::new();

    for sale in completed {
        summary.total_sales += sale.total_amount;
        summary.total_count += 1;

        if let Some(completed_at) = sale.completed_at {
            let entry = by_month.entry(completed_at.format("%Y-%m").to_string()).or_default();
            entry.0 += sale.total_amount;
            entry.1 += 1;
        }

        let entry = by_method
            .entry(sale.payment_method.as_str())
            .or_insert((sale.payment_method, Decimal::ZERO, 0));
        entry.1 += sale.total_amount;
        entry.2 += 1;
    }
    summary.average_sale = average(summary.total_sales, summary.total_count);

    let mut by_product: BTreeMap<ProductId, ProductSales> = BTreeMap::new();
    for item in items {
        let entry = by_product.entry(item.product_id).or_insert_with(|| ProductSales {
            product: item.product_name.clone(),
            quantity: 0,
            amount: Decimal::ZERO,
        });
        entry.quantity += i64::from(item.quantity);
        entry.amount += item.total;
    }
    let mut top_products: Vec<ProductSales> = by_product.into_values().collect();
    top_products.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.product.cmp(&b.product)));
    top_products.truncate(TOP_PRODUCTS);

    let mut sales_by_payment_method: Vec<MethodTotal> = by_method
        .into_values()
        .map(|(method, total, count)| MethodTotal { method, total, count })
        .collect();
    sales_by_payment_method.sort_by(|a, b| b.total.cmp(&a.total));

    SalesReport {
        summary,
        sales_by_period: by_month
            .into_iter()
            .map(|(period, (total, count))| PeriodTotal { period, total, count })
            .collect(),
        top_products,
        sales_by_payment_method,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LowStockEntry {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub quantity_available: Decimal,
    pub minimum_stock: Decimal,
    pub status: StockStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryValue {
    pub category: String,
    pub total_products: i64,
    pub total_value: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InventoryReport {
    pub low_stock_products: Vec<LowStockEntry>,
    pub categories: Vec<CategoryValue>,
    pub total_inventory_value: Decimal,
    pub total_products: i64,
}

pub fn inventory_report(active_products: &[Product], categories: &[Category]) -> InventoryReport {
    let low_stock_products = active_products
        .iter()
        .filter(|product| product.is_low_stock())
        .map(|product| LowStockEntry {
            id: product.id,
            name: product.name.clone(),
            sku: product.sku.clone(),
            quantity_available: product.quantity_available,
            minimum_stock: product.minimum_stock,
            status: product.stock_status(),
        })
        .collect();

    let categories = categories
        .iter()
        .map(|category| {
            let members = active_products.iter().filter(|p| p.category_id == category.id);
            let (count, value) = members.fold((0_i64, Decimal::ZERO), |(count, value), product| {
                (count + 1, value + product.stock_value())
            });
            CategoryValue {
                category: category.name.clone(),
                total_products: count,
                total_value: round_money(value),
            }
        })
        .collect();

    InventoryReport {
        low_stock_products,
        categories,
        total_inventory_value: round_money(active_products.iter().map(Product::stock_value).sum()),
        total_products: active_products.len() as i64,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusTotal {
    pub status: QuotationStatus,
    pub count: i64,
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClientQuotations {
    pub client: String,
    pub count: i64,
    pub total: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QuotationsReport {
    pub by_status: Vec<StatusTotal>,
    pub conversion_rate: Decimal,
    pub total_quotations: i64,
    pub converted_quotations: i64,
    pub top_clients: Vec<ClientQuotations>,
}

pub fn quotations_report(quotations: &[QuotationFact]) -> QuotationsReport {
    let mut by_status: BTreeMap<&'static str, StatusTotal> = BTreeMap::new();
    let mut by_client: BTreeMap<&str, ClientQuotations> = BTreeMap::new();

    for quotation in quotations {
        let status = by_status.entry(quotation.status.as_str()).or_insert(StatusTotal {
            status: quotation.status,
            count: 0,
            total: Decimal::ZERO,
        });
        status.count += 1;
        status.total += quotation.total_amount;

        let client =
            by_client.entry(quotation.client_name.as_str()).or_insert_with(|| ClientQuotations {
                client: quotation.client_name.clone(),
                count: 0,
                total: Decimal::ZERO,
            });
        client.count += 1;
        client.total += quotation.total_amount;
    }

    let total_quotations = quotations.len() as i64;
    let converted_quotations =
        quotations.iter().filter(|q| q.status == QuotationStatus::Converted).count() as i64;

    let mut by_status: Vec<StatusTotal> = by_status.into_values().collect();
    by_status.sort_by(|a, b| b.count.cmp(&a.count));

    let mut top_clients: Vec<ClientQuotations> = by_client.into_values().collect();
    top_clients.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| b.total.cmp(&a.total)));
    top_clients.truncate(TOP_QUOTING_CLIENTS);

    QuotationsReport {
        by_status,
        conversion_rate: percentage(converted_quotations, total_quotations),
        total_quotations,
        converted_quotations,
        top_clients,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClientSales {
    pub id: ClientId,
    pub name: String,
    pub company: String,
    pub total_sales: Decimal,
    pub sales_count: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClientsReport {
    pub top_clients: Vec<ClientSales>,
    pub total_active_clients: i64,
}

/// Ranks active clients by completed sales; clients without sales are left out.
pub fn clients_report(active_clients: &[Client], sales: &[SaleFact]) -> ClientsReport {
    let mut totals: BTreeMap<ClientId, (Decimal, i64)> = BTreeMap::new();
    for sale in sales.iter().filter(|sale| sale.status == SaleStatus::Completed) {
        let entry = totals.entry(sale.client_id).or_default();
        entry.0 += sale.total_amount;
        entry.1 += 1;
    }

    let mut top_clients: Vec<ClientSales> = active_clients
        .iter()
        .filter_map(|client| {
            let (total_sales, sales_count) = totals.get(&client.id).copied()?;
            (total_sales > Decimal::ZERO).then(|| ClientSales {
                id: client.id,
                name: client.name.clone(),
                company: client.company.clone(),
                total_sales,
                sales_count,
            })
        })
        .collect();
    top_clients.sort_by(|a, b| b.total_sales.cmp(&a.total_sales).then_with(|| a.name.cmp(&b.name)));
    top_clients.truncate(TOP_BUYING_CLIENTS);

    ClientsReport { top_clients, total_active_clients: active_clients.len() as i64 }
}
