//! Template contexts for the printable documents.

use chrono::{DateTime, Utc};
use rotu_core::domain::client::Client;
use rotu_core::domain::expense::Expense;
use rotu_core::domain::quotation::Quotation;
use rotu_core::domain::sale::{Sale, SaleStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use tera::Context;

use crate::api::local_display;

/// Rows printed on list exports.
pub const EXPORT_ROW_LIMIT: usize = 200;
/// Rows printed on the all-time sales report.
pub const TOTAL_SALES_ROW_LIMIT: usize = 100;

const DATE: &str = "%d/%m/%Y";
const DATE_TIME: &str = "%d/%m/%Y %H:%M";

fn unknown_if_blank(value: Option<&str>) -> String {
    value.map(str::trim).filter(|value| !value.is_empty()).unwrap_or("N/D").to_string()
}

/// Branding shared by every document.
pub fn base_context(company_name: &str, currency: &str, now: DateTime<Utc>) -> Context {
    let mut context = Context::new();
    context.insert("company_name", company_name);
    context.insert("currency", currency);
    context.insert("generated_at", &local_display(now, DATE_TIME));
    context
}

#[derive(Debug, Serialize)]
struct QuotationItemRow<'a> {
    product: &'a str,
    description: &'a str,
    width_inches: Decimal,
    height_inches: Decimal,
    quantity: u32,
    price_per_square_inch: Decimal,
    total: Decimal,
}

#[derive(Debug, Serialize)]
struct QuotationDocument<'a> {
    quotation_number: &'a str,
    client_name: &'a str,
    client_rtn: &'a str,
    client_phone: &'a str,
    client_address: &'a str,
    seller: String,
    status: &'static str,
    created_at: String,
    valid_until: Option<String>,
    notes: &'a str,
    discount_percentage: Decimal,
    has_discount: bool,
    apply_tax: bool,
    tax_rate: Decimal,
    subtotal: Decimal,
    discount_amount: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
    items: Vec<QuotationItemRow<'a>>,
}

pub fn quotation_context(context: &mut Context, quotation: &Quotation, client: Option<&Client>) {
    let document = QuotationDocument {
        quotation_number: &quotation.quotation_number,
        client_name: &quotation.client_name,
        client_rtn: client.map(|c| c.rtn.as_str()).unwrap_or_default(),
        client_phone: client.map(|c| c.phone.as_str()).unwrap_or_default(),
        client_address: client.map(|c| c.address.as_str()).unwrap_or_default(),
        seller: unknown_if_blank(quotation.created_by_username.as_deref()),
        status: quotation.status.label(),
        created_at: local_display(quotation.created_at, DATE_TIME),
        valid_until: quotation.valid_until.map(|date| date.format(DATE).to_string()),
        notes: &quotation.notes,
        discount_percentage: quotation.discount_percentage,
        has_discount: quotation.totals.discount_amount > Decimal::ZERO,
        apply_tax: quotation.apply_tax,
        tax_rate: quotation.tax_rate,
        subtotal: quotation.totals.subtotal,
        discount_amount: quotation.totals.discount_amount,
        tax_amount: quotation.totals.tax_amount,
        total_amount: quotation.totals.total_amount,
        items: quotation
            .items
            .iter()
            .map(|item| QuotationItemRow {
                product: &item.product_name,
                description: &item.line.description,
                width_inches: item.line.width_inches,
                height_inches: item.line.height_inches,
                quantity: item.line.quantity,
                price_per_square_inch: item.line.price_per_square_inch,
                total: item.line.total,
            })
            .collect(),
    };
    context.insert("quotation", &document);
}

#[derive(Debug, Serialize)]
struct InvoiceItemRow<'a> {
    product: &'a str,
    description: &'a str,
    quantity: u32,
    unit_price: Decimal,
    total: Decimal,
}

#[derive(Debug, Serialize)]
struct InvoiceDocument<'a> {
    invoice_number: &'a str,
    date: String,
    client_name: &'a str,
    client_rtn: &'a str,
    seller: String,
    payment_method: &'static str,
    discount_percentage: Decimal,
    has_discount: bool,
    tax_rate: Decimal,
    subtotal: Decimal,
    discount_amount: Decimal,
    tax_amount: Decimal,
    total_amount: Decimal,
    notes: &'a str,
    items: Vec<InvoiceItemRow<'a>>,
}

pub fn invoice_context(context: &mut Context, sale: &Sale, client: Option<&Client>) {
    let document = InvoiceDocument {
        invoice_number: &sale.invoice_number,
        date: local_display(sale.completed_at.unwrap_or(sale.created_at), DATE),
        client_name: &sale.client_name,
        client_rtn: client.map(|c| c.rtn.as_str()).unwrap_or_default(),
        seller: unknown_if_blank(sale.created_by_username.as_deref()),
        payment_method: sale.payment_method.label(),
        discount_percentage: sale.discount_percentage,
        has_discount: sale.totals.discount_amount > Decimal::ZERO,
        tax_rate: sale.tax_rate,
        subtotal: sale.totals.subtotal,
        discount_amount: sale.totals.discount_amount,
        tax_amount: sale.totals.tax_amount,
        total_amount: sale.totals.total_amount,
        notes: &sale.notes,
        items: sale
            .items
            .iter()
            .map(|item| InvoiceItemRow {
                product: &item.product_name,
                description: &item.line.description,
                quantity: item.line.quantity,
                unit_price: item.line.unit_price,
                total: item.line.total,
            })
            .collect(),
    };
    context.insert("sale", &document);
}

/// Money and status counts over a set of sales.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub total_amount: Decimal,
    pub count: usize,
    pub completed: usize,
    pub pending: usize,
    pub cancelled: usize,
    pub average: Decimal,
}

impl SalesSummary {
    pub fn of(sales: &[Sale]) -> Self {
        let mut summary = Self::default();
        for sale in sales {
            summary.total_amount += sale.totals.total_amount;
            summary.count += 1;
            match sale.status {
                SaleStatus::Completed => summary.completed += 1,
                SaleStatus::Pending => summary.pending += 1,
                SaleStatus::Cancelled => summary.cancelled += 1,
            }
        }
        summary.average =
            rotu_core::reports::average(summary.total_amount, summary.count as i64);
        summary
    }
}

#[derive(Debug, Serialize)]
struct SaleRow<'a> {
    invoice_number: &'a str,
    client_name: &'a str,
    seller: String,
    payment_method: &'static str,
    status: &'static str,
    date: String,
    time: String,
    total_amount: Decimal,
}

fn sale_rows(sales: &[Sale], limit: usize, at: impl Fn(&Sale) -> DateTime<Utc>) -> Vec<SaleRow<'_>> {
    sales
        .iter()
        .take(limit)
        .map(|sale| SaleRow {
            invoice_number: &sale.invoice_number,
            client_name: &sale.client_name,
            seller: unknown_if_blank(sale.created_by_username.as_deref()),
            payment_method: sale.payment_method.label(),
            status: sale.status.label(),
            date: local_display(at(sale), DATE),
            time: local_display(at(sale), "%H:%M"),
            total_amount: sale.totals.total_amount,
        })
        .collect()
}

/// Sales export: the summary covers every matching sale, the table only the first rows.
pub fn sales_export_context(context: &mut Context, sales: &[Sale], range_label: Option<String>) {
    context.insert("summary", &SalesSummary::of(sales));
    context.insert("sales", &sale_rows(sales, EXPORT_ROW_LIMIT, |sale| sale.created_at));
    context.insert("truncated", &(sales.len() > EXPORT_ROW_LIMIT));
    context.insert("range_label", &range_label);
}

pub fn daily_sales_context(context: &mut Context, sales: &[Sale], today: &str) {
    context.insert("date", today);
    context.insert("summary", &SalesSummary::of(sales));
    context.insert("sales", &sale_rows(sales, sales.len(), |sale| sale.created_at));
}

/// `completed` must already be ordered most recent completion first.
pub fn total_sales_context(context: &mut Context, completed: &[Sale]) {
    context.insert("summary", &SalesSummary::of(completed));
    context.insert(
        "sales",
        &sale_rows(completed, TOTAL_SALES_ROW_LIMIT, |sale| sale.completed_at.unwrap_or(sale.created_at)),
    );
    context.insert("truncated", &(completed.len() > TOTAL_SALES_ROW_LIMIT));
}

#[derive(Debug, Serialize)]
struct ExpenseRow<'a> {
    date: String,
    description: &'a str,
    amount: Decimal,
}

#[derive(Debug, Serialize)]
struct ExpenseSummary {
    count: usize,
    total_amount: Decimal,
}

pub fn expenses_export_context(context: &mut Context, expenses: &[Expense], range_label: Option<String>) {
    let summary = ExpenseSummary {
        count: expenses.len(),
        total_amount: expenses.iter().map(|expense| expense.amount).sum(),
    };
    let rows: Vec<ExpenseRow<'_>> = expenses
        .iter()
        .take(EXPORT_ROW_LIMIT)
        .map(|expense| ExpenseRow {
            date: expense.date.format(DATE).to_string(),
            description: &expense.description,
            amount: expense.amount,
        })
        .collect();
    context.insert("summary", &summary);
    context.insert("expenses", &rows);
    context.insert("range_label", &range_label);
}

/// "Rango de fechas: start - end" when either bound was requested.
pub fn range_label(start: Option<String>, end: Option<String>, today: &str) -> Option<String> {
    if start.is_none() && end.is_none() {
        return None;
    }
    Some(format!(
        "Rango de fechas: {} - {}",
        start.unwrap_or_else(|| "inicio".to_string()),
        end.unwrap_or_else(|| today.to_string())
    ))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rotu_core::documents::DocumentTotals;
    use rotu_core::domain::client::ClientId;
    use rotu_core::domain::sale::{PaymentMethod, Sale, SaleId, SaleStatus};
    use rust_decimal::Decimal;

    use super::{range_label, SalesSummary};

    fn sale(id: i64, status: SaleStatus, total: i64) -> Sale {
        Sale {
            id: SaleId(id),
            invoice_number: format!("FAC-{id:06}"),
            client_id: ClientId(1),
            client_name: "Maria".to_string(),
            quotation_id: None,
            created_by: None,
            created_by_username: None,
            status,
            payment_method: PaymentMethod::Cash,
            discount_percentage: Decimal::ZERO,
            tax_rate: Decimal::from(15),
            totals: DocumentTotals {
                subtotal: Decimal::from(total),
                discount_amount: Decimal::ZERO,
                tax_amount: Decimal::ZERO,
                total_amount: Decimal::from(total),
            },
            notes: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
            items: Vec::new(),
        }
    }

    #[test]
    fn summary_counts_each_status() {
        let sales = vec![
            sale(1, SaleStatus::Completed, 100),
            sale(2, SaleStatus::Pending, 50),
            sale(3, SaleStatus::Cancelled, 25),
        ];
        let summary = SalesSummary::of(&sales);
        assert_eq!(summary.total_amount, Decimal::from(175));
        assert_eq!((summary.completed, summary.pending, summary.cancelled), (1, 1, 1));
        assert_eq!(summary.average, Decimal::new(5833, 2));
    }

    #[test]
    fn range_label_fills_open_bounds() {
        assert_eq!(range_label(None, None, "18/10/2026"), None);
        assert_eq!(
            range_label(Some("2026-10-01".to_string()), None, "18/10/2026").as_deref(),
            Some("Rango de fechas: 2026-10-01 - 18/10/2026")
        );
    }
}
