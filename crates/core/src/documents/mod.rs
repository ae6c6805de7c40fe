pub mod line_item;
pub mod sequence;
pub mod totals;

pub use line_item::{
    price_quotation_items, price_sale_items, round_money, QuotationItemInput, QuotationLine,
    SaleItemInput, SaleLine,
};
pub use sequence::{next_number, parse_sequence, DocumentSeries, SkuSeries};
pub use totals::{compute_totals, DocumentTotals};
