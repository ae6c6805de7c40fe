//! Per-line arithmetic for quotation and sale items.
//!
//! Everything is fixed-point `Decimal`. Stored area and money values are rounded to cents
//! only after the full-precision product has been formed, and must fit the ten-digit columns
//! they are stored in.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::bounded_amount;
use crate::domain::inventory::ProductId;
use crate::errors::{DomainError, FieldErrors};

/// 99,999,999.99: the largest stored amount, dimension or area.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn area(width: Decimal, height: Decimal) -> Decimal {
    width * height
}

fn default_quantity() -> u32 {
    1
}

fn validate_quantity(errors: &mut FieldErrors, quantity: u32) {
    if quantity < 1 {
        errors.push("quantity", "ensure this value is greater than or equal to 1");
    } else if quantity > i32::MAX as u32 {
        errors.push("quantity", format!("ensure this value is less than or equal to {}", i32::MAX));
    }
}

/// Rounds a derived value to cents, recording a field error when it is missing (overflowed)
/// or too large to store.
fn stored(errors: &mut FieldErrors, field: &str, value: Option<Decimal>) -> Decimal {
    match value.map(round_money) {
        Some(value) if value <= MAX_AMOUNT => value,
        _ => {
            errors.push(field, format!("ensure this value is less than or equal to {MAX_AMOUNT}"));
            Decimal::ZERO
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct QuotationItemInput {
    pub product_id: ProductId,
    pub description: String,
    pub width_inches: Decimal,
    pub height_inches: Decimal,
    pub price_per_square_inch: Decimal,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

/// A priced quotation line: the input plus its derived area and total.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationLine {
    pub product_id: ProductId,
    pub description: String,
    pub width_inches: Decimal,
    pub height_inches: Decimal,
    pub square_inches: Decimal,
    pub price_per_square_inch: Decimal,
    pub quantity: u32,
    pub total: Decimal,
}

impl QuotationItemInput {
    fn field_errors(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.description.trim().is_empty() {
            errors.push("description", "this field may not be blank");
        }
        bounded_amount(&mut errors, "width_inches", self.width_inches);
        bounded_amount(&mut errors, "height_inches", self.height_inches);
        bounded_amount(&mut errors, "price_per_square_inch", self.price_per_square_inch);
        validate_quantity(&mut errors, self.quantity);
        errors
    }

    /// area = width × height; total = area × price per square inch × quantity.
    pub fn calculate(&self) -> Result<QuotationLine, DomainError> {
        self.price().map_err(DomainError::Validation)
    }

    fn price(&self) -> Result<QuotationLine, FieldErrors> {
        let mut errors = self.field_errors();
        if !errors.is_empty() {
            return Err(errors);
        }

        let exact_area = area(self.width_inches, self.height_inches);
        let exact_total = exact_area
            .checked_mul(self.price_per_square_inch)
            .and_then(|value| value.checked_mul(Decimal::from(self.quantity)));
        let square_inches = stored(&mut errors, "square_inches", Some(exact_area));
        let total = stored(&mut errors, "total", exact_total);
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(QuotationLine {
            product_id: self.product_id,
            description: self.description.trim().to_string(),
            width_inches: self.width_inches,
            height_inches: self.height_inches,
            square_inches,
            price_per_square_inch: self.price_per_square_inch,
            quantity: self.quantity,
            total,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SaleItemInput {
    pub product_id: ProductId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub width_inches: Decimal,
    #[serde(default)]
    pub height_inches: Decimal,
    pub unit_price: Decimal,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Material drawn from inventory when the sale completes.
    #[serde(default)]
    pub quantity_used: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub product_id: ProductId,
    pub description: String,
    pub width_inches: Decimal,
    pub height_inches: Decimal,
    pub square_inches: Decimal,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub quantity_used: Decimal,
    pub total: Decimal,
}

impl SaleItemInput {
    fn field_errors(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        bounded_amount(&mut errors, "width_inches", self.width_inches);
        bounded_amount(&mut errors, "height_inches", self.height_inches);
        bounded_amount(&mut errors, "unit_price", self.unit_price);
        bounded_amount(&mut errors, "quantity_used", self.quantity_used);
        validate_quantity(&mut errors, self.quantity);
        errors
    }

    /// total = unit price × quantity; area only when both dimensions are given.
    pub fn calculate(&self) -> Result<SaleLine, DomainError> {
        self.price().map_err(DomainError::Validation)
    }

    fn price(&self) -> Result<SaleLine, FieldErrors> {
        let mut errors = self.field_errors();
        if !errors.is_empty() {
            return Err(errors);
        }

        let square_inches = if self.width_inches.is_zero() || self.height_inches.is_zero() {
            Decimal::ZERO
        } else {
            stored(&mut errors, "square_inches", Some(area(self.width_inches, self.height_inches)))
        };
        let total = stored(&mut errors, "total", self.unit_price.checked_mul(Decimal::from(self.quantity)));
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(SaleLine {
            product_id: self.product_id,
            description: self.description.trim().to_string(),
            width_inches: self.width_inches,
            height_inches: self.height_inches,
            square_inches,
            unit_price: self.unit_price,
            quantity: self.quantity,
            quantity_used: self.quantity_used,
            total,
        })
    }
}

impl From<&QuotationLine> for SaleItemInput {
    /// A quoted print job becomes one sale line priced per piece: the unit price is the
    /// area price of one piece and the material used is the total printed area.
    fn from(line: &QuotationLine) -> Self {
        Self {
            product_id: line.product_id,
            description: line.description.clone(),
            width_inches: line.width_inches,
            height_inches: line.height_inches,
            unit_price: round_money(line.price_per_square_inch * line.square_inches),
            quantity: line.quantity,
            quantity_used: round_money(line.square_inches * Decimal::from(line.quantity)),
        }
    }
}

/// Prices every item, reporting failures as `items[i].field`.
fn price_all<I, L>(items: &[I], price: impl Fn(&I) -> Result<L, FieldErrors>) -> Result<Vec<L>, DomainError> {
    let mut errors = FieldErrors::new();
    let mut lines = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match price(item) {
            Ok(line) => lines.push(line),
            Err(item_errors) => errors.merge_prefixed(&format!("items[{index}]"), item_errors),
        }
    }
    errors.into_result()?;
    Ok(lines)
}

pub fn price_quotation_items(items: &[QuotationItemInput]) -> Result<Vec<QuotationLine>, DomainError> {
    price_all(items, QuotationItemInput::price)
}

pub fn price_sale_items(items: &[SaleItemInput]) -> Result<Vec<SaleLine>, DomainError> {
    price_all(items, SaleItemInput::price)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{price_quotation_items, round_money, QuotationItemInput, SaleItemInput, MAX_AMOUNT};
    use crate::domain::inventory::ProductId;
    use crate::errors::DomainError;

    fn quotation_item(width: Decimal, height: Decimal, price: Decimal, quantity: u32) -> QuotationItemInput {
        QuotationItemInput {
            product_id: ProductId(1),
            description: "Banner".to_string(),
            width_inches: width,
            height_inches: height,
            price_per_square_inch: price,
            quantity,
        }
    }

    fn sale_item(width: Decimal, height: Decimal, price: Decimal, quantity: u32) -> SaleItemInput {
        SaleItemInput {
            product_id: ProductId(1),
            description: "Sticker".to_string(),
            width_inches: width,
            height_inches: height,
            unit_price: price,
            quantity,
            quantity_used: Decimal::ZERO,
        }
    }

    #[test]
    fn quotation_item_total_is_area_times_price_times_quantity() {
        let line = quotation_item(Decimal::from(2), Decimal::from(3), Decimal::from(10), 2)
            .calculate()
            .expect("valid item");

        assert_eq!(line.square_inches, Decimal::from(6));
        assert_eq!(line.total, Decimal::from(120));
    }

    #[test]
    fn quotation_total_rounds_after_full_precision_product() {
        // 1.25 x 1.25 = 1.5625 in², 1.5625 x 0.33 x 3 = 1.546875
        let line = quotation_item(Decimal::new(125, 2), Decimal::new(125, 2), Decimal::new(33, 2), 3)
            .calculate()
            .expect("valid item");

        assert_eq!(line.square_inches, Decimal::new(156, 2));
        assert_eq!(line.total, Decimal::new(155, 2));
    }

    #[test]
    fn sale_item_total_ignores_area() {
        let line = sale_item(Decimal::from(12), Decimal::from(10), Decimal::new(4550, 2), 3)
            .calculate()
            .expect("valid item");

        assert_eq!(line.square_inches, Decimal::from(120));
        assert_eq!(line.total, Decimal::new(13650, 2));
    }

    #[test]
    fn sale_item_without_both_dimensions_has_no_area() {
        let line = sale_item(Decimal::from(12), Decimal::ZERO, Decimal::from(5), 1)
            .calculate()
            .expect("valid item");
        assert_eq!(line.square_inches, Decimal::ZERO);
    }

    #[test]
    fn zero_quantity_is_a_field_error() {
        let error = quotation_item(Decimal::ONE, Decimal::ONE, Decimal::ONE, 0)
            .calculate()
            .expect_err("quantity zero");
        assert!(matches!(error, DomainError::Validation(ref fields) if fields.contains("quantity")));
    }

    #[test]
    fn batch_pricing_reports_item_positions() {
        let items = vec![
            quotation_item(Decimal::ONE, Decimal::ONE, Decimal::ONE, 1),
            quotation_item(Decimal::from(-1), Decimal::ONE, Decimal::ONE, 1),
        ];
        let error = price_quotation_items(&items).expect_err("second item invalid");
        assert!(matches!(error, DomainError::Validation(ref fields) if fields.contains("items[1].width_inches")));
    }

    #[test]
    fn quoted_line_converts_to_piece_priced_sale_line() {
        let quoted = quotation_item(Decimal::from(2), Decimal::from(3), Decimal::from(10), 2)
            .calculate()
            .expect("valid item");

        let sale_line = SaleItemInput::from(&quoted).calculate().expect("valid sale item");

        assert_eq!(sale_line.unit_price, Decimal::from(60));
        assert_eq!(sale_line.quantity_used, Decimal::from(12));
        assert_eq!(sale_line.total, quoted.total);
    }

    #[test]
    fn oversized_dimensions_are_field_errors_not_panics() {
        let huge = Decimal::from(100_000_000_000_000_000_u64);
        let error = quotation_item(huge, huge, Decimal::ONE, 1).calculate().expect_err("too wide");
        assert!(matches!(error, DomainError::Validation(ref fields)
            if fields.contains("width_inches") && fields.contains("height_inches")));
    }

    #[test]
    fn line_totals_beyond_storage_are_rejected() {
        // Every input is within range but area × price × quantity is not.
        let big = Decimal::new(9_999_999_999, 2);
        let error = quotation_item(big, big, big, u32::MAX >> 1).calculate().expect_err("overflowing total");
        assert!(matches!(error, DomainError::Validation(ref fields)
            if fields.contains("square_inches") && fields.contains("total")));

        let error = sale_item(Decimal::ZERO, Decimal::ZERO, big, 2).calculate().expect_err("total too large");
        assert!(matches!(error, DomainError::Validation(ref fields) if fields.contains("total")));
    }

    #[test]
    fn batch_pricing_reports_overflowing_items_by_position() {
        let big = Decimal::new(9_999_999_999, 2);
        let items = vec![
            quotation_item(Decimal::ONE, Decimal::ONE, Decimal::ONE, 1),
            quotation_item(big, big, big, 1),
        ];
        let error = price_quotation_items(&items).expect_err("second item overflows");
        assert!(matches!(error, DomainError::Validation(ref fields) if fields.contains("items[1].total")));
    }

    #[test]
    fn max_amount_is_ten_digits_with_cents() {
        assert_eq!(MAX_AMOUNT.to_string(), "99999999.99");
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_money(Decimal::new(1005, 3)), Decimal::new(101, 2));
        assert_eq!(round_money(Decimal::new(-1005, 3)), Decimal::new(-101, 2));
    }
}
