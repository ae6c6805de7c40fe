use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::documents::line_item::{round_money, MAX_AMOUNT};
use crate::errors::{DomainError, FieldErrors};

/// Stored money figures of a quotation or sale.
///
/// `total_amount == subtotal - discount_amount + tax_amount` holds exactly because every
/// component is rounded to cents before the total is formed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

pub fn validate_percentage(errors: &mut FieldErrors, field: &str, value: Decimal) {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        errors.push(field, "ensure this value is between 0 and 100");
    }
}

/// Aggregates line totals into document totals. `tax_percentage` of `None` charges no tax.
pub fn compute_totals<I>(
    item_totals: I,
    discount_percentage: Decimal,
    tax_percentage: Option<Decimal>,
) -> Result<DocumentTotals, DomainError>
where
    I: IntoIterator<Item = Decimal>,
{
    let mut errors = FieldErrors::new();
    validate_percentage(&mut errors, "discount_percentage", discount_percentage);
    if let Some(rate) = tax_percentage {
        validate_percentage(&mut errors, "tax_rate", rate);
    }

    let subtotal = item_totals
        .into_iter()
        .try_fold(Decimal::ZERO, |sum, total| sum.checked_add(total))
        .map(round_money)
        .filter(|subtotal| *subtotal <= MAX_AMOUNT);
    let Some(subtotal) = subtotal else {
        errors.push("subtotal", format!("ensure this value is less than or equal to {MAX_AMOUNT}"));
        return Err(DomainError::Validation(errors));
    };
    errors.into_result()?;

    let discount_amount = round_money(subtotal * discount_percentage / Decimal::ONE_HUNDRED);
    let taxable = subtotal - discount_amount;
    let tax_amount = match tax_percentage {
        Some(rate) => round_money(taxable * rate / Decimal::ONE_HUNDRED),
        None => Decimal::ZERO,
    };

    Ok(DocumentTotals { subtotal, discount_amount, tax_amount, total_amount: taxable + tax_amount })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::compute_totals;
    use crate::errors::DomainError;

    #[test]
    fn quotation_with_ten_percent_discount() {
        let totals = compute_totals([Decimal::from(120)], Decimal::from(10), None).expect("totals");

        assert_eq!(totals.subtotal, Decimal::from(120));
        assert_eq!(totals.discount_amount, Decimal::from(12));
        assert_eq!(totals.tax_amount, Decimal::ZERO);
        assert_eq!(totals.total_amount, Decimal::from(108));
    }

    #[test]
    fn sale_with_isv() {
        let totals = compute_totals([Decimal::from(1000)], Decimal::ZERO, Some(Decimal::from(15)))
            .expect("totals");

        assert_eq!(totals.tax_amount, Decimal::from(150));
        assert_eq!(totals.total_amount, Decimal::from(1150));
    }

    #[test]
    fn tax_applies_after_discount() {
        let totals =
            compute_totals([Decimal::from(200)], Decimal::from(25), Some(Decimal::from(15)))
                .expect("totals");

        assert_eq!(totals.discount_amount, Decimal::from(50));
        assert_eq!(totals.tax_amount, Decimal::new(2250, 2));
        assert_eq!(totals.total_amount, Decimal::new(17250, 2));
    }

    #[test]
    fn empty_document_totals_are_zero() {
        let totals = compute_totals(Vec::<Decimal>::new(), Decimal::from(10), Some(Decimal::from(15)))
            .expect("totals");
        assert_eq!(totals.total_amount, Decimal::ZERO);
    }

    #[test]
    fn total_identity_holds_across_percentage_grid() {
        let lines = [Decimal::new(33333, 2), Decimal::new(1, 2), Decimal::new(7777, 3)];
        for discount in (0..=100).step_by(7) {
            for tax in (0..=100).step_by(13) {
                let discount = Decimal::new(discount * 100 + 33, 2).min(Decimal::ONE_HUNDRED);
                let tax = Decimal::new(tax * 100 + 50, 2).min(Decimal::ONE_HUNDRED);
                let totals = compute_totals(lines, discount, Some(tax)).expect("valid percentages");
                assert_eq!(
                    totals.total_amount,
                    totals.subtotal - totals.discount_amount + totals.tax_amount
                );
                assert!(totals.total_amount >= Decimal::ZERO);
            }
        }
    }

    #[test]
    fn recompute_is_idempotent() {
        let lines = vec![Decimal::new(1999, 2), Decimal::new(500, 2)];
        let first = compute_totals(lines.clone(), Decimal::new(750, 2), Some(Decimal::from(15)))
            .expect("totals");
        let second =
            compute_totals(lines, Decimal::new(750, 2), Some(Decimal::from(15))).expect("totals");
        assert_eq!(first, second);
    }

    #[test]
    fn subtotal_beyond_storage_is_a_field_error() {
        let line = Decimal::new(9_999_999_999, 2);
        let error = compute_totals([line, line], Decimal::ZERO, None).expect_err("subtotal too large");
        assert!(matches!(error, DomainError::Validation(ref fields) if fields.contains("subtotal")));

        let error = compute_totals([Decimal::MAX, Decimal::MAX], Decimal::ZERO, None)
            .expect_err("sum overflows");
        assert!(matches!(error, DomainError::Validation(ref fields) if fields.contains("subtotal")));
    }

    #[test]
    fn out_of_range_percentages_are_field_errors() {
        let error = compute_totals([Decimal::ONE], Decimal::from(101), Some(Decimal::from(-1)))
            .expect_err("invalid percentages");
        match error {
            DomainError::Validation(fields) => {
                assert!(fields.contains("discount_percentage"));
                assert!(fields.contains("tax_rate"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
