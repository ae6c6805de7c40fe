use uuid::Uuid;

/// Digits in the numeric part of a document number.
pub const SEQUENCE_WIDTH: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DocumentSeries {
    Quotation,
    Invoice,
}

impl DocumentSeries {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Quotation => "COT-",
            Self::Invoice => "FAC-",
        }
    }

    /// Number that follows `last`, the most recently inserted number in this series.
    pub fn next_after(self, last: Option<&str>) -> String {
        next_number(self.prefix(), last)
    }
}

/// Numeric suffix of `number`, or `None` when it does not belong to `prefix`.
///
/// Anything after the first `-` following the digits is ignored, so `COT-000012-R` reads as 12.
pub fn parse_sequence(prefix: &str, number: &str) -> Option<u64> {
    let rest = number.strip_prefix(prefix)?;
    let digits = rest.split('-').next()?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Next zero-padded number. A missing, foreign or malformed predecessor restarts the series at 1.
pub fn next_number(prefix: &str, last: Option<&str>) -> String {
    let next = last
        .and_then(|number| parse_sequence(prefix, number))
        .and_then(|value| value.checked_add(1))
        .unwrap_or(1);
    format_number(prefix, next)
}

pub fn format_number(prefix: &str, value: u64) -> String {
    format!("{prefix}{value:0width$}", width = SEQUENCE_WIDTH)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkuSeries {
    Product,
    SimpleProduct,
}

impl SkuSeries {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Product => "PRD-",
            Self::SimpleProduct => "INV-",
        }
    }

    /// Random SKU such as `PRD-3F9A01BC`.
    pub fn generate(self) -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("{}{}", self.prefix(), hex[..8].to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::{next_number, parse_sequence, DocumentSeries, SkuSeries};

    #[test]
    fn first_document_starts_at_one() {
        assert_eq!(DocumentSeries::Quotation.next_after(None), "COT-000001");
        assert_eq!(DocumentSeries::Invoice.next_after(None), "FAC-000001");
    }

    #[test]
    fn increments_the_latest_number() {
        assert_eq!(DocumentSeries::Invoice.next_after(Some("FAC-000041")), "FAC-000042");
        assert_eq!(next_number("COT-", Some("COT-000999")), "COT-001000");
    }

    #[test]
    fn sequence_strictly_increases_by_one() {
        let mut last: Option<String> = None;
        for expected in 1..=25_u64 {
            let next = DocumentSeries::Quotation.next_after(last.as_deref());
            assert_eq!(parse_sequence("COT-", &next), Some(expected));
            last = Some(next);
        }
    }

    #[test]
    fn malformed_or_foreign_numbers_restart_the_series() {
        assert_eq!(next_number("COT-", Some("FAC-000010")), "COT-000001");
        assert_eq!(next_number("COT-", Some("COT-abc")), "COT-000001");
        assert_eq!(next_number("COT-", Some("COT-")), "COT-000001");
    }

    #[test]
    fn overflowing_the_padding_keeps_counting() {
        assert_eq!(next_number("FAC-", Some("FAC-999999")), "FAC-1000000");
    }

    #[test]
    fn suffix_after_the_digits_is_ignored() {
        assert_eq!(parse_sequence("COT-", "COT-000012-R"), Some(12));
    }

    #[test]
    fn skus_have_prefix_and_eight_uppercase_hex_digits() {
        let sku = SkuSeries::Product.generate();
        assert!(sku.starts_with("PRD-"));
        let suffix = &sku[4..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_lowercase()));

        assert!(SkuSeries::SimpleProduct.generate().starts_with("INV-"));
    }
}
