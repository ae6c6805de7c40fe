use rust_decimal::Decimal;

use crate::documents::line_item::MAX_AMOUNT;
use crate::errors::FieldErrors;

/// Integer surrogate key newtype, serialized as the bare number.
macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

pub mod client;
pub mod expense;
pub mod inventory;
pub mod quotation;
pub mod sale;
pub mod simple_inventory;
pub mod user;

pub(crate) fn require_text(errors: &mut FieldErrors, field: &str, value: &str, max_len: usize) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(field, "this field may not be blank");
    } else if trimmed.chars().count() > max_len {
        errors.push(field, format!("ensure this field has no more than {max_len} characters"));
    }
}

pub(crate) fn limit_text(errors: &mut FieldErrors, field: &str, value: &str, max_len: usize) {
    if value.trim().chars().count() > max_len {
        errors.push(field, format!("ensure this field has no more than {max_len} characters"));
    }
}

pub(crate) fn non_negative(errors: &mut FieldErrors, field: &str, value: Decimal) {
    if value.is_sign_negative() && !value.is_zero() {
        errors.push(field, "ensure this value is greater than or equal to 0");
    }
}

/// Deserializes a field that was present in the body, so that `Option<Option<T>>` tells an
/// omitted field (`None`) apart from an explicit `null` (`Some(None)`).
pub(crate) fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Non-negative and within the ten-digit, two-decimal range every stored amount uses.
pub(crate) fn bounded_amount(errors: &mut FieldErrors, field: &str, value: Decimal) {
    non_negative(errors, field, value);
    if value > MAX_AMOUNT {
        errors.push(field, format!("ensure this value is less than or equal to {MAX_AMOUNT}"));
    }
}

pub(crate) fn optional_email(errors: &mut FieldErrors, field: &str, value: &str) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }
    let valid = match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid {
        errors.push(field, "enter a valid email address");
    }
}
