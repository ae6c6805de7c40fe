use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::documents::line_item::{price_quotation_items, QuotationItemInput, QuotationLine};
use crate::documents::totals::{compute_totals, validate_percentage, DocumentTotals};
use crate::domain::client::ClientId;
use crate::domain::present;
use crate::domain::user::UserId;
use crate::errors::{DomainError, FieldErrors};

entity_id!(QuotationId);
entity_id!(QuotationItemId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuotationStatus {
    Pending,
    Approved,
    Rejected,
    /// A sale was created from the quotation; terminal.
    Converted,
}

impl QuotationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Converted => "CONVERTED",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pendiente",
            Self::Approved => "Aprobada",
            Self::Rejected => "Rechazada",
            Self::Converted => "Convertida a venta",
        }
    }

    pub fn can_transition_to(self, next: QuotationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Approved, Self::Approved)
                | (Self::Rejected, Self::Rejected)
                | (Self::Approved, Self::Rejected)
                | (Self::Rejected, Self::Approved)
                | (Self::Pending, Self::Converted)
                | (Self::Approved, Self::Converted)
        )
    }

    /// Converted quotations are frozen.
    pub fn is_editable(self) -> bool {
        self != Self::Converted
    }
}

impl FromStr for QuotationStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "CONVERTED" => Ok(Self::Converted),
            other => Err(DomainError::field("status", format!("`{other}` is not a valid status"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationItem {
    pub id: QuotationItemId,
    pub quotation_id: QuotationId,
    pub product_name: String,
    #[serde(flatten)]
    pub line: QuotationLine,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub quotation_number: String,
    pub client_id: ClientId,
    pub client_name: String,
    pub created_by: Option<UserId>,
    pub created_by_username: Option<String>,
    pub status: QuotationStatus,
    pub discount_percentage: Decimal,
    pub apply_tax: bool,
    pub tax_rate: Decimal,
    #[serde(flatten)]
    pub totals: DocumentTotals,
    pub notes: String,
    pub valid_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<QuotationItem>,
}

impl Quotation {
    pub fn transition_to(&mut self, next: QuotationStatus) -> Result<(), DomainError> {
        if self.status.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidQuotationTransition { from: self.status, to: next })
    }

    pub fn ensure_editable(&self) -> Result<(), DomainError> {
        if self.status.is_editable() {
            Ok(())
        } else {
            Err(DomainError::BusinessRule(format!(
                "quotation {} was already converted to a sale and can no longer be edited",
                self.quotation_number
            )))
        }
    }

    /// Guard for turning the quotation into a sale.
    pub fn ensure_convertible(&self) -> Result<(), DomainError> {
        if self.status == QuotationStatus::Converted {
            return Err(DomainError::BusinessRule(format!(
                "quotation {} was already converted to a sale",
                self.quotation_number
            )));
        }
        if !self.status.can_transition_to(QuotationStatus::Converted) {
            return Err(DomainError::InvalidQuotationTransition {
                from: self.status,
                to: QuotationStatus::Converted,
            });
        }
        Ok(())
    }

    pub fn header(&self) -> QuotationHeader {
        QuotationHeader {
            client_id: self.client_id,
            discount_percentage: self.discount_percentage,
            apply_tax: self.apply_tax,
            tax_rate: self.tax_rate,
            notes: self.notes.clone(),
            valid_until: self.valid_until,
        }
    }

    /// Totals for the given set of lines under this quotation's percentages.
    pub fn totals_for<'a, I>(&self, lines: I) -> Result<DocumentTotals, DomainError>
    where
        I: IntoIterator<Item = &'a QuotationLine>,
    {
        self.header().totals_for(lines)
    }

    pub fn lines(&self) -> impl Iterator<Item = &QuotationLine> {
        self.items.iter().map(|item| &item.line)
    }
}

/// Editable, non-derived quotation fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotationHeader {
    pub client_id: ClientId,
    pub discount_percentage: Decimal,
    pub apply_tax: bool,
    pub tax_rate: Decimal,
    pub notes: String,
    pub valid_until: Option<NaiveDate>,
}

impl QuotationHeader {
    pub fn tax_percentage(&self) -> Option<Decimal> {
        self.apply_tax.then_some(self.tax_rate)
    }

    pub fn totals_for<'a, I>(&self, lines: I) -> Result<DocumentTotals, DomainError>
    where
        I: IntoIterator<Item = &'a QuotationLine>,
    {
        compute_totals(
            lines.into_iter().map(|line| line.total),
            self.discount_percentage,
            self.tax_percentage(),
        )
    }
}

/// Create or update body. Omitted header fields take their defaults on create and keep the
/// stored value on update.
#[derive(Clone, Debug, Deserialize)]
pub struct QuotationInput {
    pub client_id: ClientId,
    #[serde(default)]
    pub discount_percentage: Option<Decimal>,
    #[serde(default)]
    pub apply_tax: Option<bool>,
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
    /// `Some(None)` clears the date.
    #[serde(default, deserialize_with = "present")]
    pub valid_until: Option<Option<NaiveDate>>,
    /// On update, `None` keeps the current items and `Some` replaces all of them.
    #[serde(default)]
    pub items: Option<Vec<QuotationItemInput>>,
}

/// Validated quotation ready to persist: header, priced lines and totals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotationDraft {
    pub header: QuotationHeader,
    pub lines: Vec<QuotationLine>,
    pub totals: DocumentTotals,
}

impl QuotationInput {
    pub fn header(&self, default_tax_rate: Decimal) -> Result<QuotationHeader, DomainError> {
        self.header_over(QuotationHeader {
            client_id: self.client_id,
            discount_percentage: Decimal::ZERO,
            apply_tax: false,
            tax_rate: default_tax_rate,
            notes: String::new(),
            valid_until: None,
        })
    }

    /// `base` with every field present in this input replaced.
    fn header_over(&self, base: QuotationHeader) -> Result<QuotationHeader, DomainError> {
        let header = QuotationHeader {
            client_id: self.client_id,
            discount_percentage: self.discount_percentage.unwrap_or(base.discount_percentage),
            apply_tax: self.apply_tax.unwrap_or(base.apply_tax),
            tax_rate: self.tax_rate.unwrap_or(base.tax_rate),
            notes: self.notes.as_deref().map_or(base.notes, |notes| notes.trim().to_string()),
            valid_until: self.valid_until.unwrap_or(base.valid_until),
        };

        let mut errors = FieldErrors::new();
        validate_percentage(&mut errors, "discount_percentage", header.discount_percentage);
        validate_percentage(&mut errors, "tax_rate", header.tax_rate);
        errors.into_result()?;
        Ok(header)
    }

    /// Draft for a new quotation. Missing items mean an empty quotation.
    pub fn into_draft(self, default_tax_rate: Decimal) -> Result<QuotationDraft, DomainError> {
        let header = self.header(default_tax_rate)?;
        let lines = price_quotation_items(self.items.as_deref().unwrap_or_default())?;
        let totals = header.totals_for(&lines)?;
        Ok(QuotationDraft { header, lines, totals })
    }

    /// Draft replacing `current`; keeps its lines when no items were sent.
    pub fn into_replacement(self, current: &Quotation) -> Result<QuotationDraft, DomainError> {
        current.ensure_editable()?;
        let header = self.header_over(current.header())?;
        let lines = match self.items.as_deref() {
            Some(items) => price_quotation_items(items)?,
            None => current.lines().cloned().collect(),
        };
        let totals = header.totals_for(&lines)?;
        Ok(QuotationDraft { header, lines, totals })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{Quotation, QuotationId, QuotationInput, QuotationItem, QuotationItemId, QuotationStatus};
    use crate::documents::line_item::QuotationItemInput;
    use crate::documents::totals::DocumentTotals;
    use crate::domain::client::ClientId;
    use crate::domain::inventory::ProductId;
    use crate::errors::DomainError;

    fn item(width: i64, height: i64, price: i64, quantity: u32) -> QuotationItemInput {
        QuotationItemInput {
            product_id: ProductId(1),
            description: "Rotulo".to_string(),
            width_inches: Decimal::from(width),
            height_inches: Decimal::from(height),
            price_per_square_inch: Decimal::from(price),
            quantity,
        }
    }

    fn input(items: Option<Vec<QuotationItemInput>>) -> QuotationInput {
        QuotationInput {
            client_id: ClientId(1),
            discount_percentage: Some(Decimal::from(10)),
            apply_tax: None,
            tax_rate: None,
            notes: None,
            valid_until: None,
            items,
        }
    }

    fn quotation(status: QuotationStatus) -> Quotation {
        let draft = input(Some(vec![item(2, 3, 10, 2)])).into_draft(Decimal::from(15)).expect("draft");
        Quotation {
            id: QuotationId(1),
            quotation_number: "COT-000001".to_string(),
            client_id: ClientId(1),
            client_name: "Maria".to_string(),
            created_by: None,
            created_by_username: None,
            status,
            discount_percentage: draft.header.discount_percentage,
            apply_tax: draft.header.apply_tax,
            tax_rate: draft.header.tax_rate,
            totals: draft.totals,
            notes: String::new(),
            valid_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            items: draft
                .lines
                .into_iter()
                .enumerate()
                .map(|(index, line)| QuotationItem {
                    id: QuotationItemId(index as i64 + 1),
                    quotation_id: QuotationId(1),
                    product_name: "Vinil".to_string(),
                    line,
                })
                .collect(),
        }
    }

    #[test]
    fn draft_matches_worked_example() {
        let draft = input(Some(vec![item(2, 3, 10, 2)])).into_draft(Decimal::from(15)).expect("draft");

        assert_eq!(draft.lines[0].total, Decimal::from(120));
        assert_eq!(
            draft.totals,
            DocumentTotals {
                subtotal: Decimal::from(120),
                discount_amount: Decimal::from(12),
                tax_amount: Decimal::ZERO,
                total_amount: Decimal::from(108),
            }
        );
    }

    #[test]
    fn apply_tax_uses_default_rate_when_unspecified() {
        let mut request = input(Some(vec![item(2, 3, 10, 2)]));
        request.apply_tax = Some(true);
        let draft = request.into_draft(Decimal::from(15)).expect("draft");

        assert_eq!(draft.header.tax_rate, Decimal::from(15));
        assert_eq!(draft.totals.tax_amount, Decimal::new(1620, 2));
        assert_eq!(draft.totals.total_amount, Decimal::new(12420, 2));
    }

    #[test]
    fn replacing_items_matches_creating_with_them() {
        let current = quotation(QuotationStatus::Pending);
        let new_items = vec![item(4, 5, 2, 1), item(1, 1, 3, 7)];

        let replaced = input(Some(new_items.clone()))
            .into_replacement(&current)
            .expect("replacement");
        let created = input(Some(new_items)).into_draft(Decimal::from(15)).expect("draft");

        assert_eq!(replaced.totals, created.totals);
        assert_eq!(replaced.lines, created.lines);
    }

    #[test]
    fn header_only_update_keeps_lines_and_recomputes() {
        let current = quotation(QuotationStatus::Approved);
        let mut request = input(None);
        request.discount_percentage = Some(Decimal::from(50));

        let draft = request.into_replacement(&current).expect("replacement");
        assert_eq!(draft.lines.len(), 1);
        assert_eq!(draft.totals.total_amount, Decimal::from(60));
    }

    #[test]
    fn omitted_header_fields_keep_stored_values() {
        let mut current = quotation(QuotationStatus::Pending);
        current.apply_tax = true;
        current.tax_rate = Decimal::from(12);
        current.valid_until = NaiveDate::from_ymd_opt(2024, 6, 30);
        let body = serde_json::json!({ "client_id": 1, "notes": "  entregar lunes " });
        let request: QuotationInput = serde_json::from_value(body).expect("notes-only body");

        let draft = request.into_replacement(&current).expect("replacement");

        assert_eq!(draft.header.discount_percentage, Decimal::from(10));
        assert!(draft.header.apply_tax);
        assert_eq!(draft.header.tax_rate, Decimal::from(12));
        assert_eq!(draft.header.valid_until, current.valid_until);
        assert_eq!(draft.header.notes, "entregar lunes");
        // 120 - 12 discount = 108, plus 12% tax
        assert_eq!(draft.totals.total_amount, Decimal::new(12096, 2));
    }

    #[test]
    fn explicit_null_clears_valid_until() {
        let mut current = quotation(QuotationStatus::Pending);
        current.valid_until = NaiveDate::from_ymd_opt(2024, 6, 30);
        let request: QuotationInput =
            serde_json::from_value(serde_json::json!({ "client_id": 1, "valid_until": null }))
                .expect("body");

        let draft = request.into_replacement(&current).expect("replacement");
        assert_eq!(draft.header.valid_until, None);
    }

    #[test]
    fn repeating_a_decision_is_idempotent() {
        let mut approved = quotation(QuotationStatus::Approved);
        approved.transition_to(QuotationStatus::Approved).expect("re-approve");
        assert_eq!(approved.status, QuotationStatus::Approved);

        let mut rejected = quotation(QuotationStatus::Rejected);
        rejected.transition_to(QuotationStatus::Rejected).expect("re-reject");
        assert!(!QuotationStatus::Converted.can_transition_to(QuotationStatus::Converted));
    }

    #[test]
    fn converted_quotation_cannot_be_approved_or_converted_again() {
        let mut converted = quotation(QuotationStatus::Converted);

        let error = converted.transition_to(QuotationStatus::Approved).expect_err("frozen");
        assert!(matches!(error, DomainError::InvalidQuotationTransition { .. }));
        assert!(matches!(converted.ensure_convertible(), Err(DomainError::BusinessRule(_))));
        assert!(converted.ensure_editable().is_err());
    }

    #[test]
    fn rejected_quotation_must_be_reapproved_before_conversion() {
        let mut rejected = quotation(QuotationStatus::Rejected);
        assert!(rejected.ensure_convertible().is_err());

        rejected.transition_to(QuotationStatus::Approved).expect("re-approve");
        rejected.ensure_convertible().expect("approved quotations convert");
    }

    #[test]
    fn status_wire_names_round_trip() {
        let json = serde_json::to_value(QuotationStatus::Converted).expect("serialize");
        assert_eq!(json, "CONVERTED");
        assert_eq!("approved".parse::<QuotationStatus>().expect("parse"), QuotationStatus::Approved);
    }
}
