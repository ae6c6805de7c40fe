use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::documents::line_item::{price_sale_items, SaleItemInput, SaleLine};
use crate::documents::totals::{compute_totals, validate_percentage, DocumentTotals};
use crate::domain::client::ClientId;
use crate::domain::inventory::ProductId;
use crate::domain::present;
use crate::domain::quotation::{Quotation, QuotationId};
use crate::domain::user::UserId;
use crate::errors::{DomainError, FieldErrors};

entity_id!(SaleId);
entity_id!(SaleItemId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Pending,
    Completed,
    Cancelled,
}

impl SaleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pendiente",
            Self::Completed => "Completada",
            Self::Cancelled => "Cancelada",
        }
    }

    pub fn can_transition_to(self, next: SaleStatus) -> bool {
        matches!((self, next), (Self::Pending, Self::Completed) | (Self::Pending, Self::Cancelled))
    }
}

impl FromStr for SaleStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(DomainError::field("status", format!("`{other}` is not a valid status"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Transfer,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "CASH",
            Self::Transfer => "TRANSFER",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cash => "Efectivo",
            Self::Transfer => "Transferencia",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CASH" => Ok(Self::Cash),
            "TRANSFER" => Ok(Self::Transfer),
            other => Err(DomainError::field(
                "payment_method",
                format!("`{other}` is not a valid payment method"),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: SaleItemId,
    pub sale_id: SaleId,
    pub product_name: String,
    #[serde(flatten)]
    pub line: SaleLine,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: SaleId,
    pub invoice_number: String,
    pub client_id: ClientId,
    pub client_name: String,
    pub quotation_id: Option<QuotationId>,
    pub created_by: Option<UserId>,
    pub created_by_username: Option<String>,
    pub status: SaleStatus,
    pub payment_method: PaymentMethod,
    pub discount_percentage: Decimal,
    pub tax_rate: Decimal,
    #[serde(flatten)]
    pub totals: DocumentTotals,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items: Vec<SaleItem>,
}

/// Inventory exit owed by a completed sale line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StockExit {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub notes: String,
}

impl Sale {
    pub fn transition_to(&mut self, next: SaleStatus) -> Result<(), DomainError> {
        if self.status.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidSaleTransition { from: self.status, to: next })
    }

    /// Marks the sale completed and returns the stock exits it owes, one per line that
    /// consumed material.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<Vec<StockExit>, DomainError> {
        if self.status == SaleStatus::Completed {
            return Err(DomainError::BusinessRule(format!(
                "sale {} is already completed",
                self.invoice_number
            )));
        }
        self.transition_to(SaleStatus::Completed)?;
        self.completed_at = Some(now);

        Ok(self
            .items
            .iter()
            .filter(|item| item.line.quantity_used > Decimal::ZERO)
            .map(|item| StockExit {
                product_id: item.line.product_id,
                quantity: item.line.quantity_used,
                notes: format!("Venta - {}", item.line.description),
            })
            .collect())
    }

    pub fn cancel(&mut self) -> Result<(), DomainError> {
        if self.status == SaleStatus::Completed {
            return Err(DomainError::BusinessRule(format!(
                "sale {} is completed and cannot be cancelled",
                self.invoice_number
            )));
        }
        self.transition_to(SaleStatus::Cancelled)
    }

    /// Only pending sales may change; completed ones have already moved stock.
    pub fn ensure_editable(&self) -> Result<(), DomainError> {
        if self.status == SaleStatus::Pending {
            Ok(())
        } else {
            Err(DomainError::BusinessRule(format!(
                "sale {} is {} and can no longer be edited",
                self.invoice_number,
                self.status.as_str().to_ascii_lowercase()
            )))
        }
    }

    pub fn header(&self) -> SaleHeader {
        SaleHeader {
            client_id: self.client_id,
            quotation_id: self.quotation_id,
            payment_method: self.payment_method,
            discount_percentage: self.discount_percentage,
            tax_rate: self.tax_rate,
            notes: self.notes.clone(),
        }
    }

    pub fn totals_for<'a, I>(&self, lines: I) -> Result<DocumentTotals, DomainError>
    where
        I: IntoIterator<Item = &'a SaleLine>,
    {
        self.header().totals_for(lines)
    }

    pub fn lines(&self) -> impl Iterator<Item = &SaleLine> {
        self.items.iter().map(|item| &item.line)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleHeader {
    pub client_id: ClientId,
    pub quotation_id: Option<QuotationId>,
    pub payment_method: PaymentMethod,
    pub discount_percentage: Decimal,
    pub tax_rate: Decimal,
    pub notes: String,
}

impl SaleHeader {
    /// Sales always carry ISV.
    pub fn totals_for<'a, I>(&self, lines: I) -> Result<DocumentTotals, DomainError>
    where
        I: IntoIterator<Item = &'a SaleLine>,
    {
        compute_totals(
            lines.into_iter().map(|line| line.total),
            self.discount_percentage,
            Some(self.tax_rate),
        )
    }
}

/// Create or update body. Omitted header fields take their defaults on create and keep the
/// stored value on update.
#[derive(Clone, Debug, Deserialize)]
pub struct SaleInput {
    pub client_id: ClientId,
    /// `Some(None)` unlinks the originating quotation.
    #[serde(default, deserialize_with = "present")]
    pub quotation_id: Option<Option<QuotationId>>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub discount_percentage: Option<Decimal>,
    #[serde(default)]
    pub tax_rate: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
    /// On update, `None` keeps the current items and `Some` replaces all of them.
    #[serde(default)]
    pub items: Option<Vec<SaleItemInput>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleDraft {
    pub header: SaleHeader,
    pub lines: Vec<SaleLine>,
    pub totals: DocumentTotals,
}

impl SaleInput {
    pub fn header(&self, default_tax_rate: Decimal) -> Result<SaleHeader, DomainError> {
        self.header_over(SaleHeader {
            client_id: self.client_id,
            quotation_id: None,
            payment_method: PaymentMethod::default(),
            discount_percentage: Decimal::ZERO,
            tax_rate: default_tax_rate,
            notes: String::new(),
        })
    }

    /// `base` with every field present in this input replaced.
    fn header_over(&self, base: SaleHeader) -> Result<SaleHeader, DomainError> {
        let header = SaleHeader {
            client_id: self.client_id,
            quotation_id: self.quotation_id.unwrap_or(base.quotation_id),
            payment_method: self.payment_method.unwrap_or(base.payment_method),
            discount_percentage: self.discount_percentage.unwrap_or(base.discount_percentage),
            tax_rate: self.tax_rate.unwrap_or(base.tax_rate),
            notes: self.notes.as_deref().map_or(base.notes, |notes| notes.trim().to_string()),
        };

        let mut errors = FieldErrors::new();
        validate_percentage(&mut errors, "discount_percentage", header.discount_percentage);
        validate_percentage(&mut errors, "tax_rate", header.tax_rate);
        errors.into_result()?;
        Ok(header)
    }

    pub fn into_draft(self, default_tax_rate: Decimal) -> Result<SaleDraft, DomainError> {
        let header = self.header(default_tax_rate)?;
        let lines = price_sale_items(self.items.as_deref().unwrap_or_default())?;
        let totals = header.totals_for(&lines)?;
        Ok(SaleDraft { header, lines, totals })
    }

    /// Draft replacing `current`; keeps its lines when no items were sent.
    pub fn into_replacement(self, current: &Sale) -> Result<SaleDraft, DomainError> {
        current.ensure_editable()?;
        let header = self.header_over(current.header())?;
        let lines = match self.items.as_deref() {
            Some(items) => price_sale_items(items)?,
            None => current.lines().cloned().collect(),
        };
        let totals = header.totals_for(&lines)?;
        Ok(SaleDraft { header, lines, totals })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SaleFromQuotation {
    pub quotation_id: QuotationId,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    /// Falls back to the quotation's notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl SaleFromQuotation {
    /// Sale draft copying the quotation's client, discount and items. Tax uses the sale
    /// default rate because the quotation may not have charged any.
    pub fn draft_from(&self, quotation: &Quotation, default_tax_rate: Decimal) -> Result<SaleDraft, DomainError> {
        quotation.ensure_convertible()?;

        let items: Vec<SaleItemInput> = quotation.lines().map(SaleItemInput::from).collect();
        let input = SaleInput {
            client_id: quotation.client_id,
            quotation_id: Some(Some(quotation.id)),
            payment_method: Some(self.payment_method),
            discount_percentage: Some(quotation.discount_percentage),
            tax_rate: None,
            notes: Some(self.notes.clone().unwrap_or_else(|| quotation.notes.clone())),
            items: Some(items),
        };
        input.into_draft(default_tax_rate)
    }
}
