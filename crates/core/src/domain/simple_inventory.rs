use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::domain::{limit_text, require_text};
use crate::errors::{DomainError, FieldErrors};
use crate::stock::SimpleMovementKind;

entity_id!(SimpleProductId);
entity_id!(SimpleMovementId);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleProduct {
    pub id: SimpleProductId,
    pub name: String,
    pub sku: String,
    pub description: String,
    pub quantity: i64,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SimpleProductInput {
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: i64,
}

impl SimpleProductInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "name", &self.name, 200);
        if let Some(sku) = &self.sku {
            limit_text(&mut errors, "sku", sku, 50);
        }
        if self.quantity < 0 {
            errors.push("quantity", "ensure this value is greater than or equal to 0");
        }
        errors.into_result()
    }

    pub fn requested_sku(&self) -> Option<String> {
        self.sku.as_deref().map(str::trim).filter(|sku| !sku.is_empty()).map(str::to_string)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleMovement {
    pub id: SimpleMovementId,
    pub product_id: SimpleProductId,
    pub product_name: String,
    pub movement_type: SimpleMovementKind,
    pub quantity: i64,
    pub notes: String,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SimpleMovementInput {
    pub product_id: SimpleProductId,
    pub movement_type: SimpleMovementKind,
    pub quantity: i64,
    #[serde(default)]
    pub notes: String,
}

impl SimpleMovementInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quantity <= 0 {
            return Err(DomainError::field("quantity", "ensure this value is greater than 0"));
        }
        Ok(())
    }
}

/// Signed manual correction: positive adds stock, negative withdraws it.
#[derive(Clone, Debug, Deserialize)]
pub struct StockAdjustment {
    pub quantity: i64,
    #[serde(default)]
    pub notes: String,
}

#[cfg(test)]
mod tests {
    use super::{SimpleMovementInput, SimpleProductId, SimpleProductInput};
    use crate::stock::SimpleMovementKind;

    #[test]
    fn movement_quantity_must_be_positive() {
        let movement = SimpleMovementInput {
            product_id: SimpleProductId(1),
            movement_type: SimpleMovementKind::Exit,
            quantity: 0,
            notes: String::new(),
        };
        assert!(movement.validate().is_err());
    }

    #[test]
    fn opening_quantity_cannot_be_negative() {
        let input = SimpleProductInput {
            name: "Tinta cyan".to_string(),
            sku: None,
            description: String::new(),
            quantity: -2,
        };
        let message = input.validate().expect_err("negative stock").to_string();
        assert!(message.contains("quantity"));
    }
}
