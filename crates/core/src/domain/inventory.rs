use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::domain::{bounded_amount, limit_text, require_text};
use crate::errors::{DomainError, FieldErrors};
use crate::stock::{classify, is_low_stock, MovementKind, StockStatus};

entity_id!(CategoryId);
entity_id!(ProductId);
entity_id!(StockMovementId);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: String,
    pub product_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl CategoryInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "name", &self.name, 100);
        errors.into_result()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitMeasure {
    Roll,
    Sheet,
    #[default]
    Unit,
    Meter,
    Sqm,
    Sqin,
}

impl UnitMeasure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Roll => "ROLL",
            Self::Sheet => "SHEET",
            Self::Unit => "UNIT",
            Self::Meter => "METER",
            Self::Sqm => "SQM",
            Self::Sqin => "SQIN",
        }
    }
}

impl FromStr for UnitMeasure {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ROLL" => Ok(Self::Roll),
            "SHEET" => Ok(Self::Sheet),
            "UNIT" => Ok(Self::Unit),
            "METER" => Ok(Self::Meter),
            "SQM" => Ok(Self::Sqm),
            "SQIN" => Ok(Self::Sqin),
            other => Err(DomainError::field(
                "unit_measure",
                format!("`{other}` is not a valid unit of measure"),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub category_id: CategoryId,
    pub category_name: String,
    pub description: String,
    pub unit_measure: UnitMeasure,
    pub quantity_available: Decimal,
    pub unit_cost: Decimal,
    pub unit_price: Decimal,
    pub price_per_square_inch: Decimal,
    pub supplier: String,
    pub minimum_stock: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn stock_status(&self) -> StockStatus {
        classify(self.quantity_available, self.minimum_stock)
    }

    pub fn is_low_stock(&self) -> bool {
        is_low_stock(self.quantity_available, self.minimum_stock)
    }

    /// Value of the on-hand stock at cost.
    pub fn stock_value(&self) -> Decimal {
        self.quantity_available * self.unit_cost
    }
}

/// Product plus its derived stock classification, as returned to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub stock_status: StockStatus,
    pub is_low_stock: bool,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        let stock_status = product.stock_status();
        let is_low_stock = product.is_low_stock();
        Self { product, stock_status, is_low_stock }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub category_id: CategoryId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit_measure: UnitMeasure,
    /// Opening stock; later changes go through stock movements.
    #[serde(default)]
    pub quantity_available: Decimal,
    #[serde(default)]
    pub unit_cost: Decimal,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub price_per_square_inch: Decimal,
    #[serde(default)]
    pub supplier: String,
    #[serde(default)]
    pub minimum_stock: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ProductInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "name", &self.name, 200);
        if let Some(sku) = &self.sku {
            limit_text(&mut errors, "sku", sku, 50);
        }
        limit_text(&mut errors, "supplier", &self.supplier, 200);
        bounded_amount(&mut errors, "quantity_available", self.quantity_available);
        bounded_amount(&mut errors, "unit_cost", self.unit_cost);
        bounded_amount(&mut errors, "unit_price", self.unit_price);
        bounded_amount(&mut errors, "price_per_square_inch", self.price_per_square_inch);
        bounded_amount(&mut errors, "minimum_stock", self.minimum_stock);
        errors.into_result()
    }

    /// Caller-supplied SKU, or `None` when one must be generated.
    pub fn requested_sku(&self) -> Option<String> {
        self.sku.as_deref().map(str::trim).filter(|sku| !sku.is_empty()).map(str::to_string)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: StockMovementId,
    pub product_id: ProductId,
    pub product_name: String,
    pub movement_type: MovementKind,
    pub quantity: Decimal,
    pub reference: String,
    pub notes: String,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StockMovementInput {
    pub product_id: ProductId,
    pub movement_type: MovementKind,
    pub quantity: Decimal,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub notes: String,
}

impl StockMovementInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = FieldErrors::new();
        // Only an adjustment may set stock to zero.
        if self.movement_type != MovementKind::Adjustment && self.quantity.is_zero() {
            errors.push("quantity", "ensure this value is greater than 0");
        }
        bounded_amount(&mut errors, "quantity", self.quantity);
        limit_text(&mut errors, "reference", &self.reference, 100);
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{CategoryId, Product, ProductId, ProductInput, ProductView, UnitMeasure};
    use crate::domain::inventory::StockMovementInput;
    use crate::stock::{MovementKind, StockStatus};

    fn product(quantity: i64, minimum: i64) -> Product {
        Product {
            id: ProductId(1),
            name: "Vinil blanco".to_string(),
            sku: "PRD-0A1B2C3D".to_string(),
            category_id: CategoryId(1),
            category_name: "Viniles".to_string(),
            description: String::new(),
            unit_measure: UnitMeasure::Roll,
            quantity_available: Decimal::from(quantity),
            unit_cost: Decimal::new(25050, 2),
            unit_price: Decimal::new(40000, 2),
            price_per_square_inch: Decimal::new(5, 2),
            supplier: String::new(),
            minimum_stock: Decimal::from(minimum),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn view_carries_derived_stock_fields() {
        let view = ProductView::from(product(3, 5));
        assert_eq!(view.stock_status, StockStatus::LowStock);
        assert!(view.is_low_stock);

        let json = serde_json::to_value(&view).expect("serialize view");
        assert_eq!(json["stock_status"], "LOW_STOCK");
        assert_eq!(json["unit_measure"], "ROLL");
        assert_eq!(json["quantity_available"], "3");
    }

    #[test]
    fn stock_value_uses_unit_cost() {
        assert_eq!(product(4, 0).stock_value(), Decimal::new(100200, 2));
    }

    #[test]
    fn blank_sku_requests_generation() {
        let input: ProductInput = serde_json::from_value(serde_json::json!({
            "name": "Lona",
            "sku": "  ",
            "category_id": 2,
            "unit_price": "12.50"
        }))
        .expect("deserialize product input");

        assert_eq!(input.requested_sku(), None);
        assert_eq!(input.unit_measure, UnitMeasure::Unit);
        input.validate().expect("valid product");
    }

    #[test]
    fn negative_prices_are_rejected() {
        let input: ProductInput = serde_json::from_value(serde_json::json!({
            "name": "Lona",
            "category_id": 2,
            "unit_cost": "-1"
        }))
        .expect("deserialize product input");

        let message = input.validate().expect_err("negative cost").to_string();
        assert!(message.contains("unit_cost"));
    }

    #[test]
    fn entry_movements_need_a_positive_quantity_but_adjustments_may_be_zero() {
        let mut movement = StockMovementInput {
            product_id: ProductId(1),
            movement_type: MovementKind::Entry,
            quantity: Decimal::ZERO,
            reference: String::new(),
            notes: String::new(),
        };
        assert!(movement.validate().is_err());

        movement.movement_type = MovementKind::Adjustment;
        movement.validate().expect("zero adjustment empties the shelf");
    }
}
