//! Stock ledger: how a movement changes on-hand quantity.
//!
//! Movements are applied once, when they are recorded, and are never edited afterwards.
//! Mistakes are corrected with a compensating movement.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Entry,
    Exit,
    /// Sets the on-hand quantity to the movement quantity.
    Adjustment,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
            Self::Adjustment => "ADJUSTMENT",
        }
    }
}

impl FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ENTRY" => Ok(Self::Entry),
            "EXIT" => Ok(Self::Exit),
            "ADJUSTMENT" => Ok(Self::Adjustment),
            other => Err(DomainError::field(
                "movement_type",
                format!("`{other}` is not a valid movement type"),
            )),
        }
    }
}

/// New on-hand quantity for the detailed inventory. Not clamped: exits may drive stock negative.
pub fn apply_movement(current: Decimal, kind: MovementKind, quantity: Decimal) -> Decimal {
    match kind {
        MovementKind::Entry => current + quantity,
        MovementKind::Exit => current - quantity,
        MovementKind::Adjustment => quantity,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimpleMovementKind {
    Entry,
    Exit,
}

impl SimpleMovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
        }
    }
}

impl FromStr for SimpleMovementKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ENTRY" => Ok(Self::Entry),
            "EXIT" => Ok(Self::Exit),
            other => Err(DomainError::field(
                "movement_type",
                format!("`{other}` is not a valid movement type"),
            )),
        }
    }
}

/// New on-hand quantity for the manual inventory; exits stop at zero.
pub fn apply_simple_movement(current: i64, kind: SimpleMovementKind, quantity: i64) -> i64 {
    match kind {
        SimpleMovementKind::Entry => current.saturating_add(quantity),
        SimpleMovementKind::Exit => current.saturating_sub(quantity).max(0),
    }
}

/// Turns a signed manual adjustment into the movement that records it.
pub fn plan_adjustment(current: i64, delta: i64) -> Result<(SimpleMovementKind, i64), DomainError> {
    if delta == 0 {
        return Err(DomainError::field("quantity", "adjustment quantity must not be zero"));
    }

    if delta > 0 {
        return Ok((SimpleMovementKind::Entry, delta));
    }

    let withdrawn = delta.unsigned_abs();
    if withdrawn > current.max(0).unsigned_abs() {
        return Err(DomainError::BusinessRule(format!(
            "cannot withdraw {withdrawn} units, only {current} in stock"
        )));
    }
    Ok((SimpleMovementKind::Exit, delta.saturating_neg()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    Available,
}

impl StockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OutOfStock => "OUT_OF_STOCK",
            Self::LowStock => "LOW_STOCK",
            Self::Available => "AVAILABLE",
        }
    }
}

pub fn classify(quantity: Decimal, minimum: Decimal) -> StockStatus {
    if quantity.is_zero() {
        StockStatus::OutOfStock
    } else if quantity <= minimum {
        StockStatus::LowStock
    } else {
        StockStatus::Available
    }
}

pub fn is_low_stock(quantity: Decimal, minimum: Decimal) -> bool {
    quantity <= minimum
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        apply_movement, apply_simple_movement, classify, plan_adjustment, MovementKind,
        SimpleMovementKind, StockStatus,
    };
    use crate::errors::DomainError;

    #[test]
    fn entry_then_exit_of_same_quantity_restores_stock() {
        let start = Decimal::new(1250, 2);
        let quantity = Decimal::new(375, 2);

        let after_entry = apply_movement(start, MovementKind::Entry, quantity);
        let after_exit = apply_movement(after_entry, MovementKind::Exit, quantity);

        assert_eq!(after_entry, Decimal::new(1625, 2));
        assert_eq!(after_exit, start);
    }

    #[test]
    fn exit_is_not_clamped_for_detailed_inventory() {
        let result = apply_movement(Decimal::from(2), MovementKind::Exit, Decimal::from(5));
        assert_eq!(result, Decimal::from(-3));
    }

    #[test]
    fn adjustment_sets_absolute_value() {
        let result = apply_movement(Decimal::from(40), MovementKind::Adjustment, Decimal::from(7));
        assert_eq!(result, Decimal::from(7));
    }

    #[test]
    fn simple_exit_clamps_at_zero() {
        assert_eq!(apply_simple_movement(3, SimpleMovementKind::Exit, 10), 0);
        assert_eq!(apply_simple_movement(3, SimpleMovementKind::Entry, 10), 13);
    }

    #[test]
    fn adjustment_plan_rejects_zero_and_overdraw() {
        assert!(matches!(plan_adjustment(5, 0), Err(DomainError::Validation(_))));
        assert!(matches!(plan_adjustment(5, -6), Err(DomainError::BusinessRule(_))));
        assert_eq!(plan_adjustment(5, -5).expect("exact withdrawal"), (SimpleMovementKind::Exit, 5));
        assert_eq!(plan_adjustment(5, 4).expect("entry"), (SimpleMovementKind::Entry, 4));
    }

    #[test]
    fn stock_status_classification() {
        let minimum = Decimal::from(10);
        assert_eq!(classify(Decimal::ZERO, minimum), StockStatus::OutOfStock);
        assert_eq!(classify(Decimal::from(10), minimum), StockStatus::LowStock);
        assert_eq!(classify(Decimal::from(-1), minimum), StockStatus::LowStock);
        assert_eq!(classify(Decimal::new(1001, 2), minimum), StockStatus::Available);
    }

    #[test]
    fn movement_kind_parses_wire_names() {
        assert_eq!("exit".parse::<MovementKind>().expect("exit"), MovementKind::Exit);
        assert!("transfer".parse::<MovementKind>().is_err());
    }
}
