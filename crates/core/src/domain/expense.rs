use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::documents::line_item::MAX_AMOUNT;
use crate::domain::user::UserId;
use crate::errors::{DomainError, FieldErrors};

entity_id!(ExpenseId);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub description: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub created_by: Option<UserId>,
    pub created_by_username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ExpenseInput {
    pub description: String,
    pub date: NaiveDate,
    pub amount: Decimal,
}

impl ExpenseInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = FieldErrors::new();
        if self.description.trim().is_empty() {
            errors.push("description", "this field may not be blank");
        }
        if self.amount <= Decimal::ZERO {
            errors.push("amount", "ensure this value is greater than 0");
        }
        if self.amount > MAX_AMOUNT {
            errors.push("amount", format!("ensure this value is less than or equal to {MAX_AMOUNT}"));
        }
        if self.amount.scale() > 2 {
            errors.push("amount", "ensure that there are no more than 2 decimal places");
        }
        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::ExpenseInput;

    fn input(amount: Decimal) -> ExpenseInput {
        ExpenseInput {
            description: "Tinta".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 3).expect("valid date"),
            amount,
        }
    }

    #[test]
    fn amount_must_be_positive_cents() {
        input(Decimal::new(125050, 2)).validate().expect("valid expense");
        assert!(input(Decimal::ZERO).validate().is_err());
        assert!(input(Decimal::new(1001, 3)).validate().is_err());
    }
}
