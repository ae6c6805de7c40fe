use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{limit_text, optional_email, require_text};
use crate::errors::{DomainError, FieldErrors};

entity_id!(ClientId);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub company: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub rtn: String,
    pub notes: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn display_name(&self) -> String {
        if self.company.trim().is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.name, self.company)
        }
    }
}

/// Derived figures shown alongside a client; never stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStats {
    pub total_sales: Decimal,
    pub total_quotations: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ClientInput {
    pub name: String,
    #[serde(default)]
    pub company: String,
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub rtn: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ClientInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "name", &self.name, 200);
        limit_text(&mut errors, "company", &self.company, 200);
        require_text(&mut errors, "phone", &self.phone, 20);
        optional_email(&mut errors, "email", &self.email);
        limit_text(&mut errors, "rtn", &self.rtn, 20);
        errors.into_result()
    }
}
