use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{limit_text, optional_email, require_text};
use crate::errors::{DomainError, FieldErrors};

entity_id!(UserId);

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    /// Shop-floor operations staff.
    Seller,
    /// Front-desk vendors and designers.
    Designer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Seller => "SELLER",
            Self::Designer => "DESIGNER",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Admin => "Administrator",
            Self::Seller => "Operations",
            Self::Designer => "Vendor",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Seller
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "SELLER" => Ok(Self::Seller),
            "DESIGNER" => Ok(Self::Designer),
            other => Err(DomainError::field("role", format!("`{other}` is not a valid role"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub role: Role,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = FieldErrors::new();
        validate_username(&mut errors, &self.username);
        require_text(&mut errors, "email", &self.email, 254);
        optional_email(&mut errors, "email", &self.email);
        validate_password(&mut errors, "password", &self.password);
        limit_text(&mut errors, "first_name", &self.first_name, 150);
        limit_text(&mut errors, "last_name", &self.last_name, 150);
        limit_text(&mut errors, "phone", &self.phone, 20);
        errors.into_result()
    }
}

/// Admin-side edit of another account. Absent fields keep their value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl UserUpdate {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = FieldErrors::new();
        if let Some(email) = &self.email {
            require_text(&mut errors, "email", email, 254);
            optional_email(&mut errors, "email", email);
        }
        if let Some(phone) = &self.phone {
            limit_text(&mut errors, "phone", phone, 20);
        }
        errors.into_result()
    }

    pub fn apply(self, user: &mut User) {
        if let Some(email) = self.email {
            user.email = email.trim().to_string();
        }
        if let Some(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = last_name;
        }
        if let Some(phone) = self.phone {
            user.phone = phone;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
    }
}

/// Self-service profile edit; role and activation stay untouched.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

impl From<ProfileUpdate> for UserUpdate {
    fn from(value: ProfileUpdate) -> Self {
        Self {
            email: value.email,
            first_name: value.first_name,
            last_name: value.last_name,
            phone: value.phone,
            role: None,
            is_active: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

impl PasswordChange {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = FieldErrors::new();
        if self.old_password.is_empty() {
            errors.push("old_password", "this field may not be blank");
        }
        validate_password(&mut errors, "new_password", &self.new_password);
        errors.into_result()
    }
}

fn validate_username(errors: &mut FieldErrors, value: &str) {
    require_text(errors, "username", value, 150);
    let allowed = value.chars().all(|ch| ch.is_alphanumeric() || matches!(ch, '@' | '.' | '+' | '-' | '_'));
    if !value.trim().is_empty() && !allowed {
        errors.push("username", "may only contain letters, digits and @/./+/-/_ characters");
    }
}

fn validate_password(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.chars().count() < MIN_PASSWORD_LEN {
        errors.push(field, format!("must contain at least {MIN_PASSWORD_LEN} characters"));
    }
    if !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit()) {
        errors.push(field, "must not be entirely numeric");
    }
}

#[cfg(test)]
mod tests {
    use super::{NewUser, PasswordChange, Role};

    fn new_user(username: &str, password: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: "ana@rotu.hn".to_string(),
            password: password.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            phone: String::new(),
            role: Role::default(),
        }
    }

    #[test]
    fn roles_parse_case_insensitively_and_default_to_seller() {
        assert_eq!("admin".parse::<Role>().expect("admin"), Role::Admin);
        assert_eq!(" Designer ".parse::<Role>().expect("designer"), Role::Designer);
        assert!("owner".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::Seller);
    }

    #[test]
    fn registration_collects_every_field_error() {
        let mut user = new_user("ana lopez", "1234");
        user.email = "not-an-email".to_string();

        let error = user.validate().expect_err("invalid registration");
        let message = error.to_string();
        assert!(message.contains("username"));
        assert!(message.contains("email"));
        assert!(message.contains("password"));
    }

    #[test]
    fn valid_registration_passes() {
        new_user("ana.lopez", "imprenta2024").validate().expect("valid user");
    }

    #[test]
    fn numeric_new_password_is_rejected() {
        let change = PasswordChange {
            old_password: "old-secret".to_string(),
            new_password: "12345678".to_string(),
        };
        assert!(change.validate().is_err());
    }
}
