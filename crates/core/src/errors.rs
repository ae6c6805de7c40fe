use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::domain::quotation::QuotationStatus;
use crate::domain::sale::SaleStatus;

/// Validation messages keyed by the offending field name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Folds nested errors (for example a line item) under `prefix.field`.
    pub fn merge_prefixed(&mut self, prefix: &str, other: FieldErrors) {
        for (field, messages) in other.0 {
            let key = format!("{prefix}.{field}");
            self.0.entry(key).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn into_result(self) -> Result<(), DomainError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("quotation cannot move from {} to {}", .from.as_str(), .to.as_str())]
    InvalidQuotationTransition { from: QuotationStatus, to: QuotationStatus },
    #[error("sale cannot move from {} to {}", .from.as_str(), .to.as_str())]
    InvalidSaleTransition { from: SaleStatus, to: SaleStatus },
    #[error("{0}")]
    BusinessRule(String),
}

impl DomainError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("{entity} {id} was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, errors: FieldErrors, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Text that is safe to show to the caller. Client-side failures echo their own message;
    /// server-side failures never leak internals.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. } => message.clone(),
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly.".to_owned()
            }
            Self::Internal { .. } => "An unexpected internal error occurred.".to_owned(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::Validation(errors)) => Self::BadRequest {
                message: "validation failed".to_owned(),
                errors,
                correlation_id,
            },
            ApplicationError::Domain(other) => {
                Self::BadRequest { message: other.to_string(), errors: FieldErrors::new(), correlation_id }
            }
            ApplicationError::Conflict(message) => {
                Self::BadRequest { message, errors: FieldErrors::new(), correlation_id }
            }
            ApplicationError::PermissionDenied(message) => Self::Forbidden { message, correlation_id },
            error @ ApplicationError::NotFound { .. } => {
                Self::NotFound { message: error.to_string(), correlation_id }
            }
            ApplicationError::Persistence(message) => Self::Internal { message, correlation_id },
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::quotation::QuotationStatus;
    use crate::errors::{ApplicationError, DomainError, FieldErrors, InterfaceError};

    #[test]
    fn validation_error_maps_to_bad_request_with_field_map() {
        let mut errors = FieldErrors::new();
        errors.push("quantity", "must be at least 1");
        errors.push("quantity", "must be a whole number");
        errors.push("client", "is required");

        let interface = ApplicationError::from(DomainError::Validation(errors))
            .into_interface("req-1");

        match interface {
            InterfaceError::BadRequest { errors, correlation_id, .. } => {
                assert_eq!(correlation_id, "req-1");
                assert!(errors.contains("quantity"));
                assert!(errors.contains("client"));
                assert_eq!(errors.to_string(), "client: is required; quantity: must be at least 1, must be a whole number");
            }
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn status_conflict_is_a_readable_bad_request() {
        let interface = ApplicationError::from(DomainError::InvalidQuotationTransition {
            from: QuotationStatus::Converted,
            to: QuotationStatus::Approved,
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert_eq!(interface.user_message(), "quotation cannot move from CONVERTED to APPROVED");
    }

    #[test]
    fn nested_errors_are_prefixed() {
        let mut parent = FieldErrors::new();
        parent.merge_prefixed("items[0]", FieldErrors::single("quantity", "must be at least 1"));

        assert!(parent.contains("items[0].quantity"));
    }

    #[test]
    fn permission_and_not_found_map_to_their_own_variants() {
        let forbidden =
            ApplicationError::PermissionDenied("admins only".to_owned()).into_interface("req-3");
        assert!(matches!(forbidden, InterfaceError::Forbidden { .. }));

        let missing = ApplicationError::not_found("sale", 42).into_interface("req-4");
        assert_eq!(missing.user_message(), "sale 42 was not found");
    }

    #[test]
    fn persistence_error_maps_to_internal_without_leaking() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
        assert_eq!(interface.correlation_id(), "req-5");
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("template dir missing".to_owned()).into_interface("req-6");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
