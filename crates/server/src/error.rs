use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rotu_core::errors::{ApplicationError, DomainError, FieldErrors, InterfaceError};
use rotu_db::repositories::RepositoryError;
use serde::Serialize;
use uuid::Uuid;

use crate::pdf::PdfError;

/// Handler failure rendered as `{"detail", "errors", "correlation_id"}`.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
    #[serde(skip_serializing_if = "FieldErrors::is_empty")]
    errors: FieldErrors,
    correlation_id: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            errors: FieldErrors::new(),
            correlation_id: correlation_id(),
        })
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self(InterfaceError::Unauthorized { message: message.into(), correlation_id: correlation_id() })
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn interface(&self) -> &InterfaceError {
        &self.0
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        let correlation_id = correlation_id();
        if matches!(error, ApplicationError::Persistence(_) | ApplicationError::Configuration(_)) {
            tracing::error!(
                event_name = "http.request.failed",
                correlation_id = %correlation_id,
                error = %error,
                "request failed with an internal error"
            );
        }
        Self(error.into_interface(correlation_id))
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::from(error).into()
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        ApplicationError::from(error).into()
    }
}

impl From<PdfError> for ApiError {
    fn from(error: PdfError) -> Self {
        ApplicationError::Configuration(error.to_string()).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let errors = match &self.0 {
            InterfaceError::BadRequest { errors, .. } => errors.clone(),
            _ => FieldErrors::new(),
        };
        let body = ErrorBody {
            detail: self.0.user_message(),
            errors,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use rotu_core::domain::quotation::QuotationStatus;
    use rotu_core::errors::{ApplicationError, DomainError, FieldErrors};

    use super::ApiError;

    #[test]
    fn validation_errors_keep_their_field_map() {
        let error = ApiError::from(DomainError::Validation(FieldErrors::single(
            "quantity",
            "ensure this value is greater than or equal to 1",
        )));
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn business_rules_are_bad_requests_not_server_errors() {
        let error = ApiError::from(DomainError::InvalidQuotationTransition {
            from: QuotationStatus::Converted,
            to: QuotationStatus::Approved,
        });
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error.interface().user_message(),
            "quotation cannot move from CONVERTED to APPROVED"
        );
    }

    #[test]
    fn persistence_failures_hide_their_detail() {
        let error = ApiError::from(ApplicationError::Persistence("disk I/O error".to_string()));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.interface().user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn permission_denied_is_forbidden() {
        let error = ApiError::from(ApplicationError::PermissionDenied("no".to_string()));
        assert_eq!(error.status(), StatusCode::FORBIDDEN);
    }
}
