//! JSON API mounted under `/api`.

use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json, Router,
};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

pub mod clients;
pub mod expenses;
pub mod inventory;
pub mod quotations;
pub mod reports;
pub mod sales;
pub mod simple_inventory;
pub mod users;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/users", users::router())
        .nest("/clients", clients::router())
        .nest("/inventory", inventory::router())
        .nest("/simple-inventory", simple_inventory::router())
        .nest("/quotations", quotations::router())
        .nest("/sales", sales::router())
        .nest("/expenses", expenses::router())
        .nest("/reports", reports::router())
}

/// `axum::Json` whose rejections use the API error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
    }
}

/// `axum::extract::Query` whose rejections use the API error body.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
    }
}

/// Body of every `delete_bulk` action.
#[derive(Debug, Deserialize)]
pub struct BulkIds {
    #[serde(default)]
    pub ids: Vec<i64>,
}

impl BulkIds {
    pub fn require_ids(self) -> Result<Vec<i64>, ApiError> {
        if self.ids.is_empty() {
            return Err(ApiError::bad_request("a non-empty list of ids is required"));
        }
        Ok(self.ids)
    }
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: u64,
}

/// Empty query values (`?search=`) count as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

/// UTC instant at which the given local calendar day starts.
pub fn local_midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Local.from_local_datetime(&midnight).earliest().map(|start| start.with_timezone(&Utc))
}

/// Start of today in local time.
pub fn local_today_start(now: DateTime<Utc>) -> DateTime<Utc> {
    local_midnight(now.with_timezone(&Local).date_naive()).unwrap_or(now)
}

/// Day and time as printed on documents, in local time.
pub fn local_display(at: DateTime<Utc>, pattern: &str) -> String {
    at.with_timezone(&Local).format(pattern).to_string()
}

#[cfg(test)]
mod tests {
    use super::{non_blank, BulkIds};

    #[test]
    fn blank_filters_are_dropped() {
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(Some(" vinil ".to_string())).as_deref(), Some("vinil"));
    }

    #[test]
    fn bulk_delete_needs_ids() {
        assert!(BulkIds { ids: Vec::new() }.require_ids().is_err());
        assert_eq!(BulkIds { ids: vec![3, 4] }.require_ids().expect("ids"), vec![3, 4]);
    }
}
