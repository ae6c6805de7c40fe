//! HTTP surface of the Rotu printing-shop backend.

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod health;
pub mod pdf;
pub mod printing;
pub mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full router: the JSON API under `/api` plus the unauthenticated health check.
pub fn app(state: AppState) -> Router {
    let health = health::router(state.pool.clone());
    Router::new()
        .nest("/api", api::router())
        .with_state(state)
        .merge(health)
        .layer(TraceLayer::new_for_http())
}
