use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use rotu_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub checked_at: String,
}

/// Unauthenticated liveness route, merged next to `/api`.
pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: format!("rotu-server {}", env!("CARGO_PKG_VERSION")),
        },
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    if let Err(error) = rotu_db::ping(pool).await {
        tracing::warn!(event_name = "system.health.degraded", error = %error, "database ping failed");
        return HealthCheck { status: "degraded", detail: format!("database query failed: {error}") };
    }

    // A reachable database with pending migrations cannot serve the API tables yet.
    match rotu_db::migrations::status(pool).await {
        Ok(migrations) if migrations.pending() == 0 => HealthCheck {
            status: "ready",
            detail: format!("schema current ({} migrations applied)", migrations.applied),
        },
        Ok(migrations) => {
            tracing::warn!(
                event_name = "system.health.degraded",
                pending = migrations.pending(),
                "database schema is behind"
            );
            HealthCheck {
                status: "degraded",
                detail: format!("{} of {} migrations pending", migrations.pending(), migrations.available),
            }
        }
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("migration status unavailable: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use rotu_db::{connect_with_settings, migrations};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn migrated_database_reports_current_schema() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations should apply");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert!(payload.database.detail.starts_with("schema current"));
        assert!(payload.service.detail.starts_with("rotu-server"));

        pool.close().await;
    }

    #[tokio::test]
    async fn unmigrated_database_is_degraded_with_pending_count() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert!(payload.database.detail.contains("migrations pending"));
        assert_eq!(payload.service.status, "ready");

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_reports_the_failed_query() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.database.status, "degraded");
        assert!(payload.database.detail.starts_with("database query failed"));
    }
}
