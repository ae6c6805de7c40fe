use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use rotu_core::domain::client::{Client, ClientId, ClientInput, ClientStats};
use rotu_core::errors::ApplicationError;
use rotu_core::Capability;
use rotu_db::repositories::{ClientFilter, ClientRepository};
use serde::{Deserialize, Serialize};

use super::{non_blank, ApiJson, ApiQuery};
use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(retrieve).put(update).delete(destroy))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientQuery {
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClientDetail {
    #[serde(flatten)]
    pub client: Client,
    #[serde(flatten)]
    pub stats: ClientStats,
}

async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<ClientQuery>,
) -> ApiResult<Json<Vec<Client>>> {
    auth.require(Capability::OperateSales)?;
    let filter = ClientFilter { is_active: query.is_active, search: non_blank(query.search) };
    Ok(Json(state.clients().list(&filter).await?))
}

async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(input): ApiJson<ClientInput>,
) -> ApiResult<(StatusCode, Json<Client>)> {
    auth.require(Capability::OperateSales)?;
    input.validate()?;
    let client = state.clients().create(&input).await?;
    tracing::info!(event_name = "client.created", client_id = %client.id, "client created");
    Ok((StatusCode::CREATED, Json(client)))
}

async fn retrieve(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ClientDetail>> {
    auth.require(Capability::OperateSales)?;
    let clients = state.clients();
    let client = clients
        .find_by_id(ClientId(id))
        .await?
        .ok_or_else(|| ApplicationError::not_found("client", id))?;
    let stats = clients.stats(client.id).await?;
    Ok(Json(ClientDetail { client, stats }))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(input): ApiJson<ClientInput>,
) -> ApiResult<Json<Client>> {
    auth.require(Capability::OperateSales)?;
    input.validate()?;
    Ok(Json(state.clients().update(ClientId(id), &input).await?))
}

async fn destroy(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    auth.require(Capability::OperateSales)?;
    state.clients().delete(ClientId(id)).await?;
    tracing::info!(event_name = "client.deleted", client_id = id, deleted_by = %auth.id(), "client deleted");
    Ok(StatusCode::NO_CONTENT)
}
