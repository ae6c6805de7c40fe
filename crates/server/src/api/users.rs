use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use rotu_core::credentials::{hash_password, verify_password};
use rotu_core::domain::user::{
    NewUser, PasswordChange, ProfileUpdate, Role, User, UserId, UserUpdate,
};
use rotu_core::errors::{ApplicationError, DomainError};
use rotu_core::Capability;
use rotu_db::repositories::{UserFilter, UserRepository};
use serde::{Deserialize, Serialize};

use super::{non_blank, ApiJson, ApiQuery};
use crate::auth::{AuthUser, JwtManager, TokenKind};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/register", post(create))
        .route("/", get(list).post(create))
        .route("/me", get(me))
        .route("/update_profile", put(update_profile))
        .route("/change_password", post(change_password))
        .route("/{id}", get(retrieve).put(update).delete(destroy))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

/// Argon2 is deliberately slow; keep it off the async workers.
async fn hash_blocking(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|error| ApplicationError::Configuration(error.to_string()))?
        .map_err(|error| ApplicationError::Configuration(error.to_string()).into())
}

async fn verify_blocking(password: String, hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|error| ApplicationError::Configuration(error.to_string()))?
        .map_err(|error| ApplicationError::Persistence(error.to_string()).into())
}

async fn login(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let invalid = || ApiError::unauthorized("no active account found with the given credentials");

    let credentials =
        state.users().find_credentials(request.username.trim()).await?.ok_or_else(invalid)?;
    if !credentials.user.is_active
        || !verify_blocking(request.password, credentials.password_hash).await?
    {
        tracing::info!(event_name = "auth.login.rejected", username = %request.username.trim(), "login rejected");
        return Err(invalid());
    }

    let user = credentials.user;
    let access = state.jwt.issue(&user, TokenKind::Access)?;
    let refresh = state.jwt.issue(&user, TokenKind::Refresh)?;
    tracing::info!(event_name = "auth.login.succeeded", user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse { access, refresh, user }))
}

async fn refresh(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let claims = state.jwt.validate(&request.refresh, TokenKind::Refresh)?;
    let user = state
        .users()
        .find_by_id(JwtManager::user_id(&claims)?)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| ApiError::unauthorized("user not found or inactive"))?;
    Ok(Json(RefreshResponse { access: state.jwt.issue(&user, TokenKind::Access)? }))
}

async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> ApiResult<Json<Vec<User>>> {
    auth.require(Capability::ManageUsers)?;
    let filter =
        UserFilter { role: query.role, is_active: query.is_active, search: non_blank(query.search) };
    Ok(Json(state.users().list(&filter).await?))
}

async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(new_user): ApiJson<NewUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    auth.require(Capability::ManageUsers)?;
    new_user.validate()?;
    let password_hash = hash_blocking(new_user.password.clone()).await?;
    let user = state.users().create(&new_user, &password_hash).await?;
    tracing::info!(
        event_name = "user.created",
        user_id = %user.id,
        role = user.role.as_str(),
        created_by = %auth.id(),
        "user created"
    );
    Ok((StatusCode::CREATED, Json(user)))
}

async fn load_user(state: &AppState, id: i64) -> ApiResult<User> {
    state
        .users()
        .find_by_id(UserId(id))
        .await?
        .ok_or_else(|| ApplicationError::not_found("user", id).into())
}

async fn retrieve(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<User>> {
    auth.require(Capability::ManageUsers)?;
    Ok(Json(load_user(&state, id).await?))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    ApiJson(changes): ApiJson<UserUpdate>,
) -> ApiResult<Json<User>> {
    auth.require(Capability::ManageUsers)?;
    changes.validate()?;
    let mut user = load_user(&state, id).await?;
    changes.apply(&mut user);
    Ok(Json(state.users().update(&user).await?))
}

async fn destroy(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    auth.require(Capability::ManageUsers)?;
    if auth.id() == UserId(id) {
        return Err(DomainError::BusinessRule("you cannot delete your own account".to_string()).into());
    }
    state.users().delete(UserId(id)).await?;
    tracing::info!(event_name = "user.deleted", user_id = id, deleted_by = %auth.id(), "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.0)
}

async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(profile): ApiJson<ProfileUpdate>,
) -> ApiResult<Json<User>> {
    let changes = UserUpdate::from(profile);
    changes.validate()?;
    let mut user = auth.0;
    changes.apply(&mut user);
    Ok(Json(state.users().update(&user).await?))
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub detail: &'static str,
}

async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(change): ApiJson<PasswordChange>,
) -> ApiResult<Json<Message>> {
    change.validate()?;
    let users = state.users();
    let stored = users
        .password_hash(auth.id())
        .await?
        .ok_or_else(|| ApplicationError::not_found("user", auth.id()))?;
    if !verify_blocking(change.old_password.clone(), stored).await? {
        return Err(DomainError::field("old_password", "wrong password").into());
    }

    let password_hash = hash_blocking(change.new_password).await?;
    users.set_password(auth.id(), &password_hash).await?;
    tracing::info!(event_name = "user.password.changed", user_id = %auth.id(), "password changed");
    Ok(Json(Message { detail: "password updated successfully" }))
}
