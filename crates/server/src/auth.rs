//! Bearer-token authentication.
//!
//! Access and refresh tokens are HS256 JWTs signed with `auth.jwt_secret`. The subject is the
//! user id; the user row is reloaded on every request so deactivation takes effect at once.

use axum::{
    extract::{FromRequestParts, Query},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rotu_core::config::AuthConfig;
use rotu_core::domain::user::{Role, User, UserId};
use rotu_core::errors::ApplicationError;
use rotu_core::Capability;
use rotu_db::repositories::UserRepository;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub token_type: TokenKind,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("could not sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),
    #[error("token is invalid or expired")]
    Invalid(#[source] jsonwebtoken::errors::Error),
    #[error("expected a {0:?} token")]
    WrongKind(TokenKind),
    #[error("token subject is not a user id")]
    Subject,
}

impl From<TokenError> for ApiError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::Sign(_) => ApplicationError::Configuration(error.to_string()).into(),
            other => ApiError::unauthorized(other.to_string()),
        }
    }
}

pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtManager {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.jwt_secret.expose_secret().as_bytes(),
            Duration::minutes(config.access_token_ttl_minutes as i64),
            Duration::minutes(config.refresh_token_ttl_minutes as i64),
        )
    }

    pub fn issue(&self, user: &User, kind: TokenKind) -> Result<String, TokenError> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role,
            token_type: kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Sign)
    }

    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(TokenError::Invalid)?
            .claims;
        if claims.token_type != expected {
            return Err(TokenError::WrongKind(expected));
        }
        Ok(claims)
    }

    pub fn user_id(claims: &Claims) -> Result<UserId, TokenError> {
        claims.sub.parse::<i64>().map(UserId).map_err(|_| TokenError::Subject)
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Header first, then `?token=` so that PDF links can be opened directly.
fn bearer_token(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty());
    if from_header.is_some() {
        return from_header;
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.is_empty())
}

/// The active user behind a valid access token.
#[derive(Clone, Debug)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn id(&self) -> UserId {
        self.0.id
    }

    pub fn require(&self, capability: Capability) -> Result<(), ApiError> {
        self.0.role.require(capability).map_err(ApiError::from)
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::unauthorized("authentication credentials were not provided"))?;
        let claims = state.jwt.validate(&token, TokenKind::Access)?;
        let user_id = JwtManager::user_id(&claims)?;

        let user = state
            .users()
            .find_by_id(user_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(|| ApiError::unauthorized("user not found or inactive"))?;
        Ok(Self(user))
    }
}
