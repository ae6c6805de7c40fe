use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use rotu_core::domain::user::{NewUser, Role, User, UserId};

use super::codec::{decode_label, decode_timestamp, encode_timestamp, is_unique_violation, like_pattern};
use super::{RepositoryError, UserRepository};
use crate::DbPool;

const SELECT_USER: &str = "SELECT id, username, email, first_name, last_name, phone, role, is_active,
        created_at, updated_at
 FROM users";

#[derive(Clone, Debug, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    /// Matches username, email, first or last name.
    pub search: Option<String>,
}

/// A user together with the stored password hash, for login.
#[derive(Clone, Debug)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role: String = row.try_get("role")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(User {
        id: UserId(row.try_get("id")?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
        role: decode_label("role", &role)?,
        is_active: row.try_get("is_active")?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

fn duplicate_identity(error: sqlx::Error, username: &str, email: &str) -> RepositoryError {
    if is_unique_violation(&error) {
        RepositoryError::Conflict(format!(
            "a user with username `{username}` or email `{email}` already exists"
        ))
    } else {
        error.into()
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn create(&self, user: &NewUser, password_hash: &str) -> Result<User, RepositoryError> {
        let now = encode_timestamp(Utc::now());
        let username = user.username.trim();
        let email = user.email.trim();

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, email, password_hash, first_name, last_name, phone,
                                role, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
             RETURNING id",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(user.first_name.trim())
        .bind(user.last_name.trim())
        .bind(user.phone.trim())
        .bind(user.role.as_str())
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| duplicate_identity(error, username, email))?;

        self.find_by_id(UserId(id)).await?.ok_or_else(|| RepositoryError::not_found("user", id))
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_credentials(
        &self,
        username: &str,
    ) -> Result<Option<UserCredentials>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, username, email, first_name, last_name, phone, role, is_active,
                    created_at, updated_at, password_hash
             FROM users WHERE username = ?",
        )
        .bind(username.trim())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(UserCredentials {
                user: user_from_row(row)?,
                password_hash: row.try_get("password_hash")?,
            })),
            None => Ok(None),
        }
    }

    async fn password_hash(&self, id: UserId) -> Result<Option<String>, RepositoryError> {
        let hash = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hash)
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_USER);
        query.push(" WHERE 1 = 1");
        if let Some(role) = filter.role {
            query.push(" AND role = ").push_bind(role.as_str());
        }
        if let Some(is_active) = filter.is_active {
            query.push(" AND is_active = ").push_bind(is_active);
        }
        if let Some(pattern) = like_pattern(filter.search.as_deref()) {
            query
                .push(" AND (username LIKE ")
                .push_bind(pattern.clone())
                .push(" OR email LIKE ")
                .push_bind(pattern.clone())
                .push(" OR first_name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR last_name LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        query.push(" ORDER BY username ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn update(&self, user: &User) -> Result<User, RepositoryError> {
        let result = sqlx::query(
            "UPDATE users
             SET email = ?, first_name = ?, last_name = ?, phone = ?, role = ?, is_active = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(user.email.trim())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(encode_timestamp(Utc::now()))
        .bind(user.id.0)
        .execute(&self.pool)
        .await
        .map_err(|error| duplicate_identity(error, &user.username, &user.email))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("user", user.id));
        }
        self.find_by_id(user.id).await?.ok_or_else(|| RepositoryError::not_found("user", user.id))
    }

    async fn set_password(&self, id: UserId, password_hash: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(encode_timestamp(Utc::now()))
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("user", id));
        }
        Ok(())
    }

    async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("user", id));
        }
        Ok(())
    }
}
