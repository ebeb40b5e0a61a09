//! Local identity provider: email/password accounts with session tokens.
//!
//! The rest of the crate only sees resolved [`UserId`]s; credentials and
//! tokens stay behind the [`IdentityProvider`] trait.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::time::Duration;
use thiserror::Error;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::session;
use crate::db::models::User;
use crate::db::{with_conn, StoreError};
use crate::pings::domain::UserId;
use crate::state::DbPool;

pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_DISPLAY_NAME_CHARS: usize = 50;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An account with that email already exists")]
    EmailTaken,

    #[error("{0}")]
    Invalid(String),

    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A freshly issued session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: UserId,
    pub token: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserId, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// The user behind a live session token, if any.
    async fn current_user(&self, token: &str) -> Result<Option<UserId>, AuthError>;

    async fn sign_out(&self, token: &str) -> Result<(), AuthError>;

    async fn profile(&self, user: &UserId) -> Result<Option<User>, AuthError>;
}

fn normalize_email(raw: &str) -> Result<String, AuthError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AuthError::Invalid("Email address is not valid".into())),
    }
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AuthError::Invalid(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_CHARS
        )));
    }
    Ok(())
}

fn validate_display_name(raw: &str) -> Result<String, AuthError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_DISPLAY_NAME_CHARS {
        return Err(AuthError::Invalid(format!(
            "Display name must be 1 to {} characters",
            MAX_DISPLAY_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

/// Run CPU-bound bcrypt work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, AuthError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuthError::Store(StoreError::Task(e.to_string())))
}

pub struct SqliteIdentityProvider {
    pool: DbPool,
    timeout: Duration,
    session_hours: u64,
    bcrypt_cost: u32,
}

impl SqliteIdentityProvider {
    pub fn new(pool: DbPool, timeout: Duration, session_hours: u64, bcrypt_cost: u32) -> Self {
        Self {
            pool,
            timeout,
            session_hours,
            bcrypt_cost,
        }
    }
}

#[async_trait]
impl IdentityProvider for SqliteIdentityProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<UserId, AuthError> {
        let email = normalize_email(email)?;
        validate_password(password)?;
        let username = validate_display_name(display_name)?;

        let cost = self.bcrypt_cost;
        let plaintext = password.to_string();
        let password_hash = blocking(move || hash_password(&plaintext, cost)).await??;

        let user_id = UserId::generate();
        let id = user_id.as_str().to_string();
        let inserted = with_conn(&self.pool, self.timeout, move |conn| {
            let rows = conn.execute(
                "INSERT INTO users (id, email, username, password_hash)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(email) DO NOTHING",
                params![id, email, username, password_hash],
            )?;
            Ok(rows > 0)
        })
        .await?;

        if !inserted {
            return Err(AuthError::EmailTaken);
        }
        tracing::info!("User {} signed up", user_id);
        Ok(user_id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;

        let account: Option<(String, String)> = with_conn(&self.pool, self.timeout, move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, password_hash FROM users WHERE email = ?1",
                    params![email],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(row)
        })
        .await?;

        let (id, hash) = account.ok_or(AuthError::InvalidCredentials)?;
        let plaintext = password.to_string();
        if !blocking(move || verify_password(&plaintext, &hash)).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let hours = self.session_hours;
        let user = id.clone();
        let token = with_conn(&self.pool, self.timeout, move |conn| {
            session::purge_expired(conn)?;
            Ok(session::create_session(conn, &user, hours)?)
        })
        .await?;

        tracing::info!("User {} signed in", id);
        Ok(AuthSession {
            user_id: UserId::new(id),
            token,
        })
    }

    async fn current_user(&self, token: &str) -> Result<Option<UserId>, AuthError> {
        let token = token.to_string();
        let user = with_conn(&self.pool, self.timeout, move |conn| {
            Ok(session::resolve_session(conn, &token)?)
        })
        .await?;
        Ok(user.map(UserId::new))
    }

    async fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let token = token.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            Ok(session::delete_session(conn, &token)?)
        })
        .await?;
        Ok(())
    }

    async fn profile(&self, user: &UserId) -> Result<Option<User>, AuthError> {
        let id = user.as_str().to_string();
        let user = with_conn(&self.pool, self.timeout, move |conn| {
            let user = conn
                .query_row(
                    "SELECT id, email, username, password_hash, created_at FROM users WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(User {
                            id: row.get(0)?,
                            email: row.get(1)?,
                            username: row.get(2)?,
                            password_hash: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    },
                )
                .optional()?;
            Ok(user)
        })
        .await?;
        Ok(user)
    }
}
