use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::identity::AuthError;
use crate::db::StoreError;
use crate::pings::domain::DomainError;
use crate::pings::query::QueryError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    InvalidQuery(#[from] QueryError),

    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Auth(AuthError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Store(e) => AppError::StoreUnavailable(e),
            other => AppError::Auth(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, field) = match &self {
            AppError::InvalidQuery(e) => (StatusCode::BAD_REQUEST, e.message.clone(), Some(e.field)),
            AppError::Invalid(e) => (StatusCode::BAD_REQUEST, e.to_string(), None),
            AppError::StoreUnavailable(e) => {
                tracing::error!("Store error: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable, please try again".to_string(),
                    None,
                )
            }
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string(), None),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string(), None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
            AppError::Auth(e) => {
                let status = match e {
                    AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                    AuthError::EmailTaken => StatusCode::CONFLICT,
                    AuthError::Invalid(_) => StatusCode::BAD_REQUEST,
                    AuthError::Hash(_) | AuthError::Store(_) => {
                        tracing::error!("Auth error: {}", e);
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    "Internal server error".to_string()
                } else {
                    e.to_string()
                };
                (status, message, None)
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
        };

        let body = match field {
            Some(field) => json!({ "error": message, "field": field }),
            None => json!({ "error": message }),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
