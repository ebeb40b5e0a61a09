use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/signin", post(sign_in))
        .route("/api/auth/signout", post(sign_out))
        .route("/api/auth/me", get(me))
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

// -- Handlers --

/// POST /api/auth/signup: create an account and start a session for it
async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> AppResult<Response> {
    state
        .identity
        .sign_up(&req.email, &req.password, &req.display_name)
        .await?;
    let session = state.identity.sign_in(&req.email, &req.password).await?;

    let auth = &state.config.auth;
    Ok((
        StatusCode::CREATED,
        [(
            header::SET_COOKIE,
            session_cookie(&auth.cookie_name, &session.token, auth.session_hours),
        )],
        Json(json!({ "user_id": session.user_id, "token": session.token })),
    )
        .into_response())
}

async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> AppResult<Response> {
    let session = state.identity.sign_in(&req.email, &req.password).await?;

    let auth = &state.config.auth;
    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            session_cookie(&auth.cookie_name, &session.token, auth.session_hours),
        )],
        Json(json!({ "user_id": session.user_id, "token": session.token })),
    )
        .into_response())
}

async fn sign_out(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    state.identity.sign_out(&user.token).await?;
    Ok((
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )],
    )
        .into_response())
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    // Session outlived its account
    let profile = state
        .identity
        .profile(&user.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(profile).into_response())
}
