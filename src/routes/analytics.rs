use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppResult;
use crate::pings::analytics::{ContentAnalytics, TagCount, UserActivity};
use crate::pings::query::QueryError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ActivityParams {
    /// RFC 3339 timestamp or YYYY-MM-DD
    pub since: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/analytics/content", get(content))
        .route("/api/analytics/trending", get(trending))
        .route("/api/analytics/activity", get(activity))
}

async fn content(State(state): State<AppState>) -> AppResult<Json<ContentAnalytics>> {
    Ok(Json(state.analytics.content_analytics().await?))
}

async fn trending(State(state): State<AppState>) -> AppResult<Json<Vec<TagCount>>> {
    Ok(Json(state.analytics.trending_topics(Utc::now()).await?))
}

async fn activity(
    State(state): State<AppState>,
    Query(params): Query<ActivityParams>,
) -> AppResult<Json<UserActivity>> {
    let since = match params.since.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_since(raw)?),
        None => None,
    };
    Ok(Json(state.analytics.user_activity(since).await?))
}

fn parse_since(raw: &str) -> Result<chrono::DateTime<Utc>, QueryError> {
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
        .map_err(|_| QueryError::new("since", "expected an RFC 3339 timestamp or YYYY-MM-DD date"))
}
