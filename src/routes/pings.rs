use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppResult;
use crate::extractors::{CurrentUser, MaybeUser};
use crate::pings::domain::{CallerVote, Category, NewPing, PingId, PingUpdate, UserId, VoteAction};
use crate::pings::feed::{FeedItem, FeedPage};
use crate::pings::query::{FeedParams, FeedQuery};
use crate::state::AppState;

pub const ANONYMOUS_LABEL: &str = "Anonymous";

// --- View structs ---

/// A feed item as the client sees it. Anonymous pings keep `author_id`
/// but hide the author's username and email.
#[derive(Debug, Serialize)]
pub struct PingView {
    pub id: PingId,
    pub author_id: UserId,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub body: String,
    pub category: Category,
    pub location: Option<String>,
    pub is_anonymous: bool,
    pub hashtags: Vec<String>,
    pub seo_description: String,
    pub created_at: DateTime<Utc>,
    pub vote_count: i64,
    pub current_user_vote: CallerVote,
    pub can_edit: bool,
}

impl PingView {
    pub fn new(item: FeedItem, caller: Option<&UserId>) -> Self {
        let can_edit = caller.is_some_and(|c| item.is_owned_by(c));
        let FeedItem {
            ping,
            author,
            vote_count,
            current_user_vote,
        } = item;

        let (display_name, username, email) = if ping.is_anonymous {
            (ANONYMOUS_LABEL.to_string(), None, None)
        } else {
            (author.username.clone(), Some(author.username), Some(author.email))
        };

        Self {
            id: ping.id,
            author_id: ping.author_id,
            display_name,
            username,
            email,
            body: ping.body,
            category: ping.category,
            location: ping.location,
            is_anonymous: ping.is_anonymous,
            hashtags: ping.hashtags,
            seo_description: ping.seo_description,
            created_at: ping.created_at,
            vote_count,
            current_user_vote,
            can_edit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedPageView {
    pub items: Vec<PingView>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl FeedPageView {
    fn new(page: FeedPage, caller: Option<&UserId>) -> Self {
        Self {
            items: page
                .items
                .into_iter()
                .map(|item| PingView::new(item, caller))
                .collect(),
            has_more: page.has_more,
            total: page.total,
        }
    }
}

// --- Requests ---

#[derive(Deserialize)]
pub struct VoteRequest {
    pub vote: VoteAction,
}

#[derive(Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<PingId>,
}

#[derive(Deserialize)]
pub struct BulkUpdateRequest {
    pub ids: Vec<PingId>,
    pub update: PingUpdate,
}

#[derive(Deserialize)]
pub struct StatsParams {
    #[serde(alias = "user_id")]
    pub author_id: Option<String>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/pings", get(list_pings).post(create_ping))
        .route("/api/pings/stats", get(ping_stats))
        .route("/api/pings/bulk-delete", post(bulk_delete))
        .route("/api/pings/bulk-update", post(bulk_update))
        .route(
            "/api/pings/{id}",
            get(get_ping).patch(update_ping).delete(delete_ping),
        )
        .route("/api/pings/{id}/vote", post(vote))
}

// --- Handlers ---

async fn list_pings(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(params): Query<FeedParams>,
) -> AppResult<Json<FeedPageView>> {
    let query = FeedQuery::try_from(params)?;
    let page = state.feed.query_feed(user.id(), &query).await?;
    Ok(Json(FeedPageView::new(page, user.id())))
}

async fn create_ping(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(new): Json<NewPing>,
) -> AppResult<Response> {
    let item = state.pings.create_ping(&user.id, new).await?;
    Ok((StatusCode::CREATED, Json(PingView::new(item, Some(&user.id)))).into_response())
}

async fn get_ping(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<PingView>> {
    let item = state.pings.get_ping(user.id(), &PingId::new(id)).await?;
    Ok(Json(PingView::new(item, user.id())))
}

async fn update_ping(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(update): Json<PingUpdate>,
) -> AppResult<Json<PingView>> {
    let item = state
        .pings
        .update_ping(&user.id, &PingId::new(id), update)
        .await?;
    Ok(Json(PingView::new(item, Some(&user.id))))
}

async fn delete_ping(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.pings.delete_ping(&user.id, &PingId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn vote(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> AppResult<Response> {
    let tally = state.pings.vote(&user.id, &PingId::new(id), req.vote).await?;
    Ok(Json(tally).into_response())
}

async fn bulk_delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<BulkDeleteRequest>,
) -> AppResult<Response> {
    let deleted = state.pings.bulk_delete(&user.id, &req.ids).await?;
    Ok(Json(json!({ "deleted": deleted })).into_response())
}

async fn bulk_update(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<BulkUpdateRequest>,
) -> AppResult<Response> {
    let updated = state
        .pings
        .bulk_update(&user.id, &req.ids, req.update)
        .await?;
    Ok(Json(json!({ "updated": updated })).into_response())
}

async fn ping_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> AppResult<Response> {
    let author = params
        .author_id
        .filter(|a| !a.trim().is_empty())
        .map(UserId::new);
    let count = state.pings.ping_stats(author.as_ref()).await?;
    Ok(Json(json!({ "count": count })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pings::domain::{Author, Ping};

    fn item(anonymous: bool) -> FeedItem {
        let author = UserId::new("u1");
        FeedItem {
            ping: Ping {
                id: PingId::new("p1"),
                author_id: author.clone(),
                body: "hello".into(),
                category: Category::Help,
                location: None,
                is_anonymous: anonymous,
                hashtags: Vec::new(),
                seo_description: String::new(),
                created_at: Utc::now(),
            },
            author: Author {
                id: author,
                username: "ana".into(),
                email: "ana@example.com".into(),
            },
            vote_count: 2,
            current_user_vote: CallerVote::None,
        }
    }

    #[test]
    fn anonymous_view_masks_profile_but_keeps_author_id() {
        let view = PingView::new(item(true), None);
        assert_eq!(view.display_name, ANONYMOUS_LABEL);
        assert_eq!(view.username, None);
        assert_eq!(view.email, None);
        assert_eq!(view.author_id.as_str(), "u1");

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["author_id"], "u1");
        assert!(json.get("email").is_none());
    }

    #[test]
    fn public_view_shows_author() {
        let view = PingView::new(item(false), Some(&UserId::new("u1")));
        assert_eq!(view.display_name, "ana");
        assert_eq!(view.email.as_deref(), Some("ana@example.com"));
        assert!(view.can_edit);
    }

    #[test]
    fn only_the_author_can_edit() {
        assert!(!PingView::new(item(false), Some(&UserId::new("u2"))).can_edit);
        assert!(!PingView::new(item(false), None).can_edit);
    }
}
