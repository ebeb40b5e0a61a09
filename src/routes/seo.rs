use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::pings::hashtags::{extract_hashtags, generate_meta_tags, generate_seo_description, MetaTags};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SeoRequest {
    pub text: String,
    /// Taken from the text when omitted
    #[serde(default)]
    pub hashtags: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct SeoResponse {
    pub seo_description: String,
    pub meta_tags: MetaTags,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/seo", post(preview))
}

/// Preview the SEO text a ping body would get, without storing anything.
async fn preview(Json(req): Json<SeoRequest>) -> AppResult<Json<SeoResponse>> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Text cannot be empty".into()));
    }

    let hashtags = match req.hashtags {
        Some(tags) => tags
            .iter()
            .map(|t| t.trim().trim_start_matches('#').to_lowercase())
            .filter(|t| !t.is_empty())
            .collect(),
        None => extract_hashtags(&req.text),
    };

    Ok(Json(SeoResponse {
        seo_description: generate_seo_description(&req.text, &hashtags),
        meta_tags: generate_meta_tags(&req.text, &hashtags),
    }))
}
