//! Feed query engine.
//!
//! Validates a [`FeedQuery`], pushes the filters down to the store, and folds
//! each returned row's votes into a tally for the caller. Read-only; store
//! failures surface as `StoreUnavailable` and are never retried here.

use serde::Serialize;
use std::sync::Arc;

use crate::error::AppResult;
use crate::pings::domain::{Author, CallerVote, Ping, UserId};
use crate::pings::query::{FeedLimits, FeedQuery};
use crate::pings::repository::{PingRow, PingStore};
use crate::pings::votes::tally;

/// A ping with its derived vote state and author display fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedItem {
    pub ping: Ping,
    pub author: Author,
    pub vote_count: i64,
    pub current_user_vote: CallerVote,
}

impl FeedItem {
    pub fn from_row(row: PingRow, caller: Option<&UserId>) -> Self {
        let tally = tally(&row.votes, caller);
        Self {
            ping: row.ping,
            author: row.author,
            vote_count: tally.vote_count,
            current_user_vote: tally.current_user_vote,
        }
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.ping.author_id == user
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

pub struct FeedEngine {
    store: Arc<dyn PingStore>,
    limits: FeedLimits,
}

impl FeedEngine {
    pub fn new(store: Arc<dyn PingStore>, limits: FeedLimits) -> Self {
        Self { store, limits }
    }

    pub async fn query_feed(
        &self,
        caller: Option<&UserId>,
        query: &FeedQuery,
    ) -> AppResult<FeedPage> {
        let query = query.validate(&self.limits)?;
        tracing::debug!(
            term = ?query.term,
            category = ?query.category,
            limit = query.limit,
            offset = query.offset,
            "Querying feed"
        );

        let rows = self.store.fetch_feed(&query).await.inspect_err(|e| {
            tracing::warn!("Feed fetch failed: {}", e);
        })?;

        let total = if query.include_total {
            Some(self.store.count(&query).await?)
        } else {
            None
        };

        let has_more = rows.len() == query.limit as usize;
        let items = rows
            .into_iter()
            .map(|row| FeedItem::from_row(row, caller))
            .collect();

        Ok(FeedPage {
            items,
            has_more,
            total,
        })
    }
}
