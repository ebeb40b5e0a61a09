// Ping lifecycle - create, edit, delete, vote
use chrono::Utc;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::pings::domain::{
    normalize_location, validate_body, Ping, PingId, PingUpdate, NewPing, UserId, VoteAction,
};
use crate::pings::feed::FeedItem;
use crate::pings::hashtags::{extract_hashtags, generate_seo_description};
use crate::pings::query::{FeedLimits, FeedQuery};
use crate::pings::repository::PingStore;
use crate::pings::votes::{tally, VoteTally};

/// Upper bound on ids accepted by one bulk operation.
pub const MAX_BULK_IDS: usize = 100;

/// Apply a partial update in place. A changed body rederives hashtags and
/// the SEO description.
fn apply_update(ping: &mut Ping, update: &PingUpdate) -> AppResult<()> {
    if let Some(body) = &update.body {
        let body = validate_body(body)?;
        if body != ping.body {
            ping.hashtags = extract_hashtags(&body);
            ping.seo_description = generate_seo_description(&body, &ping.hashtags);
            ping.body = body;
        }
    }
    if let Some(category) = update.category {
        ping.category = category;
    }
    if let Some(location) = &update.location {
        ping.location = normalize_location(Some(location.as_str()))?;
    }
    if let Some(is_anonymous) = update.is_anonymous {
        ping.is_anonymous = is_anonymous;
    }
    Ok(())
}

fn check_bulk_size(ids: &[PingId]) -> AppResult<()> {
    if ids.len() > MAX_BULK_IDS {
        return Err(AppError::BadRequest(format!(
            "At most {} pings can be changed at once",
            MAX_BULK_IDS
        )));
    }
    Ok(())
}

pub struct PingService {
    store: Arc<dyn PingStore>,
}

impl PingService {
    pub fn new(store: Arc<dyn PingStore>) -> Self {
        Self { store }
    }

    pub async fn create_ping(&self, caller: &UserId, new: NewPing) -> AppResult<FeedItem> {
        let body = validate_body(&new.body)?;
        let location = normalize_location(new.location.as_deref())?;
        let hashtags = extract_hashtags(&body);
        let seo_description = generate_seo_description(&body, &hashtags);

        let ping = Ping {
            id: PingId::generate(),
            author_id: caller.clone(),
            body,
            category: new.category.unwrap_or_default(),
            location,
            is_anonymous: new.is_anonymous,
            hashtags,
            seo_description,
            created_at: Utc::now(),
        };
        self.store.insert(&ping).await?;
        tracing::info!("Ping {} created by {}", ping.id, caller);

        self.get_ping(Some(caller), &ping.id).await
    }

    pub async fn get_ping(&self, caller: Option<&UserId>, id: &PingId) -> AppResult<FeedItem> {
        let row = self.store.fetch_one(id).await?.ok_or(AppError::NotFound)?;
        Ok(FeedItem::from_row(row, caller))
    }

    pub async fn update_ping(
        &self,
        caller: &UserId,
        id: &PingId,
        update: PingUpdate,
    ) -> AppResult<FeedItem> {
        let row = self.store.fetch_one(id).await?.ok_or(AppError::NotFound)?;
        if &row.ping.author_id != caller {
            return Err(AppError::Forbidden);
        }

        let mut ping = row.ping;
        apply_update(&mut ping, &update)?;

        // Deleted between the read and the write
        if !self.store.update(&ping).await? {
            return Err(AppError::NotFound);
        }
        tracing::info!("Ping {} updated", ping.id);

        self.get_ping(Some(caller), id).await
    }

    pub async fn delete_ping(&self, caller: &UserId, id: &PingId) -> AppResult<()> {
        let row = self.store.fetch_one(id).await?.ok_or(AppError::NotFound)?;
        if &row.ping.author_id != caller {
            return Err(AppError::Forbidden);
        }

        if !self.store.delete(id, caller).await? {
            return Err(AppError::NotFound);
        }
        tracing::info!("Ping {} deleted", id);
        Ok(())
    }

    /// Apply a vote and return the ping's tally as the caller now sees it.
    pub async fn vote(
        &self,
        caller: &UserId,
        id: &PingId,
        action: VoteAction,
    ) -> AppResult<VoteTally> {
        let votes = self
            .store
            .apply_vote(id, caller, action.vote_type())
            .await?
            .ok_or(AppError::NotFound)?;

        tracing::debug!("Vote {:?} on {} by {}", action, id, caller);
        Ok(tally(&votes, Some(caller)))
    }

    /// Delete the caller's pings among `ids`. Unknown ids are skipped; if any
    /// known id belongs to someone else nothing is deleted.
    pub async fn bulk_delete(&self, caller: &UserId, ids: &[PingId]) -> AppResult<u64> {
        check_bulk_size(ids)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let owners = self.store.owners(ids).await?;
        if owners.iter().any(|(_, owner)| owner != caller) {
            return Err(AppError::Forbidden);
        }

        let owned: Vec<PingId> = owners.into_iter().map(|(id, _)| id).collect();
        let deleted = self.store.delete_many(&owned, caller).await?;
        tracing::info!("Bulk deleted {} pings for {}", deleted, caller);
        Ok(deleted)
    }

    /// Apply one partial update to each of the caller's pings among `ids`,
    /// in a single transaction. Same ownership rule as [`Self::bulk_delete`].
    pub async fn bulk_update(
        &self,
        caller: &UserId,
        ids: &[PingId],
        update: PingUpdate,
    ) -> AppResult<u64> {
        check_bulk_size(ids)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let owners = self.store.owners(ids).await?;
        if owners.iter().any(|(_, owner)| owner != caller) {
            return Err(AppError::Forbidden);
        }

        let mut pings = Vec::with_capacity(owners.len());
        for (id, _) in owners {
            // Gone since the ownership check
            let Some(row) = self.store.fetch_one(&id).await? else {
                continue;
            };
            let mut ping = row.ping;
            apply_update(&mut ping, &update)?;
            pings.push(ping);
        }

        let updated = self.store.update_many(&pings).await?;
        tracing::info!("Bulk updated {} pings for {}", updated, caller);
        Ok(updated)
    }

    /// Exact number of pings, optionally restricted to one author.
    pub async fn ping_stats(&self, author: Option<&UserId>) -> AppResult<u64> {
        let mut query = FeedQuery::new();
        if let Some(author) = author {
            query = query.author(author.clone());
        }
        let query = query.validate(&FeedLimits::default())?;
        Ok(self.store.count(&query).await?)
    }
}
