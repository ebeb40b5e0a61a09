//! Feed engine against a real SQLite file.
//!
//! Tests cover:
//! - Default ordering and the sort whitelist
//! - Vote tallies for the caller, anonymous pings
//! - Filters (term, category, location, author, date range) and pagination
//! - Store timeouts surfacing as StoreUnavailable

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use pingboard::auth::{IdentityProvider, SqliteIdentityProvider};
use pingboard::db;
use pingboard::error::AppError;
use pingboard::pings::domain::{CallerVote, Category, NewPing, Ping, PingId, UserId, VoteAction};
use pingboard::pings::feed::FeedEngine;
use pingboard::pings::hashtags::{extract_hashtags, generate_seo_description};
use pingboard::pings::query::{FeedLimits, FeedQuery, SortDirection};
use pingboard::pings::repository::{PingStore, SqlitePingStore};
use pingboard::pings::service::PingService;
use pingboard::state::DbPool;

struct Harness {
    _dir: TempDir,
    pool: DbPool,
    store: Arc<SqlitePingStore>,
    feed: FeedEngine,
    pings: PingService,
    idp: SqliteIdentityProvider,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("test.db"), 4).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let timeout = Duration::from_secs(5);
    let store = Arc::new(SqlitePingStore::new(pool.clone(), timeout));
    Harness {
        feed: FeedEngine::new(store.clone(), FeedLimits::default()),
        pings: PingService::new(store.clone()),
        idp: SqliteIdentityProvider::new(pool.clone(), timeout, 24, 4),
        store,
        pool,
        _dir: dir,
    }
}

async fn user(h: &Harness, name: &str) -> UserId {
    h.idp
        .sign_up(&format!("{name}@example.com"), "password123", name)
        .await
        .unwrap()
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
}

/// Insert a ping with a fixed timestamp, bypassing the service clock.
async fn seed(h: &Harness, id: &str, author: &UserId, body: &str, created_at: DateTime<Utc>) -> PingId {
    let hashtags = extract_hashtags(body);
    let ping = Ping {
        id: PingId::new(id),
        author_id: author.clone(),
        body: body.to_string(),
        category: Category::None,
        location: None,
        is_anonymous: false,
        seo_description: generate_seo_description(body, &hashtags),
        hashtags,
        created_at,
    };
    h.store.insert(&ping).await.unwrap();
    ping.id
}

fn ids(page: &pingboard::pings::FeedPage) -> Vec<&str> {
    page.items.iter().map(|i| i.ping.id.as_str()).collect()
}

// ============================================================================
// ORDERING
// ============================================================================

#[tokio::test]
async fn test_default_order_is_newest_first() {
    let h = harness();
    let ana = user(&h, "ana").await;
    seed(&h, "p-old", &ana, "first", at(1, 9)).await;
    seed(&h, "p-new", &ana, "third", at(3, 9)).await;
    seed(&h, "p-mid", &ana, "second", at(2, 9)).await;

    let page = h.feed.query_feed(None, &FeedQuery::new()).await.unwrap();
    assert_eq!(ids(&page), vec!["p-new", "p-mid", "p-old"]);

    let page = h
        .feed
        .query_feed(None, &FeedQuery::new().sort("timestamp", SortDirection::Asc))
        .await
        .unwrap();
    assert_eq!(ids(&page), vec!["p-old", "p-mid", "p-new"]);
}

#[tokio::test]
async fn test_identical_queries_return_identical_results() {
    let h = harness();
    let ana = user(&h, "ana").await;
    // Same timestamp: the id tiebreak keeps the order stable
    for id in ["b", "a", "c"] {
        seed(&h, id, &ana, "same moment #tie", at(1, 12)).await;
    }

    let query = FeedQuery::new().term("tie").limit(10);
    let first = h.feed.query_feed(Some(&ana), &query).await.unwrap();
    let second = h.feed.query_feed(Some(&ana), &query).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(ids(&first), vec!["c", "b", "a"]);
}

// ============================================================================
// VOTES
// ============================================================================

#[tokio::test]
async fn test_tallies_and_disallowed_sort() {
    let h = harness();
    let ana = user(&h, "ana").await;
    let (v1, v2, v3) = (user(&h, "v1").await, user(&h, "v2").await, user(&h, "v3").await);
    let p1 = seed(&h, "p1", &ana, "popular", at(1, 9)).await;
    seed(&h, "p2", &ana, "ignored", at(2, 9)).await;

    h.pings.vote(&v1, &p1, VoteAction::Upvote).await.unwrap();
    h.pings.vote(&v2, &p1, VoteAction::Upvote).await.unwrap();
    h.pings.vote(&v3, &p1, VoteAction::Downvote).await.unwrap();

    let err = h
        .feed
        .query_feed(None, &FeedQuery::new().sort("vote_count", SortDirection::Desc))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuery(ref e) if e.field == "sort"));

    let page = h.feed.query_feed(Some(&v3), &FeedQuery::new()).await.unwrap();
    assert_eq!(page.items.len(), 2);
    let p1_item = page.items.iter().find(|i| i.ping.id.as_str() == "p1").unwrap();
    let p2_item = page.items.iter().find(|i| i.ping.id.as_str() == "p2").unwrap();
    assert_eq!(p1_item.vote_count, 1);
    assert_eq!(p1_item.current_user_vote, CallerVote::Downvote);
    assert_eq!(p2_item.vote_count, 0);
    assert_eq!(p2_item.current_user_vote, CallerVote::None);
}

#[tokio::test]
async fn test_upvote_then_remove_returns_to_neutral() {
    let h = harness();
    let ana = user(&h, "ana").await;
    let bob = user(&h, "bob").await;
    let p = seed(&h, "p", &ana, "vote me", at(1, 9)).await;

    h.pings.vote(&bob, &p, VoteAction::Upvote).await.unwrap();
    h.pings.vote(&bob, &p, VoteAction::Remove).await.unwrap();

    let page = h.feed.query_feed(Some(&bob), &FeedQuery::new()).await.unwrap();
    assert_eq!(page.items[0].vote_count, 0);
    assert_eq!(page.items[0].current_user_vote, CallerVote::None);
}

#[tokio::test]
async fn test_revote_replaces_instead_of_stacking() {
    let h = harness();
    let ana = user(&h, "ana").await;
    let bob = user(&h, "bob").await;
    let p = seed(&h, "p", &ana, "flip flop", at(1, 9)).await;

    for _ in 0..3 {
        h.pings.vote(&bob, &p, VoteAction::Upvote).await.unwrap();
        h.pings.vote(&bob, &p, VoteAction::Downvote).await.unwrap();
    }

    let conn = h.pool.get().unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM votes WHERE ping_id = 'p'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(rows, 1);

    let item = h.pings.get_ping(Some(&bob), &p).await.unwrap();
    assert_eq!(item.vote_count, -1);
}

// ============================================================================
// ANONYMITY
// ============================================================================

#[tokio::test]
async fn test_anonymous_ping_keeps_author_id() {
    let h = harness();
    let ana = user(&h, "ana").await;
    let item = h
        .pings
        .create_ping(
            &ana,
            NewPing {
                body: "psst".into(),
                is_anonymous: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(item.ping.is_anonymous);

    let page = h.feed.query_feed(None, &FeedQuery::new()).await.unwrap();
    assert_eq!(page.items[0].ping.author_id, ana);
    assert!(page.items[0].is_owned_by(&ana));
}

// ============================================================================
// FILTERS
// ============================================================================

#[tokio::test]
async fn test_filters_combine_with_and() {
    let h = harness();
    let ana = user(&h, "ana").await;
    let bob = user(&h, "bob").await;

    let mut sale = Ping {
        id: PingId::new("sale-downtown"),
        author_id: ana.clone(),
        body: "Couch for sale #furniture".into(),
        category: Category::Sale,
        location: Some("Downtown Oslo".into()),
        is_anonymous: false,
        hashtags: vec!["furniture".into()],
        seo_description: String::new(),
        created_at: at(1, 9),
    };
    h.store.insert(&sale).await.unwrap();

    sale.id = PingId::new("sale-uptown");
    sale.location = Some("Uptown".into());
    h.store.insert(&sale).await.unwrap();

    sale.id = PingId::new("bob-sale");
    sale.author_id = bob.clone();
    sale.location = Some("downtown".into());
    h.store.insert(&sale).await.unwrap();

    seed(&h, "event", &ana, "Concert downtown #music", at(2, 9)).await;

    let q = FeedQuery::new().category(Category::Sale).location("DOWNTOWN");
    let page = h.feed.query_feed(None, &q).await.unwrap();
    let mut got = ids(&page);
    got.sort();
    assert_eq!(got, vec!["bob-sale", "sale-downtown"]);

    let q = FeedQuery::new()
        .category(Category::Sale)
        .location("downtown")
        .author(ana.clone());
    let page = h.feed.query_feed(None, &q).await.unwrap();
    assert_eq!(ids(&page), vec!["sale-downtown"]);
}

#[tokio::test]
async fn test_term_matches_body_or_hashtags_case_insensitively() {
    let h = harness();
    let ana = user(&h, "ana").await;
    seed(&h, "body", &ana, "Rust meetup tonight", at(1, 9)).await;
    seed(&h, "tag", &ana, "Come along #RustLang", at(2, 9)).await;
    seed(&h, "none", &ana, "Python meetup", at(3, 9)).await;

    let page = h
        .feed
        .query_feed(None, &FeedQuery::new().term("RUST"))
        .await
        .unwrap();
    assert_eq!(ids(&page), vec!["tag", "body"]);

    let page = h
        .feed
        .query_feed(None, &FeedQuery::new().term("   "))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 3);

    // Case folding is not limited to ASCII
    let cafe = h
        .pings
        .create_ping(
            &ana,
            NewPing {
                body: "CAFÉ opening on ÅRHUS street".into(),
                location: Some("ÖSTERMALM".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    for term in ["café", "CAFÉ", "Århus"] {
        let page = h
            .feed
            .query_feed(None, &FeedQuery::new().term(term))
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![cafe.ping.id.as_str()], "term {}", term);
    }
    let page = h
        .feed
        .query_feed(None, &FeedQuery::new().location("östermalm"))
        .await
        .unwrap();
    assert_eq!(ids(&page), vec![cafe.ping.id.as_str()]);
}

#[tokio::test]
async fn test_date_range_is_inclusive() {
    let h = harness();
    let ana = user(&h, "ana").await;
    seed(&h, "before", &ana, "a", at(1, 9)).await;
    seed(&h, "start", &ana, "b", at(2, 9)).await;
    seed(&h, "end", &ana, "c", at(3, 9)).await;
    seed(&h, "after", &ana, "d", at(4, 9)).await;

    let q = FeedQuery::new().between(Some(at(2, 9)), Some(at(3, 9)));
    let page = h.feed.query_feed(None, &q).await.unwrap();
    assert_eq!(ids(&page), vec!["end", "start"]);

    let inverted = FeedQuery::new().between(Some(at(3, 9)), Some(at(2, 9)));
    let err = h.feed.query_feed(None, &inverted).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidQuery(_)));
}

// ============================================================================
// PAGINATION
// ============================================================================

#[tokio::test]
async fn test_limit_boundaries() {
    let h = harness();
    for bad in [0, -5] {
        let err = h
            .feed
            .query_feed(None, &FeedQuery::new().limit(bad))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidQuery(ref e) if e.field == "limit"));
    }

    let max = i64::from(FeedLimits::default().max_limit);
    assert!(h.feed.query_feed(None, &FeedQuery::new().limit(max)).await.is_ok());
    assert!(h
        .feed
        .query_feed(None, &FeedQuery::new().limit(max + 1))
        .await
        .is_err());
}

#[tokio::test]
async fn test_pages_walk_the_feed_without_overlap() {
    let h = harness();
    let ana = user(&h, "ana").await;
    let start = at(1, 0);
    for i in 0..5 {
        seed(&h, &format!("p{i}"), &ana, "x", start + ChronoDuration::hours(i)).await;
    }

    let first = h
        .feed
        .query_feed(None, &FeedQuery::new().limit(2).with_total())
        .await
        .unwrap();
    assert_eq!(ids(&first), vec!["p4", "p3"]);
    assert!(first.has_more);
    assert_eq!(first.total, Some(5));

    let last = h
        .feed
        .query_feed(None, &FeedQuery::new().limit(2).offset(4))
        .await
        .unwrap();
    assert_eq!(ids(&last), vec!["p0"]);
    assert!(!last.has_more);
    assert_eq!(last.total, None);
}

// ============================================================================
// STORE FAILURES
// ============================================================================

#[tokio::test]
async fn test_store_timeout_is_unavailable_not_empty() {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("busy.db"), 1).unwrap();
    db::run_migrations(&pool).unwrap();

    let store = Arc::new(SqlitePingStore::new(pool.clone(), Duration::from_millis(100)));
    let feed = FeedEngine::new(store, FeedLimits::default());

    // Hold the only connection so the store call cannot start in time
    let held = pool.get().unwrap();
    let err = feed.query_feed(None, &FeedQuery::new()).await.unwrap_err();
    drop(held);

    assert!(matches!(err, AppError::StoreUnavailable(_)));
}

// ============================================================================
// STATS
// ============================================================================

#[test]
fn test_ping_stats_counts_per_author() {
    tokio_test::block_on(async {
        let h = harness();
        let ana = user(&h, "ana").await;
        let bob = user(&h, "bob").await;
        seed(&h, "a1", &ana, "x", at(1, 9)).await;
        seed(&h, "a2", &ana, "y", at(2, 9)).await;
        seed(&h, "b1", &bob, "z", at(3, 9)).await;

        assert_eq!(h.pings.ping_stats(None).await.unwrap(), 3);
        assert_eq!(h.pings.ping_stats(Some(&ana)).await.unwrap(), 2);
        assert_eq!(h.pings.ping_stats(Some(&UserId::new("ghost"))).await.unwrap(), 0);
    });
}
