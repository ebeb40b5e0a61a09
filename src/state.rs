use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::identity::{IdentityProvider, SqliteIdentityProvider};
use crate::config::Config;
use crate::pings::analytics::Analytics;
use crate::pings::feed::FeedEngine;
use crate::pings::query::FeedLimits;
use crate::pings::repository::{PingStore, SqlitePingStore};
use crate::pings::service::PingService;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub identity: Arc<dyn IdentityProvider>,
    pub feed: Arc<FeedEngine>,
    pub pings: Arc<PingService>,
    pub analytics: Arc<Analytics>,
}

impl AppState {
    /// Wire the SQLite-backed collaborators around one pool.
    pub fn new(db: DbPool, config: Config) -> Self {
        let timeout = Duration::from_millis(config.store.timeout_ms);
        let store: Arc<dyn PingStore> = Arc::new(SqlitePingStore::new(db.clone(), timeout));
        let identity = Arc::new(SqliteIdentityProvider::new(
            db.clone(),
            timeout,
            config.auth.session_hours,
            config.auth.bcrypt_cost,
        ));
        let limits = FeedLimits {
            default_limit: config.feed.default_limit,
            max_limit: config.feed.max_limit,
        };

        Self {
            feed: Arc::new(FeedEngine::new(store.clone(), limits)),
            pings: Arc::new(PingService::new(store.clone())),
            analytics: Arc::new(Analytics::new(store)),
            identity,
            db,
            config,
        }
    }
}
