pub mod analytics;
pub mod domain;
pub mod feed;
pub mod hashtags;
pub mod query;
pub mod repository;
pub mod service;
pub mod votes;

pub use domain::{Category, Ping, PingId, UserId, VoteAction, VoteType};
pub use feed::{FeedEngine, FeedItem, FeedPage};
pub use query::{FeedLimits, FeedQuery};
