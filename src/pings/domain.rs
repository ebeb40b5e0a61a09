// Domain types - pure values, no I/O
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum ping body length, counted in characters after trimming.
pub const MAX_BODY_CHARS: usize = 280;
pub const MAX_LOCATION_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Ping text cannot be empty")]
    EmptyBody,

    #[error("Ping text must be 280 characters or less (got {0})")]
    BodyTooLong(usize),

    #[error("Location must be 100 characters or less")]
    LocationTooLong,

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Unknown vote type: {0}")]
    UnknownVoteType(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PingId(pub String);

impl PingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    None,
    Event,
    Sale,
    Help,
    Misc,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::None,
        Category::Event,
        Category::Sale,
        Category::Help,
        Category::Misc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::None => "none",
            Category::Event => "event",
            Category::Sale => "sale",
            Category::Help => "help",
            Category::Misc => "misc",
        }
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // Older rows stored "no category" as the empty string
            "" | "none" => Ok(Category::None),
            "event" => Ok(Category::Event),
            "sale" => Ok(Category::Sale),
            "help" => Ok(Category::Help),
            "misc" => Ok(Category::Misc),
            other => Err(DomainError::UnknownCategory(other.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored vote value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Upvote => "upvote",
            VoteType::Downvote => "downvote",
        }
    }

    pub fn weight(&self) -> i64 {
        match self {
            VoteType::Upvote => 1,
            VoteType::Downvote => -1,
        }
    }
}

impl FromStr for VoteType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upvote" => Ok(VoteType::Upvote),
            "downvote" => Ok(VoteType::Downvote),
            other => Err(DomainError::UnknownVoteType(other.to_string())),
        }
    }
}

/// What a voter asks for: set a value, or clear their vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Upvote,
    Downvote,
    Remove,
}

impl VoteAction {
    pub fn vote_type(&self) -> Option<VoteType> {
        match self {
            VoteAction::Upvote => Some(VoteType::Upvote),
            VoteAction::Downvote => Some(VoteType::Downvote),
            VoteAction::Remove => None,
        }
    }
}

/// The requesting user's own vote on a ping, as seen in the feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerVote {
    Upvote,
    Downvote,
    #[default]
    None,
}

impl From<Option<VoteType>> for CallerVote {
    fn from(vote: Option<VoteType>) -> Self {
        match vote {
            Some(VoteType::Upvote) => CallerVote::Upvote,
            Some(VoteType::Downvote) => CallerVote::Downvote,
            None => CallerVote::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter_id: UserId,
    pub vote_type: VoteType,
}

impl Vote {
    pub fn new(voter_id: UserId, vote_type: VoteType) -> Self {
        Self {
            voter_id,
            vote_type,
        }
    }
}

/// Author profile fields resolved through the users join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub id: PingId,
    pub author_id: UserId,
    pub body: String,
    pub category: Category,
    pub location: Option<String>,
    pub is_anonymous: bool,
    pub hashtags: Vec<String>,
    pub seo_description: String,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a ping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPing {
    pub body: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Partial update; absent fields are left untouched. An empty location
/// clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PingUpdate {
    pub body: Option<String>,
    pub category: Option<Category>,
    pub location: Option<String>,
    pub is_anonymous: Option<bool>,
}

/// Trim and length-check a ping body.
pub fn validate_body(raw: &str) -> Result<String, DomainError> {
    let body = raw.trim();
    if body.is_empty() {
        return Err(DomainError::EmptyBody);
    }
    let len = body.chars().count();
    if len > MAX_BODY_CHARS {
        return Err(DomainError::BodyTooLong(len));
    }
    Ok(body.to_string())
}

pub fn normalize_location(raw: Option<&str>) -> Result<Option<String>, DomainError> {
    let Some(location) = raw.map(str::trim).filter(|l| !l.is_empty()) else {
        return Ok(None);
    };
    if location.chars().count() > MAX_LOCATION_CHARS {
        return Err(DomainError::LocationTooLong);
    }
    Ok(Some(location.to_string()))
}
