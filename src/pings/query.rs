//! Feed query values and their validation.
//!
//! A [`FeedQuery`] is what callers build; [`FeedQuery::validate`] turns it
//! into a [`ValidatedQuery`] the store can execute without further checks.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::pings::domain::{Category, UserId};

/// A query the caller must fix before retrying. Never sent to the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {message}")]
pub struct QueryError {
    pub field: &'static str,
    pub message: String,
}

impl QueryError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Whitelisted sort columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    CreatedAt,
}

impl SortField {
    pub fn parse(name: &str) -> Result<Self, QueryError> {
        match name.trim() {
            "created_at" | "timestamp" => Ok(SortField::CreatedAt),
            other => Err(QueryError::new(
                "sort",
                format!("cannot sort by '{}'; allowed: created_at", other),
            )),
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "p.created_at",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedQuery {
    pub term: Option<String>,
    pub category: Option<Category>,
    pub location: Option<String>,
    pub author_id: Option<UserId>,
    pub date_range: Option<DateRange>,
    pub sort: Option<SortSpec>,
    pub pagination: Pagination,
    /// Ask the store for an exact match count as well
    pub include_total: bool,
}

impl FeedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.term = Some(term.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn author(mut self, author_id: UserId) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn between(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.date_range = Some(DateRange { start, end });
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.pagination.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.pagination.offset = Some(offset);
        self
    }

    pub fn with_total(mut self) -> Self {
        self.include_total = true;
        self
    }

    pub fn validate(&self, limits: &FeedLimits) -> Result<ValidatedQuery, QueryError> {
        let term = non_blank(self.term.as_deref()).map(|t| t.to_lowercase());
        let location = non_blank(self.location.as_deref()).map(|l| l.to_lowercase());

        let (start, end) = match &self.date_range {
            Some(range) => (range.start, range.end),
            None => (None, None),
        };
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(QueryError::new(
                    "date_range",
                    "start must not be after end",
                ));
            }
        }

        let (sort, direction) = match &self.sort {
            Some(sort) => (SortField::parse(&sort.field)?, sort.direction),
            None => (SortField::default(), SortDirection::default()),
        };

        let limit = match self.pagination.limit {
            None => limits.default_limit,
            Some(l) if l <= 0 => {
                return Err(QueryError::new("limit", "must be a positive integer"));
            }
            Some(l) if l > i64::from(limits.max_limit) => {
                return Err(QueryError::new(
                    "limit",
                    format!("must not exceed {}", limits.max_limit),
                ));
            }
            Some(l) => l as u32,
        };

        let offset = match self.pagination.offset {
            None => 0,
            Some(o) if o < 0 => {
                return Err(QueryError::new("offset", "must not be negative"));
            }
            Some(o) => u32::try_from(o)
                .map_err(|_| QueryError::new("offset", "is too large"))?,
        };

        Ok(ValidatedQuery {
            term,
            category: self.category,
            location,
            author_id: self.author_id.clone(),
            start,
            end,
            sort,
            direction,
            limit,
            offset,
            include_total: self.include_total,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A query that passed validation. Text filters are trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    pub term: Option<String>,
    pub category: Option<Category>,
    pub location: Option<String>,
    pub author_id: Option<UserId>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub sort: SortField,
    pub direction: SortDirection,
    pub limit: u32,
    pub offset: u32,
    pub include_total: bool,
}

/// Flat, string-typed form of a feed query as it arrives in a URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedParams {
    #[serde(alias = "q")]
    pub term: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    #[serde(alias = "user_id")]
    pub author_id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub sort: Option<String>,
    pub direction: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub count: Option<String>,
}

/// Integers stay strings until here so a malformed value is reported
/// against its field.
fn parse_integer(raw: Option<&str>, field: &'static str) -> Result<Option<i64>, QueryError> {
    non_blank(raw)
        .map(|v| {
            v.parse::<i64>()
                .map_err(|_| QueryError::new(field, format!("expected an integer, got '{}'", v)))
        })
        .transpose()
}

fn parse_flag(raw: Option<&str>, field: &'static str) -> Result<bool, QueryError> {
    match non_blank(raw) {
        None => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
        Some(v) => Err(QueryError::new(
            field,
            format!("expected 'true' or 'false', got '{}'", v),
        )),
    }
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// RFC 3339 timestamps are taken as-is; bare dates cover the whole day, so
/// `end=2024-05-01` includes everything posted on May 1st.
fn parse_bound(raw: &str, field: &'static str, bound: Bound) -> Result<DateTime<Utc>, QueryError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        QueryError::new(field, "expected an RFC 3339 timestamp or YYYY-MM-DD date")
    })?;
    let time = match bound {
        Bound::Start => NaiveTime::MIN,
        Bound::End => NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN),
    };
    Ok(date.and_time(time).and_utc())
}

impl TryFrom<FeedParams> for FeedQuery {
    type Error = QueryError;

    fn try_from(params: FeedParams) -> Result<Self, Self::Error> {
        let category = non_blank(params.category.as_deref())
            .map(|c| {
                c.parse::<Category>()
                    .map_err(|e| QueryError::new("category", e.to_string()))
            })
            .transpose()?;

        let start = non_blank(params.start.as_deref())
            .map(|s| parse_bound(s, "start", Bound::Start))
            .transpose()?;
        let end = non_blank(params.end.as_deref())
            .map(|s| parse_bound(s, "end", Bound::End))
            .transpose()?;
        let date_range = (start.is_some() || end.is_some()).then_some(DateRange { start, end });

        let direction = match non_blank(params.direction.as_deref()) {
            None => SortDirection::default(),
            Some(d) if d.eq_ignore_ascii_case("asc") => SortDirection::Asc,
            Some(d) if d.eq_ignore_ascii_case("desc") => SortDirection::Desc,
            Some(other) => {
                return Err(QueryError::new(
                    "direction",
                    format!("expected 'asc' or 'desc', got '{}'", other),
                ));
            }
        };
        let sort = match non_blank(params.sort.as_deref()) {
            Some(field) => Some(SortSpec {
                field: field.to_string(),
                direction,
            }),
            None if params.direction.is_some() => Some(SortSpec {
                field: "created_at".to_string(),
                direction,
            }),
            None => None,
        };

        Ok(FeedQuery {
            term: params.term,
            category,
            location: params.location,
            author_id: non_blank(params.author_id.as_deref()).map(UserId::new),
            date_range,
            sort,
            pagination: Pagination {
                limit: parse_integer(params.limit.as_deref(), "limit")?,
                offset: parse_integer(params.offset.as_deref(), "offset")?,
            },
            include_total: parse_flag(params.count.as_deref(), "count")?,
        })
    }
}
