// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::time::Duration;

use crate::db::{with_conn, StoreError};
use crate::pings::domain::{Author, Category, Ping, PingId, UserId, Vote, VoteType};
use crate::pings::hashtags::parse_legacy_hashtags;
use crate::pings::query::ValidatedQuery;
use crate::state::DbPool;

/// A ping joined with its author profile and every vote cast on it.
#[derive(Debug, Clone, PartialEq)]
pub struct PingRow {
    pub ping: Ping,
    pub author: Author,
    pub votes: Vec<Vote>,
}

/// The columns analytics aggregate over.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRow {
    pub author_id: UserId,
    pub category: Category,
    pub hashtags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Every read and write the ping features need from the relational store.
#[async_trait]
pub trait PingStore: Send + Sync {
    /// One page of joined rows, filtered and ordered as the query says
    async fn fetch_feed(&self, query: &ValidatedQuery) -> Result<Vec<PingRow>, StoreError>;

    /// Exact number of pings matching the query's filters (pagination ignored)
    async fn count(&self, query: &ValidatedQuery) -> Result<u64, StoreError>;

    async fn fetch_one(&self, id: &PingId) -> Result<Option<PingRow>, StoreError>;

    async fn insert(&self, ping: &Ping) -> Result<(), StoreError>;

    /// Overwrite the editable fields. Only matches a row owned by `ping.author_id`.
    async fn update(&self, ping: &Ping) -> Result<bool, StoreError>;

    /// Overwrite several pings in one transaction. Returns how many matched.
    async fn update_many(&self, pings: &[Ping]) -> Result<u64, StoreError>;

    /// Delete a ping owned by `author` together with its votes
    async fn delete(&self, id: &PingId, author: &UserId) -> Result<bool, StoreError>;

    /// Delete every listed ping owned by `author` in one transaction
    async fn delete_many(&self, ids: &[PingId], author: &UserId) -> Result<u64, StoreError>;

    /// Author of each listed ping that exists
    async fn owners(&self, ids: &[PingId]) -> Result<Vec<(PingId, UserId)>, StoreError>;

    /// Set (`Some`) or clear (`None`) a voter's vote as one atomic upsert.
    /// Returns the ping's votes afterwards, or `None` if the ping is gone.
    async fn apply_vote(
        &self,
        ping_id: &PingId,
        voter: &UserId,
        vote: Option<VoteType>,
    ) -> Result<Option<Vec<Vote>>, StoreError>;

    async fn activity(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ActivityRow>, StoreError>;
}

/// Fixed-width UTC timestamps so text comparison matches time order.
pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn decode_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn decode_hashtags(idx: usize, raw: &str) -> rusqlite::Result<Vec<String>> {
    if raw.trim_start().starts_with('[') {
        serde_json::from_str(raw).map_err(|e| conversion_error(idx, e))
    } else {
        Ok(parse_legacy_hashtags(raw))
    }
}

fn encode_hashtags(tags: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(tags)
        .map_err(|e| StoreError::Sql(conversion_error(0, e)))
}

/// Lowercased copy of free text kept beside it for search. SQLite's own
/// `lower()` only folds ASCII.
fn fold_text(text: &str) -> String {
    text.to_lowercase()
}

/// `%term%` with LIKE wildcards in the term escaped by `\`.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

const PING_SELECT: &str = "SELECT p.id, p.user_id, p.body, p.category, p.location, p.is_anonymous,
        p.hashtags, p.seo_description, p.created_at, u.username, u.email
     FROM pings p
     JOIN users u ON u.id = p.user_id";

fn map_ping_row(row: &Row<'_>) -> rusqlite::Result<(Ping, Author)> {
    let author_id = UserId::new(row.get::<_, String>(1)?);
    let category = row
        .get::<_, String>(3)?
        .parse::<Category>()
        .map_err(|e| conversion_error(3, e))?;
    let hashtags = decode_hashtags(6, &row.get::<_, String>(6)?)?;
    let created_at = decode_timestamp(8, &row.get::<_, String>(8)?)?;

    let ping = Ping {
        id: PingId::new(row.get::<_, String>(0)?),
        author_id: author_id.clone(),
        body: row.get(2)?,
        category,
        location: row.get(4)?,
        is_anonymous: row.get(5)?,
        hashtags,
        seo_description: row.get(7)?,
        created_at,
    };
    let author = Author {
        id: author_id,
        username: row.get(9)?,
        email: row.get(10)?,
    };
    Ok((ping, author))
}

/// Translates a validated query into a conjunction of SQL predicates.
struct FeedFilter {
    clauses: Vec<&'static str>,
    params: Vec<Value>,
}

impl FeedFilter {
    fn from_query(query: &ValidatedQuery) -> Self {
        let mut filter = FeedFilter {
            clauses: Vec::new(),
            params: Vec::new(),
        };

        if let Some(term) = &query.term {
            // Body OR any hashtag, nested inside the outer AND
            let pattern = like_pattern(term);
            filter.clauses.push(
                "(p.body_folded LIKE ? ESCAPE '\\'
                  OR EXISTS (SELECT 1 FROM json_each(p.hashtags) h WHERE h.value LIKE ? ESCAPE '\\'))",
            );
            filter.params.push(Value::Text(pattern.clone()));
            filter.params.push(Value::Text(pattern));
        }
        if let Some(category) = query.category {
            filter.clauses.push("p.category = ?");
            filter.params.push(Value::Text(category.as_str().to_string()));
        }
        if let Some(location) = &query.location {
            filter.clauses.push("p.location_folded LIKE ? ESCAPE '\\'");
            filter.params.push(Value::Text(like_pattern(location)));
        }
        if let Some(author) = &query.author_id {
            filter.clauses.push("p.user_id = ?");
            filter.params.push(Value::Text(author.as_str().to_string()));
        }
        if let Some(start) = &query.start {
            filter.clauses.push("p.created_at >= ?");
            filter.params.push(Value::Text(encode_timestamp(start)));
        }
        if let Some(end) = &query.end {
            filter.clauses.push("p.created_at <= ?");
            filter.params.push(Value::Text(encode_timestamp(end)));
        }

        filter
    }

    fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn load_votes(
    conn: &Connection,
    ids: &[PingId],
) -> Result<HashMap<PingId, Vec<Vote>>, StoreError> {
    let mut by_ping: HashMap<PingId, Vec<Vote>> = HashMap::new();
    if ids.is_empty() {
        return Ok(by_ping);
    }

    let sql = format!(
        "SELECT ping_id, user_id, vote_type FROM votes
         WHERE ping_id IN ({})
         ORDER BY created_at, user_id",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter().map(PingId::as_str)), |row| {
            let vote_type = row
                .get::<_, String>(2)?
                .parse::<VoteType>()
                .map_err(|e| conversion_error(2, e))?;
            Ok((
                PingId::new(row.get::<_, String>(0)?),
                Vote::new(UserId::new(row.get::<_, String>(1)?), vote_type),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (ping_id, vote) in rows {
        by_ping.entry(ping_id).or_default().push(vote);
    }
    Ok(by_ping)
}

fn attach_votes(
    conn: &Connection,
    rows: Vec<(Ping, Author)>,
) -> Result<Vec<PingRow>, StoreError> {
    let ids: Vec<PingId> = rows.iter().map(|(ping, _)| ping.id.clone()).collect();
    let mut votes = load_votes(conn, &ids)?;
    Ok(rows
        .into_iter()
        .map(|(ping, author)| PingRow {
            votes: votes.remove(&ping.id).unwrap_or_default(),
            ping,
            author,
        })
        .collect())
}

fn select_votes(conn: &Connection, ping_id: &PingId) -> Result<Vec<Vote>, StoreError> {
    let mut votes = load_votes(conn, std::slice::from_ref(ping_id))?;
    Ok(votes.remove(ping_id).unwrap_or_default())
}

fn write_update(conn: &Connection, ping: &Ping) -> Result<usize, StoreError> {
    let rows = conn.execute(
        "UPDATE pings
         SET body = ?1, category = ?2, location = ?3, is_anonymous = ?4,
             hashtags = ?5, seo_description = ?6, body_folded = ?7, location_folded = ?8
         WHERE id = ?9 AND user_id = ?10",
        params![
            ping.body,
            ping.category.as_str(),
            ping.location,
            ping.is_anonymous,
            encode_hashtags(&ping.hashtags)?,
            ping.seo_description,
            fold_text(&ping.body),
            ping.location.as_deref().map(fold_text),
            ping.id.as_str(),
            ping.author_id.as_str(),
        ],
    )?;
    Ok(rows)
}

/// SQLite implementation
pub struct SqlitePingStore {
    pool: DbPool,
    timeout: Duration,
}

impl SqlitePingStore {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Rewrite rows still holding comma-joined hashtags into the JSON array
    /// form. Returns how many rows changed.
    pub async fn migrate_legacy_hashtags(&self) -> Result<u64, StoreError> {
        with_conn(&self.pool, self.timeout, |conn| {
            let tx = conn.transaction()?;
            let legacy: Vec<(String, String)> = {
                let mut stmt =
                    tx.prepare("SELECT id, hashtags FROM pings WHERE json_valid(hashtags) = 0")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            for (id, encoded) in &legacy {
                let tags = encode_hashtags(&parse_legacy_hashtags(encoded))?;
                tx.execute(
                    "UPDATE pings SET hashtags = ?1 WHERE id = ?2",
                    params![tags, id],
                )?;
            }
            tx.commit()?;

            if !legacy.is_empty() {
                tracing::info!("Migrated {} pings off legacy hashtag encoding", legacy.len());
            }
            Ok(legacy.len() as u64)
        })
        .await
    }

    /// Fill the search columns of rows written before they existed.
    pub async fn backfill_folded_text(&self) -> Result<u64, StoreError> {
        with_conn(&self.pool, self.timeout, |conn| {
            let tx = conn.transaction()?;
            let pending: Vec<(String, String, Option<String>)> = {
                let mut stmt =
                    tx.prepare("SELECT id, body, location FROM pings WHERE body_folded IS NULL")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            for (id, body, location) in &pending {
                tx.execute(
                    "UPDATE pings SET body_folded = ?1, location_folded = ?2 WHERE id = ?3",
                    params![fold_text(body), location.as_deref().map(fold_text), id],
                )?;
            }
            tx.commit()?;

            if !pending.is_empty() {
                tracing::info!("Backfilled search text for {} pings", pending.len());
            }
            Ok(pending.len() as u64)
        })
        .await
    }
}

#[async_trait]
impl PingStore for SqlitePingStore {
    async fn fetch_feed(&self, query: &ValidatedQuery) -> Result<Vec<PingRow>, StoreError> {
        let query = query.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            let filter = FeedFilter::from_query(&query);
            let direction = query.direction.as_sql();
            let sql = format!(
                "{}{} ORDER BY {} {dir}, p.id {dir} LIMIT ? OFFSET ?",
                PING_SELECT,
                filter.where_sql(),
                query.sort.column(),
                dir = direction,
            );

            let mut values = filter.params;
            values.push(Value::Integer(i64::from(query.limit)));
            values.push(Value::Integer(i64::from(query.offset)));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), map_ping_row)?
                .collect::<Result<Vec<_>, _>>()?;

            attach_votes(conn, rows)
        })
        .await
    }

    async fn count(&self, query: &ValidatedQuery) -> Result<u64, StoreError> {
        let query = query.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            let filter = FeedFilter::from_query(&query);
            let sql = format!("SELECT COUNT(*) FROM pings p{}", filter.where_sql());
            let count: i64 =
                conn.query_row(&sql, params_from_iter(filter.params.iter()), |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn fetch_one(&self, id: &PingId) -> Result<Option<PingRow>, StoreError> {
        let id = id.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!("{} WHERE p.id = ?1", PING_SELECT);
            let row = conn
                .query_row(&sql, params![id.as_str()], map_ping_row)
                .optional()?;

            match row {
                Some(row) => Ok(attach_votes(conn, vec![row])?.pop()),
                None => Ok(None),
            }
        })
        .await
    }

    async fn insert(&self, ping: &Ping) -> Result<(), StoreError> {
        let ping = ping.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            conn.execute(
                "INSERT INTO pings (id, user_id, body, category, location, is_anonymous,
                                    hashtags, seo_description, created_at,
                                    body_folded, location_folded)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    ping.id.as_str(),
                    ping.author_id.as_str(),
                    ping.body,
                    ping.category.as_str(),
                    ping.location,
                    ping.is_anonymous,
                    encode_hashtags(&ping.hashtags)?,
                    ping.seo_description,
                    encode_timestamp(&ping.created_at),
                    fold_text(&ping.body),
                    ping.location.as_deref().map(fold_text),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn update(&self, ping: &Ping) -> Result<bool, StoreError> {
        let ping = ping.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            Ok(write_update(conn, &ping)? > 0)
        })
        .await
    }

    async fn update_many(&self, pings: &[Ping]) -> Result<u64, StoreError> {
        let pings = pings.to_vec();
        with_conn(&self.pool, self.timeout, move |conn| {
            let tx = conn.transaction()?;
            let mut updated = 0u64;
            for ping in &pings {
                updated += write_update(&tx, ping)? as u64;
            }
            tx.commit()?;
            Ok(updated)
        })
        .await
    }

    async fn delete(&self, id: &PingId, author: &UserId) -> Result<bool, StoreError> {
        let (id, author) = (id.clone(), author.clone());
        with_conn(&self.pool, self.timeout, move |conn| {
            let tx = conn.transaction()?;
            let rows = tx.execute(
                "DELETE FROM pings WHERE id = ?1 AND user_id = ?2",
                params![id.as_str(), author.as_str()],
            )?;
            if rows > 0 {
                tx.execute("DELETE FROM votes WHERE ping_id = ?1", params![id.as_str()])?;
            }
            tx.commit()?;
            Ok(rows > 0)
        })
        .await
    }

    async fn delete_many(&self, ids: &[PingId], author: &UserId) -> Result<u64, StoreError> {
        let (ids, author) = (ids.to_vec(), author.clone());
        with_conn(&self.pool, self.timeout, move |conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0u64;
            for id in &ids {
                let rows = tx.execute(
                    "DELETE FROM pings WHERE id = ?1 AND user_id = ?2",
                    params![id.as_str(), author.as_str()],
                )?;
                if rows > 0 {
                    tx.execute("DELETE FROM votes WHERE ping_id = ?1", params![id.as_str()])?;
                    deleted += 1;
                }
            }
            tx.commit()?;
            Ok(deleted)
        })
        .await
    }

    async fn owners(&self, ids: &[PingId]) -> Result<Vec<(PingId, UserId)>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = ids.to_vec();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!(
                "SELECT id, user_id FROM pings WHERE id IN ({})",
                placeholders(ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let owners = stmt
                .query_map(params_from_iter(ids.iter().map(PingId::as_str)), |row| {
                    Ok((
                        PingId::new(row.get::<_, String>(0)?),
                        UserId::new(row.get::<_, String>(1)?),
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(owners)
        })
        .await
    }

    async fn apply_vote(
        &self,
        ping_id: &PingId,
        voter: &UserId,
        vote: Option<VoteType>,
    ) -> Result<Option<Vec<Vote>>, StoreError> {
        let (ping_id, voter) = (ping_id.clone(), voter.clone());
        with_conn(&self.pool, self.timeout, move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists: bool = tx.query_row(
                "SELECT COUNT(*) > 0 FROM pings WHERE id = ?1",
                params![ping_id.as_str()],
                |row| row.get(0),
            )?;
            if !exists {
                return Ok(None);
            }

            match vote {
                Some(vote_type) => {
                    tx.execute(
                        "INSERT INTO votes (ping_id, user_id, vote_type, created_at)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(ping_id, user_id) DO UPDATE SET
                           vote_type = excluded.vote_type,
                           created_at = excluded.created_at",
                        params![
                            ping_id.as_str(),
                            voter.as_str(),
                            vote_type.as_str(),
                            encode_timestamp(&Utc::now()),
                        ],
                    )?;
                }
                None => {
                    tx.execute(
                        "DELETE FROM votes WHERE ping_id = ?1 AND user_id = ?2",
                        params![ping_id.as_str(), voter.as_str()],
                    )?;
                }
            }

            let votes = select_votes(&tx, &ping_id)?;
            tx.commit()?;
            Ok(Some(votes))
        })
        .await
    }

    async fn activity(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ActivityRow>, StoreError> {
        with_conn(&self.pool, self.timeout, move |conn| {
            let cutoff = since.map(|ts| encode_timestamp(&ts));
            let mut stmt = conn.prepare(
                "SELECT user_id, category, hashtags, created_at FROM pings
                 WHERE ?1 IS NULL OR created_at >= ?1
                 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map(params![cutoff], |row| {
                    let category = row
                        .get::<_, String>(1)?
                        .parse::<Category>()
                        .map_err(|e| conversion_error(1, e))?;
                    Ok(ActivityRow {
                        author_id: UserId::new(row.get::<_, String>(0)?),
                        category,
                        hashtags: decode_hashtags(2, &row.get::<_, String>(2)?)?,
                        created_at: decode_timestamp(3, &row.get::<_, String>(3)?)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}
