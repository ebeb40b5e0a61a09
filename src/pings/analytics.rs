use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::error::AppResult;
use crate::pings::repository::{ActivityRow, PingStore};

const TOP_HASHTAGS: usize = 10;
const TRENDING_HASHTAGS: usize = 20;
const TRENDING_WINDOW_DAYS: i64 = 7;
const ACTIVITY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentAnalytics {
    pub category_distribution: BTreeMap<String, u64>,
    pub trending_hashtags: Vec<TagCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserActivity {
    /// Pings per UTC day, keyed `YYYY-MM-DD`
    pub daily_activity: BTreeMap<String, u64>,
    pub total_pings: u64,
    pub active_users: u64,
}

/// Hashtags by descending count, ties alphabetical, at most `top`.
pub fn rank_hashtags(rows: &[ActivityRow], top: usize) -> Vec<TagCount> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for row in rows {
        for tag in &row.hashtags {
            *counts.entry(tag.as_str()).or_default() += 1;
        }
    }

    let mut ranked: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    ranked.truncate(top);
    ranked
}

pub fn category_distribution(rows: &[ActivityRow]) -> BTreeMap<String, u64> {
    let mut distribution: BTreeMap<String, u64> = BTreeMap::new();
    for row in rows {
        *distribution
            .entry(row.category.as_str().to_string())
            .or_default() += 1;
    }
    distribution
}

pub fn summarize_activity(rows: &[ActivityRow]) -> UserActivity {
    let mut daily_activity: BTreeMap<String, u64> = BTreeMap::new();
    let mut authors = HashSet::new();
    for row in rows {
        let day = row.created_at.format("%Y-%m-%d").to_string();
        *daily_activity.entry(day).or_default() += 1;
        authors.insert(&row.author_id);
    }

    UserActivity {
        daily_activity,
        total_pings: rows.len() as u64,
        active_users: authors.len() as u64,
    }
}

/// Read-side aggregations over all stored pings.
pub struct Analytics {
    store: Arc<dyn PingStore>,
}

impl Analytics {
    pub fn new(store: Arc<dyn PingStore>) -> Self {
        Self { store }
    }

    pub async fn content_analytics(&self) -> AppResult<ContentAnalytics> {
        let rows = self.store.activity(None).await?;
        Ok(ContentAnalytics {
            category_distribution: category_distribution(&rows),
            trending_hashtags: rank_hashtags(&rows, TOP_HASHTAGS),
        })
    }

    pub async fn trending_topics(&self, now: DateTime<Utc>) -> AppResult<Vec<TagCount>> {
        let since = now - Duration::days(TRENDING_WINDOW_DAYS);
        let rows = self.store.activity(Some(since)).await?;
        Ok(rank_hashtags(&rows, TRENDING_HASHTAGS))
    }

    /// Activity since `since`, or over the last 30 days when absent.
    pub async fn user_activity(&self, since: Option<DateTime<Utc>>) -> AppResult<UserActivity> {
        let since = since.unwrap_or_else(|| Utc::now() - Duration::days(ACTIVITY_WINDOW_DAYS));
        let rows = self.store.activity(Some(since)).await?;
        Ok(summarize_activity(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pings::domain::{Category, UserId};
    use chrono::TimeZone;

    fn row(author: &str, category: Category, tags: &[&str], day: u32) -> ActivityRow {
        ActivityRow {
            author_id: UserId::new(author),
            category,
            hashtags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: Utc.with_ymd_and_hms(2024, 6, day, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn ranking_breaks_ties_alphabetically() {
        let rows = vec![
            row("a", Category::None, &["zeta", "alpha"], 1),
            row("b", Category::None, &["zeta", "beta"], 1),
            row("c", Category::None, &["beta"], 2),
        ];
        let ranked = rank_hashtags(&rows, 10);
        let tags: Vec<(&str, u64)> = ranked.iter().map(|t| (t.tag.as_str(), t.count)).collect();
        assert_eq!(tags, vec![("beta", 2), ("zeta", 2), ("alpha", 1)]);

        assert_eq!(rank_hashtags(&rows, 1).len(), 1);
    }

    #[test]
    fn categories_are_counted() {
        let rows = vec![
            row("a", Category::Event, &[], 1),
            row("a", Category::Event, &[], 1),
            row("b", Category::Sale, &[], 1),
        ];
        let dist = category_distribution(&rows);
        assert_eq!(dist.get("event"), Some(&2));
        assert_eq!(dist.get("sale"), Some(&1));
        assert_eq!(dist.get("help"), None);
    }

    #[test]
    fn activity_groups_by_day_and_counts_authors() {
        let rows = vec![
            row("a", Category::None, &[], 1),
            row("a", Category::None, &[], 1),
            row("b", Category::None, &[], 3),
        ];
        let activity = summarize_activity(&rows);
        assert_eq!(activity.total_pings, 3);
        assert_eq!(activity.active_users, 2);
        assert_eq!(activity.daily_activity.get("2024-06-01"), Some(&2));
        assert_eq!(activity.daily_activity.get("2024-06-03"), Some(&1));
    }

    #[test]
    fn empty_rows_summarize_to_zero() {
        let activity = summarize_activity(&[]);
        assert_eq!(activity.total_pings, 0);
        assert_eq!(activity.active_users, 0);
        assert!(activity.daily_activity.is_empty());
        assert!(rank_hashtags(&[], 10).is_empty());
    }
}
