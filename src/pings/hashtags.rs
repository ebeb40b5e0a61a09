//! Hashtag extraction and SEO text templating.
//!
//! Everything here is a deterministic text transformation with no I/O.

use serde::Serialize;

/// Topic phrases appended to the SEO description for well-known hashtags.
const TOPIC_EXPANSIONS: &[(&str, &str)] = &[
    ("tech", "technology insights, latest developments, and industry trends"),
    ("news", "breaking news, current events, and important updates"),
    ("business", "business strategies, market insights, and entrepreneurial tips"),
    ("health", "health and wellness advice, medical insights, and fitness tips"),
    ("travel", "travel destinations, adventure stories, and vacation planning"),
    ("food", "culinary experiences, recipe ideas, and restaurant recommendations"),
    ("sports", "sports analysis, game highlights, and athletic achievements"),
    ("music", "music reviews, artist spotlights, and concert experiences"),
    ("books", "book recommendations, reading insights, and literary discussions"),
    ("movies", "film reviews, entertainment news, and cinematic experiences"),
    ("education", "learning resources, academic insights, and skill development"),
    ("finance", "financial advice, investment tips, and money management"),
    ("science", "scientific discoveries, research insights, and technological advances"),
    ("art", "artistic creations, creative inspiration, and cultural highlights"),
    ("fashion", "style trends, fashion advice, and wardrobe inspiration"),
];

const EXPANDED_SUFFIX: &str =
    "Discover insights, discussions, and community perspectives on this topic.";
const PLAIN_SUFFIX: &str = "Join the conversation and discover insights from our community.";

const META_TITLE_CHARS: usize = 60;
const META_DESCRIPTION_CHARS: usize = 160;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lowercased hashtags in order of first occurrence, without duplicates.
///
/// A hashtag is the maximal run of word characters right after a `#`.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '#' {
            continue;
        }
        let mut tag = String::new();
        while let Some(&next) = chars.peek() {
            if !is_word_char(next) {
                break;
            }
            tag.extend(next.to_lowercase());
            chars.next();
        }
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    tags
}

/// Decode the comma-joined hashtag encoding (`"#a,#b"`) older rows used.
pub fn parse_legacy_hashtags(encoded: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for raw in encoded.split(',') {
        let tag = raw.trim().trim_start_matches('#').to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

pub fn topic_expansion(tag: &str) -> Option<&'static str> {
    let tag = tag.trim_start_matches('#').to_lowercase();
    TOPIC_EXPANSIONS
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, phrase)| *phrase)
}

/// Body with every `#` removed, followed by a templated suffix. Known
/// hashtags contribute topic phrases; unknown ones are ignored.
pub fn generate_seo_description(text: &str, hashtags: &[String]) -> String {
    let base = text.replace('#', "");
    let expansions: Vec<&str> = hashtags
        .iter()
        .filter_map(|tag| topic_expansion(tag))
        .collect();

    if expansions.is_empty() {
        format!("{}. {}", base, PLAIN_SUFFIX)
    } else {
        format!(
            "{}. Explore {}. {}",
            base,
            expansions.join(", "),
            EXPANDED_SUFFIX
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetaTags {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub og_title: String,
    pub og_description: String,
    pub twitter_card: String,
    pub twitter_title: String,
    pub twitter_description: String,
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub fn generate_meta_tags(text: &str, hashtags: &[String]) -> MetaTags {
    let base = text.replace('#', "");
    let short_title = truncate_chars(&base, META_TITLE_CHARS);
    let title = if short_title.len() < base.len() {
        format!("{}...", short_title)
    } else {
        short_title.to_string()
    };

    let seo = generate_seo_description(text, hashtags);
    let description = truncate_chars(&seo, META_DESCRIPTION_CHARS).to_string();

    MetaTags {
        title,
        keywords: hashtags.join(", "),
        og_title: short_title.to_string(),
        og_description: description.clone(),
        twitter_card: "summary".to_string(),
        twitter_title: short_title.to_string(),
        twitter_description: description.clone(),
        description,
    }
}
