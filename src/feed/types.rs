//! Feed data types.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::config::HookCommands;

/// Timestamp format used for every stored date.
pub const DB_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A configured feed subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    /// Unique slug identifying the feed.
    pub key: String,
    /// Display title.
    pub title: String,
    /// Feed document URL.
    pub url: String,
    /// Minimum time between two update attempts.
    pub update_interval: Duration,
    /// Process entries even when the document is malformed.
    pub accept_bozo: bool,
    /// Feed-scoped hook commands.
    pub hooks: HookCommands,
}

/// A stored feed entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: i64,
    pub feed: String,
    pub guid: String,
    pub published: DateTime<Utc>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
}

/// Data for inserting a new item.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub feed: String,
    pub guid: String,
    pub published: DateTime<Utc>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
}

impl NewItem {
    /// Build the stored item once the store has assigned its id.
    pub fn into_item(self, id: i64) -> Item {
        Item {
            id,
            feed: self.feed,
            guid: self.guid,
            published: self.published,
            link: self.link,
            title: self.title,
            author: self.author,
            content: self.content,
        }
    }
}

/// Outcome of the most recent update attempt for a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct LastUpdateRecord {
    pub feed: String,
    pub updated: DateTime<Utc>,
    pub success: bool,
}

/// Name and email of a feed or entry author.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorDetail {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Feed document as returned by a [`FeedSource`](super::FeedSource).
#[derive(Debug, Clone, Default)]
pub struct FetchedFeed {
    /// The document could not be retrieved or is malformed.
    pub bozo: bool,
    /// Diagnostic for a bozo document.
    pub bozo_exception: Option<String>,
    /// URL the document was finally served from, after redirects.
    pub href: Option<String>,
    pub title: Option<String>,
    /// Plain author string of the feed.
    pub author: Option<String>,
    pub author_detail: Option<AuthorDetail>,
    pub entries: Vec<FetchedEntry>,
}

impl FetchedFeed {
    /// A failed fetch: bozo with no entries.
    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            bozo: true,
            bozo_exception: Some(diagnostic.into()),
            ..Default::default()
        }
    }
}

/// One entry of a fetched feed.
#[derive(Debug, Clone, Default)]
pub struct FetchedEntry {
    pub id: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub link: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub author_detail: Option<AuthorDetail>,
    pub content: Option<String>,
}

/// Format a timestamp the way it is stored in the database.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DB_DATETIME_FORMAT).to_string()
}

/// Parse a stored timestamp (SQLite datetime or RFC 3339).
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, DB_DATETIME_FORMAT) {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    None
}
