//! Feed repositories for feedhook.
//!
//! Repositories borrow a connection rather than the pool so the same code
//! runs on a plain pooled connection or inside a per-feed transaction.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::warn;

use super::types::{format_datetime, parse_datetime, Feed, Item, LastUpdateRecord, NewItem};
use crate::{FeedhookError, Result};

/// Parse a stored timestamp. An unreadable value is logged and read as the
/// current time.
fn stored_datetime(column: &str, value: &str) -> DateTime<Utc> {
    parse_datetime(value).unwrap_or_else(|| {
        warn!("Unreadable {} timestamp '{}', using the current time", column, value);
        Utc::now()
    })
}

/// Row type for a stored item.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ItemRow {
    id: i64,
    feed: String,
    guid: String,
    published: String,
    link: Option<String>,
    title: Option<String>,
    author: Option<String>,
    content: Option<String>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            feed: row.feed,
            guid: row.guid,
            published: stored_datetime("item.published", &row.published),
            link: row.link,
            title: row.title,
            author: row.author,
            content: row.content,
        }
    }
}

/// Row type for a last-update record.
#[derive(Debug, Clone, sqlx::FromRow)]
struct LastUpdateRow {
    feed: String,
    updated: String,
    success: bool,
}

impl From<LastUpdateRow> for LastUpdateRecord {
    fn from(row: LastUpdateRow) -> Self {
        LastUpdateRecord {
            feed: row.feed,
            updated: stored_datetime("last_update.updated", &row.updated),
            success: row.success,
        }
    }
}

/// Repository for the `feed` table.
pub struct FeedRepository<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> FeedRepository<'a> {
    /// Create a new repository instance.
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Insert the feed or refresh its title and url.
    pub async fn upsert(&mut self, feed: &Feed) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feed (key, title, url) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET title = excluded.title, url = excluded.url
            "#,
        )
        .bind(&feed.key)
        .bind(&feed.title)
        .bind(&feed.url)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| FeedhookError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Repository for the `item` table.
pub struct ItemRepository<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> ItemRepository<'a> {
    /// Create a new repository instance.
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Insert an item unless its guid is already stored.
    ///
    /// Returns the stored item, or `None` when the guid was a duplicate.
    pub async fn create_or_ignore(&mut self, item: NewItem) -> Result<Option<Item>> {
        let result = sqlx::query(
            r#"
            INSERT INTO item (feed, guid, published, link, title, author, content)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guid) DO NOTHING
            "#,
        )
        .bind(&item.feed)
        .bind(&item.guid)
        .bind(format_datetime(&item.published))
        .bind(&item.link)
        .bind(&item.title)
        .bind(&item.author)
        .bind(&item.content)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| FeedhookError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(item.into_item(result.last_insert_rowid())))
    }

    /// List the items of a feed, newest first.
    pub async fn list_by_feed(&mut self, feed: &str) -> Result<Vec<Item>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, feed, guid, published, link, title, author, content
            FROM item
            WHERE feed = ?
            ORDER BY published DESC, id DESC
            "#,
        )
        .bind(feed)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| FeedhookError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Item::from).collect())
    }
}

/// Repository for the `last_update` table.
pub struct LastUpdateRepository<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> LastUpdateRepository<'a> {
    /// Create a new repository instance.
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Get the record of a feed, if it was ever attempted.
    pub async fn get(&mut self, feed: &str) -> Result<Option<LastUpdateRecord>> {
        let row = sqlx::query_as::<_, LastUpdateRow>(
            "SELECT feed, updated, success FROM last_update WHERE feed = ?",
        )
        .bind(feed)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(|e| FeedhookError::Database(e.to_string()))?;

        Ok(row.map(LastUpdateRecord::from))
    }

    /// Record an update attempt, replacing any previous record.
    pub async fn upsert(&mut self, feed: &str, updated: DateTime<Utc>, success: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO last_update (feed, updated, success) VALUES (?, ?, ?)
            ON CONFLICT(feed) DO UPDATE SET updated = excluded.updated, success = excluded.success
            "#,
        )
        .bind(feed)
        .bind(format_datetime(&updated))
        .bind(success)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| FeedhookError::Database(e.to_string()))?;
        Ok(())
    }
}
