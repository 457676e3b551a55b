//! Merging fetched entries into the store.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use super::repository::{FeedRepository, ItemRepository, LastUpdateRepository};
use super::types::{AuthorDetail, Feed, FetchedEntry, FetchedFeed, Item, NewItem};
use crate::error::UpdateError;
use crate::{FeedhookError, Result};

/// Result of merging one feed.
#[derive(Debug)]
pub enum MergeOutcome {
    /// The feed merged cleanly; holds the newly stored items in feed order.
    Merged(Vec<Item>),
    /// The feed was rejected part way. Items stored before the failure stay
    /// stored but are not reported.
    Failed(UpdateError),
}

impl MergeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MergeOutcome::Merged(_))
    }
}

/// Merge a fetched document into the store and record the attempt.
///
/// The last-update record is written for every outcome, stamped with
/// `attempted_at`. Store errors are returned as `Err` and leave the
/// record unwritten.
pub async fn merge(
    conn: &mut SqliteConnection,
    feed: &Feed,
    fetched: &FetchedFeed,
    attempted_at: DateTime<Utc>,
) -> Result<MergeOutcome> {
    FeedRepository::new(&mut *conn).upsert(feed).await?;

    let outcome = match insert_entries(&mut *conn, feed, fetched).await {
        Ok(items) => MergeOutcome::Merged(items),
        Err(FeedhookError::Update(e)) => MergeOutcome::Failed(e),
        Err(e) => return Err(e),
    };

    LastUpdateRepository::new(&mut *conn)
        .upsert(&feed.key, attempted_at, outcome.is_success())
        .await?;

    Ok(outcome)
}

async fn insert_entries(
    conn: &mut SqliteConnection,
    feed: &Feed,
    fetched: &FetchedFeed,
) -> Result<Vec<Item>> {
    if fetched.bozo && !feed.accept_bozo {
        return Err(UpdateError::BozoRejected {
            feed: feed.key.clone(),
            diagnostic: fetched
                .bozo_exception
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        }
        .into());
    }

    let mut repo = ItemRepository::new(conn);
    let mut new_items = Vec::new();

    for entry in &fetched.entries {
        let guid = entry
            .id
            .clone()
            .ok_or_else(|| UpdateError::MissingIdentifier {
                feed: feed.key.clone(),
            })?;

        let published =
            entry
                .published
                .or(entry.updated)
                .ok_or_else(|| UpdateError::MissingTimestamp {
                    feed: feed.key.clone(),
                    guid: guid.clone(),
                })?;

        let new_item = NewItem {
            feed: feed.key.clone(),
            guid,
            published,
            link: entry.link.clone(),
            title: entry.title.clone(),
            author: resolve_author(entry, fetched),
            content: entry.content.clone(),
        };

        if let Some(item) = repo.create_or_ignore(new_item).await? {
            debug!("New item {} in feed {}", item.guid, feed.key);
            new_items.push(item);
        }
    }

    Ok(new_items)
}

/// Pick the first available author: entry detail name, entry author,
/// feed detail name, feed author.
fn resolve_author(entry: &FetchedEntry, feed: &FetchedFeed) -> Option<String> {
    let detail_name = |detail: &Option<AuthorDetail>| detail.as_ref().and_then(|d| d.name.clone());

    detail_name(&entry.author_detail)
        .or_else(|| entry.author.clone())
        .or_else(|| detail_name(&feed.author_detail))
        .or_else(|| feed.author.clone())
}
