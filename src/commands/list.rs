//! `list`: show configured feeds and, optionally, their items.

use std::io::Write;

use crate::config::Configuration;
use crate::feed::{format_datetime, ItemRepository, LastUpdateRepository};
use crate::{Database, Result};

/// Print every configured feed with its last update time.
///
/// With `articles`, each feed is followed by its stored items, newest first.
pub async fn list(
    configuration: &Configuration,
    db: &Database,
    articles: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let mut conn = db.acquire().await?;

    for feed in configuration.feeds() {
        let last_update = LastUpdateRepository::new(&mut conn)
            .get(&feed.key)
            .await?
            .map(|record| format_datetime(&record.updated))
            .unwrap_or_else(|| "unknown".to_string());

        writeln!(
            out,
            "[{}] {} <{}>  (last update {})",
            feed.key, feed.title, feed.url, last_update
        )?;

        if !articles {
            continue;
        }

        for item in ItemRepository::new(&mut conn).list_by_feed(&feed.key).await? {
            writeln!(
                out,
                "  {} <{}>\n    by {}, at {}",
                item.title.as_deref().unwrap_or("(untitled)"),
                item.link.as_deref().unwrap_or(""),
                item.author.as_deref().unwrap_or("unknown"),
                format_datetime(&item.published)
            )?;
        }
    }

    Ok(())
}
