//! `raw-feed`: dump what the fetcher sees for a feed.

use std::io::Write;

use crate::config::Configuration;
use crate::feed::{format_datetime, AuthorDetail, FeedSource, FetchedEntry};
use crate::{FeedhookError, Result};

/// Resolve `target` to a URL: http(s) URLs are used as is, anything else
/// is looked up as a configured feed key.
pub fn resolve_target(target: &str, configuration: Option<&Configuration>) -> Result<String> {
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(target.to_string());
    }
    configuration
        .and_then(|c| c.get_feed(target))
        .map(|feed| feed.url.clone())
        .ok_or_else(|| FeedhookError::Usage(format!("unknown feed '{target}'")))
}

/// Fetch `url` and print the feed fields, and with `all` every entry.
pub async fn raw_feed(
    source: &dyn FeedSource,
    url: &str,
    all: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let feed = source.fetch(url).await;

    writeln!(out, "url: {url}")?;
    writeln!(out, "href: {}", show(&feed.href))?;
    writeln!(out, "bozo: {}", feed.bozo)?;
    if let Some(exception) = &feed.bozo_exception {
        writeln!(out, "bozo_exception: {exception}")?;
    }
    writeln!(out, "title: {}", show(&feed.title))?;
    writeln!(out, "author: {}", show(&feed.author))?;
    writeln!(out, "author_detail: {}", show_detail(&feed.author_detail))?;
    writeln!(out, "entries: {}", feed.entries.len())?;

    if all {
        for (i, entry) in feed.entries.iter().enumerate() {
            write_entry(out, i, entry)?;
        }
    }

    Ok(())
}

fn write_entry(out: &mut dyn Write, index: usize, entry: &FetchedEntry) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "entry {index}:")?;
    writeln!(out, "  id: {}", show(&entry.id))?;
    writeln!(
        out,
        "  published: {}",
        show(&entry.published.as_ref().map(format_datetime))
    )?;
    writeln!(
        out,
        "  updated: {}",
        show(&entry.updated.as_ref().map(format_datetime))
    )?;
    writeln!(out, "  link: {}", show(&entry.link))?;
    writeln!(out, "  title: {}", show(&entry.title))?;
    writeln!(out, "  author: {}", show(&entry.author))?;
    writeln!(out, "  author_detail: {}", show_detail(&entry.author_detail))?;
    writeln!(out, "  content: {}", show(&entry.content))?;
    Ok(())
}

fn show(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

fn show_detail(detail: &Option<AuthorDetail>) -> String {
    match detail {
        Some(detail) => format!(
            "name={} email={}",
            show(&detail.name),
            show(&detail.email)
        ),
        None => "-".to_string(),
    }
}
