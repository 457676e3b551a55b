//! Feed retrieval.
//!
//! A [`FeedSource`] never fails: network errors, HTTP errors and parse
//! errors are all reported as a bozo [`FetchedFeed`] without entries, so
//! the caller handles every problem through the same path.

use std::time::Duration;

use async_trait::async_trait;
use feed_rs::model;
use feed_rs::parser;
use reqwest::Client;
use tracing::debug;

use super::types::{AuthorDetail, FetchedEntry, FetchedFeed};
use crate::config::FetchConfig;
use crate::{FeedhookError, Result};

/// Source of feed documents.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Retrieve and parse the feed at `url`.
    async fn fetch(&self, url: &str) -> FetchedFeed;
}

/// HTTP feed fetcher with timeouts and a size limit.
pub struct HttpFetcher {
    client: Client,
    max_feed_size: u64,
}

impl HttpFetcher {
    /// Create a fetcher from the `[fetch]` settings.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FeedhookError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
        })
    }

    /// Download a document, returning the final URL and the body.
    async fn download(&self, url: &str) -> std::result::Result<(String, Vec<u8>), String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("failed to fetch feed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("HTTP error: {}", response.status()));
        }

        let final_url = response.url().to_string();
        if final_url != url {
            debug!("Feed {} redirected to {}", url, final_url);
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(format!(
                    "feed too large: {} bytes (max {} bytes)",
                    content_length, self.max_feed_size
                ));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        if bytes.len() as u64 > self.max_feed_size {
            return Err(format!(
                "feed too large: {} bytes (max {} bytes)",
                bytes.len(),
                self.max_feed_size
            ));
        }

        Ok((final_url, bytes.to_vec()))
    }
}

#[async_trait]
impl FeedSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchedFeed {
        debug!("Fetching {}", url);
        match self.download(url).await {
            Ok((final_url, bytes)) => {
                let mut feed = parse_feed(&bytes);
                feed.href = Some(final_url);
                feed
            }
            Err(diagnostic) => FetchedFeed::failed(diagnostic),
        }
    }
}

/// Parse a feed document.
///
/// Entries without an identifier keep `id == None`; no identifier is
/// synthesized from links or titles.
pub fn parse_feed(bytes: &[u8]) -> FetchedFeed {
    let parser = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build();

    let feed = match parser.parse(bytes) {
        Ok(feed) => feed,
        Err(e) => return FetchedFeed::failed(format!("failed to parse feed: {e}")),
    };

    let (author, author_detail) = convert_people(&feed.authors);

    let entries = feed.entries.into_iter().map(convert_entry).collect();

    FetchedFeed {
        bozo: false,
        bozo_exception: None,
        href: None,
        title: feed.title.map(|t| t.content),
        author,
        author_detail,
        entries,
    }
}

fn convert_entry(entry: model::Entry) -> FetchedEntry {
    let (author, author_detail) = convert_people(&entry.authors);
    let link = entry
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or(entry.links.first())
        .map(|l| l.href.clone());
    let content = entry
        .summary
        .map(|t| t.content)
        .or(entry.content.and_then(|c| c.body));

    FetchedEntry {
        id: Some(entry.id).filter(|id| !id.is_empty()),
        published: entry.published,
        updated: entry.updated,
        link,
        title: entry.title.map(|t| t.content),
        author,
        author_detail,
        content,
    }
}

/// Split the first author into a plain string and a name/email detail.
///
/// The plain string is the email address when one is given, otherwise the
/// name.
fn convert_people(people: &[model::Person]) -> (Option<String>, Option<AuthorDetail>) {
    let Some(person) = people.first() else {
        return (None, None);
    };
    let name = Some(person.name.trim().to_string()).filter(|n| !n.is_empty());
    let email = person.email.clone().filter(|e| !e.is_empty());
    let plain = email.clone().or_else(|| name.clone());
    (plain, Some(AuthorDetail { name, email }))
}
