//! `add`: subscribe to new feeds.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{error, warn};

use crate::config::Configuration;
use crate::feed::FeedSource;
use crate::{FeedhookError, Result};

static SLUG_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_-]+").expect("slug separator pattern is valid"));

/// Turn a title into a feed key: lowercase ASCII letters, digits, `-` and
/// `_`, with every other run of characters collapsed into one `-`.
pub fn slugify(s: &str) -> String {
    SLUG_SEPARATOR
        .replace_all(&s.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Return `candidate`, or the first free `candidate--N` (N from 2).
pub fn find_free_name(candidate: &str, taken: &BTreeSet<String>) -> String {
    if !taken.contains(candidate) {
        return candidate.to_string();
    }
    (2..)
        .map(|i| format!("{candidate}--{i}"))
        .find(|name| !taken.contains(name))
        .unwrap_or_else(|| candidate.to_string())
}

fn feed_snippet(key: &str, url: &str, title: &str) -> String {
    format!(
        "[feeds.{key}]\nurl = {}\ntitle = {}\n",
        toml::Value::String(url.to_string()),
        toml::Value::String(title.to_string())
    )
}

/// Flags of the `add` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Add feeds whose URL is already configured.
    pub force: bool,
    /// Keep the given URL even when the server redirects elsewhere.
    pub no_redirect: bool,
    /// Append to the configuration file instead of printing.
    pub write_config: bool,
}

/// Fetch each URL and produce a `[feeds.<key>]` table for it.
///
/// Malformed feeds are refused. Already configured URLs are skipped unless
/// `force` is set. A redirected feed is recorded under its new URL unless
/// `no_redirect` is set. With `write_config` the tables are appended to the
/// configuration file, otherwise they are written to `out`, which works
/// without a configuration. Returns the keys that were added.
pub async fn add_feeds(
    configuration: Option<&Configuration>,
    source: &dyn FeedSource,
    urls: &[String],
    options: AddOptions,
    out: &mut dyn Write,
) -> Result<Vec<String>> {
    if options.write_config && configuration.is_none() {
        return Err(FeedhookError::Config(
            "cannot write added feeds: configuration does not exist".to_string(),
        ));
    }

    let known = configuration.map(|c| c.feeds()).unwrap_or_default();
    let mut taken: BTreeSet<String> = known.iter().map(|feed| feed.key.clone()).collect();
    let mut snippets = Vec::new();
    let mut added = Vec::new();

    for url in urls {
        if let Some(existing) = known.iter().find(|feed| &feed.url == url) {
            if !options.force {
                warn!(
                    "Feed {} is already configured as '{}', skipping",
                    url, existing.key
                );
                continue;
            }
        }

        let fetched = source.fetch(url).await;
        if fetched.bozo {
            error!(
                "Feed {} contains malformed data: {}",
                url,
                fetched.bozo_exception.as_deref().unwrap_or("unknown error")
            );
            continue;
        }

        let feed_url = match fetched.href.as_deref() {
            Some(href) if href != url.as_str() && !options.no_redirect => {
                writeln!(out, "Using redirection URL '{href}'")?;
                href.to_string()
            }
            _ => url.clone(),
        };

        let title = fetched
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "untitled".to_string());
        let slug = slugify(&title);
        let slug = if slug.is_empty() { "feed".to_string() } else { slug };
        let key = find_free_name(&slug, &taken);

        snippets.push(feed_snippet(&key, &feed_url, &title));
        taken.insert(key.clone());
        added.push(key);
    }

    if snippets.is_empty() {
        return Ok(added);
    }

    match configuration.filter(|_| options.write_config) {
        Some(configuration) => {
            let mut file = OpenOptions::new().append(true).open(configuration.path())?;
            for snippet in &snippets {
                write!(file, "\n{snippet}")?;
            }
            writeln!(
                out,
                "Added {} feed(s) to '{}'",
                added.len(),
                configuration.path().display()
            )?;
        }
        None => {
            for snippet in &snippets {
                writeln!(out, "{snippet}")?;
            }
        }
    }

    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::feed::FetchedFeed;
    use async_trait::async_trait;

    struct TitledSource;

    #[async_trait]
    impl FeedSource for TitledSource {
        async fn fetch(&self, url: &str) -> FetchedFeed {
            match url {
                "https://broken.example.com/" => FetchedFeed::failed("not xml"),
                "https://untitled.example.com/" => FetchedFeed::default(),
                "http://moved.example.com/rss" => FetchedFeed {
                    href: Some("https://moved.example.com/feed.xml".to_string()),
                    title: Some("Moved".to_string()),
                    ..Default::default()
                },
                _ => FetchedFeed {
                    title: Some("Rust \"Blog\"!".to_string()),
                    ..Default::default()
                },
            }
        }
    }

    const CONFIG: &str = r#"[global]
database = "feeds.db"

[feeds.rust-blog]
url = "https://blog.rust-lang.org/feed.xml"
"#;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  --Already-slugged_name--  "), "already-slugged_name");
        assert_eq!(slugify("Ünïcode Tïtle"), "n-code-t-tle");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_find_free_name() {
        let taken: BTreeSet<String> = ["news", "news--2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(find_free_name("blog", &taken), "blog");
        assert_eq!(find_free_name("news", &taken), "news--3");
    }

    #[test]
    fn test_feed_snippet_quotes_values() {
        let snippet = feed_snippet("k", "https://x/", "A \"quoted\" title");
        let parsed: toml::Table = toml::from_str(&snippet).unwrap();
        assert_eq!(
            parsed["feeds"]["k"]["title"].as_str(),
            Some("A \"quoted\" title")
        );
    }

    #[tokio::test]
    async fn test_add_prints_snippets() {
        let configuration =
            Configuration::from_config("feeds.toml", Config::parse(CONFIG).unwrap()).unwrap();
        let urls = vec![
            "https://example.com/rust.xml".to_string(),
            "https://broken.example.com/".to_string(),
            "https://untitled.example.com/".to_string(),
            "https://blog.rust-lang.org/feed.xml".to_string(),
        ];

        let mut out = Vec::new();
        let added = add_feeds(
            Some(&configuration),
            &TitledSource,
            &urls,
            AddOptions::default(),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(added, vec!["rust-blog--2", "untitled"]);
        let output = String::from_utf8(out).unwrap();
        assert!(output.contains("[feeds.rust-blog--2]\nurl = \"https://example.com/rust.xml\"\n"));
        assert!(output.contains("[feeds.untitled]"));
        assert!(!output.contains("broken"));
    }

    #[tokio::test]
    async fn test_add_writes_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeds.toml");
        std::fs::write(&path, CONFIG).unwrap();
        let configuration = Configuration::load(&path).unwrap();

        let urls = vec!["https://blog.rust-lang.org/feed.xml".to_string()];
        let mut out = Vec::new();
        let options = AddOptions {
            force: true,
            write_config: true,
            ..Default::default()
        };
        let added = add_feeds(Some(&configuration), &TitledSource, &urls, options, &mut out)
            .await
            .unwrap();
        assert_eq!(added, vec!["rust-blog--2"]);

        let reloaded = Configuration::load(&path).unwrap();
        assert_eq!(reloaded.feeds().len(), 2);
        assert_eq!(
            reloaded.get_feed("rust-blog--2").unwrap().title,
            "Rust \"Blog\"!"
        );
    }

    #[tokio::test]
    async fn test_add_uses_redirect_target() {
        let urls = vec!["http://moved.example.com/rss".to_string()];

        let mut out = Vec::new();
        let added = add_feeds(None, &TitledSource, &urls, AddOptions::default(), &mut out)
            .await
            .unwrap();
        assert_eq!(added, vec!["moved"]);
        let output = String::from_utf8(out).unwrap();
        assert!(output.contains("Using redirection URL 'https://moved.example.com/feed.xml'\n"));
        assert!(output.contains("url = \"https://moved.example.com/feed.xml\""));

        let options = AddOptions {
            no_redirect: true,
            ..Default::default()
        };
        let mut out = Vec::new();
        add_feeds(None, &TitledSource, &urls, options, &mut out)
            .await
            .unwrap();
        let output = String::from_utf8(out).unwrap();
        assert!(!output.contains("Using redirection URL"));
        assert!(output.contains("url = \"http://moved.example.com/rss\""));
    }

    #[tokio::test]
    async fn test_add_without_configuration() {
        let urls = vec!["https://example.com/rust.xml".to_string()];

        let mut out = Vec::new();
        let added = add_feeds(None, &TitledSource, &urls, AddOptions::default(), &mut out)
            .await
            .unwrap();
        assert_eq!(added, vec!["rust-blog"]);
        assert!(String::from_utf8(out).unwrap().contains("[feeds.rust-blog]"));

        let options = AddOptions {
            write_config: true,
            ..Default::default()
        };
        let mut out = Vec::new();
        let err = add_feeds(None, &TitledSource, &urls, options, &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedhookError::Config(_)));
        assert!(out.is_empty());
    }
}
