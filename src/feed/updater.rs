//! Update orchestration.
//!
//! An update run walks the selected feeds one after another. Each feed is
//! scheduled, fetched, merged and has its hooks run inside one database
//! transaction that is committed before the next feed starts. Failures of
//! one feed, and hook failures, are logged and never stop the run; store
//! failures do.
//!
//! Once every feed is done the global `on_update` hook runs once for all
//! feeds that received new items.

use chrono::{DateTime, Utc};
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn, Dispatch};

use super::fetcher::FeedSource;
use super::merger::{merge, MergeOutcome};
use super::repository::LastUpdateRepository;
use super::scheduler::is_due;
use super::types::{format_datetime, Feed, Item};
use crate::config::Configuration;
use crate::hook::{feed_hook_name, global_hook_name, HookInvoker, ListValue, Placeholders};
use crate::{Database, FeedhookError, Result};

/// Hook name for per-item hooks.
pub const ON_NEW_ITEM: &str = "on_new_item";

/// Hook name for per-feed and global update hooks.
pub const ON_UPDATE: &str = "on_update";

/// What happened during an update run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSummary {
    /// Feeds selected for the run.
    pub considered: usize,
    /// Feeds skipped because they were not due.
    pub skipped: usize,
    /// Feeds fetched and merged successfully.
    pub refreshed: usize,
    /// Keys of feeds whose update failed.
    pub failed: Vec<String>,
    /// Keys of feeds that received new items, in processing order.
    pub touched: Vec<String>,
    /// Newly stored items across all feeds.
    pub new_items: Vec<Item>,
    /// Number of hooks that failed.
    pub hook_failures: usize,
}

/// Items a feed contributed to the run.
struct TouchedFeed<'f> {
    feed: &'f Feed,
    items: Vec<Item>,
}

/// Runs updates for a configuration.
pub struct Updater<'a> {
    config: &'a Configuration,
    db: &'a Database,
    source: &'a dyn FeedSource,
    hooks: HookInvoker,
    log_sink: Option<Dispatch>,
}

impl<'a> Updater<'a> {
    pub fn new(
        config: &'a Configuration,
        db: &'a Database,
        source: &'a dyn FeedSource,
        hooks: HookInvoker,
    ) -> Self {
        Self {
            config,
            db,
            source,
            hooks,
            log_sink: None,
        }
    }

    /// Send all log events of a run, hooks included, to `dispatch`
    /// instead of the process-wide subscriber.
    pub fn with_log_sink(mut self, dispatch: Dispatch) -> Self {
        self.log_sink = Some(dispatch);
        self
    }

    /// Update the feeds named by `keys`, or every feed when `keys` is empty.
    ///
    /// Unknown keys are rejected before anything is fetched. With `force`
    /// every selected feed is fetched regardless of its schedule.
    pub async fn update(&self, keys: &[String], force: bool) -> Result<UpdateSummary> {
        self.dispatch(self.run(keys, force, None)).await
    }

    /// Like [`update`](Self::update), but with a fixed clock for scheduling
    /// and for the recorded attempt times.
    pub async fn update_at(
        &self,
        keys: &[String],
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<UpdateSummary> {
        self.dispatch(self.run(keys, force, Some(now))).await
    }

    async fn dispatch<F>(&self, run: F) -> F::Output
    where
        F: std::future::Future,
    {
        match &self.log_sink {
            Some(dispatch) => run.with_subscriber(dispatch.clone()).await,
            None => run.await,
        }
    }

    fn select_feeds(&self, keys: &[String]) -> Result<Vec<&'a Feed>> {
        if keys.is_empty() {
            return Ok(self.config.feeds().iter().collect());
        }

        let unknown: Vec<&str> = keys
            .iter()
            .filter(|key| self.config.get_feed(key).is_none())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(FeedhookError::Usage(format!(
                "unknown feed(s): {}",
                unknown.join(", ")
            )));
        }

        let mut selected: Vec<&'a Feed> = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(feed) = self.config.get_feed(key) {
                if !selected.iter().any(|f| f.key == feed.key) {
                    selected.push(feed);
                }
            }
        }
        Ok(selected)
    }

    async fn run(
        &self,
        keys: &[String],
        force: bool,
        clock: Option<DateTime<Utc>>,
    ) -> Result<UpdateSummary> {
        let feeds = self.select_feeds(keys)?;
        let mut summary = UpdateSummary {
            considered: feeds.len(),
            ..Default::default()
        };
        let mut touched: Vec<TouchedFeed<'a>> = Vec::new();

        for feed in feeds {
            let now = clock.unwrap_or_else(Utc::now);
            let mut tx = self.db.begin().await?;

            let last_update = LastUpdateRepository::new(&mut tx).get(&feed.key).await?;
            if !is_due(feed, last_update.as_ref(), now, force) {
                debug!("Feed {} is not due for update", feed.key);
                summary.skipped += 1;
                continue;
            }

            info!("Updating feed {}", feed.key);
            let fetched = self.source.fetch(&feed.url).await;

            match merge(&mut tx, feed, &fetched, now).await? {
                MergeOutcome::Failed(e) => {
                    error!("{}", e);
                    summary.failed.push(e.feed().to_string());
                }
                MergeOutcome::Merged(items) => {
                    summary.refreshed += 1;
                    if items.is_empty() {
                        debug!("Feed {} has no new items", feed.key);
                    } else {
                        info!("Feed {} updated: {} new item(s)", feed.key, items.len());
                        summary.hook_failures += self.run_feed_hooks(feed, &items).await;
                        touched.push(TouchedFeed { feed, items });
                    }
                }
            }

            tx.commit().await?;
        }

        if !touched.is_empty() {
            summary.hook_failures += self.run_global_update_hook(&touched).await;
        }

        for entry in touched {
            summary.touched.push(entry.feed.key.clone());
            summary.new_items.extend(entry.items);
        }

        info!(
            "Update finished: {} refreshed, {} failed, {} skipped, {} new item(s)",
            summary.refreshed,
            summary.failed.len(),
            summary.skipped,
            summary.new_items.len()
        );
        Ok(summary)
    }

    /// Run per-item hooks for every new item, then the feed's `on_update`.
    ///
    /// Returns the number of failed hooks.
    async fn run_feed_hooks(&self, feed: &Feed, items: &[Item]) -> usize {
        let global = self.config.global_hooks();
        let feed_item_hook = feed_hook_name(&feed.key, ON_NEW_ITEM);
        let global_item_hook = global_hook_name(ON_NEW_ITEM);
        let mut failures = 0;

        for item in items {
            let placeholders = item_placeholders(feed, item);
            let env = item_environment(feed, item);

            for (name, template) in [
                (&feed_item_hook, feed.hooks.on_new_item.as_deref()),
                (&global_item_hook, global.on_new_item.as_deref()),
            ] {
                failures += self.invoke(name, template, &placeholders, &env).await;
            }
        }

        let placeholders = feed_placeholders(feed, items);
        let env = feed_environment(feed, items);
        failures += self
            .invoke(
                &feed_hook_name(&feed.key, ON_UPDATE),
                feed.hooks.on_update.as_deref(),
                &placeholders,
                &env,
            )
            .await;

        failures
    }

    async fn run_global_update_hook(&self, touched: &[TouchedFeed<'_>]) -> usize {
        let placeholders = global_placeholders(touched);
        let env = global_environment(touched);
        self.invoke(
            &global_hook_name(ON_UPDATE),
            self.config.global_hooks().on_update.as_deref(),
            &placeholders,
            &env,
        )
        .await
    }

    /// Invoke one hook and log its failure. Returns 1 on failure, else 0.
    async fn invoke(
        &self,
        hook: &str,
        template: Option<&str>,
        placeholders: &Placeholders,
        env: &[(String, String)],
    ) -> usize {
        let working_dir = self.config.base_dir();
        match self
            .hooks
            .invoke(hook, &working_dir, template, placeholders, env)
            .await
        {
            Ok(()) => 0,
            Err(e) => {
                warn!("{}", e);
                1
            }
        }
    }
}

fn item_placeholders(feed: &Feed, item: &Item) -> Placeholders {
    Placeholders::new()
        .scalar("id", item.id.to_string())
        .scalar("feed", feed.key.as_str())
        .scalar("feed_title", feed.title.as_str())
        .scalar("published", format_datetime(&item.published))
        .optional("link", item.link.as_deref())
        .optional("title", item.title.as_deref())
        .optional("author", item.author.as_deref())
}

fn item_environment(feed: &Feed, item: &Item) -> Vec<(String, String)> {
    env_vars([
        ("ITEM_ID", item.id.to_string()),
        ("ITEM_FEED", feed.key.clone()),
        ("ITEM_FEED_TITLE", feed.title.clone()),
        ("ITEM_PUBLISHED", format_datetime(&item.published)),
        ("ITEM_LINK", item.link.clone().unwrap_or_default()),
        ("ITEM_TITLE", item.title.clone().unwrap_or_default()),
        ("ITEM_AUTHOR", item.author.clone().unwrap_or_default()),
        ("ITEM_CONTENT", item.content.clone().unwrap_or_default()),
    ])
}

/// Lists shared by the per-feed and global update hooks.
struct ItemLists {
    ids: ListValue,
    links: ListValue,
    titles: ListValue,
    count: usize,
}

impl ItemLists {
    fn collect<'i>(items: impl Iterator<Item = &'i Item>) -> Self {
        let mut ids = Vec::new();
        let mut links = Vec::new();
        let mut titles = Vec::new();
        for item in items {
            ids.push(item.id.to_string());
            links.push(item.link.clone().unwrap_or_default());
            titles.push(item.title.clone().unwrap_or_default());
        }
        Self {
            count: ids.len(),
            ids: ListValue::new(ids),
            links: ListValue::new(links),
            titles: ListValue::new(titles).with_joiner("\n"),
        }
    }

    fn placeholders(&self, placeholders: Placeholders) -> Placeholders {
        placeholders
            .scalar("count", self.count.to_string())
            .list("item_ids", self.ids.clone())
            .list("item_links", self.links.clone())
            .list("item_titles", self.titles.clone())
    }

    fn environment(&self) -> [(&'static str, String); 4] {
        [
            ("ITEM_COUNT", self.count.to_string()),
            ("ITEM_IDS", self.ids.to_string()),
            ("ITEM_LINKS", self.links.to_string()),
            ("ITEM_TITLES", self.titles.to_string()),
        ]
    }
}

fn feed_placeholders(feed: &Feed, items: &[Item]) -> Placeholders {
    let base = Placeholders::new()
        .scalar("feed", feed.key.as_str())
        .scalar("feed_title", feed.title.as_str());
    ItemLists::collect(items.iter()).placeholders(base)
}

fn feed_environment(feed: &Feed, items: &[Item]) -> Vec<(String, String)> {
    let mut env = env_vars([
        ("FEED_KEY", feed.key.clone()),
        ("FEED_TITLE", feed.title.clone()),
    ]);
    env.extend(env_vars(ItemLists::collect(items.iter()).environment()));
    env
}

fn global_placeholders(touched: &[TouchedFeed<'_>]) -> Placeholders {
    let (keys, titles) = touched_names(touched);
    let base = Placeholders::new()
        .list("feeds", keys)
        .list("feed_titles", titles);
    ItemLists::collect(touched.iter().flat_map(|t| t.items.iter())).placeholders(base)
}

fn global_environment(touched: &[TouchedFeed<'_>]) -> Vec<(String, String)> {
    let (keys, titles) = touched_names(touched);
    let mut env = env_vars([
        ("FEED_KEYS", keys.to_string()),
        ("FEED_TITLES", titles.to_string()),
    ]);
    env.extend(env_vars(
        ItemLists::collect(touched.iter().flat_map(|t| t.items.iter())).environment(),
    ));
    env
}

fn touched_names(touched: &[TouchedFeed<'_>]) -> (ListValue, ListValue) {
    let keys = ListValue::new(touched.iter().map(|t| t.feed.key.clone()));
    let titles = ListValue::new(touched.iter().map(|t| t.feed.title.clone())).with_joiner("\n");
    (keys, titles)
}

fn env_vars<const N: usize>(vars: [(&str, String); N]) -> Vec<(String, String)> {
    vars.into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
