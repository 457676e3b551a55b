//! Configuration module for feedhook.
//!
//! The configuration file is TOML with a `[global]` table, an optional
//! `[fetch]` table and one `[feeds.<key>]` table per subscribed feed.
//! Paths inside the file are resolved relative to the file itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;

use crate::feed::Feed;
use crate::{FeedhookError, Result};

/// Update interval used when a feed does not configure one.
pub const DEFAULT_UPDATE_INTERVAL: &str = "1 hour";

/// Global settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Path to the SQLite database file, relative to the configuration file.
    pub database: String,
    /// Optional log file, relative to the configuration file.
    #[serde(default)]
    pub log_file: Option<String>,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seconds a hook may run before it is killed.
    #[serde(default = "default_hook_timeout")]
    pub hook_timeout_secs: u64,
    /// Hook run once for every new item of any feed.
    #[serde(default)]
    pub on_new_item: Option<String>,
    /// Hook run once per update run when any feed received new items.
    #[serde(default)]
    pub on_update: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_hook_timeout() -> u64 {
    300
}

/// HTTP fetch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum feed document size in bytes.
    #[serde(default = "default_max_feed_size")]
    pub max_feed_size_bytes: u64,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_feed_size() -> u64 {
    5 * 1024 * 1024
}

fn default_user_agent() -> String {
    concat!("feedhook/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            max_feed_size_bytes: default_max_feed_size(),
            user_agent: default_user_agent(),
        }
    }
}

/// A `[feeds.<key>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Feed document URL.
    pub url: String,
    /// Display title; defaults to the feed key.
    #[serde(default)]
    pub title: Option<String>,
    /// Refresh interval such as "30 minutes" or "1 day, 12 hours".
    #[serde(default = "default_update_interval")]
    pub update_interval: String,
    /// Keep processing entries of a malformed document.
    #[serde(default)]
    pub accept_bozo: bool,
    /// Hook run for every new item of this feed.
    #[serde(default)]
    pub on_new_item: Option<String>,
    /// Hook run once when this feed received new items.
    #[serde(default)]
    pub on_update: Option<String>,
}

fn default_update_interval() -> String {
    DEFAULT_UPDATE_INTERVAL.to_string()
}

/// Raw configuration file contents.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub global: GlobalConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub feeds: BTreeMap<String, FeedConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FeedhookError::Io)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FeedhookError::Config(format!("config parse error: {e}")))
    }

    /// Validate settings that serde cannot check.
    pub fn validate(&self) -> Result<()> {
        if self.global.database.trim().is_empty() {
            return Err(FeedhookError::Config(
                "'global.database' must not be empty".to_string(),
            ));
        }
        if self.global.hook_timeout_secs == 0 {
            return Err(FeedhookError::Config(
                "'global.hook_timeout_secs' must be positive".to_string(),
            ));
        }
        for (key, feed) in &self.feeds {
            validate_feed_key(key)?;
            validate_feed_url(key, &feed.url)?;
            parse_update_interval(&feed.update_interval).map_err(|e| {
                FeedhookError::Config(format!("feed '{key}' has an invalid update interval: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Hook command templates attached to a feed or to the global section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookCommands {
    pub on_new_item: Option<String>,
    pub on_update: Option<String>,
}

/// Validated configuration bound to the file it was loaded from.
#[derive(Debug, Clone)]
pub struct Configuration {
    path: PathBuf,
    config: Config,
    feeds: Vec<Feed>,
    global_hooks: HookCommands,
}

impl Configuration {
    /// Load and validate the configuration file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FeedhookError::Config(format!(
                "configuration file '{}' does not exist",
                path.display()
            )));
        }
        let config = Config::load(path)?;
        Self::from_config(path, config)
    }

    /// Validate an already parsed configuration located at `path`.
    pub fn from_config<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        config.validate()?;

        let mut feeds = Vec::with_capacity(config.feeds.len());
        for (key, feed) in &config.feeds {
            let update_interval = parse_update_interval(&feed.update_interval)
                .map_err(|e| FeedhookError::Config(format!("feed '{key}': {e}")))?;
            feeds.push(Feed {
                key: key.clone(),
                title: feed.title.clone().unwrap_or_else(|| key.clone()),
                url: feed.url.clone(),
                update_interval,
                accept_bozo: feed.accept_bozo,
                hooks: HookCommands {
                    on_new_item: feed.on_new_item.clone(),
                    on_update: feed.on_update.clone(),
                },
            });
        }

        let global_hooks = HookCommands {
            on_new_item: config.global.on_new_item.clone(),
            on_update: config.global.on_update.clone(),
        };

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            config,
            feeds,
            global_hooks,
        })
    }

    /// Path of the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw configuration values.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Configured feeds, ordered by key.
    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn get_feed(&self, key: &str) -> Option<&Feed> {
        self.feeds.iter().find(|feed| feed.key == key)
    }

    /// Hooks from the `[global]` table.
    pub fn global_hooks(&self) -> &HookCommands {
        &self.global_hooks
    }

    /// Directory containing the configuration file.
    ///
    /// Hooks run with this as their working directory.
    pub fn base_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Resolve a path relative to the configuration file.
    pub fn relative_path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.base_dir().join(path)
    }

    pub fn database_file(&self) -> PathBuf {
        self.relative_path(&self.config.global.database)
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.config
            .global
            .log_file
            .as_ref()
            .map(|file| self.relative_path(file))
    }
}

fn validate_feed_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(FeedhookError::Config(format!(
            "invalid feed key '{key}': only letters, digits, '-' and '_' are allowed"
        )))
    }
}

fn validate_feed_url(key: &str, url: &str) -> Result<()> {
    let parsed = url::Url::parse(url)
        .map_err(|e| FeedhookError::Config(format!("feed '{key}' has an invalid url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(FeedhookError::Config(format!(
            "feed '{key}' uses unsupported url scheme '{scheme}'"
        ))),
    }
}

/// Parse an update interval such as `"1 hour"` or `"2 days, 3 hours"`.
///
/// Accepted units are weeks, days, hours, minutes and seconds, in singular
/// or plural form. A repeated unit replaces its earlier amount, so
/// `"1 hour, 2 hours"` is two hours. The total must be positive.
pub fn parse_update_interval(input: &str) -> std::result::Result<Duration, String> {
    let normalized = input.replace(',', " ");
    let parts: Vec<&str> = normalized.split_whitespace().collect();

    if parts.is_empty() {
        return Err("interval is empty".to_string());
    }
    if parts.len() % 2 != 0 {
        return Err(format!("cannot parse interval '{input}'"));
    }

    // Amount per unit, keyed by the unit length in seconds.
    let mut amounts: BTreeMap<i64, i64> = BTreeMap::new();
    for pair in parts.chunks(2) {
        let amount: i64 = pair[0]
            .parse()
            .map_err(|_| format!("invalid amount '{}' in interval '{input}'", pair[0]))?;
        let unit_secs = match pair[1].to_lowercase().as_str() {
            "week" | "weeks" => 7 * 24 * 60 * 60,
            "day" | "days" => 24 * 60 * 60,
            "hour" | "hours" => 60 * 60,
            "minute" | "minutes" => 60,
            "second" | "seconds" => 1,
            other => return Err(format!("unknown time unit '{other}' in interval '{input}'")),
        };
        amounts.insert(unit_secs, amount);
    }

    let total_secs = amounts
        .iter()
        .try_fold(0i64, |total, (unit_secs, amount)| {
            amount
                .checked_mul(*unit_secs)
                .and_then(|secs| total.checked_add(secs))
        })
        .ok_or_else(|| format!("interval '{input}' is out of range"))?;
    let total = Duration::try_seconds(total_secs)
        .ok_or_else(|| format!("interval '{input}' is out of range"))?;

    if total <= Duration::zero() {
        return Err(format!("interval '{input}' must be positive"));
    }
    Ok(total)
}
