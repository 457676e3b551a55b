//! feedhook - a personal feed aggregator
//!
//! Polls configured RSS/Atom feeds, merges new entries into a SQLite store
//! and runs user supplied hook commands when new items arrive.

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod hook;
pub mod logging;

pub use config::{Config, Configuration, HookCommands};
pub use db::Database;
pub use error::{FeedhookError, Result, UpdateError};
pub use feed::{
    FeedSource, HttpFetcher, Item, LastUpdateRecord, MergeOutcome, UpdateSummary, Updater,
};
pub use hook::{CommandRunner, HookError, HookInvoker, ProcessRunner};
