//! Feed updating for feedhook.
//!
//! This module provides:
//! - Feed retrieval behind the [`FeedSource`] trait
//! - Scheduling of feed refreshes
//! - Merging fetched entries into the item store
//! - The update run that ties these together and fires hooks

pub mod fetcher;
pub mod merger;
pub mod repository;
pub mod scheduler;
pub mod types;
pub mod updater;

pub use fetcher::{parse_feed, FeedSource, HttpFetcher};
pub use merger::{merge, MergeOutcome};
pub use repository::{FeedRepository, ItemRepository, LastUpdateRepository};
pub use scheduler::is_due;
pub use types::{
    format_datetime, parse_datetime, AuthorDetail, Feed, FetchedEntry, FetchedFeed, Item,
    LastUpdateRecord, NewItem,
};
pub use updater::{UpdateSummary, Updater, ON_NEW_ITEM, ON_UPDATE};
