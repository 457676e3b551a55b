//! Test helpers for update integration tests.
//!
//! Provides a scripted feed source, a recording hook runner and builders
//! for fetched feeds and configurations.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use feedhook::feed::{FetchedEntry, FetchedFeed};
use feedhook::hook::HookInvocation;
use feedhook::{CommandRunner, Config, Configuration, FeedSource, HookError, HookInvoker};

/// Feed source serving canned documents and recording requested URLs.
#[derive(Default)]
pub struct ScriptedSource {
    feeds: Mutex<HashMap<String, FetchedFeed>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `feed` for `url` from now on.
    pub fn serve(&self, url: &str, feed: FetchedFeed) {
        self.feeds.lock().unwrap().insert(url.to_string(), feed);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch(&self, url: &str) -> FetchedFeed {
        self.requests.lock().unwrap().push(url.to_string());
        self.feeds
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchedFeed::failed("HTTP error: 404 Not Found"))
    }
}

/// Hook runner that records invocations instead of spawning processes.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<HookInvocation>>,
    failing: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every invocation of `hook` exit with status 1.
    pub fn fail_hook(&self, hook: &str) {
        self.failing.lock().unwrap().push(hook.to_string());
    }

    pub fn calls(&self) -> Vec<HookInvocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Hook names in invocation order.
    pub fn hook_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.hook).collect()
    }

    pub fn calls_for(&self, hook: &str) -> Vec<HookInvocation> {
        self.calls()
            .into_iter()
            .filter(|call| call.hook == hook)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &HookInvocation) -> Result<(), HookError> {
        self.calls.lock().unwrap().push(invocation.clone());
        if self.failing.lock().unwrap().contains(&invocation.hook) {
            return Err(HookError::ExitCode {
                hook: invocation.hook.clone(),
                code: 1,
            });
        }
        Ok(())
    }
}

pub fn invoker(runner: &Arc<RecordingRunner>) -> HookInvoker {
    HookInvoker::new(runner.clone())
}

/// 2024-01-01 at the given hour, UTC.
pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
}

pub fn entry(id: &str, hour: u32) -> FetchedEntry {
    FetchedEntry {
        id: Some(id.to_string()),
        published: Some(at(hour)),
        link: Some(format!("https://example.com/{id}")),
        title: Some(format!("Title {id}")),
        ..Default::default()
    }
}

pub fn fetched(title: &str, entries: Vec<FetchedEntry>) -> FetchedFeed {
    FetchedFeed {
        title: Some(title.to_string()),
        entries,
        ..Default::default()
    }
}

pub fn bozo(diagnostic: &str) -> FetchedFeed {
    FetchedFeed::failed(diagnostic)
}

/// Build a validated configuration as if loaded from `/srv/feeds/feeds.toml`.
pub fn configuration(toml: &str) -> Configuration {
    let config = Config::parse(toml).unwrap();
    Configuration::from_config("/srv/feeds/feeds.toml", config).unwrap()
}
