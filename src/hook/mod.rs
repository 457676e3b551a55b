//! Hook execution.
//!
//! Hooks are user supplied command templates run when feeds receive new
//! items. [`command`] turns a template into an argument vector and
//! [`runner`] executes it.

pub mod command;
pub mod runner;

pub use command::{build_command, tokenize, HookValue, ListValue, Placeholders};
pub use runner::{CommandRunner, HookInvocation, HookInvoker, ProcessRunner};

use thiserror::Error;

/// Failure to build or run a hook.
///
/// Hook failures are logged by the caller and never abort an update run.
#[derive(Error, Debug)]
pub enum HookError {
    /// The template cannot be split into words.
    #[error("{hook} hook command is invalid: {reason}")]
    InvalidCommand { hook: String, reason: String },

    #[error("{hook} hook command contains unknown placeholder '{placeholder}'")]
    UnknownPlaceholder { hook: String, placeholder: String },

    /// `{*name}` used on a scalar placeholder.
    #[error("{hook} hook command expands non-expandable placeholder '{placeholder}'")]
    NotExpandable { hook: String, placeholder: String },

    #[error("Failed to run {hook} hook: hook returned non-zero exit status {code}")]
    ExitCode { hook: String, code: i32 },

    /// The process ended without an exit code, e.g. killed by a signal.
    #[error("Failed to run {hook} hook: hook was terminated")]
    Terminated { hook: String },

    /// The process could not be started or waited on.
    #[error("Failed to run {hook} hook: {source}")]
    Launch {
        hook: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run {hook} hook: hook did not finish within {timeout_secs} seconds")]
    TimedOut { hook: String, timeout_secs: u64 },
}

/// Name of a feed-scoped hook as it appears in log messages.
pub fn feed_hook_name(feed_key: &str, hook: &str) -> String {
    format!("'{feed_key}' {hook}")
}

/// Name of a hook from the `[global]` table.
pub fn global_hook_name(hook: &str) -> String {
    format!("global {hook}")
}
