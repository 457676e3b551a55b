//! Error types for feedhook.

use thiserror::Error;

pub use crate::hook::HookError;

/// Common error type for feedhook.
#[derive(Error, Debug)]
pub enum FeedhookError {
    /// Database error.
    ///
    /// Errors from sqlx are automatically converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error.
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid command line usage, such as an unknown feed key.
    #[error("{0}")]
    Usage(String),

    /// A single feed failed to update.
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// A hook could not be built or did not run successfully.
    #[error(transparent)]
    Hook(#[from] HookError),
}

impl From<sqlx::Error> for FeedhookError {
    fn from(e: sqlx::Error) -> Self {
        FeedhookError::Database(e.to_string())
    }
}

/// Per-feed update failure.
///
/// These never abort a run; the feed is recorded as failed and the next
/// feed is processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// The feed document is malformed and the feed does not accept bozo data.
    #[error("Feed '{feed}' contains malformed data: {diagnostic}")]
    BozoRejected { feed: String, diagnostic: String },

    /// An entry carries no identifier.
    #[error("Feed '{feed}' contains an item without an identifier")]
    MissingIdentifier { feed: String },

    /// An entry has neither a published nor an updated timestamp.
    #[error("Feed '{feed}' item '{guid}' has no publication or update timestamp")]
    MissingTimestamp { feed: String, guid: String },
}

impl UpdateError {
    /// Key of the feed that failed.
    pub fn feed(&self) -> &str {
        match self {
            UpdateError::BozoRejected { feed, .. }
            | UpdateError::MissingIdentifier { feed }
            | UpdateError::MissingTimestamp { feed, .. } => feed,
        }
    }
}

/// Result type alias for feedhook operations.
pub type Result<T> = std::result::Result<T, FeedhookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = FeedhookError::Config("missing 'global.database'".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: missing 'global.database'"
        );
    }

    #[test]
    fn test_usage_error_display() {
        let err = FeedhookError::Usage("unknown feed 'nope'".to_string());
        assert_eq!(err.to_string(), "unknown feed 'nope'");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FeedhookError = io_err.into();
        assert!(matches!(err, FeedhookError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_update_error_display() {
        let err = UpdateError::BozoRejected {
            feed: "news".to_string(),
            diagnostic: "unexpected end of file".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Feed 'news' contains malformed data: unexpected end of file"
        );
        assert_eq!(err.feed(), "news");

        let err = UpdateError::MissingTimestamp {
            feed: "news".to_string(),
            guid: "urn:1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Feed 'news' item 'urn:1' has no publication or update timestamp"
        );
    }

    #[test]
    fn test_update_error_is_transparent() {
        let err: FeedhookError = UpdateError::MissingIdentifier {
            feed: "blog".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Feed 'blog' contains an item without an identifier"
        );
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }

        fn sample_err() -> Result<i32> {
            Err(FeedhookError::Usage("test".to_string()))
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
