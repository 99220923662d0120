//! Error types for coursenotes.
//!
//! Library crates use [`CourseNotesError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// User-facing message returned when the notes service answers with garbage.
pub const UPSTREAM_RETRY_MESSAGE: &str = "Server error. Try again in a few minutes.";

/// Top-level error type for all coursenotes operations.
#[derive(Debug, thiserror::Error)]
pub enum CourseNotesError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A required external-service URL is not configured.
    #[error("no endpoint was provided for {service}")]
    MisconfiguredEndpoint { service: String },

    /// A course (or other single resource) does not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// A content item referenced by key does not exist in the store.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// A course or usage key string could not be parsed.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// A timestamp string could not be parsed.
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    /// The notes service returned a body we could not interpret.
    #[error("{}", UPSTREAM_RETRY_MESSAGE)]
    UpstreamParse { detail: String },

    /// Network/HTTP error talking to the notes service.
    #[error("network error: {0}")]
    Network(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed course tree, bad flag value, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CourseNotesError>;

impl CourseNotesError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an invalid-key error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an upstream parse error, keeping the detail for logs only.
    pub fn upstream(detail: impl Into<String>) -> Self {
        Self::UpstreamParse {
            detail: detail.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Status code the HTTP boundary should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) | Self::ItemNotFound(_) => 404,
            Self::InvalidKey { .. } | Self::InvalidTimestamp(_) | Self::Validation { .. } => 400,
            Self::UpstreamParse { .. } | Self::Network(_) => 502,
            Self::Config { .. }
            | Self::MisconfiguredEndpoint { .. }
            | Self::Storage(_)
            | Self::Io { .. } => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CourseNotesError::config("missing notes url");
        assert_eq!(err.to_string(), "config error: missing notes url");

        let err = CourseNotesError::MisconfiguredEndpoint {
            service: "EdxNotes".into(),
        };
        assert_eq!(err.to_string(), "no endpoint was provided for EdxNotes");
    }

    #[test]
    fn upstream_error_hides_detail() {
        let err = CourseNotesError::upstream("expected value at line 1 column 1");
        assert_eq!(err.to_string(), UPSTREAM_RETRY_MESSAGE);
        assert!(matches!(err, CourseNotesError::UpstreamParse { ref detail } if detail.contains("line 1")));
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(CourseNotesError::NotFound("foo/bar/baz".into()).http_status(), 404);
        assert_eq!(CourseNotesError::upstream("bad").http_status(), 502);
        assert_eq!(
            CourseNotesError::MisconfiguredEndpoint {
                service: "EdxNotes".into()
            }
            .http_status(),
            500
        );
    }
}
