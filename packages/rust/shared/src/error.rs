//! Error types for insertster.
//!
//! Library crates use [`InsertsterError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! A query that cannot be placed is *not* an error: it is recorded as
//! [`Disposition::Unplaced`](crate::Disposition) and the run continues.

use std::path::PathBuf;

/// Top-level error type for all insertster operations.
#[derive(Debug, thiserror::Error)]
pub enum InsertsterError {
    /// Unknown strategy name or invalid threshold. Detected before traversal.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed tree or query-result input.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// An insertion would break the tree invariants. Halts the batch but
    /// keeps the insertions already made.
    #[error("structural error: {message}")]
    Structural { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Output validation or serialization error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, InsertsterError>;

impl InsertsterError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a structural error from any displayable message.
    pub fn structural(msg: impl Into<String>) -> Self {
        Self::Structural {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = InsertsterError::config("unknown score function 'f3'");
        assert_eq!(err.to_string(), "config error: unknown score function 'f3'");

        let err = InsertsterError::structural("duplicate node name 'Q1'");
        assert!(err.to_string().contains("duplicate node name"));
    }

    #[test]
    fn io_errors_carry_the_path() {
        let err = InsertsterError::io(
            "/tmp/tree.nwk",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("tree.nwk"));
        assert!(matches!(err, InsertsterError::Io { .. }));
    }
}
