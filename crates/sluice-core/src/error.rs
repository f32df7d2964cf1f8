//! # Design
//!
//! - Structured, constant-message errors for the core domain types.
//! - Capture the operation and path involved so failures reproduce in tests.
//! - Preserve source errors without interpolating context into messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for core domain operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by the core domain types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A naming pattern referenced a token the engine does not know.
    #[error("unknown naming token '{token}'")]
    UnknownToken {
        /// The offending `${file:...}` token, including delimiters.
        token: String,
    },
    /// A naming pattern was empty or resolved to an empty name.
    #[error("naming pattern resolved to an empty name")]
    EmptyPattern {
        /// The pattern as configured.
        pattern: String,
    },
    /// A done-file pattern used a token only valid in full naming patterns.
    #[error("token not allowed in done-file pattern")]
    TokenNotAllowed {
        /// The offending token.
        token: String,
        /// The pattern as configured.
        pattern: String,
    },
    /// IO failure while reading or writing a repository store file.
    #[error("repository store io failure")]
    Store {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Store file involved.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl CoreError {
    pub(crate) fn store(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::Store {
            operation,
            path: path.into(),
            source,
        }
    }
}
