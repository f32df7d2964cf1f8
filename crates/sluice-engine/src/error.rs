//! # Design
//!
//! - Structured, constant-message errors for the consumer engine.
//! - Scan failures are fatal to the poll; lock timeouts are not errors at
//!   all and never appear here.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by the polling consumer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The root directory is missing and the configuration requires it.
    #[error("directory does not exist")]
    DirectoryMissing {
        /// Missing directory.
        path: PathBuf,
    },
    /// Listing a directory failed mid-scan.
    #[error("engine scan failure")]
    Scan {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Directory being listed.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// IO failure outside of scanning, e.g. while probing metadata.
    #[error("engine io failure")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A file could not be retrieved after its read lock was granted.
    #[error("cannot retrieve file")]
    Retrieve {
        /// File that could not be retrieved.
        path: PathBuf,
        /// Underlying operations error.
        source: sluice_fsops::FsOpsError,
    },
    /// A read-lock strategy failed in a way that is not a timeout.
    #[error("read lock failure")]
    Lock {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// File the lock applies to.
        path: PathBuf,
        /// Strategy-specific detail.
        message: String,
    },
    /// A file operation failed during the consume lifecycle.
    #[error("engine file operation failure")]
    Operation {
        /// Lifecycle step that triggered the failure.
        operation: &'static str,
        /// Underlying operations error.
        source: sluice_fsops::FsOpsError,
    },
    /// Endpoint settings failed validation.
    #[error("invalid endpoint configuration")]
    Config {
        /// Underlying configuration error.
        source: sluice_config::ConfigError,
    },
    /// The consumer could not be assembled.
    #[error("consumer initialisation failed: {message}")]
    Init {
        /// Detail of the failure.
        message: String,
    },
}

impl EngineError {
    pub(crate) fn scan(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Scan {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) const fn operation(operation: &'static str, source: sluice_fsops::FsOpsError) -> Self {
        Self::Operation { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn scan_helper_builds_variant_with_source() {
        let err = EngineError::scan("read_dir", "/data/in", io::Error::other("io"));
        assert!(matches!(err, EngineError::Scan { .. }));
        assert!(err.source().is_some());
    }

    #[test]
    fn operation_wraps_fsops_errors() {
        let inner = sluice_fsops::FsOpsError::TargetExists {
            path: "a.txt".into(),
        };
        let err = EngineError::operation("commit", inner);
        assert!(err.source().is_some());
    }
}
