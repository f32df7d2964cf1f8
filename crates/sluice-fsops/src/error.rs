//! # Design
//!
//! - Structured, constant-message errors for filesystem operations.
//! - Capture operation context (paths, fields) to make failures reproducible
//!   in tests.
//! - Preserve source errors without interpolating context into messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for filesystem operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced by file operations and the producer.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// IO failures while interacting with the filesystem.
    #[error("fsops io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The target file already exists and the policy forbids overwriting.
    #[error("target file already exists")]
    TargetExists {
        /// Path of the conflicting target.
        path: PathBuf,
    },
    /// The move-existing destination already exists and eager deletion is
    /// disabled.
    #[error("cannot move existing file, destination already exists")]
    MoveExistingTargetExists {
        /// Existing file that was to be relocated.
        source_path: PathBuf,
        /// Occupied destination.
        target_path: PathBuf,
    },
    /// The body was absent and empty files are not permitted.
    #[error("cannot write missing body to file")]
    NullBody {
        /// Target that was to be written.
        path: PathBuf,
    },
    /// The computed target escapes the configured root directory.
    #[error("target escapes the starting directory")]
    OutsideRoot {
        /// Configured root directory.
        root: PathBuf,
        /// Offending target path.
        target: PathBuf,
    },
    /// The root directory is missing and the configuration requires it.
    #[error("directory does not exist")]
    DirectoryMissing {
        /// Missing directory.
        path: PathBuf,
    },
    /// A naming pattern failed to resolve.
    #[error("fsops naming failure")]
    Pattern {
        /// Operation that evaluated the pattern.
        operation: &'static str,
        /// Underlying pattern error.
        source: sluice_core::CoreError,
    },
    /// The configured charset is unknown or cannot encode the body.
    #[error("unsupported charset or unencodable content")]
    Encoding {
        /// Charset label as configured.
        charset: String,
    },
    /// Required state was missing from the pipeline.
    #[error("fsops missing state")]
    MissingState {
        /// State field that was missing.
        field: &'static str,
    },
    /// Recursive sweep failures.
    #[error("fsops walkdir failure")]
    Walkdir {
        /// Operation that triggered the walkdir failure.
        operation: &'static str,
        /// Path involved in the walkdir failure.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn io_helper_builds_variant_with_source() {
        let err = FsOpsError::io("rename", "a.txt", io::Error::other("io"));
        assert!(matches!(err, FsOpsError::Io { .. }));
        assert!(err.source().is_some());
    }

    #[test]
    fn collision_errors_name_the_paths() {
        let err = FsOpsError::MoveExistingTargetExists {
            source_path: "a.txt".into(),
            target_path: "a.txt.old".into(),
        };
        assert!(err.to_string().contains("destination already exists"));
    }
}
