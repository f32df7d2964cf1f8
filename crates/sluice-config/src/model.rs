//! Typed endpoint settings and policy enums.
//!
//! # Design
//! - Pure data carriers; parsing helpers live in `validate.rs`.
//! - Settings are validated once via [`EndpointSettings::validated`] and
//!   treated as immutable afterwards.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use globset::GlobSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sluice_core::{DoneFilePattern, NamePattern};

use crate::error::{ConfigError, ConfigResult};

/// Read-lock acquisition protocol used before a file is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadLockKind {
    /// Grant immediately without any check.
    None,
    /// Create a sibling marker file as the lock artifact.
    MarkerFile,
    /// Hold an OS advisory lock for the duration of processing (Unix only).
    FileLock,
    /// Probe exclusivity by renaming the file to a sibling test name.
    Rename,
    /// Grant once length and modification time are stable across samples.
    Changed,
    /// Treat insertion into the idempotent repository as the lock.
    Idempotent,
    /// Idempotent insertion combined with changed-detection.
    IdempotentChanged,
    /// Idempotent insertion combined with the rename probe.
    IdempotentRename,
}

impl ReadLockKind {
    /// Render the kind as its configuration string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::MarkerFile => "marker-file",
            Self::FileLock => "file-lock",
            Self::Rename => "rename",
            Self::Changed => "changed",
            Self::Idempotent => "idempotent",
            Self::IdempotentChanged => "idempotent-changed",
            Self::IdempotentRename => "idempotent-rename",
        }
    }

    /// Whether the kind relies on the idempotent repository.
    #[must_use]
    pub const fn uses_idempotent_repository(self) -> bool {
        matches!(
            self,
            Self::Idempotent | Self::IdempotentChanged | Self::IdempotentRename
        )
    }
}

impl FromStr for ReadLockKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "marker-file" | "markerFile" => Ok(Self::MarkerFile),
            "file-lock" | "fileLock" => Ok(Self::FileLock),
            "rename" => Ok(Self::Rename),
            "changed" => Ok(Self::Changed),
            "idempotent" => Ok(Self::Idempotent),
            "idempotent-changed" => Ok(Self::IdempotentChanged),
            "idempotent-rename" => Ok(Self::IdempotentRename),
            other => Err(ConfigError::InvalidField {
                field: "read_lock",
                message: format!("unknown read lock kind '{other}'"),
            }),
        }
    }
}

/// Policy applied when a producer's target file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Truncate and rewrite the existing file.
    Override,
    /// Append the new content to the existing file.
    Append,
    /// Fail the write without touching the target.
    Fail,
    /// Leave the target untouched and report success.
    Ignore,
    /// Relocate the existing file before writing the new one.
    Move,
    /// Attempt the final rename directly; only valid with a temp name.
    TryRename,
}

impl CollisionPolicy {
    /// Render the policy as its configuration string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Append => "append",
            Self::Fail => "fail",
            Self::Ignore => "ignore",
            Self::Move => "move",
            Self::TryRename => "try-rename",
        }
    }
}

impl FromStr for CollisionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "override" | "Override" => Ok(Self::Override),
            "append" | "Append" => Ok(Self::Append),
            "fail" | "Fail" => Ok(Self::Fail),
            "ignore" | "Ignore" => Ok(Self::Ignore),
            "move" | "Move" => Ok(Self::Move),
            "try-rename" | "TryRename" => Ok(Self::TryRename),
            other => Err(ConfigError::InvalidField {
                field: "file_exist",
                message: format!("unknown collision policy '{other}'"),
            }),
        }
    }
}

/// Comparator applied to the admitted candidate list before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Order by relative file name.
    FileName {
        /// Reverse the natural ascending order.
        reverse: bool,
    },
    /// Order by byte length.
    FileLength {
        /// Reverse the natural ascending order.
        reverse: bool,
    },
    /// Order by last-modified timestamp.
    LastModified {
        /// Reverse the natural ascending order.
        reverse: bool,
    },
}

/// Digest written to the producer's checksum sidecar file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// SHA-256 digest.
    Sha256,
    /// SHA-512 digest.
    Sha512,
}

impl ChecksumAlgorithm {
    /// Extension used for the sidecar file, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

/// Immutable-after-validation endpoint configuration.
///
/// Consumer and producer read from the same aggregate; fields irrelevant to
/// one side are simply ignored by it.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct EndpointSettings {
    /// Root directory polled by the consumer / written by the producer.
    pub directory: PathBuf,
    /// Whether the consumer descends into sub-directories.
    pub recursive: bool,
    /// Minimum directory depth a file must sit at to be admitted (root = 1).
    pub min_depth: u32,
    /// Maximum directory depth the scan descends to.
    pub max_depth: u32,
    /// Include filter on the final path segment.
    pub include: Option<Regex>,
    /// Exclude filter on the final path segment; wins over include.
    pub exclude: Option<Regex>,
    /// Case-insensitive extensions to include.
    pub include_ext: Vec<String>,
    /// Case-insensitive extensions to exclude; wins over include.
    pub exclude_ext: Vec<String>,
    /// Ant-style include globs over the relative path.
    pub ant_include: Option<GlobSet>,
    /// Ant-style exclude globs over the relative path; wins over include.
    pub ant_exclude: Option<GlobSet>,
    /// Name expression. The consumer admits only files whose name equals
    /// the resolved pattern; the producer uses it to rewrite target names.
    pub file_name: Option<NamePattern>,
    /// Read-lock protocol acquired before consumption begins.
    pub read_lock: ReadLockKind,
    /// Upper bound on read-lock acquisition; zero waits forever.
    pub read_lock_timeout: Duration,
    /// Interval between read-lock acquisition attempts.
    pub read_lock_check_interval: Duration,
    /// Minimum age a file must have for changed-detection to grant.
    pub read_lock_min_age: Duration,
    /// Minimum length a file must have for changed-detection to grant.
    pub read_lock_min_length: u64,
    /// Layer a marker file on top of rename/changed/idempotent locks.
    pub read_lock_marker_file: bool,
    /// Purge orphaned marker files left by a previous run at startup.
    pub read_lock_delete_orphan_marker_files: bool,
    /// Remove the idempotent-lock key when processing rolls back.
    pub read_lock_remove_on_rollback: bool,
    /// Remove the idempotent-lock key when processing commits.
    pub read_lock_remove_on_commit: bool,
    /// Policy applied when the producer's target already exists.
    pub file_exist: CollisionPolicy,
    /// Destination pattern for relocating an existing target under
    /// [`CollisionPolicy::Move`].
    pub move_existing: Option<NamePattern>,
    /// Delete the pre-existing target before (rather than after) staging.
    pub eager_delete_target_file: bool,
    /// Destination pattern applied to consumed files on commit.
    pub move_to: Option<NamePattern>,
    /// Holding-location pattern applied before processing begins.
    pub pre_move: Option<NamePattern>,
    /// Destination pattern applied to failed files on rollback.
    pub move_failed: Option<NamePattern>,
    /// Companion done-file pattern gating consumption and emitted on store.
    pub done_file_name: Option<DoneFilePattern>,
    /// Temp-name pattern the producer stages writes under.
    pub temp_file_name: Option<NamePattern>,
    /// Shorthand: prefix prepended to the target name to form the temp name.
    pub temp_prefix: Option<String>,
    /// Delete consumed files on commit.
    pub delete: bool,
    /// Leave consumed files in place; forces idempotent tracking.
    pub noop: bool,
    /// Idempotent consumption; `None` resolves from `noop`.
    pub idempotent: Option<bool>,
    /// Key pattern for the idempotent repository; default absolute path.
    pub idempotent_key: Option<NamePattern>,
    /// Add the idempotent key at admission rather than on commit.
    pub idempotent_eager: bool,
    /// Per-poll candidate cap; zero is unlimited.
    pub max_messages_per_poll: usize,
    /// Enforce the cap during the scan rather than after sorting.
    pub eager_max_messages_per_poll: bool,
    /// Charset used when writing character content.
    pub charset: Option<String>,
    /// Buffer size for streamed byte copies.
    pub buffer_size: usize,
    /// POSIX permission bits applied to stored files.
    pub chmod: Option<u32>,
    /// POSIX permission bits applied to each created directory segment.
    pub chmod_directory: Option<u32>,
    /// Drop leading directories from the computed producer target.
    pub flatten: bool,
    /// Reject producer targets that escape the root directory.
    pub jail_starting_directory: bool,
    /// Create missing directories automatically.
    pub auto_create: bool,
    /// Fail the poll when the root directory is missing.
    pub directory_must_exist: bool,
    /// Permit storing an empty file when the body is absent.
    pub allow_null_body: bool,
    /// Restore the source's last-modified timestamp after a store.
    pub keep_last_modified: bool,
    /// Emit a checksum sidecar next to stored files.
    pub checksum_file_algorithm: Option<ChecksumAlgorithm>,
    /// Sort raw directory entries by absolute path before filtering.
    pub pre_sort: bool,
    /// Shuffle the admitted candidate list before dispatch.
    pub shuffle: bool,
    /// Comparator applied to the admitted candidate list.
    pub sort_by: Option<SortBy>,
    /// Delay between polls when running the consumer loop.
    pub poll_interval: Duration,
    /// Retrieve file bodies before dispatch; disable for lazy consumers.
    pub retrieve_file: bool,
    /// Treat an unretrievable file as a skip instead of a failure.
    pub ignore_cannot_retrieve: bool,
}

impl EndpointSettings {
    /// Settings rooted at `directory` with every option at its default.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            recursive: false,
            min_depth: 0,
            max_depth: u32::MAX,
            include: None,
            exclude: None,
            include_ext: Vec::new(),
            exclude_ext: Vec::new(),
            ant_include: None,
            ant_exclude: None,
            file_name: None,
            read_lock: ReadLockKind::None,
            read_lock_timeout: Duration::from_secs(10),
            read_lock_check_interval: Duration::from_secs(1),
            read_lock_min_age: Duration::ZERO,
            read_lock_min_length: 1,
            read_lock_marker_file: true,
            read_lock_delete_orphan_marker_files: true,
            read_lock_remove_on_rollback: true,
            read_lock_remove_on_commit: false,
            file_exist: CollisionPolicy::Override,
            move_existing: None,
            eager_delete_target_file: true,
            move_to: None,
            pre_move: None,
            move_failed: None,
            done_file_name: None,
            temp_file_name: None,
            temp_prefix: None,
            delete: false,
            noop: false,
            idempotent: None,
            idempotent_key: None,
            idempotent_eager: false,
            max_messages_per_poll: 0,
            eager_max_messages_per_poll: true,
            charset: None,
            buffer_size: 128 * 1024,
            chmod: None,
            chmod_directory: None,
            flatten: false,
            jail_starting_directory: true,
            auto_create: true,
            directory_must_exist: false,
            allow_null_body: false,
            keep_last_modified: false,
            checksum_file_algorithm: None,
            pre_sort: false,
            shuffle: false,
            sort_by: None,
            poll_interval: Duration::from_millis(500),
            retrieve_file: true,
            ignore_cannot_retrieve: false,
        }
    }

    /// Whether idempotent consumption is in effect, resolving the tri-state
    /// against `noop`.
    #[must_use]
    pub fn idempotent_enabled(&self) -> bool {
        self.idempotent.unwrap_or(self.noop)
    }

    /// Validate the aggregate and normalise derived fields.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the offending field when any
    /// invariant fails; the endpoint must not start in that case.
    pub fn validated(mut self) -> ConfigResult<Self> {
        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::InvalidField {
                field: "directory",
                message: "must not be empty".to_string(),
            });
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidField {
                field: "buffer_size",
                message: "must be positive".to_string(),
            });
        }
        if self.min_depth > self.max_depth {
            return Err(ConfigError::InvalidField {
                field: "min_depth",
                message: "must not exceed max_depth".to_string(),
            });
        }
        if self.delete && self.noop {
            return Err(ConfigError::IncompatibleOptions {
                first: "delete",
                second: "noop",
            });
        }
        if self.delete && self.move_to.is_some() {
            return Err(ConfigError::IncompatibleOptions {
                first: "delete",
                second: "move_to",
            });
        }

        if self.read_lock != ReadLockKind::None {
            let timeout = self.read_lock_timeout;
            if !timeout.is_zero() && timeout <= self.read_lock_check_interval {
                return Err(ConfigError::InvalidField {
                    field: "read_lock_timeout",
                    message: format!(
                        "must be higher than read_lock_check_interval (was {timeout:?} vs {:?}); \
                         a timeout of two or more check intervals leaves the lock procedure \
                         enough time to succeed",
                        self.read_lock_check_interval
                    ),
                });
            }
        }
        if self.read_lock == ReadLockKind::FileLock && !cfg!(unix) {
            return Err(ConfigError::UnsupportedPlatform {
                feature: "read_lock=file-lock",
            });
        }

        // noop consumption would redeliver on every poll without the
        // idempotent gate, so it forces idempotent on.
        if self.noop {
            self.idempotent = Some(true);
        }
        if self.read_lock.uses_idempotent_repository() && !self.idempotent_enabled() {
            return Err(ConfigError::InvalidField {
                field: "read_lock",
                message: format!(
                    "read_lock={} requires idempotent consumption",
                    self.read_lock.as_str()
                ),
            });
        }

        if self.file_exist == CollisionPolicy::Append
            && (self.temp_file_name.is_some() || self.temp_prefix.is_some())
        {
            return Err(ConfigError::IncompatibleOptions {
                first: "file_exist=append",
                second: "temp_file_name",
            });
        }
        if self.file_exist == CollisionPolicy::Move && self.move_existing.is_none() {
            return Err(ConfigError::InvalidField {
                field: "move_existing",
                message: "required when file_exist=move".to_string(),
            });
        }
        if self.file_exist == CollisionPolicy::TryRename
            && self.temp_file_name.is_none()
            && self.temp_prefix.is_none()
        {
            return Err(ConfigError::InvalidField {
                field: "file_exist",
                message: "try-rename requires a temp file name or temp prefix".to_string(),
            });
        }

        if self.temp_file_name.is_none() {
            if let Some(prefix) = &self.temp_prefix {
                let pattern = format!("{prefix}${{file:onlyname}}");
                self.temp_file_name = Some(
                    NamePattern::parse(&pattern).map_err(|source| ConfigError::Pattern {
                        field: "temp_prefix",
                        source,
                    })?,
                );
            }
        }

        // With no post-action configured at all, consumed files are archived
        // under a hidden sub-directory so the next poll does not see them.
        if !self.delete && !self.noop && self.move_to.is_none() {
            self.move_to = Some(
                NamePattern::parse(".archive/${file:name}").map_err(|source| {
                    ConfigError::Pattern {
                        field: "move_to",
                        source,
                    }
                })?,
            );
        }

        Ok(self)
    }
}
