//! Value type describing one discovered filesystem entry.
//!
//! A [`SourceFile`] is created fresh for every entry a poll discovers and is
//! carried through the consume lifecycle. The absolute path is kept current
//! even when a pre-move renames the entry before processing; the original
//! path is preserved separately so tracking keys stay stable.

use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One discovered filesystem entry, relative to a configured root directory.
#[derive(Debug, Clone)]
pub struct SourceFile {
    root: PathBuf,
    absolute_path: PathBuf,
    relative_path: PathBuf,
    file_name_only: String,
    directory: bool,
    file_length: u64,
    last_modified: Option<SystemTime>,
    extended_attributes: Option<HashMap<String, String>>,
    copy_from_absolute_path: Option<PathBuf>,
}

impl SourceFile {
    /// Describe an entry at `absolute_path` under `root`.
    ///
    /// The relative path is derived by stripping the root prefix; an entry
    /// outside the root keeps its full path as the relative form.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        absolute_path: impl Into<PathBuf>,
        directory: bool,
        file_length: u64,
        last_modified: Option<SystemTime>,
    ) -> Self {
        let root = root.into();
        let absolute_path = absolute_path.into();
        let relative_path = relative_to(&root, &absolute_path);
        let file_name_only = final_segment(&absolute_path);
        Self {
            root,
            absolute_path,
            relative_path,
            file_name_only,
            directory,
            file_length,
            last_modified,
            extended_attributes: None,
            copy_from_absolute_path: None,
        }
    }

    /// Describe an entry from filesystem metadata.
    #[must_use]
    pub fn from_metadata(
        root: impl Into<PathBuf>,
        absolute_path: impl Into<PathBuf>,
        metadata: &Metadata,
    ) -> Self {
        Self::new(
            root,
            absolute_path,
            metadata.is_dir(),
            metadata.len(),
            metadata.modified().ok(),
        )
    }

    /// The configured root directory this entry was discovered under.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Absolute path of the entry; kept current across renames.
    #[must_use]
    pub fn absolute_path(&self) -> &Path {
        self.absolute_path.as_path()
    }

    /// Path relative to the configured root.
    #[must_use]
    pub fn relative_path(&self) -> &Path {
        self.relative_path.as_path()
    }

    /// Relative name of the entry as a string.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.relative_path.to_string_lossy().into_owned()
    }

    /// Final path segment of the entry.
    #[must_use]
    pub fn file_name_only(&self) -> &str {
        &self.file_name_only
    }

    /// Whether the entry is a directory.
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        self.directory
    }

    /// Byte length recorded at discovery or at the latest refresh.
    #[must_use]
    pub const fn file_length(&self) -> u64 {
        self.file_length
    }

    /// Last-modified timestamp recorded at discovery or at the latest refresh.
    #[must_use]
    pub const fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    /// Original absolute path before a pre-move relocated the entry.
    #[must_use]
    pub fn copy_from_absolute_path(&self) -> Option<&Path> {
        self.copy_from_absolute_path.as_deref()
    }

    /// Extended attributes probed for the entry, when any were collected.
    #[must_use]
    pub const fn extended_attributes(&self) -> Option<&HashMap<String, String>> {
        self.extended_attributes.as_ref()
    }

    /// Attach probed extended attributes.
    pub fn set_extended_attributes(&mut self, attributes: HashMap<String, String>) {
        self.extended_attributes = Some(attributes);
    }

    /// Refresh length and timestamp from current metadata.
    ///
    /// Used after a read lock is granted, since the entry may have changed
    /// while the lock was being acquired.
    pub fn refresh_from(&mut self, metadata: &Metadata) {
        self.file_length = metadata.len();
        self.last_modified = metadata.modified().ok();
    }

    /// Record that the entry now lives at `new_absolute`.
    ///
    /// The first relocation preserves the original path so in-progress and
    /// idempotent keys computed before the move stay stable.
    pub fn relocate(&mut self, new_absolute: impl Into<PathBuf>) {
        let new_absolute = new_absolute.into();
        if self.copy_from_absolute_path.is_none() {
            self.copy_from_absolute_path = Some(self.absolute_path.clone());
        }
        self.relative_path = relative_to(&self.root, &new_absolute);
        self.file_name_only = final_segment(&new_absolute);
        self.absolute_path = new_absolute;
    }

    /// Key under which the entry is tracked: the original path when a
    /// pre-move renamed it, else the current absolute path.
    #[must_use]
    pub fn tracking_key(&self) -> &Path {
        self.copy_from_absolute_path
            .as_deref()
            .unwrap_or_else(|| self.absolute_path.as_path())
    }
}

fn relative_to(root: &Path, absolute: &Path) -> PathBuf {
    absolute
        .strip_prefix(root)
        .map_or_else(|_| absolute.to_path_buf(), Path::to_path_buf)
}

fn final_segment(path: &Path) -> String {
    path.file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SourceFile {
        SourceFile::new("/data/in", "/data/in/sub/report.csv", false, 42, None)
    }

    #[test]
    fn relative_path_strips_root() {
        let file = sample();
        assert_eq!(file.relative_path(), Path::new("sub/report.csv"));
        assert_eq!(file.file_name(), "sub/report.csv");
        assert_eq!(file.file_name_only(), "report.csv");
    }

    #[test]
    fn entry_outside_root_keeps_full_path() {
        let file = SourceFile::new("/data/in", "/elsewhere/report.csv", false, 0, None);
        assert_eq!(file.relative_path(), Path::new("/elsewhere/report.csv"));
    }

    #[test]
    fn relocate_preserves_original_tracking_key() {
        let mut file = sample();
        file.relocate("/data/in/.staging/report.csv");
        assert_eq!(
            file.absolute_path(),
            Path::new("/data/in/.staging/report.csv")
        );
        assert_eq!(file.tracking_key(), Path::new("/data/in/sub/report.csv"));

        // A second relocation must not overwrite the original.
        file.relocate("/data/in/.staging/report2.csv");
        assert_eq!(file.tracking_key(), Path::new("/data/in/sub/report.csv"));
    }

    #[test]
    fn refresh_updates_length() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").expect("write");
        let metadata = std::fs::metadata(&path).expect("metadata");
        let mut file = SourceFile::new(dir.path(), &path, false, 0, None);
        file.refresh_from(&metadata);
        assert_eq!(file.file_length(), 5);
        assert!(file.last_modified().is_some());
    }
}
