//! Marker-file read lock.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use sluice_core::SourceFile;
use sluice_fsops::FileOperations;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::lock::{MARKER_SUFFIX, ReadLockStrategy, acquire_with_retry};

/// Creates a sibling `<name>.sluicelock` marker as the lock artifact.
///
/// A marker already present is a negative signal: another process owns the
/// file, and its marker must survive our aborts. Only markers this instance
/// created are removed on release. Orphaned markers from a crashed run are
/// purged at startup when the endpoint is configured to do so.
#[derive(Default)]
pub struct MarkerLock {
    created: Mutex<HashSet<PathBuf>>,
}

impl MarkerLock {
    /// Build a strategy holding no markers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_marker(&self, file: &SourceFile) -> EngineResult<()> {
        let marker = marker_path(file);
        if !self
            .created
            .lock()
            .expect("marker table mutex poisoned")
            .remove(&marker)
        {
            return Ok(());
        }
        match std::fs::remove_file(&marker) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(EngineError::Lock {
                operation: "release_marker",
                path: marker,
                message: error.to_string(),
            }),
        }
    }
}

fn marker_path(file: &SourceFile) -> PathBuf {
    let mut name = file.absolute_path().as_os_str().to_owned();
    name.push(MARKER_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl ReadLockStrategy for MarkerLock {
    fn prepare_on_startup(&self, operations: &FileOperations) -> EngineResult<()> {
        let settings = operations.settings();
        if !settings.read_lock_delete_orphan_marker_files {
            return Ok(());
        }
        let removed = operations
            .remove_matching(&settings.directory, settings.recursive, MARKER_SUFFIX)
            .map_err(|source| EngineError::operation("prepare_on_startup", source))?;
        if removed > 0 {
            info!(removed, "purged orphaned lock markers");
        }
        Ok(())
    }

    async fn acquire(&self, operations: &FileOperations, file: &SourceFile) -> EngineResult<bool> {
        let settings = operations.settings();
        let marker = marker_path(file);
        acquire_with_retry(settings, file.absolute_path(), || {
            match OpenOptions::new().write(true).create_new(true).open(&marker) {
                Ok(_) => {
                    debug!(marker = %marker.display(), "acquired marker lock");
                    self.created
                        .lock()
                        .expect("marker table mutex poisoned")
                        .insert(marker.clone());
                    Ok(true)
                }
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
                Err(error) => Err(EngineError::Lock {
                    operation: "create_marker",
                    path: marker.clone(),
                    message: error.to_string(),
                }),
            }
        })
        .await
    }

    fn release_on_abort(&self, _operations: &FileOperations, file: &SourceFile) -> EngineResult<()> {
        self.remove_marker(file)
    }

    fn release_on_rollback(
        &self,
        _operations: &FileOperations,
        file: &SourceFile,
    ) -> EngineResult<()> {
        self.remove_marker(file)
    }

    fn release_on_commit(&self, _operations: &FileOperations, file: &SourceFile) -> EngineResult<()> {
        self.remove_marker(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_config::EndpointSettings;
    use std::sync::Arc;
    use std::time::Duration;

    fn fixture(check: Duration, timeout: Duration) -> (tempfile::TempDir, FileOperations, SourceFile) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = EndpointSettings::new(dir.path());
        settings.read_lock = sluice_config::ReadLockKind::MarkerFile;
        settings.read_lock_check_interval = check;
        settings.read_lock_timeout = timeout;
        let settings = Arc::new(settings.validated().expect("valid settings"));
        let operations = FileOperations::new(settings).expect("operations");
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"body").expect("seed");
        let file = SourceFile::new(dir.path(), &path, false, 4, None);
        (dir, operations, file)
    }

    #[tokio::test]
    async fn marker_created_and_removed() {
        let (dir, operations, file) = fixture(Duration::from_millis(5), Duration::from_millis(30));
        let lock = MarkerLock::new();
        assert!(lock.acquire(&operations, &file).await.expect("acquire"));
        assert!(dir.path().join("a.txt.sluicelock").exists());
        lock.release_on_commit(&operations, &file).expect("release");
        assert!(!dir.path().join("a.txt.sluicelock").exists());
    }

    #[tokio::test]
    async fn foreign_marker_blocks_until_timeout() {
        let (dir, operations, file) = fixture(Duration::from_millis(5), Duration::from_millis(30));
        std::fs::write(dir.path().join("a.txt.sluicelock"), b"").expect("foreign marker");
        let lock = MarkerLock::new();
        assert!(!lock.acquire(&operations, &file).await.expect("acquire"));
    }

    #[tokio::test]
    async fn startup_purges_orphans() {
        let (dir, operations, _file) = fixture(Duration::from_millis(5), Duration::from_millis(30));
        std::fs::write(dir.path().join("stale.txt.sluicelock"), b"").expect("orphan");
        MarkerLock::new().prepare_on_startup(&operations).expect("prepare");
        assert!(!dir.path().join("stale.txt.sluicelock").exists());
    }
}
