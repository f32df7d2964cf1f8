//! Rename-probe read lock.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use sluice_core::SourceFile;
use sluice_fsops::FileOperations;
use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::lock::{PROBE_SUFFIX, ReadLockStrategy, acquire_with_retry};

/// Probes exclusivity by renaming the file to a sibling test name and back.
///
/// A successful round trip implies no other process holds an incompatible
/// handle on the file.
pub struct RenameLock;

fn probe_path(file: &SourceFile) -> PathBuf {
    let mut name = file.absolute_path().as_os_str().to_owned();
    name.push(PROBE_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl ReadLockStrategy for RenameLock {
    async fn acquire(&self, operations: &FileOperations, file: &SourceFile) -> EngineResult<bool> {
        let settings = operations.settings();
        let path = file.absolute_path().to_path_buf();
        let probe = probe_path(file);
        acquire_with_retry(settings, &path, || {
            if fs::rename(&path, &probe).is_err() {
                trace!(file = %path.display(), "rename probe refused, file busy");
                return Ok(false);
            }
            // Restore immediately; failing to do so would lose the file.
            fs::rename(&probe, &path).map_err(|error| EngineError::Lock {
                operation: "rename_probe_restore",
                path: probe.clone(),
                message: error.to_string(),
            })?;
            Ok(true)
        })
        .await
    }
}
