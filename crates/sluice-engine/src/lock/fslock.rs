//! OS advisory-lock read lock (Unix only).

use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use sluice_core::SourceFile;
use sluice_fsops::FileOperations;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::lock::{ReadLockStrategy, acquire_with_retry};

/// Holds a native advisory lock for the duration of processing.
///
/// The lock handle is kept per path between acquire and release; dropping it
/// unlocks the file. Platforms without advisory locks reject this strategy
/// at configuration validation, never at lock time.
pub struct FsLock {
    held: Mutex<HashMap<PathBuf, Flock<File>>>,
}

impl FsLock {
    /// Build a strategy with no held locks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
        }
    }

    fn release(&self, file: &SourceFile) {
        let mut held = self.held.lock().expect("flock table mutex poisoned");
        if held.remove(file.absolute_path()).is_some() {
            debug!(
                file = %file.absolute_path().display(),
                "released advisory lock"
            );
        }
    }
}

impl Default for FsLock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadLockStrategy for FsLock {
    async fn acquire(&self, operations: &FileOperations, file: &SourceFile) -> EngineResult<bool> {
        let settings = operations.settings();
        let path = file.absolute_path().to_path_buf();
        acquire_with_retry(settings, &path, || {
            let handle = File::open(&path).map_err(|error| EngineError::Lock {
                operation: "flock_open",
                path: path.clone(),
                message: error.to_string(),
            })?;
            match Flock::lock(handle, FlockArg::LockExclusiveNonblock) {
                Ok(flock) => {
                    debug!(file = %path.display(), "acquired advisory lock");
                    self.held
                        .lock()
                        .expect("flock table mutex poisoned")
                        .insert(path.clone(), flock);
                    Ok(true)
                }
                Err((_, Errno::EAGAIN)) => Ok(false),
                Err((_, errno)) => Err(EngineError::Lock {
                    operation: "flock",
                    path: path.clone(),
                    message: errno.to_string(),
                }),
            }
        })
        .await
    }

    fn release_on_abort(&self, _operations: &FileOperations, file: &SourceFile) -> EngineResult<()> {
        self.release(file);
        Ok(())
    }

    fn release_on_rollback(
        &self,
        _operations: &FileOperations,
        file: &SourceFile,
    ) -> EngineResult<()> {
        self.release(file);
        Ok(())
    }

    fn release_on_commit(&self, _operations: &FileOperations, file: &SourceFile) -> EngineResult<()> {
        self.release(file);
        Ok(())
    }
}
