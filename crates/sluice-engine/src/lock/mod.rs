//! Read-lock strategies.
//!
//! A strategy must grant exclusive access before consumption begins. A
//! timeout is a normal outcome (`Ok(false)` — skip this cycle, retry next
//! poll), never an error. Strategies are selected by configuration; a marker
//! file can be layered on top of the rename/changed/idempotent protocols as
//! an additional guard.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use sluice_config::{EndpointSettings, ReadLockKind};
use sluice_core::{Repository, SourceFile};
use sluice_fsops::FileOperations;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

mod changed;
mod idempotent;
mod marker;
mod rename;

#[cfg(unix)]
mod fslock;

pub use changed::ChangedLock;
pub use idempotent::IdempotentLock;
pub use marker::MarkerLock;
pub use rename::RenameLock;

#[cfg(unix)]
pub use fslock::FsLock;

/// Suffix of marker-lock artifacts; names ending with it are never admitted.
pub const MARKER_SUFFIX: &str = ".sluicelock";

/// Suffix used by the rename probe; names ending with it are never admitted.
pub const PROBE_SUFFIX: &str = ".sluiceprobe";

/// Exclusive-access protocol acquired before a file is consumed.
#[async_trait]
pub trait ReadLockStrategy: Send + Sync {
    /// Clear orphaned lock artifacts left behind by a previous run.
    ///
    /// # Errors
    ///
    /// Returns an error when the cleanup sweep itself fails.
    fn prepare_on_startup(&self, operations: &FileOperations) -> EngineResult<()> {
        let _ = operations;
        Ok(())
    }

    /// Try to acquire the lock, polling internally until the configured
    /// timeout elapses. `Ok(false)` means the file stays untouched this
    /// cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that are not timeouts.
    async fn acquire(&self, operations: &FileOperations, file: &SourceFile) -> EngineResult<bool>;

    /// Release after a failed begin.
    ///
    /// # Errors
    ///
    /// Returns an error when the release itself fails.
    fn release_on_abort(&self, operations: &FileOperations, file: &SourceFile) -> EngineResult<()> {
        let _ = (operations, file);
        Ok(())
    }

    /// Release after the processing callback failed.
    ///
    /// # Errors
    ///
    /// Returns an error when the release itself fails.
    fn release_on_rollback(
        &self,
        operations: &FileOperations,
        file: &SourceFile,
    ) -> EngineResult<()> {
        let _ = (operations, file);
        Ok(())
    }

    /// Release after the processing callback succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error when the release itself fails.
    fn release_on_commit(&self, operations: &FileOperations, file: &SourceFile) -> EngineResult<()> {
        let _ = (operations, file);
        Ok(())
    }
}

/// Strategy that always grants immediately.
pub struct NoneLock;

#[async_trait]
impl ReadLockStrategy for NoneLock {
    async fn acquire(&self, _operations: &FileOperations, _file: &SourceFile) -> EngineResult<bool> {
        Ok(true)
    }
}

/// Layered strategies acquired in order; releasing runs in reverse.
pub struct CompositeLock {
    layers: Vec<Arc<dyn ReadLockStrategy>>,
}

impl CompositeLock {
    /// Combine the given layers into one strategy.
    #[must_use]
    pub fn new(layers: Vec<Arc<dyn ReadLockStrategy>>) -> Self {
        Self { layers }
    }
}

#[async_trait]
impl ReadLockStrategy for CompositeLock {
    fn prepare_on_startup(&self, operations: &FileOperations) -> EngineResult<()> {
        for layer in &self.layers {
            layer.prepare_on_startup(operations)?;
        }
        Ok(())
    }

    async fn acquire(&self, operations: &FileOperations, file: &SourceFile) -> EngineResult<bool> {
        for (index, layer) in self.layers.iter().enumerate() {
            let granted = match layer.acquire(operations, file).await {
                Ok(granted) => granted,
                Err(error) => {
                    release_layers(&self.layers[..index], operations, file);
                    return Err(error);
                }
            };
            if !granted {
                release_layers(&self.layers[..index], operations, file);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn release_on_abort(&self, operations: &FileOperations, file: &SourceFile) -> EngineResult<()> {
        let mut first_error = None;
        for layer in self.layers.iter().rev() {
            if let Err(error) = layer.release_on_abort(operations, file) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn release_on_rollback(
        &self,
        operations: &FileOperations,
        file: &SourceFile,
    ) -> EngineResult<()> {
        let mut first_error = None;
        for layer in self.layers.iter().rev() {
            if let Err(error) = layer.release_on_rollback(operations, file) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn release_on_commit(&self, operations: &FileOperations, file: &SourceFile) -> EngineResult<()> {
        let mut first_error = None;
        for layer in self.layers.iter().rev() {
            if let Err(error) = layer.release_on_commit(operations, file) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn release_layers(layers: &[Arc<dyn ReadLockStrategy>], operations: &FileOperations, file: &SourceFile) {
    for layer in layers.iter().rev() {
        if let Err(error) = layer.release_on_abort(operations, file) {
            warn!(
                file = %file.absolute_path().display(),
                error = %error,
                "could not release partially acquired lock layer"
            );
        }
    }
}

/// Build the configured strategy stack.
///
/// # Errors
///
/// Returns an error when an idempotent-backed lock is configured without a
/// repository, or the platform cannot provide the requested lock.
pub(crate) fn create_read_lock(
    settings: &Arc<EndpointSettings>,
    idempotent: Option<&Arc<dyn Repository>>,
) -> EngineResult<Arc<dyn ReadLockStrategy>> {
    let mut layers: Vec<Arc<dyn ReadLockStrategy>> = Vec::new();
    let layered_marker = settings.read_lock_marker_file;

    match settings.read_lock {
        ReadLockKind::None => return Ok(Arc::new(NoneLock)),
        ReadLockKind::MarkerFile => layers.push(Arc::new(MarkerLock::new())),
        ReadLockKind::Rename => {
            if layered_marker {
                layers.push(Arc::new(MarkerLock::new()));
            }
            layers.push(Arc::new(RenameLock));
        }
        ReadLockKind::Changed => {
            if layered_marker {
                layers.push(Arc::new(MarkerLock::new()));
            }
            layers.push(Arc::new(ChangedLock));
        }
        ReadLockKind::FileLock => {
            if layered_marker {
                layers.push(Arc::new(MarkerLock::new()));
            }
            layers.push(file_lock(settings)?);
        }
        ReadLockKind::Idempotent
        | ReadLockKind::IdempotentChanged
        | ReadLockKind::IdempotentRename => {
            let repository = idempotent.ok_or_else(|| EngineError::Lock {
                operation: "create_read_lock",
                path: settings.directory.clone(),
                message: "an idempotent repository is required for idempotent read locks"
                    .to_string(),
            })?;
            if layered_marker {
                layers.push(Arc::new(MarkerLock::new()));
            }
            layers.push(Arc::new(IdempotentLock::new(
                Arc::clone(repository),
                Arc::clone(settings),
            )));
            match settings.read_lock {
                ReadLockKind::IdempotentChanged => layers.push(Arc::new(ChangedLock)),
                ReadLockKind::IdempotentRename => layers.push(Arc::new(RenameLock)),
                _ => {}
            }
        }
    }

    if layers.len() == 1 {
        Ok(layers.remove(0))
    } else {
        Ok(Arc::new(CompositeLock::new(layers)))
    }
}

#[cfg(unix)]
fn file_lock(_settings: &Arc<EndpointSettings>) -> EngineResult<Arc<dyn ReadLockStrategy>> {
    Ok(Arc::new(FsLock::new()))
}

#[cfg(not(unix))]
fn file_lock(settings: &Arc<EndpointSettings>) -> EngineResult<Arc<dyn ReadLockStrategy>> {
    Err(EngineError::Lock {
        operation: "create_read_lock",
        path: settings.directory.clone(),
        message: "read_lock=file-lock is not supported on this platform".to_string(),
    })
}

/// Retry `attempt` at the configured check interval until it grants or the
/// timeout elapses. A zero timeout retries forever.
pub(crate) async fn acquire_with_retry<F>(
    settings: &EndpointSettings,
    path: &Path,
    mut attempt: F,
) -> EngineResult<bool>
where
    F: FnMut() -> EngineResult<bool>,
{
    let timeout = settings.read_lock_timeout;
    let interval = settings.read_lock_check_interval;
    let started = Instant::now();
    loop {
        if attempt()? {
            return Ok(true);
        }
        if !timeout.is_zero() && started.elapsed() >= timeout {
            debug!(
                file = %path.display(),
                timeout = ?timeout,
                "read lock not granted within timeout"
            );
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Key under which a file is tracked in the idempotent repository: the
/// configured key pattern over the original relative name, else the original
/// absolute path.
pub(crate) fn idempotent_key(settings: &EndpointSettings, file: &SourceFile) -> String {
    let original = file.tracking_key();
    settings.idempotent_key.as_ref().map_or_else(
        || original.to_string_lossy().into_owned(),
        |pattern| {
            let relative = original.strip_prefix(&settings.directory).unwrap_or(original);
            pattern.resolve_name(&relative.to_string_lossy())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Arc<EndpointSettings> {
        Arc::new(
            EndpointSettings::new("/data/in")
                .validated()
                .expect("valid settings"),
        )
    }

    #[tokio::test]
    async fn none_lock_grants_immediately() {
        let settings = settings();
        let operations = FileOperations::new(Arc::clone(&settings)).expect("operations");
        let file = SourceFile::new("/data/in", "/data/in/a.txt", false, 1, None);
        let granted = NoneLock
            .acquire(&operations, &file)
            .await
            .expect("acquire");
        assert!(granted);
    }

    #[tokio::test]
    async fn retry_times_out_and_reports_not_granted() {
        let mut settings = EndpointSettings::new("/data/in");
        settings.read_lock_timeout = std::time::Duration::from_millis(40);
        settings.read_lock_check_interval = std::time::Duration::from_millis(10);
        let settings = settings.validated().expect("valid settings");

        let mut attempts = 0;
        let granted = acquire_with_retry(&settings, Path::new("/data/in/a.txt"), || {
            attempts += 1;
            Ok(false)
        })
        .await
        .expect("retry");
        assert!(!granted);
        assert!(attempts >= 2);
    }

    #[tokio::test]
    async fn retry_grants_as_soon_as_attempt_succeeds() {
        let mut settings = EndpointSettings::new("/data/in");
        settings.read_lock_timeout = std::time::Duration::from_secs(5);
        settings.read_lock_check_interval = std::time::Duration::from_millis(5);
        let settings = settings.validated().expect("valid settings");

        let mut attempts = 0;
        let granted = acquire_with_retry(&settings, Path::new("/data/in/a.txt"), || {
            attempts += 1;
            Ok(attempts >= 3)
        })
        .await
        .expect("retry");
        assert!(granted);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn idempotent_key_uses_original_path_after_relocation() {
        let settings = settings();
        let mut file = SourceFile::new("/data/in", "/data/in/a.txt", false, 1, None);
        file.relocate("/data/in/.staging/a.txt");
        assert_eq!(idempotent_key(&settings, &file), "/data/in/a.txt");
    }

    #[test]
    fn idempotent_key_resolves_configured_pattern() {
        let mut raw = EndpointSettings::new("/data/in");
        raw.idempotent_key =
            Some(sluice_core::NamePattern::parse("${file:onlyname}-processed").expect("pattern"));
        let settings = raw.validated().expect("valid settings");
        let file = SourceFile::new("/data/in", "/data/in/sub/a.txt", false, 1, None);
        assert_eq!(idempotent_key(&settings, &file), "a.txt-processed");
    }
}
