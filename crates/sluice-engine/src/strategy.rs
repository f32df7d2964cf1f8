//! The begin / commit / rollback / abort lifecycle around one delivery.
//!
//! `begin` wraps read-lock acquisition and the optional pre-move into a
//! holding location. `commit` and `rollback` are the two halves of the
//! completion hook: each runs its post-action, then always releases the
//! tracking state exactly once, even when the post-action failed.

use std::path::PathBuf;
use std::sync::Arc;

use sluice_config::EndpointSettings;
use sluice_core::{NamePattern, Repository};
use sluice_fsops::{FileOperations, compact_path};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::exchange::Delivery;
use crate::lock::{ReadLockStrategy, idempotent_key};

#[derive(Clone)]
pub(crate) struct ProcessStrategy {
    settings: Arc<EndpointSettings>,
    operations: FileOperations,
    lock: Arc<dyn ReadLockStrategy>,
    in_progress: Arc<dyn Repository>,
    idempotent: Option<Arc<dyn Repository>>,
}

impl ProcessStrategy {
    pub(crate) fn new(
        settings: Arc<EndpointSettings>,
        operations: FileOperations,
        lock: Arc<dyn ReadLockStrategy>,
        in_progress: Arc<dyn Repository>,
        idempotent: Option<Arc<dyn Repository>>,
    ) -> Self {
        Self {
            settings,
            operations,
            lock,
            in_progress,
            idempotent,
        }
    }

    pub(crate) fn prepare_on_startup(&self) -> EngineResult<()> {
        self.lock.prepare_on_startup(&self.operations)
    }

    /// Acquire exclusive access, then apply the pre-move when configured.
    ///
    /// Returns `Ok(false)` when the read lock was not granted in time.
    pub(crate) async fn begin(&self, delivery: &mut Delivery) -> EngineResult<bool> {
        let granted = self
            .lock
            .acquire(&self.operations, delivery.file())
            .await?;
        if !granted {
            return Ok(false);
        }

        if let Some(pre_move) = &self.settings.pre_move {
            let destination = self.relocate(delivery, pre_move, "pre_move")?;
            delivery.file_mut().relocate(destination);
            delivery.refresh_headers();
        }
        Ok(true)
    }

    /// Best-effort release after a failed begin.
    pub(crate) fn abort(&self, delivery: &Delivery) -> EngineResult<()> {
        self.lock.release_on_abort(&self.operations, delivery.file())
    }

    /// Post-action and tracker release for a successful delivery.
    ///
    /// The idempotent key is confirmed before the post-action runs, so a
    /// concurrent poller cannot re-admit the file in the window where it is
    /// being moved or deleted.
    pub(crate) fn commit(&self, delivery: &Delivery) -> EngineResult<()> {
        self.confirm_idempotent(delivery);

        let mut outcome = Ok(());
        if self.settings.delete {
            debug!(
                file = %delivery.file().absolute_path().display(),
                "deleting consumed file"
            );
            outcome = self
                .operations
                .delete_file(delivery.file().absolute_path())
                .map_err(|source| EngineError::operation("commit_delete", source));
        } else if let Some(move_to) = &self.settings.move_to {
            outcome = self.relocate(delivery, move_to, "commit_move").map(|_| ());
        }

        self.remove_done_file(delivery);
        if let Err(error) = self
            .lock
            .release_on_commit(&self.operations, delivery.file())
        {
            warn!(error = %error, "read lock release on commit failed");
        }
        self.release_in_progress(delivery);
        outcome
    }

    /// Post-action and tracker release for a failed delivery.
    pub(crate) fn rollback(&self, delivery: &Delivery) -> EngineResult<()> {
        let mut outcome = Ok(());
        if let Some(move_failed) = &self.settings.move_failed {
            outcome = self
                .relocate(delivery, move_failed, "rollback_move")
                .map(|_| ());
        }

        if let Err(error) = self
            .lock
            .release_on_rollback(&self.operations, delivery.file())
        {
            warn!(error = %error, "read lock release on rollback failed");
        }
        if self.settings.idempotent_eager {
            if let Some(repository) = self.idempotent_repository() {
                repository.remove(&idempotent_key(&self.settings, delivery.file()));
            }
        }
        self.release_in_progress(delivery);
        outcome
    }

    fn idempotent_repository(&self) -> Option<&Arc<dyn Repository>> {
        if self.settings.idempotent_enabled() {
            self.idempotent.as_ref()
        } else {
            None
        }
    }

    fn confirm_idempotent(&self, delivery: &Delivery) {
        if self.settings.idempotent_eager {
            // Already registered at admission.
            return;
        }
        if let Some(repository) = self.idempotent_repository() {
            repository.add(&idempotent_key(&self.settings, delivery.file()));
        }
    }

    fn release_in_progress(&self, delivery: &Delivery) {
        self.in_progress
            .remove(&delivery.file().tracking_key().to_string_lossy());
    }

    fn remove_done_file(&self, delivery: &Delivery) {
        let Some(done) = &self.settings.done_file_name else {
            return;
        };
        let file = delivery.file();
        let done_name = done.resolve(file.file_name_only());
        let companion = file
            .absolute_path()
            .parent()
            .map_or_else(|| PathBuf::from(&done_name), |parent| parent.join(&done_name));
        if companion.exists() {
            if let Err(error) = self.operations.delete_file(&companion) {
                warn!(
                    done = %companion.display(),
                    error = %error,
                    "could not remove companion done file"
                );
            }
        }
    }

    /// Resolve a naming pattern for the delivery's file and rename it there,
    /// building missing directories first. An occupied destination is
    /// deleted when eager deletion is on, else the relocation fails.
    fn relocate(
        &self,
        delivery: &Delivery,
        pattern: &NamePattern,
        operation: &'static str,
    ) -> EngineResult<PathBuf> {
        let file = delivery.file();
        let resolved = pattern.resolve(file);
        let destination = if std::path::Path::new(&resolved).is_absolute() {
            PathBuf::from(&resolved)
        } else {
            self.settings.directory.join(&resolved)
        };
        let destination = compact_path(&destination);

        if let Some(parent) = destination.parent() {
            self.operations
                .build_directory(parent)
                .map_err(|source| EngineError::operation(operation, source))?;
        }
        if self.operations.exists(&destination) {
            if self.settings.eager_delete_target_file {
                self.operations
                    .delete_file(&destination)
                    .map_err(|source| EngineError::operation(operation, source))?;
            } else {
                return Err(EngineError::operation(
                    operation,
                    sluice_fsops::FsOpsError::MoveExistingTargetExists {
                        source_path: file.absolute_path().to_path_buf(),
                        target_path: destination,
                    },
                ));
            }
        }
        debug!(
            from = %file.absolute_path().display(),
            to = %destination.display(),
            "relocating file"
        );
        self.operations
            .rename_file(file.absolute_path(), &destination)
            .map_err(|source| EngineError::operation(operation, source))?;
        Ok(destination)
    }
}
