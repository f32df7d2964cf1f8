//! Idempotent-repository-backed read lock.

use std::sync::Arc;

use async_trait::async_trait;
use sluice_config::EndpointSettings;
use sluice_core::{Repository, SourceFile};
use sluice_fsops::FileOperations;
use tracing::trace;

use crate::error::EngineResult;
use crate::lock::{ReadLockStrategy, idempotent_key};

/// Treats insertion into the idempotent repository as the lock.
///
/// Supports clustered deployments when the backing repository does: whichever
/// node wins the `add` owns the file. Whether the key is removed again on
/// rollback or commit is configuration-driven; retaining it on commit keeps
/// the no-redelivery window open.
pub struct IdempotentLock {
    repository: Arc<dyn Repository>,
    settings: Arc<EndpointSettings>,
}

impl IdempotentLock {
    /// Build the lock over the endpoint's idempotent repository.
    #[must_use]
    pub fn new(repository: Arc<dyn Repository>, settings: Arc<EndpointSettings>) -> Self {
        Self {
            repository,
            settings,
        }
    }

    fn key(&self, file: &SourceFile) -> String {
        idempotent_key(&self.settings, file)
    }
}

#[async_trait]
impl ReadLockStrategy for IdempotentLock {
    async fn acquire(&self, _operations: &FileOperations, file: &SourceFile) -> EngineResult<bool> {
        let key = self.key(file);
        let granted = self.repository.add(&key);
        if !granted {
            trace!(key = %key, "idempotent key already held");
        }
        Ok(granted)
    }

    fn release_on_abort(&self, _operations: &FileOperations, file: &SourceFile) -> EngineResult<()> {
        // The file was never processed, so the key must not linger.
        self.repository.remove(&self.key(file));
        Ok(())
    }

    fn release_on_rollback(
        &self,
        _operations: &FileOperations,
        file: &SourceFile,
    ) -> EngineResult<()> {
        if self.settings.read_lock_remove_on_rollback {
            self.repository.remove(&self.key(file));
        }
        Ok(())
    }

    fn release_on_commit(&self, _operations: &FileOperations, file: &SourceFile) -> EngineResult<()> {
        if self.settings.read_lock_remove_on_commit {
            self.repository.remove(&self.key(file));
        }
        Ok(())
    }
}
