//! Directory scanner: depth-bounded recursion, admission, per-poll caps.
//!
//! Admission is the point of no return for tracking state: a file pushed
//! into the result list holds an in-progress entry (and, in eager idempotent
//! mode, an idempotent entry) that every later code path must release
//! exactly once.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sluice_config::EndpointSettings;
use sluice_core::{Repository, SourceFile};
use tracing::{debug, trace};

use crate::error::{EngineError, EngineResult};
use crate::filter::AdmissionFilter;
use crate::lock::idempotent_key;

#[derive(Clone)]
pub(crate) struct Scanner {
    settings: Arc<EndpointSettings>,
    filter: AdmissionFilter,
    in_progress: Arc<dyn Repository>,
    idempotent: Option<Arc<dyn Repository>>,
}

impl Scanner {
    pub(crate) fn new(
        settings: Arc<EndpointSettings>,
        filter: AdmissionFilter,
        in_progress: Arc<dyn Repository>,
        idempotent: Option<Arc<dyn Repository>>,
    ) -> Self {
        Self {
            settings,
            filter,
            in_progress,
            idempotent,
        }
    }

    /// Produce the admissible candidates for one poll.
    ///
    /// On a scan failure, every entry tracked during the failed poll is
    /// released before the error propagates.
    pub(crate) fn scan(&self) -> EngineResult<Vec<SourceFile>> {
        let root = &self.settings.directory;
        let mut admitted = Vec::new();
        if !root.is_dir() {
            if self.settings.directory_must_exist {
                return Err(EngineError::DirectoryMissing {
                    path: root.clone(),
                });
            }
            debug!(root = %root.display(), "root directory missing, nothing to poll");
            return Ok(admitted);
        }

        match self.poll_directory(root, &mut admitted, 0) {
            Ok(kept_scanning) => {
                if !kept_scanning {
                    debug!(
                        limit = self.settings.max_messages_per_poll,
                        "per-poll limit reached, more files remain"
                    );
                }
                Ok(admitted)
            }
            Err(error) => {
                debug!(
                    root = %root.display(),
                    tracked = admitted.len(),
                    "scan failed, releasing tracked entries"
                );
                for file in &admitted {
                    self.release(file);
                }
                Err(error)
            }
        }
    }

    /// Undo the tracking-state side effects of one admission.
    pub(crate) fn release(&self, file: &SourceFile) {
        self.in_progress
            .remove(&file.tracking_key().to_string_lossy());
        if self.settings.idempotent_eager {
            if let Some(repository) = self.idempotent_repository() {
                repository.remove(&idempotent_key(&self.settings, file));
            }
        }
    }

    fn idempotent_repository(&self) -> Option<&Arc<dyn Repository>> {
        if self.settings.idempotent_enabled() {
            self.idempotent.as_ref()
        } else {
            None
        }
    }

    /// Recursive walk; returns `false` once the eager per-poll cap cut the
    /// scan short.
    fn poll_directory(
        &self,
        dir: &Path,
        admitted: &mut Vec<SourceFile>,
        depth: u32,
    ) -> EngineResult<bool> {
        let depth = depth + 1;
        let mut entries: Vec<(PathBuf, fs::Metadata)> = Vec::new();
        let listing =
            fs::read_dir(dir).map_err(|source| EngineError::scan("read_dir", dir, source))?;
        for entry in listing {
            let entry = entry.map_err(|source| EngineError::scan("read_dir_entry", dir, source))?;
            let metadata = entry
                .metadata()
                .map_err(|source| EngineError::scan("metadata", entry.path(), source))?;
            entries.push((entry.path(), metadata));
        }
        if self.settings.pre_sort {
            entries.sort_by(|left, right| left.0.cmp(&right.0));
        }

        for (path, metadata) in entries {
            let file = SourceFile::from_metadata(&self.settings.directory, &path, &metadata);
            if metadata.is_dir() {
                let descend = self.settings.recursive
                    && depth < self.settings.max_depth
                    && self.filter.matches(&file, true);
                if descend && !self.poll_directory(&path, admitted, depth)? {
                    return Ok(false);
                }
            } else {
                if !self.can_poll_more(admitted) {
                    return Ok(false);
                }
                if depth >= self.settings.min_depth && self.admit(&file) {
                    admitted.push(file);
                }
            }
        }
        Ok(true)
    }

    fn can_poll_more(&self, admitted: &[SourceFile]) -> bool {
        if !self.settings.eager_max_messages_per_poll || self.settings.max_messages_per_poll == 0 {
            return true;
        }
        admitted.len() < self.settings.max_messages_per_poll
    }

    /// Run the filter chain and, if it passes, register the file in the
    /// tracking sets. The in-progress `add` is the atomic gate: only the
    /// caller that wins it keeps the candidate.
    fn admit(&self, file: &SourceFile) -> bool {
        if !self.filter.matches(file, false) {
            trace!(file = %file.absolute_path().display(), "filtered out");
            return false;
        }

        let key = file.absolute_path().to_string_lossy().into_owned();
        if self.in_progress.contains(&key) {
            trace!(file = %key, "already in progress, skipping");
            return false;
        }

        if let Some(repository) = self.idempotent_repository() {
            let idem_key = idempotent_key(&self.settings, file);
            if repository.contains(&idem_key) {
                trace!(file = %key, key = %idem_key, "already consumed, skipping");
                return false;
            }
            if !self.in_progress.add(&key) {
                return false;
            }
            if self.settings.idempotent_eager && !repository.add(&idem_key) {
                self.in_progress.remove(&key);
                return false;
            }
            return true;
        }

        self.in_progress.add(&key)
    }
}
