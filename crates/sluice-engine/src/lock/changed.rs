//! Changed-detection read lock.

use std::time::{Instant, SystemTime};

use async_trait::async_trait;
use sluice_core::SourceFile;
use sluice_fsops::FileOperations;
use tracing::{debug, trace};

use crate::error::EngineResult;
use crate::lock::ReadLockStrategy;

/// Grants once length and modification time are stable across samples.
///
/// Inherently cannot grant faster than one check interval, since stability
/// requires two observations.
pub struct ChangedLock;

#[derive(PartialEq, Eq, Clone, Copy)]
struct Sample {
    length: u64,
    modified: Option<SystemTime>,
}

fn sample(file: &SourceFile) -> Option<Sample> {
    std::fs::metadata(file.absolute_path())
        .ok()
        .map(|metadata| Sample {
            length: metadata.len(),
            modified: metadata.modified().ok(),
        })
}

fn old_enough(sample: Sample, min_age: std::time::Duration) -> bool {
    if min_age.is_zero() {
        return true;
    }
    sample
        .modified
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= min_age)
}

#[async_trait]
impl ReadLockStrategy for ChangedLock {
    async fn acquire(&self, operations: &FileOperations, file: &SourceFile) -> EngineResult<bool> {
        let settings = operations.settings();
        let timeout = settings.read_lock_timeout;
        let interval = settings.read_lock_check_interval;
        let started = Instant::now();

        let Some(mut previous) = sample(file) else {
            // The file vanished before the first sample; nothing to lock.
            return Ok(false);
        };

        loop {
            tokio::time::sleep(interval).await;
            let Some(current) = sample(file) else {
                return Ok(false);
            };
            let stable = current == previous
                && current.length >= settings.read_lock_min_length
                && old_enough(current, settings.read_lock_min_age);
            if stable {
                debug!(
                    file = %file.absolute_path().display(),
                    length = current.length,
                    "file stable, read lock granted"
                );
                return Ok(true);
            }
            trace!(
                file = %file.absolute_path().display(),
                "file still changing, waiting"
            );
            previous = current;
            if !timeout.is_zero() && started.elapsed() >= timeout {
                return Ok(false);
            }
        }
    }
}
