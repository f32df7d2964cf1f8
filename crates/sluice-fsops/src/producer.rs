//! Producer (writer) side of the engine.
//!
//! Computes the target name, jails it to the configured root, optionally
//! stages content under a temporary name, applies the collision policy, and
//! atomically renames into place. Concurrent producers writing the same
//! computed name are serialised through a bounded per-name lock map.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use sluice_config::{CollisionPolicy, EndpointSettings};
use sluice_events::{Event, EventBus};
use sluice_telemetry::Metrics;
use tracing::{debug, info, warn};

use crate::error::{FsOpsError, FsOpsResult};
use crate::operations::{Body, FileOperations, compact_path};

/// Bound on the per-name lock map; idle entries are recycled FIFO.
const NAME_LOCK_CAPACITY: usize = 64;

/// Writer for one configured endpoint.
#[derive(Clone)]
pub struct FileProducer {
    operations: FileOperations,
    settings: Arc<EndpointSettings>,
    events: EventBus,
    metrics: Metrics,
    health_degraded: Arc<Mutex<bool>>,
    name_locks: Arc<NameLocks>,
}

impl FileProducer {
    /// Build a producer over validated endpoint settings.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying operations cannot be constructed
    /// (for example an unknown charset).
    pub fn new(
        settings: Arc<EndpointSettings>,
        events: EventBus,
        metrics: Metrics,
    ) -> FsOpsResult<Self> {
        let operations = FileOperations::new(Arc::clone(&settings))?;
        Ok(Self {
            operations,
            settings,
            events,
            metrics,
            health_degraded: Arc::new(Mutex::new(false)),
            name_locks: Arc::new(NameLocks::new(NAME_LOCK_CAPACITY)),
        })
    }

    /// The operations handle backing this producer.
    #[must_use]
    pub const fn operations(&self) -> &FileOperations {
        &self.operations
    }

    /// Store `body` under `target_name`, relative to the configured root.
    ///
    /// Returns the absolute path the content was stored at.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::OutsideRoot`] when jailing rejects the computed
    /// target, [`FsOpsError::DirectoryMissing`] when the parent directory is
    /// absent and auto-creation is disabled, and the collision policy and IO
    /// errors described on [`FileOperations::store_file`].
    pub async fn produce(
        &self,
        target_name: &str,
        body: Option<Body<'_>>,
        last_modified: Option<SystemTime>,
    ) -> FsOpsResult<PathBuf> {
        match self.produce_inner(target_name, body, last_modified).await {
            Ok((target, written)) => {
                self.mark_recovered();
                self.metrics.record_store();
                self.events.publish(Event::FileStored {
                    path: target.display().to_string(),
                    bytes: written,
                });
                info!(target = %target.display(), bytes = written, "stored file");
                Ok(target)
            }
            Err(error) => {
                self.metrics.record_store_failure();
                self.mark_degraded(&error.to_string());
                Err(error)
            }
        }
    }

    async fn produce_inner(
        &self,
        target_name: &str,
        body: Option<Body<'_>>,
        last_modified: Option<SystemTime>,
    ) -> FsOpsResult<(PathBuf, u64)> {
        let relative = self.effective_name(target_name);
        let target = self.jailed_target(&relative)?;

        let lock = self.name_locks.lock_for(&target.to_string_lossy());
        let _guard = lock.lock().await;

        self.ensure_parent(&target)?;

        let written = if self.settings.temp_file_name.is_some() {
            self.store_via_temp(&relative, &target, body, last_modified)?
        } else {
            self.operations.store_file(&target, body, last_modified)?
        };

        self.operations.write_done_file(&target)?;
        self.operations.write_checksum_file(&target)?;
        Ok((target, written))
    }

    fn effective_name(&self, target_name: &str) -> String {
        // The configured name expression rewrites the requested name, e.g.
        // `out/${file:onlyname.noext}.${file:ext}`.
        let named = self.settings.file_name.as_ref().map_or_else(
            || target_name.to_string(),
            |pattern| pattern.resolve_name(target_name),
        );
        if self.settings.flatten {
            Path::new(&named)
                .file_name()
                .map_or_else(|| named.clone(), |name| name.to_string_lossy().into_owned())
        } else {
            named
        }
    }

    fn jailed_target(&self, relative: &str) -> FsOpsResult<PathBuf> {
        let target = compact_path(&self.settings.directory.join(relative));
        if self.settings.jail_starting_directory {
            // The check runs after compaction so `../` segments cannot smuggle
            // the target outside the root.
            let root = compact_path(&self.settings.directory);
            if !target.starts_with(&root) {
                return Err(FsOpsError::OutsideRoot {
                    root,
                    target,
                });
            }
        }
        Ok(target)
    }

    fn ensure_parent(&self, target: &Path) -> FsOpsResult<()> {
        let Some(parent) = target.parent() else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() || parent.is_dir() {
            return Ok(());
        }
        if self.settings.auto_create {
            self.operations.build_directory(parent)
        } else {
            Err(FsOpsError::DirectoryMissing {
                path: parent.to_path_buf(),
            })
        }
    }

    fn store_via_temp(
        &self,
        relative: &str,
        target: &Path,
        body: Option<Body<'_>>,
        last_modified: Option<SystemTime>,
    ) -> FsOpsResult<u64> {
        let pattern = self
            .settings
            .temp_file_name
            .as_ref()
            .ok_or(FsOpsError::MissingState {
                field: "temp_file_name",
            })?;
        let temp_relative = pattern.resolve_name(relative);
        let temp = compact_path(&self.settings.directory.join(&temp_relative));
        if let Some(parent) = temp.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() && self.settings.auto_create {
                self.operations.build_directory(parent)?;
            }
        }

        let exists = self.operations.exists(target);
        let policy = self.settings.file_exist;
        if exists {
            match policy {
                CollisionPolicy::Ignore => {
                    debug!(target = %target.display(), "target exists, ignoring write");
                    return Ok(0);
                }
                CollisionPolicy::Fail => {
                    return Err(FsOpsError::TargetExists {
                        path: target.to_path_buf(),
                    });
                }
                CollisionPolicy::Move => {
                    self.operations.move_existing(target)?;
                }
                CollisionPolicy::Override | CollisionPolicy::TryRename => {}
                CollisionPolicy::Append => {
                    // Rejected at validation; staging cannot append.
                    return Err(FsOpsError::MissingState {
                        field: "file_exist",
                    });
                }
            }
        }

        // Eager deletion trades data-loss-on-failure for a collision-free
        // rename; the choice is explicit and caller-selected.
        let delete_target = exists && policy == CollisionPolicy::Override;
        if delete_target && self.settings.eager_delete_target_file {
            self.operations.delete_file(target)?;
        }
        if self.operations.exists(&temp) {
            warn!(temp = %temp.display(), "removing stale temp file");
            self.operations.delete_file(&temp)?;
        }

        let written = self.operations.write_body(&temp, body, false)?;

        if delete_target && !self.settings.eager_delete_target_file {
            self.operations.delete_file(target)?;
        }
        debug!(
            temp = %temp.display(),
            target = %target.display(),
            "renaming staged file into place"
        );
        self.operations.rename_file(&temp, target)?;

        if self.settings.keep_last_modified {
            if let Some(modified) = last_modified {
                if let Err(error) = self.operations.change_last_modified(target, modified) {
                    warn!(
                        target = %target.display(),
                        error = %error,
                        "could not restore last-modified timestamp"
                    );
                }
            }
        }
        if let Some(mode) = self.settings.chmod {
            self.operations.apply_chmod(target, mode)?;
        }
        Ok(written)
    }

    fn mark_degraded(&self, detail: &str) {
        let mut degraded = self.health_degraded.lock().expect("health mutex poisoned");
        if !*degraded {
            *degraded = true;
            self.events.publish(Event::HealthChanged {
                degraded: vec![format!("producer: {detail}")],
            });
        }
    }

    fn mark_recovered(&self) {
        let mut degraded = self.health_degraded.lock().expect("health mutex poisoned");
        if *degraded {
            *degraded = false;
            self.events.publish(Event::HealthChanged {
                degraded: Vec::new(),
            });
        }
    }
}

/// Bounded map of per-target-name async locks.
///
/// Only writers to the *same* computed name need serialising, so the map
/// recycles idle entries FIFO instead of keeping unbounded history. A lock
/// currently held elsewhere is never evicted.
struct NameLocks {
    capacity: usize,
    inner: Mutex<LockMap>,
}

struct LockMap {
    locks: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
    order: VecDeque<String>,
}

impl NameLocks {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(LockMap {
                locks: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("name lock mutex poisoned");
        if let Some(existing) = map.locks.get(key) {
            return Arc::clone(existing);
        }
        let lock = Arc::new(tokio::sync::Mutex::new(()));
        map.locks.insert(key.to_string(), Arc::clone(&lock));
        map.order.push_back(key.to_string());

        while map.locks.len() > self.capacity {
            let Some(index) = map
                .order
                .iter()
                .position(|candidate| {
                    map.locks
                        .get(candidate)
                        .is_some_and(|entry| Arc::strong_count(entry) == 1)
                })
            else {
                break;
            };
            if let Some(evicted) = map.order.remove(index) {
                map.locks.remove(&evicted);
            }
        }
        lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::NamePattern;
    use std::fs;
    use tempfile::TempDir;

    fn producer(mut settings: EndpointSettings) -> (TempDir, FileProducer) {
        let dir = tempfile::tempdir().expect("tempdir");
        settings.directory = dir.path().to_path_buf();
        let settings = settings.validated().expect("valid settings");
        let producer = FileProducer::new(
            Arc::new(settings),
            EventBus::new(),
            Metrics::new().expect("metrics"),
        )
        .expect("producer");
        (dir, producer)
    }

    #[tokio::test]
    async fn auto_create_builds_nested_directories() {
        let (dir, producer) = producer(EndpointSettings::new("placeholder"));
        let target = producer
            .produce("out/sub/file.txt", Some(Body::Bytes(b"x")), None)
            .await
            .expect("produce");
        assert_eq!(target, dir.path().join("out/sub/file.txt"));
        assert!(dir.path().join("out").is_dir());
        assert!(dir.path().join("out/sub").is_dir());
        assert_eq!(fs::read(&target).expect("read"), b"x");
    }

    #[tokio::test]
    async fn missing_parent_fails_without_auto_create() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.auto_create = false;
        let (_dir, producer) = producer(settings);
        let err = producer
            .produce("out/file.txt", Some(Body::Bytes(b"x")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FsOpsError::DirectoryMissing { .. }));
    }

    #[tokio::test]
    async fn jail_rejects_escaping_target() {
        let (_dir, producer) = producer(EndpointSettings::new("placeholder"));
        let err = producer
            .produce("../escape.txt", Some(Body::Bytes(b"x")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FsOpsError::OutsideRoot { .. }));
    }

    #[tokio::test]
    async fn jail_disabled_allows_escaping_target() {
        let outer = tempfile::tempdir().expect("tempdir");
        let root = outer.path().join("root");
        fs::create_dir(&root).expect("mkdir");
        let mut settings = EndpointSettings::new(&root);
        settings.jail_starting_directory = false;
        let settings = settings.validated().expect("valid settings");
        let producer = FileProducer::new(
            Arc::new(settings),
            EventBus::new(),
            Metrics::new().expect("metrics"),
        )
        .expect("producer");

        let target = producer
            .produce("../outside.txt", Some(Body::Bytes(b"x")), None)
            .await
            .expect("produce");
        assert_eq!(target, outer.path().join("outside.txt"));
        assert!(target.exists());
    }

    #[tokio::test]
    async fn name_expression_rewrites_the_target() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.file_name =
            Some(NamePattern::parse("out/${file:onlyname.noext}.dat").expect("pattern"));
        let (dir, producer) = producer(settings);
        let target = producer
            .produce("report.csv", Some(Body::Bytes(b"x")), None)
            .await
            .expect("produce");
        assert_eq!(target, dir.path().join("out/report.dat"));
    }

    #[tokio::test]
    async fn flatten_drops_leading_directories() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.flatten = true;
        let (dir, producer) = producer(settings);
        let target = producer
            .produce("deep/nested/name.txt", Some(Body::Bytes(b"x")), None)
            .await
            .expect("produce");
        assert_eq!(target, dir.path().join("name.txt"));
    }

    #[tokio::test]
    async fn temp_name_stages_then_renames() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.temp_file_name =
            Some(NamePattern::parse("${file:onlyname}.part").expect("pattern"));
        let (dir, producer) = producer(settings);
        let target = producer
            .produce("file.txt", Some(Body::Bytes(b"payload")), None)
            .await
            .expect("produce");
        assert_eq!(fs::read(&target).expect("read"), b"payload");
        assert!(!dir.path().join("file.txt.part").exists());
    }

    #[tokio::test]
    async fn temp_with_fail_policy_checks_final_target() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.file_exist = CollisionPolicy::Fail;
        settings.temp_file_name =
            Some(NamePattern::parse("${file:onlyname}.part").expect("pattern"));
        let (dir, producer) = producer(settings);
        fs::write(dir.path().join("file.txt"), b"existing").expect("seed");
        let err = producer
            .produce("file.txt", Some(Body::Bytes(b"new")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FsOpsError::TargetExists { .. }));
        assert_eq!(
            fs::read(dir.path().join("file.txt")).expect("read"),
            b"existing"
        );
    }

    #[tokio::test]
    async fn try_rename_overwrites_via_rename() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.file_exist = CollisionPolicy::TryRename;
        settings.temp_file_name =
            Some(NamePattern::parse("${file:onlyname}.part").expect("pattern"));
        let (dir, producer) = producer(settings);
        fs::write(dir.path().join("file.txt"), b"existing").expect("seed");
        producer
            .produce("file.txt", Some(Body::Bytes(b"new")), None)
            .await
            .expect("produce");
        assert_eq!(fs::read(dir.path().join("file.txt")).expect("read"), b"new");
    }

    #[tokio::test]
    async fn done_file_emitted_after_store() {
        let mut settings = EndpointSettings::new("placeholder");
        settings.done_file_name =
            Some(sluice_core::DoneFilePattern::parse("${file:name}.done").expect("pattern"));
        let (dir, producer) = producer(settings);
        producer
            .produce("report.csv", Some(Body::Bytes(b"rows")), None)
            .await
            .expect("produce");
        assert!(dir.path().join("report.csv.done").exists());
    }

    #[test]
    fn name_locks_recycle_only_idle_entries() {
        let locks = NameLocks::new(2);
        let held = locks.lock_for("busy");
        let _first = locks.lock_for("a");
        let _second = locks.lock_for("b");
        let _third = locks.lock_for("c");

        // The held lock survives eviction pressure and stays the same entry.
        let again = locks.lock_for("busy");
        assert!(Arc::ptr_eq(&held, &again));
    }
}
