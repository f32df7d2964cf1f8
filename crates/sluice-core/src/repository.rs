//! Key-set repositories used for in-progress and idempotent tracking.
//!
//! # Design
//!
//! - `add` is atomic add-if-absent: the first caller wins, later callers see
//!   `false`. This is the mutual-exclusion gate the consumer relies on.
//! - The memory store bounds its size with FIFO eviction so long-running
//!   endpoints do not accumulate keys without limit.
//! - The file store hydrates its in-memory set at construction and persists
//!   every change, so consumed keys survive restarts.

use std::collections::{HashSet, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use crate::error::{CoreError, CoreResult};

/// Default bound for memory-backed idempotent stores.
const DEFAULT_CAPACITY: usize = 1_000;

/// Concurrent key-set abstraction shared by in-progress and idempotent
/// tracking. Implementations must be safe for concurrent callers.
pub trait Repository: Send + Sync {
    /// Whether the key is present.
    fn contains(&self, key: &str) -> bool;

    /// Add the key; returns `false` if it was already present.
    fn add(&self, key: &str) -> bool;

    /// Remove the key; returns `false` if it was not present.
    fn remove(&self, key: &str) -> bool;

    /// Number of keys currently held.
    fn len(&self) -> usize;

    /// Whether the repository holds no keys.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct KeySet {
    keys: HashSet<String>,
    order: VecDeque<String>,
}

impl KeySet {
    fn new() -> Self {
        Self {
            keys: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    fn insert(&mut self, key: &str, capacity: Option<usize>) -> bool {
        if !self.keys.insert(key.to_string()) {
            return false;
        }
        self.order.push_back(key.to_string());
        if let Some(capacity) = capacity {
            while self.order.len() > capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.keys.remove(&oldest);
                }
            }
        }
        true
    }

    fn remove(&mut self, key: &str) -> bool {
        if !self.keys.remove(key) {
            return false;
        }
        self.order.retain(|entry| entry != key);
        true
    }
}

/// In-memory key set with optional FIFO eviction.
pub struct MemoryRepository {
    state: Mutex<KeySet>,
    capacity: Option<usize>,
}

impl MemoryRepository {
    /// Bounded store with the default capacity of 1000 keys.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Bounded store evicting the oldest key once `capacity` is exceeded.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(KeySet::new()),
            capacity: Some(capacity),
        }
    }

    /// Unbounded store; used for in-progress tracking where every admitted
    /// key is guaranteed a matching removal.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            state: Mutex::new(KeySet::new()),
            capacity: None,
        }
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository for MemoryRepository {
    fn contains(&self, key: &str) -> bool {
        self.state
            .lock()
            .expect("repository mutex poisoned")
            .keys
            .contains(key)
    }

    fn add(&self, key: &str) -> bool {
        self.state
            .lock()
            .expect("repository mutex poisoned")
            .insert(key, self.capacity)
    }

    fn remove(&self, key: &str) -> bool {
        self.state
            .lock()
            .expect("repository mutex poisoned")
            .remove(key)
    }

    fn len(&self) -> usize {
        self.state
            .lock()
            .expect("repository mutex poisoned")
            .keys
            .len()
    }
}

/// Durable key set backed by a newline-delimited store file.
///
/// Keys are appended on `add` and the file is compacted on `remove` or
/// eviction. The whole set is kept in memory, so `contains` never touches
/// the disk.
pub struct FileRepository {
    path: PathBuf,
    state: Mutex<KeySet>,
    capacity: usize,
}

impl FileRepository {
    /// Open (or create) the store file at `path` and hydrate the key set.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when the store file cannot be read or
    /// created.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> CoreResult<Self> {
        let path = path.into();
        let mut state = KeySet::new();
        if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|source| CoreError::store("hydrate", &path, source))?;
            for line in contents.lines() {
                if !line.is_empty() {
                    state.insert(line, Some(capacity));
                }
            }
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|source| CoreError::store("create_parent", parent, source))?;
            }
            fs::write(&path, b"").map_err(|source| CoreError::store("create", &path, source))?;
        }
        Ok(Self {
            path,
            state: Mutex::new(state),
            capacity,
        })
    }

    /// Open with the default capacity of 1000 keys.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Store`] when the store file cannot be read or
    /// created.
    pub fn open_default(path: impl Into<PathBuf>) -> CoreResult<Self> {
        Self::open(path, DEFAULT_CAPACITY)
    }

    fn append(&self, key: &str) -> CoreResult<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| CoreError::store("append_open", &self.path, source))?;
        writeln!(file, "{key}").map_err(|source| CoreError::store("append", &self.path, source))?;
        file.flush()
            .map_err(|source| CoreError::store("flush", &self.path, source))
    }

    fn rewrite(&self, state: &KeySet) -> CoreResult<()> {
        let mut contents = String::new();
        for key in &state.order {
            contents.push_str(key);
            contents.push('\n');
        }
        fs::write(&self.path, contents)
            .map_err(|source| CoreError::store("rewrite", &self.path, source))
    }
}

impl Repository for FileRepository {
    fn contains(&self, key: &str) -> bool {
        self.state
            .lock()
            .expect("repository mutex poisoned")
            .keys
            .contains(key)
    }

    fn add(&self, key: &str) -> bool {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        let before = state.order.len();
        if !state.insert(key, Some(self.capacity)) {
            return false;
        }
        let evicted = state.order.len() <= before;
        let result = if evicted {
            // Eviction changed history, so the append-only file is stale.
            self.rewrite(&state)
        } else {
            self.append(key)
        };
        if let Err(error) = result {
            warn!(error = %error, "idempotent store write failed; durability degraded");
        }
        true
    }

    fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock().expect("repository mutex poisoned");
        if !state.remove(key) {
            return false;
        }
        if let Err(error) = self.rewrite(&state) {
            warn!(error = %error, "idempotent store compaction failed; durability degraded");
        }
        true
    }

    fn len(&self) -> usize {
        self.state
            .lock()
            .expect("repository mutex poisoned")
            .keys
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_first_caller_wins() {
        let repo = MemoryRepository::unbounded();
        assert!(repo.add("a"));
        assert!(!repo.add("a"));
        assert!(repo.contains("a"));
        assert!(repo.remove("a"));
        assert!(!repo.remove("a"));
        assert!(repo.is_empty());
    }

    #[test]
    fn bounded_store_evicts_oldest() {
        let repo = MemoryRepository::with_capacity(2);
        assert!(repo.add("a"));
        assert!(repo.add("b"));
        assert!(repo.add("c"));
        assert_eq!(repo.len(), 2);
        assert!(!repo.contains("a"));
        assert!(repo.contains("b"));
        assert!(repo.contains("c"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = dir.path().join("idempotent.dat");
        {
            let repo = FileRepository::open_default(&store).expect("open");
            assert!(repo.add("one"));
            assert!(repo.add("two"));
            assert!(repo.remove("one"));
        }
        let repo = FileRepository::open_default(&store).expect("reopen");
        assert!(!repo.contains("one"));
        assert!(repo.contains("two"));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn file_store_creates_missing_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = dir.path().join("nested/state/idempotent.dat");
        let repo = FileRepository::open(&store, 10).expect("open");
        assert!(repo.add("key"));
        assert!(store.exists());
    }

    #[test]
    fn concurrent_adds_admit_exactly_one_winner() {
        let repo = std::sync::Arc::new(MemoryRepository::unbounded());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = std::sync::Arc::clone(&repo);
            handles.push(std::thread::spawn(move || repo.add("contested")));
        }
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
