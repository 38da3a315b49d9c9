#![forbid(unsafe_code)]

//! Persistence backends for [`State`](crate::State).
//!
//! A backend maps a storage key to a full state [`Snapshot`]. `State` writes
//! the whole snapshot after every change and reads it once at construction.
//!
//! - [`MemoryStorage`]: in-process map, always available.
//! - [`FileStorage`](file::FileStorage): one JSON file per key (feature
//!   `state-persistence`).
//!
//! # Failure Modes
//!
//! Backends report failures as [`StorageError`]; `State` propagates them to
//! the caller of the write that triggered them.

#[cfg(feature = "state-persistence")]
pub mod file;

use std::cell::{Cell, RefCell};
use std::fmt;

use ahash::AHashMap;
use evx_core::Snapshot;
use thiserror::Error;

/// Errors raised by a [`StateStorage`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "state-persistence")]
    #[error("stored state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }
}

/// Key/value persistence for whole state snapshots.
pub trait StateStorage<V> {
    /// Persisted snapshot under `key`; `Ok(None)` when nothing was stored.
    fn get(&self, key: &str) -> Result<Option<Snapshot<V>>, StorageError>;

    /// Replace the snapshot stored under `key`.
    fn set(&self, key: &str, state: &Snapshot<V>) -> Result<(), StorageError>;
}

/// In-process [`StateStorage`].
///
/// Shared through `Rc`; writes go through `&self`.
pub struct MemoryStorage<V> {
    entries: RefCell<AHashMap<String, Snapshot<V>>>,
    writes: Cell<u64>,
    read_only: Cell<bool>,
}

impl<V> Default for MemoryStorage<V> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(AHashMap::new()),
            writes: Cell::new(0),
            read_only: Cell::new(false),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for MemoryStorage<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("entries", &self.entries.borrow())
            .field("writes", &self.writes.get())
            .field("read_only", &self.read_only.get())
            .finish()
    }
}

impl<V> MemoryStorage<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `key` without counting a write.
    #[must_use]
    pub fn with_entry(self, key: impl Into<String>, state: Snapshot<V>) -> Self {
        self.entries.borrow_mut().insert(key.into(), state);
        self
    }

    /// Reject every subsequent `set` with [`StorageError::Unavailable`].
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.set(read_only);
    }

    /// Number of successful `set` calls.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.get()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }
}

impl<V: Clone> StateStorage<V> for MemoryStorage<V> {
    fn get(&self, key: &str) -> Result<Option<Snapshot<V>>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, state: &Snapshot<V>) -> Result<(), StorageError> {
        if self.read_only.get() {
            return Err(StorageError::unavailable(format!(
                "memory storage is read-only (key `{key}`)"
            )));
        }
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), state.clone());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}
