// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage contract underneath a log stream
//!
//! Storage deals in opaque blocks, each covering a contiguous range of
//! positions `[lowest, highest]`. It never looks inside a payload.

mod file;
mod memory;

pub use file::FileLogStorage;
pub use memory::{CommitMode, MemoryLogStorage};

use bytes::Bytes;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt block at offset {offset}")]
    Corrupt { offset: u64 },
    #[error("block [{lowest}, {highest}] does not follow position {last}")]
    OutOfOrder { lowest: i64, highest: i64, last: i64 },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// A stored block of records
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlock {
    pub lowest: i64,
    pub highest: i64,
    pub payload: Bytes,
}

impl StoredBlock {
    pub fn contains(&self, position: i64) -> bool {
        (self.lowest..=self.highest).contains(&position)
    }
}

/// Outcome callbacks for a single append
///
/// `on_write` and `on_commit` are called in that order on success; on failure
/// only `on_write_error` is called. Callbacks must not call back into the
/// storage.
pub trait AppendListener: Send + Sync {
    fn on_write(&mut self, _index: u64, _highest_position: i64) {}

    fn on_write_error(&mut self, _error: &StorageError) {}

    fn on_commit(&mut self, _index: u64, _highest_position: i64) {}
}

/// Notified after every commit
pub trait CommitListener: Send + Sync {
    fn on_commit(&self);
}

/// Durable, append-only block storage for one partition
pub trait LogStorage: Send + Sync {
    /// Persist `payload` covering `[lowest, highest]`.
    ///
    /// Safe under concurrent callers; the outcome is reported through the
    /// listener only.
    fn append(&self, lowest: i64, highest: i64, payload: Bytes, listener: Box<dyn AppendListener>);

    /// A new cursor over committed blocks, positioned at the first block
    fn new_reader(&self) -> Box<dyn LogStorageReader>;

    fn add_commit_listener(&self, listener: Arc<dyn CommitListener>);

    fn remove_commit_listener(&self, listener: &Arc<dyn CommitListener>);

    /// Advisory: blocks entirely below `position` may be removed, except
    /// where a live reader still points.
    fn update_compaction_bound(&self, _position: i64) {}
}

/// Forward-only cursor over committed blocks
pub trait LogStorageReader: Send {
    /// Move to the block containing `position`, or the last block before it.
    /// Seeking before the first block moves to the first block.
    fn seek(&mut self, position: i64);

    fn seek_to_first(&mut self) {
        self.seek(i64::MIN);
    }

    /// Move past the last committed block
    fn seek_to_end(&mut self);

    fn has_next(&mut self) -> bool;

    fn next(&mut self) -> Option<Result<StoredBlock, StorageError>>;
}

/// Copy-on-write list of commit listeners
///
/// Notification iterates a snapshot, so listeners may be added or removed
/// while a commit is being announced.
#[derive(Default)]
pub(crate) struct CommitListeners {
    listeners: RwLock<Arc<Vec<Arc<dyn CommitListener>>>>,
}

impl CommitListeners {
    pub(crate) fn add(&self, listener: Arc<dyn CommitListener>) {
        let mut guard = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let mut next = Vec::clone(&guard);
        next.push(listener);
        *guard = Arc::new(next);
    }

    pub(crate) fn remove(&self, listener: &Arc<dyn CommitListener>) {
        let mut guard = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let next: Vec<_> = guard
            .iter()
            .filter(|l| !std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)))
            .cloned()
            .collect();
        *guard = Arc::new(next);
    }

    pub(crate) fn notify(&self) {
        let snapshot = Arc::clone(&self.listeners.read().unwrap_or_else(|e| e.into_inner()));
        for listener in snapshot.iter() {
            listener.on_commit();
        }
    }
}
