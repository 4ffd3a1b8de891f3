// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory log storage
//!
//! Used by tests and by single-node setups that do not need durability. In
//! manual commit mode appended blocks stay invisible to readers until
//! [`MemoryLogStorage::commit_pending`] is called, which lets tests hold
//! appends in flight.

use super::{
    AppendListener, CommitListener, CommitListeners, LogStorage, LogStorageReader, StorageError,
    StoredBlock,
};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// When appended blocks become committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Every append commits before `append` returns
    #[default]
    Immediate,
    /// Appends commit on [`MemoryLogStorage::commit_pending`]
    Manual,
}

struct PendingAppend {
    index: u64,
    block: StoredBlock,
    listener: Box<dyn AppendListener>,
}

#[derive(Default)]
struct MemoryLog {
    committed: VecDeque<StoredBlock>,
    pending: Vec<PendingAppend>,
    next_index: u64,
    last_position: Option<i64>,
    compaction_bound: i64,
    readers: Vec<Weak<AtomicI64>>,
    failure: Option<String>,
}

impl MemoryLog {
    /// Drop blocks below the compaction bound that no live reader still needs
    fn compact(&mut self) {
        self.readers.retain(|reader| reader.strong_count() > 0);
        let lowest_cursor = self
            .readers
            .iter()
            .filter_map(Weak::upgrade)
            .map(|cursor| cursor.load(Ordering::SeqCst))
            .min()
            .unwrap_or(i64::MAX);
        let bound = self.compaction_bound.min(lowest_cursor);
        while self
            .committed
            .front()
            .is_some_and(|block| block.highest < bound)
        {
            self.committed.pop_front();
        }
    }
}

/// Log storage held entirely in memory
pub struct MemoryLogStorage {
    mode: CommitMode,
    log: Arc<RwLock<MemoryLog>>,
    commit_listeners: CommitListeners,
}

impl MemoryLogStorage {
    pub fn new() -> Self {
        Self::with_mode(CommitMode::Immediate)
    }

    pub fn with_mode(mode: CommitMode) -> Self {
        Self {
            mode,
            log: Arc::new(RwLock::new(MemoryLog::default())),
            commit_listeners: CommitListeners::default(),
        }
    }

    /// Commit every pending append, in append order. Returns how many were
    /// committed.
    pub fn commit_pending(&self) -> usize {
        let pending = {
            let mut log = self.log.write().unwrap_or_else(|e| e.into_inner());
            let pending = std::mem::take(&mut log.pending);
            for append in &pending {
                log.committed.push_back(append.block.clone());
            }
            pending
        };
        let count = pending.len();
        for mut append in pending {
            append.listener.on_commit(append.index, append.block.highest);
        }
        if count > 0 {
            self.commit_listeners.notify();
        }
        count
    }

    /// Fail every following append until [`MemoryLogStorage::heal`]
    pub fn fail_appends(&self, reason: impl Into<String>) {
        self.log.write().unwrap_or_else(|e| e.into_inner()).failure = Some(reason.into());
    }

    pub fn heal(&self) {
        self.log.write().unwrap_or_else(|e| e.into_inner()).failure = None;
    }

    pub fn committed_block_count(&self) -> usize {
        self.log.read().unwrap_or_else(|e| e.into_inner()).committed.len()
    }

    pub fn pending_count(&self) -> usize {
        self.log.read().unwrap_or_else(|e| e.into_inner()).pending.len()
    }

    /// Lowest position still held, if any
    pub fn first_position(&self) -> Option<i64> {
        self.log
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .committed
            .front()
            .map(|block| block.lowest)
    }
}

impl Default for MemoryLogStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStorage for MemoryLogStorage {
    fn append(
        &self,
        lowest: i64,
        highest: i64,
        payload: Bytes,
        mut listener: Box<dyn AppendListener>,
    ) {
        let block = StoredBlock {
            lowest,
            highest,
            payload,
        };
        let mut log = self.log.write().unwrap_or_else(|e| e.into_inner());
        let last = log.last_position.unwrap_or(i64::MIN);
        let rejected = if let Some(reason) = &log.failure {
            Some(StorageError::Unavailable(reason.clone()))
        } else if lowest > highest || lowest <= last {
            Some(StorageError::OutOfOrder {
                lowest,
                highest,
                last,
            })
        } else {
            None
        };
        if let Some(e) = rejected {
            drop(log);
            listener.on_write_error(&e);
            return;
        }

        let index = log.next_index;
        log.next_index += 1;
        log.last_position = Some(highest);
        match self.mode {
            CommitMode::Immediate => {
                log.committed.push_back(block);
                drop(log);
                listener.on_write(index, highest);
                listener.on_commit(index, highest);
                self.commit_listeners.notify();
            }
            CommitMode::Manual => {
                // Written while still holding the lock so that pending
                // appends commit in append order.
                listener.on_write(index, highest);
                log.pending.push(PendingAppend {
                    index,
                    block,
                    listener,
                });
            }
        }
    }

    fn new_reader(&self) -> Box<dyn LogStorageReader> {
        let cursor = Arc::new(AtomicI64::new(i64::MIN));
        self.log
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .readers
            .push(Arc::downgrade(&cursor));
        Box::new(MemoryReader {
            log: Arc::clone(&self.log),
            cursor,
        })
    }

    fn add_commit_listener(&self, listener: Arc<dyn CommitListener>) {
        self.commit_listeners.add(listener);
    }

    fn remove_commit_listener(&self, listener: &Arc<dyn CommitListener>) {
        self.commit_listeners.remove(listener);
    }

    fn update_compaction_bound(&self, position: i64) {
        let mut log = self.log.write().unwrap_or_else(|e| e.into_inner());
        log.compaction_bound = log.compaction_bound.max(position);
        log.compact();
    }
}

/// Cursor over the committed blocks of a [`MemoryLogStorage`]
///
/// The cursor is the lowest position the next block may end at; it is shared
/// with the storage so compaction can respect it.
struct MemoryReader {
    log: Arc<RwLock<MemoryLog>>,
    cursor: Arc<AtomicI64>,
}

impl MemoryReader {
    fn next_block_index(&self, log: &MemoryLog) -> Option<usize> {
        let cursor = self.cursor.load(Ordering::SeqCst);
        let index = log.committed.partition_point(|block| block.highest < cursor);
        (index < log.committed.len()).then_some(index)
    }
}

impl LogStorageReader for MemoryReader {
    fn seek(&mut self, position: i64) {
        let log = self.log.read().unwrap_or_else(|e| e.into_inner());
        let after = log.committed.partition_point(|block| block.lowest <= position);
        let cursor = match after.checked_sub(1).and_then(|i| log.committed.get(i)) {
            Some(block) => block.lowest,
            None => i64::MIN,
        };
        self.cursor.store(cursor, Ordering::SeqCst);
    }

    fn seek_to_end(&mut self) {
        let log = self.log.read().unwrap_or_else(|e| e.into_inner());
        let cursor = log
            .committed
            .back()
            .map(|block| block.highest.saturating_add(1))
            .unwrap_or(i64::MIN);
        self.cursor.store(cursor, Ordering::SeqCst);
    }

    fn has_next(&mut self) -> bool {
        let log = self.log.read().unwrap_or_else(|e| e.into_inner());
        self.next_block_index(&log).is_some()
    }

    fn next(&mut self) -> Option<Result<StoredBlock, StorageError>> {
        let log = self.log.read().unwrap_or_else(|e| e.into_inner());
        let block = log.committed.get(self.next_block_index(&log)?)?.clone();
        self.cursor
            .store(block.highest.saturating_add(1), Ordering::SeqCst);
        Some(Ok(block))
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
