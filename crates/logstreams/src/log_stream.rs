// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The log stream of one partition

use crate::flow_control::{AimdLimiter, FlowControl, Limiter};
use crate::reader::{LogStreamReader, ReadError};
use crate::storage::{CommitListener, LogStorage, StorageError};
use crate::writer::{LogStreamWriter, SequencedWriter};
use keel_core::{
    check_partition_id, Clock, KeelConfig, KeyError, PartitionId, SystemClock, NULL_POSITION,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::sync::watch;

/// Errors that can occur in log stream operations
#[derive(Debug, Error)]
pub enum LogStreamError {
    #[error("log stream of partition {0} is closed")]
    Closed(PartitionId),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("read error: {0}")]
    Read(#[from] ReadError),
    #[error(transparent)]
    Partition(#[from] KeyError),
}

/// Whether the stream can still make progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Storage failed; the stream accepts no more writes
    Dead(String),
}

/// Notified when new records were committed and can be read
pub trait RecordsAvailableListener: Send + Sync {
    fn on_records_available(&self, commit_position: i64);
}

/// Notified once when the stream dies
pub trait FailureListener: Send + Sync {
    fn on_failure(&self, reason: &str);
}

pub(crate) struct Sequencer {
    pub(crate) next_position: i64,
}

/// State shared by the stream and every writer on it
pub(crate) struct Shared {
    pub(crate) partition_id: PartitionId,
    pub(crate) storage: Arc<dyn LogStorage>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) flow_control: FlowControl,
    pub(crate) max_batch_size: usize,
    pub(crate) sequencer: Mutex<Sequencer>,
    last_written: AtomicI64,
    commit_position: watch::Sender<i64>,
    closed: AtomicBool,
    health: RwLock<HealthStatus>,
    records_available: RwLock<Arc<Vec<Arc<dyn RecordsAvailableListener>>>>,
    failure_listeners: RwLock<Arc<Vec<Arc<dyn FailureListener>>>>,
}

impl Shared {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn set_last_written(&self, position: i64) {
        self.last_written.fetch_max(position, Ordering::SeqCst);
    }

    pub(crate) fn set_committed(&self, position: i64) {
        let advanced = self.commit_position.send_if_modified(|current| {
            if position > *current {
                *current = position;
                true
            } else {
                false
            }
        });
        if advanced {
            let listeners = Arc::clone(
                &self
                    .records_available
                    .read()
                    .unwrap_or_else(|e| e.into_inner()),
            );
            for listener in listeners.iter() {
                listener.on_records_available(position);
            }
        }
    }

    /// Storage failed: the stream is dead and every writer is closed
    pub(crate) fn fail(&self, error: &StorageError) {
        let reason = error.to_string();
        tracing::error!(partition = self.partition_id, error = %reason, "log storage failed; closing log stream");
        *self.health.write().unwrap_or_else(|e| e.into_inner()) = HealthStatus::Dead(reason.clone());
        let already_closed = self.closed.swap(true, Ordering::SeqCst);
        // Wake commit waiters so they observe the closed stream
        self.commit_position.send_modify(|_| {});
        if !already_closed {
            let listeners = Arc::clone(
                &self
                    .failure_listeners
                    .read()
                    .unwrap_or_else(|e| e.into_inner()),
            );
            for listener in listeners.iter() {
                listener.on_failure(&reason);
            }
        }
    }
}

fn push_listener<T: ?Sized>(list: &RwLock<Arc<Vec<Arc<T>>>>, listener: Arc<T>) {
    let mut guard = list.write().unwrap_or_else(|e| e.into_inner());
    let mut next = Vec::clone(&guard);
    next.push(listener);
    *guard = Arc::new(next);
}

fn remove_listener<T: ?Sized>(list: &RwLock<Arc<Vec<Arc<T>>>>, listener: &Arc<T>) {
    let mut guard = list.write().unwrap_or_else(|e| e.into_inner());
    let next: Vec<_> = guard
        .iter()
        .filter(|l| !Arc::ptr_eq(l, listener))
        .cloned()
        .collect();
    *guard = Arc::new(next);
}

/// Builds a [`LogStream`] over a storage
pub struct LogStreamBuilder {
    partition_id: PartitionId,
    storage: Option<Arc<dyn LogStorage>>,
    clock: Arc<dyn Clock>,
    limiter: Option<Arc<dyn Limiter>>,
    config: KeelConfig,
}

impl LogStreamBuilder {
    pub fn storage(mut self, storage: Arc<dyn LogStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the limiter built from the configuration
    pub fn limiter(mut self, limiter: Arc<dyn Limiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn config(mut self, config: &KeelConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Open the stream, continuing after the last position in storage
    pub fn build(self) -> Result<LogStream, LogStreamError> {
        check_partition_id(self.partition_id)?;
        let storage = match self.storage {
            Some(storage) => storage,
            None => Arc::new(crate::storage::MemoryLogStorage::new()),
        };
        let last_position = last_stored_position(storage.as_ref())?;
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(AimdLimiter::from_config(&self.config)));
        let (commit_position, _) = watch::channel(last_position);

        tracing::info!(
            partition = self.partition_id,
            last_position,
            "opened log stream"
        );
        Ok(LogStream {
            shared: Arc::new(Shared {
                partition_id: self.partition_id,
                storage,
                clock: Arc::clone(&self.clock),
                flow_control: FlowControl::new(limiter, self.clock),
                max_batch_size: self.config.max_batch_size_bytes,
                sequencer: Mutex::new(Sequencer {
                    next_position: last_position.max(0) + 1,
                }),
                last_written: AtomicI64::new(last_position),
                commit_position,
                closed: AtomicBool::new(false),
                health: RwLock::new(HealthStatus::Healthy),
                records_available: RwLock::new(Arc::new(Vec::new())),
                failure_listeners: RwLock::new(Arc::new(Vec::new())),
            }),
        })
    }
}

fn last_stored_position(storage: &dyn LogStorage) -> Result<i64, LogStreamError> {
    let mut reader = storage.new_reader();
    reader.seek(i64::MAX);
    let mut last = NULL_POSITION;
    while let Some(block) = reader.next() {
        last = block?.highest;
    }
    Ok(last)
}

/// Append-only, position-addressed record log of one partition
///
/// Cheap to clone; clones share the stream.
#[derive(Clone)]
pub struct LogStream {
    shared: Arc<Shared>,
}

impl LogStream {
    pub fn builder(partition_id: PartitionId) -> LogStreamBuilder {
        LogStreamBuilder {
            partition_id,
            storage: None,
            clock: Arc::new(SystemClock),
            limiter: None,
            config: KeelConfig::default(),
        }
    }

    pub fn partition_id(&self) -> PartitionId {
        self.shared.partition_id
    }

    pub fn new_writer(&self) -> Result<Arc<dyn LogStreamWriter>, LogStreamError> {
        self.ensure_open()?;
        Ok(Arc::new(SequencedWriter::new(Arc::clone(&self.shared))))
    }

    pub fn new_reader(&self) -> Result<LogStreamReader, LogStreamError> {
        self.ensure_open()?;
        Ok(LogStreamReader::new(self.shared.storage.new_reader()))
    }

    /// Position of the last record handed to storage
    pub fn last_written_position(&self) -> i64 {
        self.shared.last_written.load(Ordering::SeqCst)
    }

    /// Position of the last committed record, `-1` before the first commit
    pub fn commit_position(&self) -> i64 {
        *self.shared.commit_position.borrow()
    }

    /// Wait until `position` is committed
    pub async fn wait_for_commit(&self, position: i64) -> Result<(), LogStreamError> {
        let mut rx = self.shared.commit_position.subscribe();
        let shared = Arc::clone(&self.shared);
        let committed = rx
            .wait_for(|committed| *committed >= position || shared.is_closed())
            .await
            .map(|committed| *committed)
            .map_err(|_| LogStreamError::Closed(self.shared.partition_id))?;
        if committed >= position {
            Ok(())
        } else {
            Err(LogStreamError::Closed(self.shared.partition_id))
        }
    }

    /// Storage-level commit listener, called after every commit
    pub fn add_commit_listener(&self, listener: Arc<dyn CommitListener>) {
        self.shared.storage.add_commit_listener(listener);
    }

    pub fn remove_commit_listener(&self, listener: &Arc<dyn CommitListener>) {
        self.shared.storage.remove_commit_listener(listener);
    }

    /// Must not write to the stream from the callback; it runs on the
    /// appending thread.
    pub fn add_records_available_listener(&self, listener: Arc<dyn RecordsAvailableListener>) {
        push_listener(&self.shared.records_available, listener);
    }

    pub fn remove_records_available_listener(&self, listener: &Arc<dyn RecordsAvailableListener>) {
        remove_listener(&self.shared.records_available, listener);
    }

    pub fn add_failure_listener(&self, listener: Arc<dyn FailureListener>) {
        push_listener(&self.shared.failure_listeners, listener);
    }

    pub fn health(&self) -> HealthStatus {
        self.shared
            .health
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Advisory hint that records below `position` are no longer needed
    pub fn update_compaction_bound(&self, position: i64) {
        tracing::debug!(
            partition = self.shared.partition_id,
            position,
            "updating compaction bound"
        );
        self.shared.storage.update_compaction_bound(position);
    }

    pub fn flow_control_limit(&self) -> usize {
        self.shared.flow_control.limit()
    }

    pub fn in_flight_appends(&self) -> usize {
        self.shared.flow_control.in_flight()
    }

    /// Close the stream; existing writers fail with `Closed` from now on
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(partition = self.shared.partition_id, "closed log stream");
            self.shared.commit_position.send_modify(|_| {});
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    fn ensure_open(&self) -> Result<(), LogStreamError> {
        if self.shared.is_closed() {
            return Err(LogStreamError::Closed(self.shared.partition_id));
        }
        Ok(())
    }
}

impl fmt::Debug for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogStream")
            .field("partition_id", &self.shared.partition_id)
            .field("last_written_position", &self.last_written_position())
            .field("commit_position", &self.commit_position())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
#[path = "log_stream_tests.rs"]
mod tests;
