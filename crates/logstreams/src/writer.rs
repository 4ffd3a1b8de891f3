// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Writing batches to a log stream
//!
//! All writers of a stream share one sequencer. It assigns contiguous
//! positions to each batch and hands the batch to storage while holding its
//! lock, so storage sees batches in position order.

use crate::batch::{self, FRAME_OVERHEAD};
use crate::flow_control::InFlightAppend;
use crate::log_stream::Shared;
use crate::storage::{AppendListener, StorageError};
use bytes::BytesMut;
use keel_core::{codec, LogAppendEntry};
use std::sync::{Arc, Weak};
use thiserror::Error;

/// Why a batch was not written
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteFailure {
    #[error("log stream is closed")]
    Closed,
    #[error("log stream is full; try again later")]
    Full,
    #[error("invalid batch: {0}")]
    InvalidArgument(String),
}

/// An admitted but not yet written batch
///
/// Dropping it unused returns the permit.
#[derive(Debug)]
pub struct WriteReservation {
    permit: InFlightAppend,
}

/// Appends batches of records to a partition's log
pub trait LogStreamWriter: Send + Sync {
    /// Whether a batch of `event_count` records totalling `batch_size` encoded
    /// bytes would be accepted
    fn can_write_events(&self, event_count: usize, batch_size: usize) -> bool;

    /// Admit and write `entries` as one atomic batch.
    ///
    /// Returns the position of the last record of the batch.
    fn try_write(&self, entries: &[LogAppendEntry], source_position: i64)
        -> Result<i64, WriteFailure>;

    /// Admit a future batch without writing it yet
    fn try_reserve(&self) -> Result<WriteReservation, WriteFailure>;

    /// Write a batch that was admitted earlier
    fn write_reserved(
        &self,
        reservation: WriteReservation,
        entries: &[LogAppendEntry],
        source_position: i64,
    ) -> Result<i64, WriteFailure>;
}

/// Writer handle on a [`crate::LogStream`]
#[derive(Clone)]
pub struct SequencedWriter {
    shared: Arc<Shared>,
}

impl SequencedWriter {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl LogStreamWriter for SequencedWriter {
    fn can_write_events(&self, event_count: usize, batch_size: usize) -> bool {
        let framed = batch_size.saturating_add(event_count.saturating_mul(FRAME_OVERHEAD));
        event_count > 0 && framed <= self.shared.max_batch_size
    }

    fn try_write(
        &self,
        entries: &[LogAppendEntry],
        source_position: i64,
    ) -> Result<i64, WriteFailure> {
        if entries.is_empty() {
            return Err(WriteFailure::InvalidArgument("batch is empty".to_string()));
        }
        let reservation = self.try_reserve()?;
        self.write_reserved(reservation, entries, source_position)
    }

    fn try_reserve(&self) -> Result<WriteReservation, WriteFailure> {
        if self.shared.is_closed() {
            return Err(WriteFailure::Closed);
        }
        match self.shared.flow_control.try_acquire() {
            Some(permit) => Ok(WriteReservation { permit }),
            None => {
                tracing::debug!(
                    partition = self.shared.partition_id,
                    limit = self.shared.flow_control.limit(),
                    "append rejected by flow control"
                );
                Err(WriteFailure::Full)
            }
        }
    }

    fn write_reserved(
        &self,
        reservation: WriteReservation,
        entries: &[LogAppendEntry],
        source_position: i64,
    ) -> Result<i64, WriteFailure> {
        if entries.is_empty() {
            return Err(WriteFailure::InvalidArgument("batch is empty".to_string()));
        }
        for entry in entries {
            entry
                .body
                .validate()
                .map_err(|e| WriteFailure::InvalidArgument(e.to_string()))?;
        }

        let shared = &self.shared;
        let mut sequencer = shared.sequencer.lock().unwrap_or_else(|e| e.into_inner());
        if shared.is_closed() {
            return Err(WriteFailure::Closed);
        }

        let first = sequencer.next_position;
        let timestamp = shared.clock.epoch_millis();
        let mut payload = BytesMut::new();
        batch::encode_batch(&mut payload, first, source_position, timestamp, entries)
            .map_err(|e| WriteFailure::InvalidArgument(e.to_string()))?;
        if payload.len() > shared.max_batch_size {
            return Err(WriteFailure::InvalidArgument(format!(
                "batch of {} bytes exceeds the maximum of {} bytes",
                payload.len(),
                shared.max_batch_size
            )));
        }

        let highest = first + entries.len() as i64 - 1;
        sequencer.next_position = highest + 1;
        shared.set_last_written(highest);

        let mut permit = reservation.permit;
        permit.start();
        tracing::trace!(
            partition = shared.partition_id,
            lowest = first,
            highest,
            records = entries.len(),
            "appending batch"
        );
        shared.storage.append(
            first,
            highest,
            payload.freeze(),
            Box::new(BatchAppendListener {
                stream: Arc::downgrade(shared),
                permit: Some(permit),
            }),
        );
        drop(sequencer);

        // Storage may fail synchronously, which kills the stream
        if shared.is_closed() {
            return Err(WriteFailure::Closed);
        }
        Ok(highest)
    }
}

/// Settles the permit and publishes the commit position of one batch
struct BatchAppendListener {
    stream: Weak<Shared>,
    permit: Option<InFlightAppend>,
}

impl AppendListener for BatchAppendListener {
    fn on_write_error(&mut self, error: &StorageError) {
        if let Some(permit) = self.permit.take() {
            permit.on_error();
        }
        if let Some(stream) = self.stream.upgrade() {
            stream.fail(error);
        }
    }

    fn on_commit(&mut self, _index: u64, highest_position: i64) {
        if let Some(permit) = self.permit.take() {
            permit.on_commit();
        }
        if let Some(stream) = self.stream.upgrade() {
            stream.set_committed(highest_position);
        }
    }
}

/// Encoded size of an entry, for callers that check batch limits up front
pub fn entry_size(entry: &LogAppendEntry) -> Result<usize, WriteFailure> {
    codec::encoded_len(entry).map_err(|e| WriteFailure::InvalidArgument(e.to_string()))
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
