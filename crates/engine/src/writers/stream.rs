// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Staging follow-up records of one command into a single batch

use super::{TypedCommandWriter, TypedEventWriter, TypedRejectionWriter, WriteError};
use keel_core::{
    codec, Intent, KeyGenerator, LogAppendEntry, Record, RecordBody, RecordMetadata, RecordValue,
    RejectionType, NULL_POSITION,
};
use keel_logstreams::{LogStreamWriter, WriteFailure, WriteReservation, FRAME_OVERHEAD};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlushError {
    #[error("nothing to flush")]
    Empty,
    #[error(transparent)]
    Write(#[from] WriteFailure),
}

type MetadataModifier = Box<dyn Fn(&mut RecordMetadata) + Send>;

/// Accumulates records and writes them to the log as one batch
///
/// Keys are drawn when a record is queued, positions only when the batch is
/// flushed.
pub struct TypedStreamWriter {
    writer: Arc<dyn LogStreamWriter>,
    keys: KeyGenerator,
    max_batch_size: usize,
    entries: Vec<LogAppendEntry>,
    batch_size: usize,
    source_position: i64,
    metadata_modifier: Option<MetadataModifier>,
}

impl TypedStreamWriter {
    pub fn new(writer: Arc<dyn LogStreamWriter>, keys: KeyGenerator, max_batch_size: usize) -> Self {
        Self {
            writer,
            keys,
            max_batch_size,
            entries: Vec::new(),
            batch_size: 0,
            source_position: NULL_POSITION,
            metadata_modifier: None,
        }
    }

    /// Position of the record the queued records follow up on
    pub fn configure_source_position(&mut self, position: i64) {
        self.source_position = position;
    }

    pub fn source_position(&self) -> i64 {
        self.source_position
    }

    /// Applied to the metadata of every record at flush
    pub fn set_metadata_modifier(&mut self, modifier: impl Fn(&mut RecordMetadata) + Send + 'static) {
        self.metadata_modifier = Some(Box::new(modifier));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[LogAppendEntry] {
        &self.entries
    }

    /// Drop queued records and the source position
    pub fn reset(&mut self) {
        self.entries.clear();
        self.batch_size = 0;
        self.source_position = NULL_POSITION;
    }

    /// Whether one more record of `length` encoded bytes still fits
    pub fn can_write_event_of_length(&self, length: usize) -> bool {
        self.fits(length)
    }

    /// Write queued records as one batch, admitting it first
    ///
    /// Returns the position of the last record written.
    pub fn flush(&mut self) -> Result<i64, FlushError> {
        let entries = self.prepare()?;
        let position = self.writer.try_write(&entries, self.source_position)?;
        self.reset();
        Ok(position)
    }

    /// Write queued records under a reservation taken earlier
    pub fn flush_reserved(&mut self, reservation: WriteReservation) -> Result<i64, FlushError> {
        let entries = self.prepare()?;
        let position = self
            .writer
            .write_reserved(reservation, &entries, self.source_position)?;
        self.reset();
        Ok(position)
    }

    pub fn try_reserve(&self) -> Result<WriteReservation, WriteFailure> {
        self.writer.try_reserve()
    }

    fn prepare(&self) -> Result<Vec<LogAppendEntry>, FlushError> {
        if self.entries.is_empty() {
            return Err(FlushError::Empty);
        }
        let mut entries = self.entries.clone();
        if let Some(modifier) = &self.metadata_modifier {
            for entry in &mut entries {
                modifier(&mut entry.metadata);
            }
        }
        Ok(entries)
    }

    fn fits(&self, length: usize) -> bool {
        let count = self.entries.len() + 1;
        let size = self.batch_size + length;
        size + count * FRAME_OVERHEAD <= self.max_batch_size
            && self.writer.can_write_events(count, size)
    }

    pub(crate) fn append(
        &mut self,
        key: i64,
        metadata: RecordMetadata,
        body: RecordBody,
    ) -> Result<i64, WriteError> {
        self.stage(key, metadata, body, true)
    }

    /// Queue a record under `key` as given, never drawing a new one
    pub(crate) fn append_exact(
        &mut self,
        key: i64,
        metadata: RecordMetadata,
        body: RecordBody,
    ) -> Result<i64, WriteError> {
        self.stage(key, metadata, body, false)
    }

    fn stage(
        &mut self,
        key: i64,
        metadata: RecordMetadata,
        body: RecordBody,
        assign_key: bool,
    ) -> Result<i64, WriteError> {
        body.validate()?;
        let mut entry = LogAppendEntry::new(key, body).with_metadata(metadata);
        // Keys have a fixed width, so the length is known before one is drawn
        let length = codec::encoded_len(&entry)?;
        if !self.fits(length) {
            return Err(WriteError::BatchTooLarge {
                size: self.batch_size + length,
                max: self.max_batch_size,
            });
        }
        if assign_key && key < 0 {
            entry.key = self.keys.next_key();
        }
        let key = entry.key;
        self.batch_size += length;
        self.entries.push(entry);
        Ok(key)
    }
}

impl TypedCommandWriter for TypedStreamWriter {
    fn append_new_command(&mut self, intent: Intent, value: RecordValue) -> Result<i64, WriteError> {
        self.append(-1, RecordMetadata::default(), RecordBody::command(intent, value))
    }

    fn append_follow_up_command(
        &mut self,
        key: i64,
        intent: Intent,
        value: RecordValue,
    ) -> Result<(), WriteError> {
        self.append(key, RecordMetadata::default(), RecordBody::command(intent, value))
            .map(|_| ())
    }
}

impl TypedEventWriter for TypedStreamWriter {
    fn append_new_event(&mut self, intent: Intent, value: RecordValue) -> Result<i64, WriteError> {
        self.append(-1, RecordMetadata::default(), RecordBody::event(intent, value))
    }

    fn append_follow_up_event(
        &mut self,
        key: i64,
        intent: Intent,
        value: RecordValue,
    ) -> Result<(), WriteError> {
        self.append(key, RecordMetadata::default(), RecordBody::event(intent, value))
            .map(|_| ())
    }
}

impl TypedRejectionWriter for TypedStreamWriter {
    fn append_rejection(
        &mut self,
        command: &Record,
        rejection_type: RejectionType,
        reason: &str,
    ) -> Result<(), WriteError> {
        let body = RecordBody::Rejection {
            intent: command.intent(),
            value: command.value().clone(),
            rejection_type,
            reason: reason.to_string(),
        };
        self.append_exact(command.key, command.metadata, body).map(|_| ())
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
