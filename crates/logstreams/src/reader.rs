// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reading records from a log stream
//!
//! A reader decodes one storage block at a time and hands out its records in
//! position order. Readers are independent of each other and of the writer.

use crate::batch;
use crate::storage::{LogStorageReader, StorageError};
use keel_core::{CodecError, Record, NULL_POSITION};
use std::collections::VecDeque;
use thiserror::Error;

/// Errors that can occur while reading records
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("undecodable block [{lowest}, {highest}]: {source}")]
    Codec {
        lowest: i64,
        highest: i64,
        source: CodecError,
    },
}

/// Forward-only cursor over the committed records of a stream
pub struct LogStreamReader {
    storage: Box<dyn LogStorageReader>,
    buffered: VecDeque<Record>,
    pending_error: Option<ReadError>,
    last_position: i64,
}

impl LogStreamReader {
    pub(crate) fn new(storage: Box<dyn LogStorageReader>) -> Self {
        Self {
            storage,
            buffered: VecDeque::new(),
            pending_error: None,
            last_position: NULL_POSITION,
        }
    }

    /// Position of the last record returned by `next`
    pub fn last_position(&self) -> i64 {
        self.last_position
    }

    /// Move to the record at `position`, or the next higher one if it does not
    /// exist. Returns whether a record with exactly `position` was found.
    pub fn seek(&mut self, position: i64) -> bool {
        self.reset();
        self.storage.seek(position);
        loop {
            if !self.fill() {
                return false;
            }
            match self.buffered.front() {
                Some(record) if record.position < position => {
                    self.buffered.pop_front();
                }
                Some(record) => return record.position == position,
                None => return false,
            }
        }
    }

    pub fn seek_to_first_event(&mut self) {
        self.reset();
        self.storage.seek_to_first();
    }

    /// Move past the last committed record; only records committed later
    /// will be read.
    pub fn seek_to_end(&mut self) {
        self.reset();
        self.storage.seek_to_end();
    }

    /// Move right after the record at `position`.
    ///
    /// A negative position moves to the first record. Returns `false` if no
    /// record with exactly `position` exists; the reader is then positioned at
    /// the next higher record.
    pub fn seek_to_next_event(&mut self, position: i64) -> bool {
        if position < 0 {
            self.seek_to_first_event();
            return true;
        }
        if self.seek(position) {
            self.buffered.pop_front();
            self.last_position = position;
            return true;
        }
        false
    }

    pub fn has_next(&mut self) -> bool {
        self.fill()
    }

    pub fn next_record(&mut self) -> Option<Result<Record, ReadError>> {
        if !self.fill() {
            return None;
        }
        if let Some(error) = self.pending_error.take() {
            return Some(Err(error));
        }
        let record = self.buffered.pop_front()?;
        self.last_position = record.position;
        Some(Ok(record))
    }

    fn reset(&mut self) {
        self.buffered.clear();
        self.pending_error = None;
    }

    /// Make sure a record or an error is ready; `false` at the end of the log
    fn fill(&mut self) -> bool {
        while self.buffered.is_empty() && self.pending_error.is_none() {
            match self.storage.next() {
                None => return false,
                Some(Err(e)) => self.pending_error = Some(e.into()),
                Some(Ok(block)) => match batch::decode_batch(&block.payload) {
                    Ok(records) => self.buffered.extend(records),
                    Err(source) => {
                        self.pending_error = Some(ReadError::Codec {
                            lowest: block.lowest,
                            highest: block.highest,
                            source,
                        })
                    }
                },
            }
        }
        true
    }
}

impl Iterator for LogStreamReader {
    type Item = Result<Record, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
    }
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
