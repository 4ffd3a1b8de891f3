// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed writers handed to command processors
//!
//! Processors never touch the log directly. Everything they write is staged
//! in a [`ProcessingResultBuilder`] and flushed by the stream processor as one
//! batch per command.

mod response;
mod result;
mod stream;

pub use response::{ChannelResponseSink, CommandResponse, CommandResponseSink, ResponseWriter};
pub use result::{PostCommitTask, ProcessingResultBuilder};
pub use stream::{FlushError, TypedStreamWriter};

use crate::applier::{ApplyError, EventApplier};
use keel_core::{
    CodecError, Intent, InvalidRecord, Record, RecordBody, RecordMetadata, RecordValue,
    RejectionType,
};
use thiserror::Error;

/// Why a record could not be staged
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("batch of {size} bytes would exceed the maximum of {max} bytes")]
    BatchTooLarge { size: usize, max: usize },
    #[error("record does not encode: {0}")]
    Encoding(#[from] CodecError),
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] InvalidRecord),
    #[error("failed to apply event: {0}")]
    Apply(#[from] ApplyError),
}

pub trait TypedCommandWriter {
    /// Stage a command for a newly generated key and return that key
    fn append_new_command(&mut self, intent: Intent, value: RecordValue) -> Result<i64, WriteError>;

    fn append_follow_up_command(
        &mut self,
        key: i64,
        intent: Intent,
        value: RecordValue,
    ) -> Result<(), WriteError>;
}

pub trait TypedEventWriter {
    /// Stage an event for a newly generated key and return that key
    fn append_new_event(&mut self, intent: Intent, value: RecordValue) -> Result<i64, WriteError>;

    fn append_follow_up_event(
        &mut self,
        key: i64,
        intent: Intent,
        value: RecordValue,
    ) -> Result<(), WriteError>;
}

/// Event writer that applies each event to state as soon as it is staged
pub trait StateWriter: TypedEventWriter {
    fn can_write_event_of_length(&self, length: usize) -> bool;
}

pub trait TypedRejectionWriter {
    /// Stage a rejection of `command`, keyed and routed like the command
    fn append_rejection(
        &mut self,
        command: &Record,
        rejection_type: RejectionType,
        reason: &str,
    ) -> Result<(), WriteError>;
}

pub trait TypedResponseWriter {
    fn write_event_on_command(
        &mut self,
        key: i64,
        intent: Intent,
        value: RecordValue,
        command: &Record,
    );

    fn write_rejection_on_command(
        &mut self,
        command: &Record,
        rejection_type: RejectionType,
        reason: &str,
    );
}

/// Stages events and applies them in staging order
pub struct AppliedStateWriter<'a> {
    stream: &'a mut TypedStreamWriter,
    applier: &'a mut dyn EventApplier,
}

impl AppliedStateWriter<'_> {
    fn append_and_apply(
        &mut self,
        key: i64,
        intent: Intent,
        value: RecordValue,
    ) -> Result<i64, WriteError> {
        let body = RecordBody::event(intent, value.clone());
        let key = self.stream.append(key, RecordMetadata::default(), body)?;
        self.applier.apply_state(key, intent, &value)?;
        Ok(key)
    }
}

impl TypedEventWriter for AppliedStateWriter<'_> {
    fn append_new_event(&mut self, intent: Intent, value: RecordValue) -> Result<i64, WriteError> {
        self.append_and_apply(-1, intent, value)
    }

    fn append_follow_up_event(
        &mut self,
        key: i64,
        intent: Intent,
        value: RecordValue,
    ) -> Result<(), WriteError> {
        self.append_and_apply(key, intent, value).map(|_| ())
    }
}

impl StateWriter for AppliedStateWriter<'_> {
    fn can_write_event_of_length(&self, length: usize) -> bool {
        self.stream.can_write_event_of_length(length)
    }
}

/// All writers a command processor may use
///
/// Offers no flush: the stream processor writes the staged batch once the
/// processor returns.
pub struct Writers<'a> {
    result: &'a mut ProcessingResultBuilder,
    applier: &'a mut dyn EventApplier,
}

impl<'a> Writers<'a> {
    pub fn new(result: &'a mut ProcessingResultBuilder, applier: &'a mut dyn EventApplier) -> Self {
        Self { result, applier }
    }

    pub fn command(&mut self) -> &mut dyn TypedCommandWriter {
        self.result.stream()
    }

    pub fn state(&mut self) -> AppliedStateWriter<'_> {
        AppliedStateWriter {
            stream: self.result.stream(),
            applier: &mut *self.applier,
        }
    }

    pub fn rejection(&mut self) -> &mut dyn TypedRejectionWriter {
        self.result.stream()
    }

    pub fn response(&mut self) -> &mut dyn TypedResponseWriter {
        self.result.response()
    }

    /// Run `task` once the batch staged with it is written
    pub fn post_commit(&mut self, task: impl FnOnce() + Send + 'static) {
        self.result.add_post_commit_task(Box::new(task));
    }
}

#[cfg(test)]
#[path = "writers_tests.rs"]
mod tests;
