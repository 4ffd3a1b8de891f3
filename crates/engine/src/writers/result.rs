// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Everything one processed command produces

use super::response::{CommandResponse, ResponseWriter};
use super::stream::{FlushError, TypedStreamWriter};
use keel_logstreams::WriteReservation;

/// Runs after the batch it was staged with has been written
pub type PostCommitTask = Box<dyn FnOnce() + Send>;

/// Records, response and post-commit tasks of the command being processed
pub struct ProcessingResultBuilder {
    stream: TypedStreamWriter,
    response: ResponseWriter,
    post_commit: Vec<PostCommitTask>,
}

impl ProcessingResultBuilder {
    pub fn new(stream: TypedStreamWriter) -> Self {
        Self {
            stream,
            response: ResponseWriter::default(),
            post_commit: Vec::new(),
        }
    }

    /// Start over for the command at `source_position`
    pub fn reset(&mut self, source_position: i64) {
        self.stream.reset();
        self.stream.configure_source_position(source_position);
        self.response.reset();
        self.post_commit.clear();
    }

    /// Drop staged output but keep the source position
    pub fn discard(&mut self) {
        let source = self.source_position();
        self.reset(source);
    }

    pub fn source_position(&self) -> i64 {
        self.stream.source_position()
    }

    pub fn stream(&mut self) -> &mut TypedStreamWriter {
        &mut self.stream
    }

    pub fn response(&mut self) -> &mut ResponseWriter {
        &mut self.response
    }

    pub fn add_post_commit_task(&mut self, task: PostCommitTask) {
        self.post_commit.push(task);
    }

    pub fn has_records(&self) -> bool {
        !self.stream.is_empty()
    }

    pub fn flush_reserved(&mut self, reservation: WriteReservation) -> Result<i64, FlushError> {
        self.stream.flush_reserved(reservation)
    }

    /// Staged response and tasks, to be run once the batch is written
    pub fn take_outcome(&mut self) -> (Option<CommandResponse>, Vec<PostCommitTask>) {
        (self.response.take(), std::mem::take(&mut self.post_commit))
    }
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
