// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Responses to the client that sent a command

use super::TypedResponseWriter;
use keel_core::{Intent, Record, RecordType, RecordValue, RejectionType};
use tokio::sync::mpsc;

/// The answer to one client request
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResponse {
    pub request_stream_id: i32,
    pub request_id: i64,
    pub key: i64,
    pub record_type: RecordType,
    pub intent: Intent,
    pub value: RecordValue,
    pub rejection_type: RejectionType,
    pub rejection_reason: String,
}

impl CommandResponse {
    pub fn is_rejection(&self) -> bool {
        self.record_type == RecordType::CommandRejection
    }
}

/// Delivers responses once the records they describe are written
pub trait CommandResponseSink: Send + Sync {
    fn send(&self, response: CommandResponse);
}

/// Forwards responses over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelResponseSink {
    tx: mpsc::UnboundedSender<CommandResponse>,
}

impl ChannelResponseSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CommandResponse>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CommandResponseSink for ChannelResponseSink {
    fn send(&self, response: CommandResponse) {
        if self.tx.send(response).is_err() {
            tracing::debug!("response receiver dropped");
        }
    }
}

/// Stages at most one response per processed command
///
/// Commands without a request get no response.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    staged: Option<CommandResponse>,
}

impl ResponseWriter {
    pub fn take(&mut self) -> Option<CommandResponse> {
        self.staged.take()
    }

    pub fn reset(&mut self) {
        self.staged = None;
    }

    pub fn staged(&self) -> Option<&CommandResponse> {
        self.staged.as_ref()
    }
}

impl TypedResponseWriter for ResponseWriter {
    fn write_event_on_command(
        &mut self,
        key: i64,
        intent: Intent,
        value: RecordValue,
        command: &Record,
    ) {
        if !command.metadata.has_request() {
            return;
        }
        self.staged = Some(CommandResponse {
            request_stream_id: command.metadata.request_stream_id,
            request_id: command.metadata.request_id,
            key,
            record_type: RecordType::Event,
            intent,
            value,
            rejection_type: RejectionType::NullVal,
            rejection_reason: String::new(),
        });
    }

    fn write_rejection_on_command(
        &mut self,
        command: &Record,
        rejection_type: RejectionType,
        reason: &str,
    ) {
        if !command.metadata.has_request() {
            return;
        }
        self.staged = Some(CommandResponse {
            request_stream_id: command.metadata.request_stream_id,
            request_id: command.metadata.request_id,
            key: command.key,
            record_type: RecordType::CommandRejection,
            intent: command.intent(),
            value: command.value().clone(),
            rejection_type,
            rejection_reason: reason.to_string(),
        });
    }
}
