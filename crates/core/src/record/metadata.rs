// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Record types, rejection types and request metadata

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version stamped on every record written by this build
pub const PROTOCOL_VERSION: u16 = 1;

/// Coarse classification of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    Event,
    Command,
    CommandRejection,
}

impl RecordType {
    pub fn code(self) -> u8 {
        match self {
            RecordType::Event => 0,
            RecordType::Command => 1,
            RecordType::CommandRejection => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RecordType::Event),
            1 => Some(RecordType::Command),
            2 => Some(RecordType::CommandRejection),
            _ => None,
        }
    }
}

/// Reason class of a command rejection
///
/// `NullVal` is the on-wire sentinel for "no rejection" and is what commands
/// and events carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionType {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    InvalidState,
    ProcessingError,
    ExceededBatchRecordSize,
    NullVal,
}

impl RejectionType {
    pub fn code(self) -> u8 {
        match self {
            RejectionType::InvalidArgument => 0,
            RejectionType::NotFound => 1,
            RejectionType::AlreadyExists => 2,
            RejectionType::InvalidState => 3,
            RejectionType::ProcessingError => 4,
            RejectionType::ExceededBatchRecordSize => 5,
            RejectionType::NullVal => 255,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RejectionType::InvalidArgument),
            1 => Some(RejectionType::NotFound),
            2 => Some(RejectionType::AlreadyExists),
            3 => Some(RejectionType::InvalidState),
            4 => Some(RejectionType::ProcessingError),
            5 => Some(RejectionType::ExceededBatchRecordSize),
            255 => Some(RejectionType::NullVal),
            _ => None,
        }
    }
}

impl fmt::Display for RejectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectionType::InvalidArgument => "INVALID_ARGUMENT",
            RejectionType::NotFound => "NOT_FOUND",
            RejectionType::AlreadyExists => "ALREADY_EXISTS",
            RejectionType::InvalidState => "INVALID_STATE",
            RejectionType::ProcessingError => "PROCESSING_ERROR",
            RejectionType::ExceededBatchRecordSize => "EXCEEDED_BATCH_RECORD_SIZE",
            RejectionType::NullVal => "NULL_VAL",
        };
        f.write_str(name)
    }
}

/// Request routing metadata carried alongside a record body
///
/// `-1` marks an absent request. Follow-up records copy the request of the
/// command they answer so that the response can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub request_id: i64,
    pub request_stream_id: i32,
    pub operation_reference: i64,
    pub protocol_version: u16,
}

impl RecordMetadata {
    pub fn with_request(mut self, request_stream_id: i32, request_id: i64) -> Self {
        self.request_stream_id = request_stream_id;
        self.request_id = request_id;
        self
    }

    pub fn has_request(&self) -> bool {
        self.request_id >= 0 && self.request_stream_id >= 0
    }
}

impl Default for RecordMetadata {
    fn default() -> Self {
        Self {
            request_id: -1,
            request_stream_id: -1,
            operation_reference: -1,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}
