// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Records and the entries they are appended from

use super::intent::{Intent, ValueType};
use super::metadata::{RecordMetadata, RecordType, RejectionType};
use super::value::RecordValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Absent position, e.g. the source of a client command
pub const NULL_POSITION: i64 = -1;

/// Absent key; writers replace it with a generated key
pub const NULL_KEY: i64 = -1;

/// A record body whose parts disagree with each other
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRecord {
    #[error("intent {intent} does not belong to value type {value_type:?}")]
    ValueTypeMismatch { intent: Intent, value_type: ValueType },
    #[error("intent {intent} cannot be used on a {record_type:?} record")]
    RecordTypeMismatch { intent: Intent, record_type: RecordType },
    #[error("rejection must carry a rejection type")]
    MissingRejectionType,
}

/// Body of a record: one variant per record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordBody {
    Command {
        intent: Intent,
        value: RecordValue,
    },
    Event {
        intent: Intent,
        value: RecordValue,
    },
    Rejection {
        intent: Intent,
        value: RecordValue,
        rejection_type: RejectionType,
        reason: String,
    },
}

impl RecordBody {
    pub fn command(intent: impl Into<Intent>, value: impl Into<RecordValue>) -> Self {
        RecordBody::Command {
            intent: intent.into(),
            value: value.into(),
        }
    }

    pub fn event(intent: impl Into<Intent>, value: impl Into<RecordValue>) -> Self {
        RecordBody::Event {
            intent: intent.into(),
            value: value.into(),
        }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            RecordBody::Command { .. } => RecordType::Command,
            RecordBody::Event { .. } => RecordType::Event,
            RecordBody::Rejection { .. } => RecordType::CommandRejection,
        }
    }

    pub fn intent(&self) -> Intent {
        match self {
            RecordBody::Command { intent, .. }
            | RecordBody::Event { intent, .. }
            | RecordBody::Rejection { intent, .. } => *intent,
        }
    }

    pub fn value(&self) -> &RecordValue {
        match self {
            RecordBody::Command { value, .. }
            | RecordBody::Event { value, .. }
            | RecordBody::Rejection { value, .. } => value,
        }
    }

    pub fn value_type(&self) -> ValueType {
        self.value().value_type()
    }

    /// `NullVal` for anything that is not a rejection
    pub fn rejection_type(&self) -> RejectionType {
        match self {
            RecordBody::Rejection { rejection_type, .. } => *rejection_type,
            _ => RejectionType::NullVal,
        }
    }

    /// Empty for anything that is not a rejection
    pub fn rejection_reason(&self) -> &str {
        match self {
            RecordBody::Rejection { reason, .. } => reason,
            _ => "",
        }
    }

    pub fn is_command(&self) -> bool {
        matches!(self, RecordBody::Command { .. })
    }

    pub fn is_event(&self) -> bool {
        matches!(self, RecordBody::Event { .. })
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, RecordBody::Rejection { .. })
    }

    /// Check that intent, value type and record type agree.
    ///
    /// Rejections carry the intent of the rejected command.
    pub fn validate(&self) -> Result<(), InvalidRecord> {
        let intent = self.intent();
        let value_type = self.value_type();
        if intent.value_type() != value_type {
            return Err(InvalidRecord::ValueTypeMismatch { intent, value_type });
        }
        let intent_matches = match self {
            RecordBody::Event { .. } => intent.is_event(),
            RecordBody::Command { .. } | RecordBody::Rejection { .. } => !intent.is_event(),
        };
        if !intent_matches {
            return Err(InvalidRecord::RecordTypeMismatch {
                intent,
                record_type: self.record_type(),
            });
        }
        if let RecordBody::Rejection { rejection_type, .. } = self {
            if *rejection_type == RejectionType::NullVal {
                return Err(InvalidRecord::MissingRejectionType);
            }
        }
        Ok(())
    }
}

/// A record as handed to the log writer, before it has a position
#[derive(Debug, Clone, PartialEq)]
pub struct LogAppendEntry {
    pub key: i64,
    pub metadata: RecordMetadata,
    pub body: RecordBody,
}

impl LogAppendEntry {
    pub fn new(key: i64, body: RecordBody) -> Self {
        Self {
            key,
            metadata: RecordMetadata::default(),
            body,
        }
    }

    pub fn with_metadata(mut self, metadata: RecordMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// An appended record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub position: i64,
    pub source_record_position: i64,
    pub key: i64,
    /// Epoch millis at append time
    pub timestamp: i64,
    pub metadata: RecordMetadata,
    pub body: RecordBody,
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        self.body.record_type()
    }

    pub fn intent(&self) -> Intent {
        self.body.intent()
    }

    pub fn value(&self) -> &RecordValue {
        self.body.value()
    }

    pub fn value_type(&self) -> ValueType {
        self.body.value_type()
    }

    pub fn is_command(&self) -> bool {
        self.body.is_command()
    }

    pub fn is_event(&self) -> bool {
        self.body.is_event()
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
