// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Value types and intents
//!
//! An intent is the semantic verb of a record within its value type. Commands
//! are imperative (`Complete`), events are past tense (`Completed`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload schema selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueType {
    Job,
    JobBatch,
}

impl ValueType {
    pub fn code(self) -> u8 {
        match self {
            ValueType::Job => 0,
            ValueType::JobBatch => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ValueType::Job),
            1 => Some(ValueType::JobBatch),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Job => "JOB",
            ValueType::JobBatch => "JOB_BATCH",
        }
    }
}

/// Intents of the `Job` value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobIntent {
    Created,
    Complete,
    Completed,
    TimeOut,
    TimedOut,
    Fail,
    Failed,
    Yield,
    Yielded,
    Create,
}

impl JobIntent {
    const ALL: [JobIntent; 10] = [
        JobIntent::Created,
        JobIntent::Complete,
        JobIntent::Completed,
        JobIntent::TimeOut,
        JobIntent::TimedOut,
        JobIntent::Fail,
        JobIntent::Failed,
        JobIntent::Yield,
        JobIntent::Yielded,
        JobIntent::Create,
    ];

    pub fn code(self) -> u8 {
        match self {
            JobIntent::Created => 0,
            JobIntent::Complete => 1,
            JobIntent::Completed => 2,
            JobIntent::TimeOut => 3,
            JobIntent::TimedOut => 4,
            JobIntent::Fail => 5,
            JobIntent::Failed => 6,
            JobIntent::Yield => 7,
            JobIntent::Yielded => 8,
            JobIntent::Create => 9,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|intent| intent.code() == code)
    }

    pub fn is_event(self) -> bool {
        matches!(
            self,
            JobIntent::Created
                | JobIntent::Completed
                | JobIntent::TimedOut
                | JobIntent::Failed
                | JobIntent::Yielded
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            JobIntent::Created => "CREATED",
            JobIntent::Complete => "COMPLETE",
            JobIntent::Completed => "COMPLETED",
            JobIntent::TimeOut => "TIME_OUT",
            JobIntent::TimedOut => "TIMED_OUT",
            JobIntent::Fail => "FAIL",
            JobIntent::Failed => "FAILED",
            JobIntent::Yield => "YIELD",
            JobIntent::Yielded => "YIELDED",
            JobIntent::Create => "CREATE",
        }
    }
}

/// Intents of the `JobBatch` value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobBatchIntent {
    Activate,
    Activated,
}

impl JobBatchIntent {
    pub fn code(self) -> u8 {
        match self {
            JobBatchIntent::Activate => 0,
            JobBatchIntent::Activated => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(JobBatchIntent::Activate),
            1 => Some(JobBatchIntent::Activated),
            _ => None,
        }
    }

    pub fn is_event(self) -> bool {
        matches!(self, JobBatchIntent::Activated)
    }

    pub fn name(self) -> &'static str {
        match self {
            JobBatchIntent::Activate => "ACTIVATE",
            JobBatchIntent::Activated => "ACTIVATED",
        }
    }
}

/// An intent, tagged with the value type it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    Job(JobIntent),
    JobBatch(JobBatchIntent),
}

impl Intent {
    pub fn value_type(self) -> ValueType {
        match self {
            Intent::Job(_) => ValueType::Job,
            Intent::JobBatch(_) => ValueType::JobBatch,
        }
    }

    /// Code of the intent within its value type
    pub fn code(self) -> u8 {
        match self {
            Intent::Job(intent) => intent.code(),
            Intent::JobBatch(intent) => intent.code(),
        }
    }

    pub fn from_code(value_type: ValueType, code: u8) -> Option<Self> {
        match value_type {
            ValueType::Job => JobIntent::from_code(code).map(Intent::Job),
            ValueType::JobBatch => JobBatchIntent::from_code(code).map(Intent::JobBatch),
        }
    }

    pub fn is_event(self) -> bool {
        match self {
            Intent::Job(intent) => intent.is_event(),
            Intent::JobBatch(intent) => intent.is_event(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Intent::Job(intent) => intent.name(),
            Intent::JobBatch(intent) => intent.name(),
        }
    }
}

impl From<JobIntent> for Intent {
    fn from(intent: JobIntent) -> Self {
        Intent::Job(intent)
    }
}

impl From<JobBatchIntent> for Intent {
    fn from(intent: JobBatchIntent) -> Self {
        Intent::JobBatch(intent)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.value_type().name(), self.name())
    }
}

#[cfg(test)]
#[path = "intent_tests.rs"]
mod tests;
