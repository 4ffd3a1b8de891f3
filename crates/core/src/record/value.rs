// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Record values, one per value type

use super::intent::ValueType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A unit of work handed to workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_type: String,
    pub worker: String,
    pub retries: i32,
    /// Epoch millis; `-1` while the job is not activated
    pub deadline: i64,
    pub error_message: String,
    pub variables: Map<String, Value>,
    pub process_instance_key: i64,
    pub element_id: String,
}

impl JobRecord {
    pub const DEFAULT_RETRIES: i32 = 3;

    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            worker: String::new(),
            retries: Self::DEFAULT_RETRIES,
            deadline: -1,
            error_message: String::new(),
            variables: Map::new(),
            process_instance_key: -1,
            element_id: String::new(),
        }
    }

    pub fn with_retries(mut self, retries: i32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

/// Activation request and result for a set of jobs of one type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobBatchRecord {
    pub job_type: String,
    pub worker: String,
    /// Activation timeout in millis
    pub timeout: i64,
    pub max_jobs_to_activate: i32,
    pub job_keys: Vec<i64>,
    pub jobs: Vec<JobRecord>,
    pub truncated: bool,
}

impl JobBatchRecord {
    pub fn new(job_type: impl Into<String>, worker: impl Into<String>, timeout: i64) -> Self {
        Self {
            job_type: job_type.into(),
            worker: worker.into(),
            timeout,
            max_jobs_to_activate: 1,
            job_keys: Vec::new(),
            jobs: Vec::new(),
            truncated: false,
        }
    }

    pub fn with_max_jobs(mut self, max_jobs_to_activate: i32) -> Self {
        self.max_jobs_to_activate = max_jobs_to_activate;
        self
    }

    pub fn push_job(&mut self, key: i64, job: JobRecord) {
        self.job_keys.push(key);
        self.jobs.push(job);
    }
}

/// Tagged union over the value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordValue {
    Job(JobRecord),
    JobBatch(JobBatchRecord),
}

impl RecordValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            RecordValue::Job(_) => ValueType::Job,
            RecordValue::JobBatch(_) => ValueType::JobBatch,
        }
    }

    pub fn as_job(&self) -> Option<&JobRecord> {
        match self {
            RecordValue::Job(job) => Some(job),
            RecordValue::JobBatch(_) => None,
        }
    }

    pub fn as_job_batch(&self) -> Option<&JobBatchRecord> {
        match self {
            RecordValue::JobBatch(batch) => Some(batch),
            RecordValue::Job(_) => None,
        }
    }
}

impl From<JobRecord> for RecordValue {
    fn from(job: JobRecord) -> Self {
        RecordValue::Job(job)
    }
}

impl From<JobBatchRecord> for RecordValue {
    fn from(batch: JobBatchRecord) -> Self {
        RecordValue::JobBatch(batch)
    }
}

/// Immutable snapshot of an activated job, as pushed to a remote stream
///
/// Never written to the log as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivatedJob {
    pub key: i64,
    pub record: JobRecord,
}

impl ActivatedJob {
    pub fn new(key: i64, record: JobRecord) -> Self {
        Self { key, record }
    }

    pub fn job_type(&self) -> &str {
        &self.record.job_type
    }

    pub fn deadline(&self) -> i64 {
        self.record.deadline
    }
}
