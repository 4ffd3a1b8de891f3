// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seam between job processing and remote job streams
//!
//! The processor only asks for a stream and pushes to it after commit.
//! Transport, retries and error handling live behind these traits.

use keel_core::{ActivatedJob, JobRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// How a worker wants its jobs activated
///
/// Streams with equal properties are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobActivationProperties {
    pub worker: String,
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Variables to hand over; empty means all
    pub fetch_variables: Vec<String>,
    pub tenant_ids: Vec<String>,
}

impl JobActivationProperties {
    pub fn new(worker: impl Into<String>, timeout: Duration) -> Self {
        Self {
            worker: worker.into(),
            timeout,
            fetch_variables: Vec::new(),
            tenant_ids: Vec::new(),
        }
    }

    pub fn with_fetch_variables(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fetch_variables = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout_millis(&self) -> i64 {
        i64::try_from(self.timeout.as_millis()).unwrap_or(i64::MAX)
    }

    /// The job as activated under these properties at `now`
    pub fn activate(&self, job: &JobRecord, now: i64) -> JobRecord {
        let mut activated = job.clone();
        activated.worker = self.worker.clone();
        activated.deadline = now.saturating_add(self.timeout_millis());
        if !self.fetch_variables.is_empty() {
            activated
                .variables
                .retain(|name, _| self.fetch_variables.iter().any(|wanted| wanted == name));
        }
        activated
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// One consumer of activated jobs
pub trait JobStream: Send + Sync {
    fn properties(&self) -> &JobActivationProperties;

    /// Hand over an activated job; never blocks and never fails the caller
    fn push(&self, job: ActivatedJob);
}

pub trait JobStreamer: Send + Sync {
    /// A stream able to take a job of `job_type` right now
    fn stream_for(&self, job_type: &str) -> Option<Arc<dyn JobStream>>;

    /// Tell workers that jobs of `job_type` can be activated
    fn notify_work_available(&self, job_type: &str);
}

/// Streamer without any streams
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopJobStreamer;

impl JobStreamer for NoopJobStreamer {
    fn stream_for(&self, _job_type: &str) -> Option<Arc<dyn JobStream>> {
        None
    }

    fn notify_work_available(&self, _job_type: &str) {}
}

#[cfg(test)]
#[path = "streamer_tests.rs"]
mod tests;
