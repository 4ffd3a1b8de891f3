// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Applying events to state
//!
//! Replay and live processing go through the same applier, so state after
//! replaying a log equals state after processing it.

use crate::state::JobState;
use keel_core::{Intent, JobBatchIntent, JobIntent, RecordValue, ValueType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("no state change is defined for {0}")]
    UnsupportedIntent(Intent),
    #[error("{intent} expects a {expected} value, got {actual}")]
    UnexpectedValue {
        intent: Intent,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("job {0} does not exist")]
    MissingJob(i64),
}

/// Deterministic state mutation for one event
pub trait EventApplier: Send {
    fn apply_state(&mut self, key: i64, intent: Intent, value: &RecordValue)
        -> Result<(), ApplyError>;
}

/// Applies job and job batch events to a [`JobState`]
#[derive(Debug, Default)]
pub struct JobEventApplier {
    state: JobState,
}

impl JobEventApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: JobState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn into_state(self) -> JobState {
        self.state
    }

    fn apply_job(&mut self, key: i64, intent: JobIntent, value: &RecordValue) -> Result<(), ApplyError> {
        let job = value.as_job().ok_or_else(|| ApplyError::UnexpectedValue {
            intent: intent.into(),
            expected: ValueType::Job.name(),
            actual: value.value_type().name(),
        })?;
        match intent {
            JobIntent::Created => {
                self.state.insert_activatable(key, job.clone());
            }
            JobIntent::Completed => {
                self.state.remove(key).ok_or(ApplyError::MissingJob(key))?;
            }
            JobIntent::Failed => {
                self.require(key)?;
                let mut record = job.clone();
                record.deadline = -1;
                if record.retries > 0 {
                    self.state.insert_activatable(key, record);
                } else {
                    self.state.insert_failed(key, record);
                }
            }
            JobIntent::Yielded | JobIntent::TimedOut => {
                self.require(key)?;
                let mut record = job.clone();
                record.deadline = -1;
                record.worker.clear();
                self.state.insert_activatable(key, record);
            }
            JobIntent::Create
            | JobIntent::Complete
            | JobIntent::Fail
            | JobIntent::Yield
            | JobIntent::TimeOut => return Err(ApplyError::UnsupportedIntent(intent.into())),
        }
        Ok(())
    }

    fn apply_job_batch(
        &mut self,
        intent: JobBatchIntent,
        value: &RecordValue,
    ) -> Result<(), ApplyError> {
        let batch = value.as_job_batch().ok_or_else(|| ApplyError::UnexpectedValue {
            intent: intent.into(),
            expected: ValueType::JobBatch.name(),
            actual: value.value_type().name(),
        })?;
        match intent {
            JobBatchIntent::Activated => {
                for (key, job) in batch.job_keys.iter().zip(&batch.jobs) {
                    self.require(*key)?;
                    self.state.insert_activated(*key, job.clone());
                }
                Ok(())
            }
            JobBatchIntent::Activate => Err(ApplyError::UnsupportedIntent(intent.into())),
        }
    }

    fn require(&self, key: i64) -> Result<(), ApplyError> {
        match self.state.job(key) {
            Some(_) => Ok(()),
            None => Err(ApplyError::MissingJob(key)),
        }
    }
}

impl EventApplier for JobEventApplier {
    fn apply_state(
        &mut self,
        key: i64,
        intent: Intent,
        value: &RecordValue,
    ) -> Result<(), ApplyError> {
        match intent {
            Intent::Job(intent) => self.apply_job(key, intent, value),
            Intent::JobBatch(intent) => self.apply_job_batch(intent, value),
        }
    }
}

#[cfg(test)]
#[path = "applier_tests.rs"]
mod tests;
