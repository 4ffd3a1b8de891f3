// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized job state of a partition
//!
//! Only ever mutated by applying events. Ordered maps keep iteration, and so
//! activation order and snapshots, deterministic.

use keel_core::JobRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobLifecycle {
    /// Waiting for a worker
    Activatable,
    /// Handed to a worker until its deadline
    Activated,
    /// Failed without retries left
    Failed,
}

impl fmt::Display for JobLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobLifecycle::Activatable => "ACTIVATABLE",
            JobLifecycle::Activated => "ACTIVATED",
            JobLifecycle::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEntry {
    pub lifecycle: JobLifecycle,
    pub record: JobRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    jobs: BTreeMap<i64, JobEntry>,
    /// Activatable job keys by job type
    activatable: BTreeMap<String, BTreeSet<i64>>,
    /// `(deadline, key)` of activated jobs
    deadlines: BTreeSet<(i64, i64)>,
}

impl JobState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(&self, key: i64) -> Option<&JobEntry> {
        self.jobs.get(&key)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Up to `max` activatable jobs of `job_type`, lowest key first
    pub fn activatable_jobs(&self, job_type: &str, max: usize) -> Vec<(i64, &JobRecord)> {
        let Some(keys) = self.activatable.get(job_type) else {
            return Vec::new();
        };
        keys.iter()
            .filter_map(|key| self.jobs.get(key).map(|entry| (*key, &entry.record)))
            .take(max)
            .collect()
    }

    /// Keys of activated jobs whose deadline lies before `now`
    pub fn expired_jobs(&self, now: i64) -> Vec<i64> {
        self.deadlines
            .iter()
            .take_while(|(deadline, _)| *deadline < now)
            .map(|(_, key)| *key)
            .collect()
    }

    pub(crate) fn insert_activatable(&mut self, key: i64, record: JobRecord) {
        self.remove(key);
        self.activatable
            .entry(record.job_type.clone())
            .or_default()
            .insert(key);
        self.jobs.insert(
            key,
            JobEntry {
                lifecycle: JobLifecycle::Activatable,
                record,
            },
        );
    }

    pub(crate) fn insert_activated(&mut self, key: i64, record: JobRecord) {
        self.remove(key);
        self.deadlines.insert((record.deadline, key));
        self.jobs.insert(
            key,
            JobEntry {
                lifecycle: JobLifecycle::Activated,
                record,
            },
        );
    }

    pub(crate) fn insert_failed(&mut self, key: i64, record: JobRecord) {
        self.remove(key);
        self.jobs.insert(
            key,
            JobEntry {
                lifecycle: JobLifecycle::Failed,
                record,
            },
        );
    }

    /// Remove a job and every index entry pointing at it
    pub(crate) fn remove(&mut self, key: i64) -> Option<JobEntry> {
        let entry = self.jobs.remove(&key)?;
        match entry.lifecycle {
            JobLifecycle::Activatable => {
                if let Some(keys) = self.activatable.get_mut(&entry.record.job_type) {
                    keys.remove(&key);
                    if keys.is_empty() {
                        self.activatable.remove(&entry.record.job_type);
                    }
                }
            }
            JobLifecycle::Activated => {
                self.deadlines.remove(&(entry.record.deadline, key));
            }
            JobLifecycle::Failed => {}
        }
        Some(entry)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
