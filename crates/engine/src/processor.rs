// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job command processing
//!
//! Each command is answered with events or a rejection, staged through
//! [`Writers`]. Pushing to job streams and waking workers happens in
//! post-commit tasks, after the events that justify them are written.

use crate::applier::JobEventApplier;
use crate::state::{JobEntry, JobLifecycle, JobState};
use crate::streamer::JobStreamer;
use crate::writers::{ProcessingResultBuilder, StateWriter, TypedEventWriter, WriteError, Writers};
use keel_core::{
    codec, ActivatedJob, Intent, JobBatchIntent, JobBatchRecord, JobIntent, JobRecord,
    LogAppendEntry, Record, RecordBody, RejectionType,
};
use std::sync::Arc;

/// What a processor may see and do while handling one command
pub struct ProcessingContext<'a> {
    applier: &'a mut JobEventApplier,
    result: &'a mut ProcessingResultBuilder,
    now: i64,
}

impl<'a> ProcessingContext<'a> {
    pub fn new(
        applier: &'a mut JobEventApplier,
        result: &'a mut ProcessingResultBuilder,
        now: i64,
    ) -> Self {
        Self {
            applier,
            result,
            now,
        }
    }

    pub fn state(&self) -> &JobState {
        self.applier.state()
    }

    /// Epoch millis at which the command is processed
    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn writers(&mut self) -> Writers<'_> {
        Writers::new(&mut *self.result, &mut *self.applier)
    }
}

/// Handles job and job batch commands
pub struct JobProcessor {
    streamer: Arc<dyn JobStreamer>,
}

impl JobProcessor {
    pub fn new(streamer: Arc<dyn JobStreamer>) -> Self {
        Self { streamer }
    }

    /// Stage the answer to `command`
    ///
    /// Errors leave partially staged output behind; the caller discards it.
    pub fn process(
        &self,
        command: &Record,
        ctx: &mut ProcessingContext<'_>,
    ) -> Result<(), WriteError> {
        match command.intent() {
            Intent::Job(JobIntent::Create) => self.create(command, ctx),
            Intent::Job(JobIntent::Complete) => self.complete(command, ctx),
            Intent::Job(JobIntent::Fail) => self.fail(command, ctx),
            Intent::Job(JobIntent::Yield) => self.yield_job(command, ctx),
            Intent::Job(JobIntent::TimeOut) => self.time_out(command, ctx),
            Intent::JobBatch(JobBatchIntent::Activate) => self.activate(command, ctx),
            other => reject(
                command,
                ctx,
                RejectionType::InvalidArgument,
                &format!("Expected a command, but got event intent '{other}'"),
            ),
        }
    }

    fn create(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<(), WriteError> {
        let Some(job) = job_of(command, ctx)? else {
            return Ok(());
        };
        if job.job_type.trim().is_empty() {
            return reject(
                command,
                ctx,
                RejectionType::InvalidArgument,
                "Expected to create a job with a non-empty type, but type was empty",
            );
        }

        let now = ctx.now();
        let mut writers = ctx.writers();
        let key = writers
            .state()
            .append_new_event(JobIntent::Created.into(), job.clone().into())?;
        writers
            .response()
            .write_event_on_command(key, JobIntent::Created.into(), job.clone().into(), command);

        match self.streamer.stream_for(&job.job_type) {
            Some(stream) => {
                let properties = stream.properties();
                let activated = properties.activate(&job, now);
                let mut batch = JobBatchRecord::new(
                    job.job_type.clone(),
                    properties.worker.clone(),
                    properties.timeout_millis(),
                );
                batch.push_job(key, activated.clone());
                writers
                    .state()
                    .append_new_event(JobBatchIntent::Activated.into(), batch.into())?;
                writers.post_commit(move || stream.push(ActivatedJob::new(key, activated)));
            }
            None => self.notify_after_commit(&mut writers, &job.job_type),
        }
        Ok(())
    }

    fn complete(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<(), WriteError> {
        let Some(job) = job_of(command, ctx)? else {
            return Ok(());
        };
        let Some(entry) = activated_job(command, ctx, "complete")? else {
            return Ok(());
        };

        let mut record = entry.record;
        record.variables.extend(job.variables);
        let mut writers = ctx.writers();
        writers.state().append_follow_up_event(
            command.key,
            JobIntent::Completed.into(),
            record.clone().into(),
        )?;
        writers.response().write_event_on_command(
            command.key,
            JobIntent::Completed.into(),
            record.into(),
            command,
        );
        Ok(())
    }

    fn fail(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<(), WriteError> {
        let Some(job) = job_of(command, ctx)? else {
            return Ok(());
        };
        let Some(entry) = activated_job(command, ctx, "fail")? else {
            return Ok(());
        };

        let mut record = entry.record;
        record.retries = job.retries;
        record.error_message = job.error_message;
        let retry = record.retries > 0;
        let job_type = record.job_type.clone();

        let mut writers = ctx.writers();
        writers.state().append_follow_up_event(
            command.key,
            JobIntent::Failed.into(),
            record.clone().into(),
        )?;
        writers.response().write_event_on_command(
            command.key,
            JobIntent::Failed.into(),
            record.into(),
            command,
        );
        if retry {
            self.notify_after_commit(&mut writers, &job_type);
        }
        Ok(())
    }

    /// Hand an activated job back without using up a retry
    ///
    /// The job is not pushed anywhere, so a worker that just failed to take
    /// it is not offered it again right away.
    fn yield_job(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<(), WriteError> {
        let Some(entry) = activated_job(command, ctx, "yield")? else {
            return Ok(());
        };

        let mut writers = ctx.writers();
        writers.state().append_follow_up_event(
            command.key,
            JobIntent::Yielded.into(),
            entry.record.clone().into(),
        )?;
        writers.response().write_event_on_command(
            command.key,
            JobIntent::Yielded.into(),
            entry.record.into(),
            command,
        );
        Ok(())
    }

    fn time_out(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<(), WriteError> {
        let Some(entry) = activated_job(command, ctx, "time out")? else {
            return Ok(());
        };
        if entry.record.deadline >= ctx.now() {
            let reason = format!(
                "Expected to time out activated job with key '{}', but its deadline has not passed yet",
                command.key
            );
            return reject(command, ctx, RejectionType::InvalidState, &reason);
        }

        let job_type = entry.record.job_type.clone();
        let mut writers = ctx.writers();
        writers.state().append_follow_up_event(
            command.key,
            JobIntent::TimedOut.into(),
            entry.record.clone().into(),
        )?;
        writers.response().write_event_on_command(
            command.key,
            JobIntent::TimedOut.into(),
            entry.record.into(),
            command,
        );
        self.notify_after_commit(&mut writers, &job_type);
        Ok(())
    }

    fn activate(&self, command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<(), WriteError> {
        let Some(request) = command.value().as_job_batch().cloned() else {
            return reject(
                command,
                ctx,
                RejectionType::InvalidArgument,
                "Expected a job batch value",
            );
        };
        let invalid = if request.job_type.trim().is_empty() {
            Some("Expected to activate jobs of a non-empty type, but type was empty".to_string())
        } else if request.timeout < 1 {
            Some(format!(
                "Expected to activate jobs with a timeout greater than zero, but it was '{}'",
                request.timeout
            ))
        } else if request.max_jobs_to_activate < 1 {
            Some(format!(
                "Expected to activate at least one job, but max jobs to activate was '{}'",
                request.max_jobs_to_activate
            ))
        } else {
            None
        };
        if let Some(reason) = invalid {
            return reject(command, ctx, RejectionType::InvalidArgument, &reason);
        }

        let now = ctx.now();
        let deadline = now.saturating_add(request.timeout);
        let max = usize::try_from(request.max_jobs_to_activate).unwrap_or(usize::MAX);
        let mut batch =
            JobBatchRecord::new(request.job_type.clone(), request.worker.clone(), request.timeout)
                .with_max_jobs(request.max_jobs_to_activate);
        let candidates: Vec<(i64, JobRecord)> = ctx
            .state()
            .activatable_jobs(&request.job_type, max)
            .into_iter()
            .map(|(key, record)| (key, record.clone()))
            .collect();

        let mut writers = ctx.writers();
        for (key, mut record) in candidates {
            record.worker = request.worker.clone();
            record.deadline = deadline;
            batch.push_job(key, record);
            if !writers.state().can_write_event_of_length(activated_len(&batch)?) {
                batch.job_keys.pop();
                batch.jobs.pop();
                batch.truncated = true;
                break;
            }
        }

        let key = writers
            .state()
            .append_new_event(JobBatchIntent::Activated.into(), batch.clone().into())?;
        writers.response().write_event_on_command(
            key,
            JobBatchIntent::Activated.into(),
            batch.into(),
            command,
        );
        Ok(())
    }

    fn notify_after_commit(&self, writers: &mut Writers<'_>, job_type: &str) {
        let streamer = Arc::clone(&self.streamer);
        let job_type = job_type.to_string();
        writers.post_commit(move || streamer.notify_work_available(&job_type));
    }
}

fn job_of(command: &Record, ctx: &mut ProcessingContext<'_>) -> Result<Option<JobRecord>, WriteError> {
    match command.value().as_job() {
        Some(job) => Ok(Some(job.clone())),
        None => {
            reject(command, ctx, RejectionType::InvalidArgument, "Expected a job value")?;
            Ok(None)
        }
    }
}

/// The job the command refers to, if it exists and is activated
///
/// Otherwise stages the rejection and returns `None`.
fn activated_job(
    command: &Record,
    ctx: &mut ProcessingContext<'_>,
    action: &str,
) -> Result<Option<JobEntry>, WriteError> {
    let key = command.key;
    let existing = ctx.state().job(key).cloned();
    match existing {
        None => {
            let reason =
                format!("Expected to {action} job with key '{key}', but no such job was found");
            reject(command, ctx, RejectionType::NotFound, &reason)?;
            Ok(None)
        }
        Some(entry) if entry.lifecycle != JobLifecycle::Activated => {
            let reason = format!(
                "Expected to {action} activated job with key '{key}', but it is in state '{}'",
                entry.lifecycle
            );
            reject(command, ctx, RejectionType::InvalidState, &reason)?;
            Ok(None)
        }
        Some(entry) => Ok(Some(entry)),
    }
}

fn reject(
    command: &Record,
    ctx: &mut ProcessingContext<'_>,
    rejection_type: RejectionType,
    reason: &str,
) -> Result<(), WriteError> {
    tracing::debug!(
        key = command.key,
        intent = %command.intent(),
        %rejection_type,
        reason,
        "rejecting command"
    );
    let mut writers = ctx.writers();
    writers.rejection().append_rejection(command, rejection_type, reason)?;
    writers
        .response()
        .write_rejection_on_command(command, rejection_type, reason);
    Ok(())
}

/// Encoded length of the activation event for `batch`
fn activated_len(batch: &JobBatchRecord) -> Result<usize, WriteError> {
    let entry = LogAppendEntry::new(0, RecordBody::event(JobBatchIntent::Activated, batch.clone()));
    Ok(codec::encoded_len(&entry)?)
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
