// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compensation for failed job pushes
//!
//! A job whose push failed is activated on its partition but no worker has
//! it. The service writes a YIELD command for it to the partition that owns
//! the job, which makes the job activatable again. Writers are tracked per
//! partition as leadership comes and goes; all state lives on one task and
//! is only touched through its message queue.

use crate::streamer::{ErrorHandler, PushError};
use async_trait::async_trait;
use keel_core::{
    decode_partition_id, ActivatedJob, Clock, JobIntent, KeelConfig, LogAppendEntry, PartitionId,
    RecordBody, ThrottledLogger, NULL_POSITION,
};
use keel_logstreams::{LogStream, LogStreamError, LogStreamWriter};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Raft-like leadership transitions of a partition on this member
#[async_trait]
pub trait PartitionListener: Send + Sync {
    async fn on_becoming_leader(
        &self,
        partition: PartitionId,
        term: u64,
        log_stream: &LogStream,
    ) -> Result<(), LogStreamError>;

    async fn on_becoming_follower(&self, partition: PartitionId, term: u64);

    async fn on_becoming_inactive(&self, partition: PartitionId, term: u64);
}

enum Message {
    Leader {
        partition: PartitionId,
        term: u64,
        writer: Arc<dyn LogStreamWriter>,
        ack: oneshot::Sender<()>,
    },
    Release {
        partition: PartitionId,
        ack: oneshot::Sender<()>,
    },
    HasWriter {
        partition: PartitionId,
        reply: oneshot::Sender<bool>,
    },
    Failed {
        error: PushError,
        job: ActivatedJob,
    },
    Shutdown,
}

struct PartitionWriter {
    term: u64,
    writer: Arc<dyn LogStreamWriter>,
}

struct ErrorHandlerTask {
    writers: HashMap<PartitionId, PartitionWriter>,
    no_writer: ThrottledLogger<Arc<dyn Clock>>,
}

impl ErrorHandlerTask {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = rx.recv().await {
            match message {
                Message::Leader {
                    partition,
                    term,
                    writer,
                    ack,
                } => {
                    self.writers
                        .insert(partition, PartitionWriter { term, writer });
                    let _ = ack.send(());
                }
                Message::Release { partition, ack } => {
                    self.writers.remove(&partition);
                    let _ = ack.send(());
                }
                Message::HasWriter { partition, reply } => {
                    let _ = reply.send(self.writers.contains_key(&partition));
                }
                Message::Failed { error, job } => self.yield_job(error, job),
                Message::Shutdown => break,
            }
        }
        tracing::debug!("job stream error handler stopped");
    }

    fn yield_job(&self, error: PushError, job: ActivatedJob) {
        let partition = decode_partition_id(job.key);
        let Some(target) = self.writers.get(&partition) else {
            if let Some(suppressed) = self.no_writer.permit() {
                tracing::warn!(
                    partition,
                    job_key = job.key,
                    suppressed,
                    error = %error,
                    "no writer for partition; dropping failed push, the job will time out",
                );
            }
            return;
        };

        let key = job.key;
        let entry = LogAppendEntry::new(key, RecordBody::command(JobIntent::Yield, job.record));
        match target
            .writer
            .try_write(std::slice::from_ref(&entry), NULL_POSITION)
        {
            Ok(position) => tracing::debug!(
                partition,
                term = target.term,
                job_key = key,
                position,
                error = %error,
                "yielded job after failed push",
            ),
            Err(e) => tracing::warn!(
                partition,
                job_key = key,
                error = %e,
                "failed to yield job after failed push; it will time out",
            ),
        }
    }
}

/// Owns the partition writers and yields jobs whose push failed
pub struct RemoteJobStreamErrorHandlerService {
    sender: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

impl RemoteJobStreamErrorHandlerService {
    /// Spawn the service on the current tokio runtime
    pub fn start(config: &KeelConfig, clock: Arc<dyn Clock>) -> Self {
        let (sender, rx) = mpsc::unbounded_channel();
        let task = ErrorHandlerTask {
            writers: HashMap::new(),
            no_writer: ThrottledLogger::new(config.no_writer_log_interval, clock),
        };
        let task = tokio::spawn(task.run(rx));
        Self { sender, task }
    }

    /// Error handler to pass along with job pushes
    pub fn handler(&self) -> YieldingJobStreamErrorHandler {
        YieldingJobStreamErrorHandler {
            sender: self.sender.clone(),
        }
    }

    pub async fn has_writer(&self, partition: PartitionId) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .sender
            .send(Message::HasWriter { partition, reply })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Stop after all queued messages were handled
    pub async fn close(mut self) {
        let _ = self.sender.send(Message::Shutdown);
        let _ = (&mut self.task).await;
    }

    async fn release(&self, partition: PartitionId) {
        let (ack, rx) = oneshot::channel();
        if self.sender.send(Message::Release { partition, ack }).is_ok() {
            let _ = rx.await;
        }
    }
}

impl Drop for RemoteJobStreamErrorHandlerService {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl PartitionListener for RemoteJobStreamErrorHandlerService {
    async fn on_becoming_leader(
        &self,
        partition: PartitionId,
        term: u64,
        log_stream: &LogStream,
    ) -> Result<(), LogStreamError> {
        let span = tracing::info_span!("jobstream.leader", partition, term);
        let writer = log_stream.new_writer()?;
        let (ack, rx) = oneshot::channel();
        let message = Message::Leader {
            partition,
            term,
            writer,
            ack,
        };
        async {
            if self.sender.send(message).is_ok() {
                let _ = rx.await;
            }
            tracing::info!("acquired partition writer");
        }
        .instrument(span)
        .await;
        Ok(())
    }

    async fn on_becoming_follower(&self, partition: PartitionId, term: u64) {
        self.release(partition).await;
        tracing::info!(partition, term, "released partition writer (follower)");
    }

    async fn on_becoming_inactive(&self, partition: PartitionId, term: u64) {
        self.release(partition).await;
        tracing::info!(partition, term, "released partition writer (inactive)");
    }
}

/// Forwards failed pushes to the [`RemoteJobStreamErrorHandlerService`]
#[derive(Clone)]
pub struct YieldingJobStreamErrorHandler {
    sender: mpsc::UnboundedSender<Message>,
}

impl ErrorHandler<ActivatedJob> for YieldingJobStreamErrorHandler {
    fn handle_error(&self, error: PushError, payload: ActivatedJob) {
        let job_key = payload.key;
        if self
            .sender
            .send(Message::Failed {
                error,
                job: payload,
            })
            .is_err()
        {
            tracing::warn!(job_key, "error handler stopped; dropping failed push");
        }
    }
}

#[cfg(test)]
#[path = "error_handler_tests.rs"]
mod tests;
