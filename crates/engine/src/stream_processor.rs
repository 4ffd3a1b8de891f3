// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The partition's stream processor
//!
//! One task per partition reads the log in position order. On startup it
//! rebuilds state by replaying events, then either processes new commands
//! (leader) or keeps replaying what others write (follower).
//!
//! Each command produces exactly one batch of follow-up records. The batch is
//! admitted by flow control before the command is processed, so a full log
//! delays processing instead of losing its result.

use crate::applier::{EventApplier, JobEventApplier};
use crate::error::ProcessingError;
use crate::processor::{JobProcessor, ProcessingContext};
use crate::snapshot::{ProcessorSnapshot, SnapshotMeta, SnapshotStore};
use crate::state::JobState;
use crate::streamer::{JobStreamer, NoopJobStreamer};
use crate::writers::{
    CommandResponseSink, FlushError, ProcessingResultBuilder, TypedCommandWriter,
    TypedRejectionWriter, TypedResponseWriter, TypedStreamWriter, WriteError,
};
use keel_core::{
    Clock, Intent, JobIntent, KeelConfig, KeyGenerator, PartitionId, Record, RejectionType,
    SystemClock,
};
use keel_logstreams::{
    LogStream, LogStreamError, LogStreamReader, LogStreamWriter, RecordsAvailableListener,
    WriteFailure, WriteReservation,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Records handled before the task checks its control channel again
const RECORDS_PER_TURN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorMode {
    /// Process commands and write their follow-ups
    Processing,
    /// Only apply events written by someone else
    Replay,
}

enum Control {
    Pause(oneshot::Sender<()>),
    Resume(oneshot::Sender<()>),
    Snapshot(oneshot::Sender<Result<Option<SnapshotMeta>, ProcessingError>>),
    State(oneshot::Sender<JobState>),
    Shutdown(oneshot::Sender<()>),
}

pub struct StreamProcessor;

impl StreamProcessor {
    pub fn builder(log_stream: LogStream) -> StreamProcessorBuilder {
        StreamProcessorBuilder {
            log_stream,
            clock: Arc::new(SystemClock),
            config: KeelConfig::default(),
            streamer: Arc::new(NoopJobStreamer),
            responses: None,
            snapshots: None,
            mode: ProcessorMode::Processing,
        }
    }
}

pub struct StreamProcessorBuilder {
    log_stream: LogStream,
    clock: Arc<dyn Clock>,
    config: KeelConfig,
    streamer: Arc<dyn JobStreamer>,
    responses: Option<Arc<dyn CommandResponseSink>>,
    snapshots: Option<SnapshotStore>,
    mode: ProcessorMode,
}

impl StreamProcessorBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: KeelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn streamer(mut self, streamer: Arc<dyn JobStreamer>) -> Self {
        self.streamer = streamer;
        self
    }

    pub fn responses(mut self, sink: Arc<dyn CommandResponseSink>) -> Self {
        self.responses = Some(sink);
        self
    }

    pub fn snapshots(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn mode(mut self, mode: ProcessorMode) -> Self {
        self.mode = mode;
        self
    }

    /// Recover state from the latest snapshot and the log, then start the
    /// processing task
    pub async fn start(self) -> Result<StreamProcessorHandle, ProcessingError> {
        let partition_id = self.log_stream.partition_id();
        let keys = KeyGenerator::new(partition_id)?;
        let writer = self.log_stream.new_writer()?;
        let stream_writer = TypedStreamWriter::new(
            Arc::clone(&writer),
            keys.clone(),
            self.config.max_batch_size_bytes,
        );
        let (processed_tx, processed_rx) = watch::channel(keel_core::NULL_POSITION);
        let wakeup = Arc::new(Notify::new());
        let (control_tx, control_rx) = mpsc::channel(16);

        let mut task = ProcessorTask {
            partition_id,
            reader: self.log_stream.new_reader()?,
            log_stream: self.log_stream,
            writer,
            keys,
            applier: JobEventApplier::new(),
            result: ProcessingResultBuilder::new(stream_writer),
            processor: JobProcessor::new(self.streamer),
            clock: self.clock,
            config: self.config,
            responses: self.responses,
            snapshots: self.snapshots,
            base: None,
            mode: self.mode,
            paused: false,
            processed_position: keel_core::NULL_POSITION,
            applied_position: keel_core::NULL_POSITION,
            since_snapshot: 0,
            pending_timeouts: BTreeSet::new(),
            processed_tx,
            wakeup: Arc::clone(&wakeup),
            control: control_rx,
            stopping: false,
            shutdown_ack: None,
        };
        task.recover().await?;

        let listener: Arc<dyn RecordsAvailableListener> = Arc::new(Wakeup(wakeup));
        task.log_stream
            .add_records_available_listener(Arc::clone(&listener));

        let handle = tokio::spawn(task.run(listener));
        Ok(StreamProcessorHandle {
            partition_id,
            control: control_tx,
            processed: processed_rx,
            task: Some(handle),
        })
    }
}

struct Wakeup(Arc<Notify>);

impl RecordsAvailableListener for Wakeup {
    fn on_records_available(&self, _commit_position: i64) {
        self.0.notify_one();
    }
}

/// Control surface of a running stream processor
pub struct StreamProcessorHandle {
    partition_id: PartitionId,
    control: mpsc::Sender<Control>,
    processed: watch::Receiver<i64>,
    task: Option<JoinHandle<Result<(), ProcessingError>>>,
}

impl StreamProcessorHandle {
    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Position of the last command whose follow-ups were written
    pub fn processed_position(&self) -> i64 {
        *self.processed.borrow()
    }

    /// Wait until the command at `position` or a later one is processed
    pub async fn wait_for_processed(&self, position: i64) -> Result<(), ProcessingError> {
        let mut processed = self.processed.clone();
        processed
            .wait_for(|current| *current >= position)
            .await
            .map(|_| ())
            .map_err(|_| ProcessingError::Stopped)
    }

    /// Stop reading the log; records that arrive meanwhile are kept
    pub async fn pause(&self) -> Result<(), ProcessingError> {
        self.request(Control::Pause).await
    }

    pub async fn resume(&self) -> Result<(), ProcessingError> {
        self.request(Control::Resume).await
    }

    /// Persist a snapshot now; `None` without a snapshot store
    pub async fn take_snapshot(&self) -> Result<Option<SnapshotMeta>, ProcessingError> {
        self.request(Control::Snapshot).await?
    }

    /// Copy of the current job state
    pub async fn state(&self) -> Result<JobState, ProcessingError> {
        self.request(Control::State).await
    }

    /// Stop the task and report how it ended
    pub async fn shutdown(mut self) -> Result<(), ProcessingError> {
        let (tx, rx) = oneshot::channel();
        if self.control.send(Control::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
        match self.task.take() {
            Some(task) => task.await.unwrap_or(Err(ProcessingError::Stopped)),
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|task| task.is_finished()).unwrap_or(true)
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> Control,
    ) -> Result<T, ProcessingError> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(message(tx))
            .await
            .map_err(|_| ProcessingError::Stopped)?;
        rx.await.map_err(|_| ProcessingError::Stopped)
    }
}

impl Drop for StreamProcessorHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct ProcessorTask {
    partition_id: PartitionId,
    log_stream: LogStream,
    reader: LogStreamReader,
    writer: Arc<dyn LogStreamWriter>,
    keys: KeyGenerator,
    applier: JobEventApplier,
    result: ProcessingResultBuilder,
    processor: JobProcessor,
    clock: Arc<dyn Clock>,
    config: KeelConfig,
    responses: Option<Arc<dyn CommandResponseSink>>,
    snapshots: Option<SnapshotStore>,
    /// Latest snapshot, the starting point of every rebuild
    base: Option<ProcessorSnapshot>,
    mode: ProcessorMode,
    paused: bool,
    processed_position: i64,
    applied_position: i64,
    since_snapshot: u64,
    /// Jobs with a TIME_OUT command written but not yet processed
    pending_timeouts: BTreeSet<i64>,
    processed_tx: watch::Sender<i64>,
    wakeup: Arc<Notify>,
    control: mpsc::Receiver<Control>,
    /// Set by a shutdown request or once every handle is gone
    stopping: bool,
    shutdown_ack: Option<oneshot::Sender<()>>,
}

impl ProcessorTask {
    async fn run(
        mut self,
        listener: Arc<dyn RecordsAvailableListener>,
    ) -> Result<(), ProcessingError> {
        let mut timeout_check = tokio::time::interval(self.config.job_timeout_check_interval);
        timeout_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let wakeup = Arc::clone(&self.wakeup);

        tracing::info!(
            partition = self.partition_id,
            mode = ?self.mode,
            processed_position = self.processed_position,
            "stream processor started"
        );

        let outcome = loop {
            match self.process_available().await {
                Ok(()) => {}
                Err(ProcessingError::Stopped) if self.stopping => break Ok(()),
                Err(e) => break Err(e),
            }
            tokio::select! {
                message = self.control.recv() => self.on_control(message).await,
                _ = wakeup.notified() => {}
                _ = timeout_check.tick() => {
                    if let Err(e) = self.check_job_timeouts() {
                        break Err(e);
                    }
                }
            }
            if self.stopping {
                break Ok(());
            }
        };

        self.log_stream.remove_records_available_listener(&listener);
        if let Some(done) = self.shutdown_ack.take() {
            let _ = done.send(());
        }
        match &outcome {
            Ok(()) => tracing::info!(partition = self.partition_id, "stream processor stopped"),
            Err(e) => tracing::error!(partition = self.partition_id, error = %e, "stream processor failed"),
        }
        outcome
    }

    /// `None` means every handle is gone
    async fn on_control(&mut self, message: Option<Control>) {
        match message {
            Some(message) => self.handle_control(message).await,
            None => self.stopping = true,
        }
    }

    async fn handle_control(&mut self, message: Control) {
        match message {
            Control::Pause(done) => {
                self.paused = true;
                tracing::info!(partition = self.partition_id, "stream processor paused");
                let _ = done.send(());
            }
            Control::Resume(done) => {
                self.paused = false;
                self.wakeup.notify_one();
                tracing::info!(partition = self.partition_id, "stream processor resumed");
                let _ = done.send(());
            }
            Control::Snapshot(done) => {
                let _ = done.send(self.take_snapshot().await);
            }
            Control::State(done) => {
                let _ = done.send(self.applier.state().clone());
            }
            Control::Shutdown(done) => {
                tracing::info!(partition = self.partition_id, "stream processor stopping");
                self.stopping = true;
                self.shutdown_ack = Some(done);
            }
        }
    }

    /// Load the latest snapshot and replay every event after it
    async fn recover(&mut self) -> Result<(), ProcessingError> {
        if let Some(store) = &self.snapshots {
            if let Some(snapshot) = store.latest()? {
                tracing::info!(
                    partition = self.partition_id,
                    applied_position = snapshot.applied_position,
                    jobs = snapshot.state.len(),
                    "restoring from snapshot"
                );
                self.applier = JobEventApplier::with_state(snapshot.state.clone());
                self.keys.set_key_if_higher(snapshot.next_key - 1);
                self.processed_position = snapshot.processed_position;
                self.applied_position = snapshot.applied_position;
                self.base = Some(snapshot);
            }
        }

        let last_written = self.log_stream.last_written_position();
        if last_written > 0 {
            self.log_stream.wait_for_commit(last_written).await?;
        }

        let from = self.processed_position.min(self.applied_position) + 1;
        self.reader.seek(from);
        let mut replayed = 0u64;
        while let Some(record) = self.reader.next_record() {
            self.replay_record(&record?)?;
            replayed += 1;
        }
        tracing::info!(
            partition = self.partition_id,
            replayed,
            processed_position = self.processed_position,
            applied_position = self.applied_position,
            "replay complete"
        );

        if self.mode == ProcessorMode::Processing {
            self.reader.seek_to_next_event(self.processed_position);
        }
        self.processed_tx.send_replace(self.processed_position);
        Ok(())
    }

    fn replay_record(&mut self, record: &Record) -> Result<(), ProcessingError> {
        if record.source_record_position > self.processed_position {
            self.processed_position = record.source_record_position;
        }
        if record.is_event() && record.position > self.applied_position {
            self.applier
                .apply_state(record.key, record.intent(), record.value())
                .map_err(|source| ProcessingError::Replay {
                    position: record.position,
                    source,
                })?;
        }
        self.keys.set_key_if_higher(record.key);
        self.applied_position = self.applied_position.max(record.position);
        Ok(())
    }

    async fn process_available(&mut self) -> Result<(), ProcessingError> {
        let mut budget = RECORDS_PER_TURN;
        while !self.paused && budget > 0 {
            let Some(record) = self.reader.next_record() else {
                return Ok(());
            };
            let record = record?;
            budget -= 1;
            match self.mode {
                ProcessorMode::Replay => {
                    self.replay_record(&record)?;
                    self.processed_tx.send_replace(self.processed_position);
                }
                ProcessorMode::Processing => self.process_record(record).await?,
            }
        }
        if !self.paused && self.reader.has_next() {
            self.wakeup.notify_one();
        }
        Ok(())
    }

    async fn process_record(&mut self, record: Record) -> Result<(), ProcessingError> {
        if !record.is_command() || record.position <= self.processed_position {
            return self.replay_record(&record);
        }

        let reservation = self.reserve().await?;
        if record.intent() == Intent::Job(JobIntent::TimeOut) {
            self.pending_timeouts.remove(&record.key);
        }
        self.result.reset(record.position);
        let now = self.clock.epoch_millis();
        let processed = {
            let mut ctx = ProcessingContext::new(&mut self.applier, &mut self.result, now);
            self.processor.process(&record, &mut ctx)
        };
        if let Err(error) = processed {
            tracing::warn!(
                partition = self.partition_id,
                position = record.position,
                intent = %record.intent(),
                error = %error,
                "command processing failed; rejecting"
            );
            self.result.discard();
            self.rebuild_state().await?;
            self.stage_rejection(&record, rejection_type_of(&error), &error.to_string());
        }

        self.write_result(&record, reservation).await?;

        let (response, tasks) = self.result.take_outcome();
        if let (Some(response), Some(sink)) = (response, &self.responses) {
            sink.send(response);
        }
        for task in tasks {
            task();
        }

        self.applied_position = self.applied_position.max(record.position);
        self.processed_position = record.position;
        self.processed_tx.send_replace(record.position);
        self.since_snapshot += 1;
        let snapshot_due = self.since_snapshot >= self.config.compaction_hint_interval_records;
        if snapshot_due && self.snapshots.is_some() {
            self.take_snapshot().await?;
        }
        Ok(())
    }

    /// Admit the next batch, waiting while the log is full
    ///
    /// Control requests are served while waiting; a shutdown ends the wait
    /// with [`ProcessingError::Stopped`].
    async fn reserve(&mut self) -> Result<WriteReservation, ProcessingError> {
        loop {
            match self.writer.try_reserve() {
                Ok(reservation) => return Ok(reservation),
                Err(WriteFailure::Full) => {
                    tracing::debug!(
                        partition = self.partition_id,
                        "log stream full; delaying processing"
                    );
                    let delay = self.config.processing_retry_delay;
                    let message = tokio::select! {
                        () = tokio::time::sleep(delay) => None,
                        message = self.control.recv() => Some(message),
                    };
                    if let Some(message) = message {
                        self.on_control(message).await;
                    }
                    if self.stopping {
                        return Err(ProcessingError::Stopped);
                    }
                }
                Err(WriteFailure::Closed) => {
                    return Err(LogStreamError::Closed(self.partition_id).into())
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Write the staged batch; a batch the log refuses is replaced by a
    /// rejection of the command
    async fn write_result(
        &mut self,
        command: &Record,
        reservation: WriteReservation,
    ) -> Result<(), ProcessingError> {
        match self.result.flush_reserved(reservation) {
            Ok(position) => {
                self.applied_position = self.applied_position.max(position);
                Ok(())
            }
            Err(FlushError::Empty) => Ok(()),
            Err(FlushError::Write(WriteFailure::InvalidArgument(reason))) => {
                tracing::warn!(
                    partition = self.partition_id,
                    position = command.position,
                    reason,
                    "log refused follow-up batch; rejecting command"
                );
                self.result.discard();
                self.rebuild_state().await?;
                self.stage_rejection(command, RejectionType::InvalidArgument, &reason);
                let reservation = self.reserve().await?;
                match self.result.flush_reserved(reservation) {
                    Ok(position) => {
                        self.applied_position = self.applied_position.max(position);
                        Ok(())
                    }
                    Err(FlushError::Empty) => Ok(()),
                    Err(FlushError::Write(failure)) => Err(failure.into()),
                }
            }
            Err(FlushError::Write(WriteFailure::Closed)) => {
                Err(LogStreamError::Closed(self.partition_id).into())
            }
            Err(FlushError::Write(failure)) => Err(failure.into()),
        }
    }

    /// Stage a rejection plus response for a command that could not be
    /// processed
    fn stage_rejection(&mut self, command: &Record, rejection_type: RejectionType, reason: &str) {
        let staged = self
            .result
            .stream()
            .append_rejection(command, rejection_type, reason);
        match staged {
            Ok(()) => self
                .result
                .response()
                .write_rejection_on_command(command, rejection_type, reason),
            Err(e) => {
                tracing::error!(
                    partition = self.partition_id,
                    position = command.position,
                    error = %e,
                    "failed to stage rejection; skipping command"
                );
                self.result.discard();
            }
        }
    }

    /// Rebuild state from the latest snapshot and the written log, dropping
    /// whatever a failed command applied
    async fn rebuild_state(&mut self) -> Result<(), ProcessingError> {
        if self.applied_position > 0 {
            self.log_stream
                .wait_for_commit(self.applied_position)
                .await?;
        }
        let (state, from) = match &self.base {
            Some(base) => (base.state.clone(), base.applied_position),
            None => (JobState::new(), keel_core::NULL_POSITION),
        };

        let mut applier = JobEventApplier::with_state(state);
        let mut reader = self.log_stream.new_reader()?;
        reader.seek(from + 1);
        for record in reader {
            let record = record?;
            if record.position > self.applied_position {
                break;
            }
            if record.is_event() {
                applier
                    .apply_state(record.key, record.intent(), record.value())
                    .map_err(|source| ProcessingError::Replay {
                        position: record.position,
                        source,
                    })?;
            }
        }
        self.applier = applier;
        tracing::debug!(
            partition = self.partition_id,
            applied_position = self.applied_position,
            "state rebuilt"
        );
        Ok(())
    }

    /// Write TIME_OUT commands for activated jobs past their deadline
    fn check_job_timeouts(&mut self) -> Result<(), ProcessingError> {
        if self.mode != ProcessorMode::Processing || self.paused {
            return Ok(());
        }
        let now = self.clock.epoch_millis();
        let expired: Vec<i64> = self
            .applier
            .state()
            .expired_jobs(now)
            .into_iter()
            .filter(|key| !self.pending_timeouts.contains(key))
            .collect();
        if expired.is_empty() {
            return Ok(());
        }

        let mut writer = TypedStreamWriter::new(
            Arc::clone(&self.writer),
            self.keys.clone(),
            self.config.max_batch_size_bytes,
        );
        let mut keys = Vec::new();
        for key in expired {
            let Some(entry) = self.applier.state().job(key) else {
                continue;
            };
            let value = entry.record.clone().into();
            match writer.append_follow_up_command(key, JobIntent::TimeOut.into(), value) {
                Ok(()) => keys.push(key),
                Err(WriteError::BatchTooLarge { .. }) => break,
                Err(e) => {
                    tracing::warn!(partition = self.partition_id, key, error = %e, "cannot time out job");
                }
            }
        }
        if writer.is_empty() {
            return Ok(());
        }

        match writer.flush() {
            Ok(_) => {
                tracing::debug!(
                    partition = self.partition_id,
                    jobs = keys.len(),
                    "timed out expired jobs"
                );
                self.pending_timeouts.extend(keys);
                Ok(())
            }
            Err(FlushError::Write(WriteFailure::Full)) => {
                tracing::debug!(partition = self.partition_id, "log stream full; retrying job timeouts later");
                Ok(())
            }
            Err(FlushError::Write(WriteFailure::Closed)) => {
                Err(LogStreamError::Closed(self.partition_id).into())
            }
            Err(FlushError::Write(failure)) => Err(failure.into()),
            Err(FlushError::Empty) => Ok(()),
        }
    }

    async fn take_snapshot(&mut self) -> Result<Option<SnapshotMeta>, ProcessingError> {
        let Some(store) = self.snapshots.clone() else {
            return Ok(None);
        };
        // A snapshot must never cover records that could still be lost
        if self.applied_position > 0 {
            self.log_stream
                .wait_for_commit(self.applied_position)
                .await?;
        }
        let snapshot = ProcessorSnapshot::new(
            self.partition_id,
            self.processed_position,
            self.applied_position,
            self.keys.peek(),
            self.applier.state().clone(),
        );
        let meta = store.persist(&snapshot)?;
        self.log_stream.update_compaction_bound(snapshot.replay_from());
        self.base = Some(snapshot);
        self.since_snapshot = 0;
        Ok(Some(meta))
    }
}

fn rejection_type_of(error: &WriteError) -> RejectionType {
    match error {
        WriteError::BatchTooLarge { .. } => RejectionType::ExceededBatchRecordSize,
        WriteError::Encoding(_) | WriteError::InvalidRecord(_) => RejectionType::InvalidArgument,
        WriteError::Apply(_) => RejectionType::ProcessingError,
    }
}

#[cfg(test)]
#[path = "stream_processor_tests.rs"]
mod tests;
