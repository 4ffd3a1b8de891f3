// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for behavioral specs

pub use keel_core::{
    encode_partition_id, Clock, FakeClock, Intent, JobBatchIntent, JobIntent, JobRecord,
    KeelConfig, LogAppendEntry, Record, RecordBody, RecordMetadata, RecordType, RecordValue,
    RejectionType, NULL_POSITION,
};
pub use keel_engine::{StreamProcessor, StreamProcessorHandle};
pub use keel_logstreams::{
    AimdLimiter, CommitMode, FileLogStorage, LogStorage, LogStream, LogStreamWriter,
    MemoryLogStorage, WriteFailure,
};
pub use std::sync::Arc;
pub use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

/// One partition: memory storage, a fake clock and a log stream on top
pub struct Partition {
    pub id: u32,
    pub storage: Arc<MemoryLogStorage>,
    pub clock: Arc<FakeClock>,
    pub log: LogStream,
}

impl Partition {
    pub fn new(id: u32) -> Self {
        Self::with_storage(id, Arc::new(MemoryLogStorage::new()))
    }

    pub fn with_storage(id: u32, storage: Arc<MemoryLogStorage>) -> Self {
        let clock = Arc::new(FakeClock::new());
        let log = LogStream::builder(id)
            .storage(Arc::clone(&storage) as Arc<dyn LogStorage>)
            .clock(clock.clone())
            .build()
            .unwrap();
        Self {
            id,
            storage,
            clock,
            log,
        }
    }

    /// A fresh log stream over the same storage, as after a restart
    pub fn reopen(&self) -> LogStream {
        LogStream::builder(self.id)
            .storage(Arc::clone(&self.storage) as Arc<dyn LogStorage>)
            .clock(self.clock.clone())
            .build()
            .unwrap()
    }

    pub fn writer(&self) -> Arc<dyn LogStreamWriter> {
        self.log.new_writer().unwrap()
    }

    /// Write a client command with a request attached; returns its position
    pub fn command(
        &self,
        key: i64,
        intent: impl Into<Intent>,
        value: impl Into<RecordValue>,
    ) -> i64 {
        let entry = LogAppendEntry::new(key, RecordBody::command(intent, value))
            .with_metadata(RecordMetadata::default().with_request(1, key.max(0)));
        self.writer().try_write(&[entry], NULL_POSITION).unwrap()
    }

    pub fn records(&self) -> Vec<Record> {
        read_all(&self.log)
    }

    pub async fn processor(&self) -> StreamProcessorHandle {
        StreamProcessor::builder(self.log.clone())
            .clock(self.clock.clone())
            .start()
            .await
            .unwrap()
    }
}

pub fn read_all(log: &LogStream) -> Vec<Record> {
    log.new_reader().unwrap().map(|r| r.unwrap()).collect()
}

pub fn job_entry(job_type: &str) -> LogAppendEntry {
    LogAppendEntry::new(-1, RecordBody::command(JobIntent::Create, JobRecord::new(job_type)))
}

pub async fn processed(handle: &StreamProcessorHandle, position: i64) {
    tokio::time::timeout(WAIT, handle.wait_for_processed(position))
        .await
        .expect("processing timed out")
        .unwrap();
}

/// Poll `check` until it holds or the wait runs out
pub async fn eventually<F: FnMut() -> bool>(mut check: F) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
