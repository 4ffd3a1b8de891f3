// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::storage::{CommitMode, FileLogStorage, MemoryLogStorage};
use keel_core::{JobIntent, JobRecord, LogAppendEntry, RecordBody};
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

fn entry() -> LogAppendEntry {
    LogAppendEntry::new(1, RecordBody::command(JobIntent::Create, JobRecord::new("T")))
}

#[derive(Default)]
struct Recorder {
    available: Mutex<Vec<i64>>,
    failures: Mutex<Vec<String>>,
    commits: AtomicUsize,
}

impl RecordsAvailableListener for Recorder {
    fn on_records_available(&self, commit_position: i64) {
        self.available.lock().unwrap().push(commit_position);
    }
}

impl FailureListener for Recorder {
    fn on_failure(&self, reason: &str) {
        self.failures.lock().unwrap().push(reason.to_string());
    }
}

impl CommitListener for Recorder {
    fn on_commit(&self) {
        self.commits.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn new_stream_starts_before_position_one() {
    let stream = LogStream::builder(3).build().unwrap();
    assert_eq!(stream.partition_id(), 3);
    assert_eq!(stream.last_written_position(), NULL_POSITION);
    assert_eq!(stream.commit_position(), NULL_POSITION);
    assert_eq!(stream.health(), HealthStatus::Healthy);
}

#[test]
fn partition_beyond_key_range_is_refused() {
    let highest = LogStream::builder(keel_core::MAX_PARTITION_ID).build();
    assert!(highest.is_ok());

    let result = LogStream::builder(keel_core::MAX_PARTITION_ID + 1).build();
    assert!(matches!(
        result,
        Err(LogStreamError::Partition(KeyError::PartitionOutOfRange(4096)))
    ));
}

#[test]
fn reopened_stream_continues_after_stored_positions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log.bin");
    {
        let storage = Arc::new(FileLogStorage::open(&path).unwrap());
        let stream = LogStream::builder(1).storage(storage).build().unwrap();
        let writer = stream.new_writer().unwrap();
        writer.try_write(&[entry(), entry()], NULL_POSITION).unwrap();
    }

    let storage = Arc::new(FileLogStorage::open(&path).unwrap());
    let stream = LogStream::builder(1).storage(storage).build().unwrap();
    assert_eq!(stream.commit_position(), 2);
    let writer = stream.new_writer().unwrap();
    assert_eq!(writer.try_write(&[entry()], NULL_POSITION), Ok(3));
}

#[test]
fn listeners_observe_commits() {
    let stream = LogStream::builder(1).build().unwrap();
    let recorder = Arc::new(Recorder::default());
    stream.add_records_available_listener(recorder.clone());
    let commit_listener: Arc<dyn CommitListener> = recorder.clone();
    stream.add_commit_listener(Arc::clone(&commit_listener));

    let writer = stream.new_writer().unwrap();
    writer.try_write(&[entry(), entry()], NULL_POSITION).unwrap();
    writer.try_write(&[entry()], NULL_POSITION).unwrap();

    stream.remove_commit_listener(&commit_listener);
    writer.try_write(&[entry()], NULL_POSITION).unwrap();

    assert_eq!(*recorder.available.lock().unwrap(), vec![2, 3, 4]);
    assert_eq!(recorder.commits.load(Ordering::SeqCst), 2);
}

#[test]
fn storage_failure_marks_stream_dead_and_notifies_once() {
    let storage = Arc::new(MemoryLogStorage::new());
    let stream = LogStream::builder(1).storage(storage.clone()).build().unwrap();
    let recorder = Arc::new(Recorder::default());
    stream.add_failure_listener(recorder.clone());

    storage.fail_appends("io");
    let writer = stream.new_writer().unwrap();
    let _ = writer.try_write(&[entry()], NULL_POSITION);
    let _ = writer.try_write(&[entry()], NULL_POSITION);

    assert!(matches!(stream.health(), HealthStatus::Dead(_)));
    assert_eq!(recorder.failures.lock().unwrap().len(), 1);
    assert!(stream.new_reader().is_err());
}

#[tokio::test]
async fn wait_for_commit_resolves_after_commit() {
    let storage = Arc::new(MemoryLogStorage::with_mode(CommitMode::Manual));
    let stream = LogStream::builder(1).storage(storage.clone()).build().unwrap();
    let writer = stream.new_writer().unwrap();
    let position = writer.try_write(&[entry()], NULL_POSITION).unwrap();

    let waiter = {
        let stream = stream.clone();
        tokio::spawn(async move { stream.wait_for_commit(position).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());

    storage.commit_pending();
    waiter.await.unwrap().unwrap();
    assert_eq!(stream.commit_position(), position);
}

#[tokio::test]
async fn wait_for_commit_fails_when_stream_closes() {
    let storage = Arc::new(MemoryLogStorage::with_mode(CommitMode::Manual));
    let stream = LogStream::builder(1).storage(storage).build().unwrap();
    let writer = stream.new_writer().unwrap();
    let position = writer.try_write(&[entry()], NULL_POSITION).unwrap();

    let waiter = {
        let stream = stream.clone();
        tokio::spawn(async move { stream.wait_for_commit(position).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    stream.close();

    assert!(matches!(
        waiter.await.unwrap(),
        Err(LogStreamError::Closed(1))
    ));
}

#[test]
fn compaction_hint_reaches_storage() {
    let storage = Arc::new(MemoryLogStorage::new());
    let stream = LogStream::builder(1).storage(storage.clone()).build().unwrap();
    let writer = stream.new_writer().unwrap();
    for _ in 0..3 {
        writer.try_write(&[entry()], NULL_POSITION).unwrap();
    }

    stream.update_compaction_bound(3);
    assert_eq!(storage.first_position(), Some(3));
}
