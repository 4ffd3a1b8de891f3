// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::transport::TransportError;
use keel_core::{encode_partition_id, FakeClock, Intent, JobRecord, Record, RecordType};
use keel_logstreams::{LogStorage, MemoryLogStorage};
use std::time::Duration;

fn log_stream(partition: PartitionId) -> LogStream {
    LogStream::builder(partition)
        .storage(Arc::new(MemoryLogStorage::new()) as Arc<dyn LogStorage>)
        .build()
        .unwrap()
}

fn service() -> RemoteJobStreamErrorHandlerService {
    RemoteJobStreamErrorHandlerService::start(&KeelConfig::default(), Arc::new(FakeClock::new()))
}

fn failed_push() -> PushError {
    PushError::Transport(TransportError::Unreachable("gw-1".to_string()))
}

async fn records_eventually(log: &LogStream, count: usize) -> Vec<Record> {
    for _ in 0..200 {
        let records: Vec<Record> = log.new_reader().unwrap().map(|r| r.unwrap()).collect();
        if records.len() >= count {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {count} records");
}

#[tokio::test]
async fn failed_push_yields_job_on_owning_partition() {
    let service = service();
    let log = log_stream(1);
    service.on_becoming_leader(1, 1, &log).await.unwrap();

    let key = encode_partition_id(1, 42);
    let mut job = JobRecord::new("T");
    job.worker = "w".to_string();
    service
        .handler()
        .handle_error(failed_push(), ActivatedJob::new(key, job.clone()));

    let records = records_eventually(&log, 1).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, key);
    assert_eq!(records[0].record_type(), RecordType::Command);
    assert_eq!(records[0].intent(), Intent::Job(JobIntent::Yield));
    assert_eq!(records[0].value().as_job(), Some(&job));
}

#[tokio::test]
async fn without_writer_the_job_is_dropped() {
    let service = service();
    let other = log_stream(2);
    service.on_becoming_leader(2, 1, &other).await.unwrap();

    let key = encode_partition_id(1, 42);
    service
        .handler()
        .handle_error(failed_push(), ActivatedJob::new(key, JobRecord::new("T")));
    // Queue is ordered, so the failure was handled once this returns
    assert!(!service.has_writer(1).await);

    assert_eq!(other.new_reader().unwrap().count(), 0);
}

#[tokio::test]
async fn leadership_changes_acquire_and_release_writers() {
    let service = service();
    let log = log_stream(3);

    assert!(!service.has_writer(3).await);
    service.on_becoming_leader(3, 1, &log).await.unwrap();
    assert!(service.has_writer(3).await);

    service.on_becoming_follower(3, 2).await;
    assert!(!service.has_writer(3).await);

    service.on_becoming_leader(3, 3, &log).await.unwrap();
    service.on_becoming_inactive(3, 3).await;
    assert!(!service.has_writer(3).await);
}

#[tokio::test]
async fn released_writer_is_not_used() {
    let service = service();
    let log = log_stream(1);
    service.on_becoming_leader(1, 1, &log).await.unwrap();
    service.on_becoming_follower(1, 2).await;

    let key = encode_partition_id(1, 5);
    service
        .handler()
        .handle_error(failed_push(), ActivatedJob::new(key, JobRecord::new("T")));
    assert!(!service.has_writer(1).await);
    assert_eq!(log.new_reader().unwrap().count(), 0);
}

#[tokio::test]
async fn closed_service_drops_failures_quietly() {
    let service = service();
    let handler = service.handler();
    service.close().await;

    handler.handle_error(
        failed_push(),
        ActivatedJob::new(encode_partition_id(1, 1), JobRecord::new("T")),
    );
}
