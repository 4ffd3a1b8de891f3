// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Processing specs
//!
//! Commands are answered by follow-up records that are applied in log
//! order; the same log always yields the same state.

use crate::prelude::*;
use keel_core::JobBatchRecord;

/// Everything about a record except wall-clock time
fn shape(record: &Record) -> (i64, i64, i64, RecordType, Intent) {
    (
        record.position,
        record.source_record_position,
        record.key,
        record.record_type(),
        record.intent(),
    )
}

async fn run_workload(partition: &Partition) -> keel_engine::JobState {
    let handle = partition.processor().await;
    partition.command(-1, JobIntent::Create, JobRecord::new("T"));
    partition.command(-1, JobIntent::Create, JobRecord::new("T"));
    partition.command(-1, JobIntent::Create, JobRecord::new("U"));
    partition.command(
        -1,
        JobBatchIntent::Activate,
        JobBatchRecord::new("T", "w", 60_000),
    );
    let last = partition.command(77, JobIntent::Complete, JobRecord::new("T"));
    processed(&handle, last).await;
    let state = handle.state().await.unwrap();
    handle.shutdown().await.unwrap();
    state
}

#[tokio::test]
async fn same_commands_produce_same_records_and_state() {
    let first = Partition::new(1);
    let second = Partition::new(1);

    let first_state = run_workload(&first).await;
    let second_state = run_workload(&second).await;

    let first_records: Vec<_> = first.records().iter().map(shape).collect();
    let second_records: Vec<_> = second.records().iter().map(shape).collect();
    assert_eq!(first_records, second_records);
    assert_eq!(first_state, second_state);
    assert_eq!(first_state.len(), 3);
}

#[tokio::test]
async fn replay_after_restart_rebuilds_identical_state() {
    let partition = Partition::new(1);
    let before = run_workload(&partition).await;

    let log = partition.reopen();
    let handle = StreamProcessor::builder(log)
        .clock(partition.clock.clone())
        .start()
        .await
        .unwrap();
    assert_eq!(handle.state().await.unwrap(), before);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn rejection_follows_and_points_at_its_command() {
    let partition = Partition::new(1);
    let handle = partition.processor().await;

    let position = partition.command(77, JobIntent::Complete, JobRecord::new("T"));
    processed(&handle, position).await;

    let records = partition.records();
    assert_eq!(records.len(), 2);
    let rejection = &records[1];
    assert!(rejection.position > position);
    assert_eq!(rejection.source_record_position, position);
    assert_eq!(rejection.key, 77);
    assert_eq!(rejection.record_type(), RecordType::CommandRejection);
    assert_eq!(rejection.intent(), Intent::Job(JobIntent::Complete));
    assert_eq!(rejection.body.rejection_type(), RejectionType::NotFound);
    assert!(handle.state().await.unwrap().is_empty());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn created_job_can_be_activated_and_completed() {
    let partition = Partition::new(1);
    let handle = partition.processor().await;

    let created = partition.command(-1, JobIntent::Create, JobRecord::new("T"));
    processed(&handle, created).await;
    let key = partition.records()[1].key;

    let activate = partition.command(
        -1,
        JobBatchIntent::Activate,
        JobBatchRecord::new("T", "w", 60_000),
    );
    processed(&handle, activate).await;
    let state = handle.state().await.unwrap();
    assert_eq!(state.job(key).unwrap().record.worker, "w");

    let complete = partition.command(key, JobIntent::Complete, JobRecord::new("T"));
    processed(&handle, complete).await;
    assert!(handle.state().await.unwrap().is_empty());

    let last = partition.records().pop().unwrap();
    assert_eq!(last.intent(), Intent::Job(JobIntent::Completed));
    assert_eq!(last.key, key);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn rejected_activation_without_key_keeps_the_command_key() {
    let partition = Partition::new(1);
    let handle = partition.processor().await;

    let position = partition.command(
        -1,
        JobBatchIntent::Activate,
        JobBatchRecord::new("", "w", 60_000),
    );
    processed(&handle, position).await;

    let records = partition.records();
    assert_eq!(records.len(), 2);
    let rejection = &records[1];
    assert_eq!(rejection.record_type(), RecordType::CommandRejection);
    assert_eq!(rejection.key, -1);
    assert_eq!(rejection.source_record_position, position);
    assert_eq!(rejection.body.rejection_type(), RejectionType::InvalidArgument);
    handle.shutdown().await.unwrap();
}
