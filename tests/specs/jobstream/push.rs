// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push specs
//!
//! A job whose push fails is yielded on its own partition, exactly once.

use crate::prelude::*;
use keel_core::ActivatedJob;
use keel_engine::{JobActivationProperties, JobStream, JobStreamer};
use keel_jobstream::{
    FakeTransport, PartitionListener, RemoteJobStreamErrorHandlerService, RemoteJobStreamer,
    RemoteStreamer, StreamRegistry, TransportError,
};
use uuid::Uuid;

fn registry_with_stream(job_type: &str) -> Arc<StreamRegistry<JobActivationProperties>> {
    let registry = Arc::new(StreamRegistry::new());
    registry.add(
        job_type,
        Uuid::new_v4(),
        "gateway-1",
        JobActivationProperties::new("remote-worker", Duration::from_secs(30)),
    );
    registry
}

fn failing_transport() -> FakeTransport {
    let transport = FakeTransport::new();
    transport.fail_all(Some(TransportError::Unreachable("gateway-1".to_string())));
    transport
}

#[tokio::test]
async fn failed_push_appends_yield_for_the_same_job() {
    // Key 42 belongs to partition 0
    let partition = Partition::new(0);
    let service = RemoteJobStreamErrorHandlerService::start(
        &KeelConfig::default(),
        partition.clock.clone(),
    );
    service.on_becoming_leader(0, 1, &partition.log).await.unwrap();

    let transport = failing_transport();
    let streamer = RemoteJobStreamer::new(
        RemoteStreamer::new(registry_with_stream("T"), transport.clone()),
        Arc::new(service.handler()),
    );

    let stream = streamer.stream_for("T").unwrap();
    stream.push(ActivatedJob::new(42, JobRecord::new("T")));

    eventually(|| !partition.records().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let records = partition.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, 42);
    assert_eq!(records[0].record_type(), RecordType::Command);
    assert_eq!(records[0].intent(), Intent::Job(JobIntent::Yield));
    assert_eq!(transport.pushes().len(), 1, "no further push");
}

#[tokio::test]
async fn failed_push_makes_the_job_activatable_again() {
    let partition = Partition::new(1);
    let service = RemoteJobStreamErrorHandlerService::start(
        &KeelConfig::default(),
        partition.clock.clone(),
    );
    service.on_becoming_leader(1, 1, &partition.log).await.unwrap();

    let transport = failing_transport();
    let streamer = Arc::new(RemoteJobStreamer::new(
        RemoteStreamer::new(registry_with_stream("T"), transport.clone()),
        Arc::new(service.handler()),
    ));
    let handle = StreamProcessor::builder(partition.log.clone())
        .clock(partition.clock.clone())
        .streamer(streamer)
        .start()
        .await
        .unwrap();

    let position = partition.command(-1, JobIntent::Create, JobRecord::new("T"));
    processed(&handle, position).await;

    // CREATE, CREATED, ACTIVATED, then YIELD from the error handler and YIELDED
    eventually(|| partition.records().len() >= 5).await;
    let yielded = partition.records().pop().unwrap();
    processed(&handle, yielded.position - 1).await;

    let intents: Vec<Intent> = partition.records().iter().map(|r| r.intent()).collect();
    assert_eq!(
        intents,
        vec![
            Intent::Job(JobIntent::Create),
            Intent::Job(JobIntent::Created),
            Intent::JobBatch(JobBatchIntent::Activated),
            Intent::Job(JobIntent::Yield),
            Intent::Job(JobIntent::Yielded),
        ]
    );
    let key = partition.records()[1].key;
    assert_eq!(yielded.key, key);

    let state = handle.state().await.unwrap();
    assert_eq!(state.activatable_jobs("T", 10).len(), 1);
    assert_eq!(transport.pushes().len(), 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn without_leadership_the_failed_push_is_dropped() {
    let partition = Partition::new(0);
    let service = RemoteJobStreamErrorHandlerService::start(
        &KeelConfig::default(),
        partition.clock.clone(),
    );
    service.on_becoming_leader(0, 1, &partition.log).await.unwrap();
    service.on_becoming_follower(0, 2).await;

    let streamer = RemoteJobStreamer::new(
        RemoteStreamer::new(registry_with_stream("T"), failing_transport()),
        Arc::new(service.handler()),
    );
    streamer
        .stream_for("T")
        .unwrap()
        .push(ActivatedJob::new(42, JobRecord::new("T")));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!service.has_writer(0).await);
    assert!(partition.records().is_empty());
}

#[tokio::test]
async fn push_slower_than_configured_timeout_is_yielded() {
    let config = KeelConfig {
        push_timeout: Duration::from_millis(20),
        ..KeelConfig::default()
    };
    let partition = Partition::new(0);
    let service = RemoteJobStreamErrorHandlerService::start(&config, partition.clock.clone());
    service.on_becoming_leader(0, 1, &partition.log).await.unwrap();

    let transport = FakeTransport::new();
    transport.set_delay(Some(Duration::from_secs(2)));
    let streamer = RemoteJobStreamer::new(
        RemoteStreamer::from_config(registry_with_stream("T"), transport, &config),
        Arc::new(service.handler()),
    );
    streamer
        .stream_for("T")
        .unwrap()
        .push(ActivatedJob::new(42, JobRecord::new("T")));

    eventually(|| !partition.records().is_empty()).await;
    let records = partition.records();
    assert_eq!(records[0].key, 42);
    assert_eq!(records[0].intent(), Intent::Job(JobIntent::Yield));
}
