// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::transport::FakeTransport;
use keel_core::JobRecord;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

struct RecordingHandler {
    failed: mpsc::UnboundedSender<(String, ActivatedJob)>,
}

impl ErrorHandler<ActivatedJob> for RecordingHandler {
    fn handle_error(&self, error: PushError, payload: ActivatedJob) {
        let _ = self.failed.send((error.to_string(), payload));
    }
}

fn handler() -> (
    Arc<dyn ErrorHandler<ActivatedJob>>,
    mpsc::UnboundedReceiver<(String, ActivatedJob)>,
) {
    let (failed, rx) = mpsc::unbounded_channel();
    (Arc::new(RecordingHandler { failed }), rx)
}

fn streamer(transport: FakeTransport) -> RemoteStreamer<&'static str, FakeTransport> {
    RemoteStreamer::new(Arc::new(StreamRegistry::new()), transport)
}

fn job(key: i64) -> ActivatedJob {
    ActivatedJob::new(key, JobRecord::new("T"))
}

async fn wait_for_pushes(transport: &FakeTransport, count: usize) {
    for _ in 0..200 {
        if transport.pushes().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {count} pushes, saw {}", transport.pushes().len());
}

#[test]
fn no_stream_without_consumers() {
    let streamer = streamer(FakeTransport::new());
    assert!(streamer.stream_for("T").is_none());
}

#[test]
fn rotates_over_all_consumers_of_a_type() {
    let streamer = streamer(FakeTransport::new());
    let registry = streamer.registry();
    registry.add("T", Uuid::from_u128(1), "gw-1", "a");
    registry.add("T", Uuid::from_u128(2), "gw-2", "a");
    registry.add("T", Uuid::from_u128(3), "gw-1", "b");
    registry.add("U", Uuid::from_u128(4), "gw-1", "a");

    let picked: Vec<Uuid> = (0..6)
        .map(|_| streamer.stream_for("T").unwrap().id().stream_id)
        .collect();
    let first_round: Vec<Uuid> = picked[..3].to_vec();
    assert_eq!(&picked[3..], &first_round[..]);

    let mut distinct = first_round.clone();
    distinct.sort();
    assert_eq!(
        distinct,
        vec![Uuid::from_u128(1), Uuid::from_u128(2), Uuid::from_u128(3)]
    );
}

#[test]
fn stream_carries_aggregate_properties() {
    let streamer = streamer(FakeTransport::new());
    streamer.registry().add("T", Uuid::from_u128(9), "gw-1", "props");
    let stream = streamer.stream_for("T").unwrap();
    assert_eq!(*stream.properties(), "props");
}

#[tokio::test]
async fn successful_push_reaches_transport_and_counts() {
    let transport = FakeTransport::new();
    let streamer = streamer(transport.clone());
    streamer.registry().add("T", Uuid::from_u128(1), "gw-1", "a");
    let (handler, mut failed) = handler();

    streamer.stream_for("T").unwrap().push(job(42), handler);
    wait_for_pushes(&transport, 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (target, payload) = transport.pushes().remove(0);
    assert_eq!(target, RemoteStreamId::new("gw-1", Uuid::from_u128(1)));
    assert_eq!(codec::decode_activated_job(&payload).unwrap(), job(42));
    assert!(failed.try_recv().is_err());
    assert_eq!(streamer.job_stream_metrics().snapshot().pushes_succeeded, 1);
}

#[tokio::test]
async fn failed_push_hands_payload_to_error_handler_once() {
    let transport = FakeTransport::new();
    transport.fail_next(TransportError::Unreachable("gw-1".to_string()));
    let streamer = streamer(transport.clone());
    streamer.registry().add("T", Uuid::from_u128(1), "gw-1", "a");
    let (handler, mut failed) = handler();

    streamer.stream_for("T").unwrap().push(job(42), handler);

    let (error, payload) = tokio::time::timeout(Duration::from_secs(2), failed.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(error.contains("unreachable"), "{error}");
    assert_eq!(payload.key, 42);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(failed.try_recv().is_err());
    assert_eq!(transport.pushes().len(), 1, "failed pushes are not retried");
    assert_eq!(streamer.job_stream_metrics().snapshot().pushes_failed, 1);
}

#[tokio::test]
async fn unacknowledged_push_times_out() {
    let transport = FakeTransport::new();
    transport.set_delay(Some(Duration::from_millis(500)));
    let streamer = streamer(transport).push_timeout(Duration::from_millis(20));
    streamer.registry().add("T", Uuid::from_u128(1), "gw-1", "a");
    let (handler, mut failed) = handler();

    streamer.stream_for("T").unwrap().push(job(7), handler);

    let (error, payload) = tokio::time::timeout(Duration::from_secs(2), failed.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(error.contains("not acknowledged"), "{error}");
    assert_eq!(payload.key, 7);
}

#[tokio::test]
async fn configured_push_timeout_routes_slow_pushes_to_the_handler() {
    let transport = FakeTransport::new();
    transport.set_delay(Some(Duration::from_millis(500)));
    let config = KeelConfig {
        push_timeout: Duration::from_millis(20),
        ..KeelConfig::default()
    };
    let registry = Arc::new(StreamRegistry::new());
    let streamer = RemoteStreamer::from_config(registry, transport, &config);
    streamer.registry().add("T", Uuid::from_u128(1), "gw-1", "a");
    let (handler, mut failed) = handler();

    streamer.stream_for("T").unwrap().push(job(9), handler);

    let (error, payload) = tokio::time::timeout(Duration::from_secs(2), failed.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(error, PushError::Timeout(Duration::from_millis(20)).to_string());
    assert_eq!(payload.key, 9);
    assert_eq!(streamer.job_stream_metrics().snapshot().pushes_failed, 1);
}

#[test]
fn push_without_runtime_fails_immediately() {
    let streamer = streamer(FakeTransport::new());
    streamer.registry().add("T", Uuid::from_u128(1), "gw-1", "a");
    let errors = Arc::new(Mutex::new(Vec::new()));

    struct Collect(Arc<Mutex<Vec<String>>>);
    impl ErrorHandler<ActivatedJob> for Collect {
        fn handle_error(&self, error: PushError, _payload: ActivatedJob) {
            self.0.lock().unwrap().push(error.to_string());
        }
    }

    streamer
        .stream_for("T")
        .unwrap()
        .push(job(1), Arc::new(Collect(Arc::clone(&errors))));
    assert_eq!(
        *errors.lock().unwrap(),
        vec!["no async runtime available to push on".to_string()]
    );
}

#[tokio::test]
async fn work_available_is_broadcast() {
    let transport = FakeTransport::new();
    let streamer = streamer(transport.clone());
    streamer.notify_work_available("T");

    for _ in 0..200 {
        if !transport.calls().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(
        transport.calls(),
        vec![crate::transport::TransportCall::Broadcast {
            job_type: "T".to_string()
        }]
    );
}
