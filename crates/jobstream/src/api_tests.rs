// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn handler() -> (
    RemoteStreamApiHandler<u32>,
    Arc<StreamRegistry<u32>>,
    Arc<JobStreamMetrics>,
) {
    let registry = Arc::new(StreamRegistry::new());
    let metrics = Arc::new(JobStreamMetrics::new());
    let handler = RemoteStreamApiHandler::new(Arc::clone(&registry), Arc::clone(&metrics));
    (handler, registry, metrics)
}

fn add(stream: u128, receiver: &str) -> StreamRequest<u32> {
    StreamRequest::Add {
        job_type: "T".to_string(),
        stream_id: Uuid::from_u128(stream),
        receiver: receiver.to_string(),
        properties: 1,
    }
}

#[test]
fn add_is_idempotent() {
    let (handler, registry, metrics) = handler();
    assert!(handler.handle(add(1, "gw-1")));
    assert!(!handler.handle(add(1, "gw-1")));

    assert_eq!(registry.len(), 1);
    assert_eq!(metrics.snapshot().open_streams, 1);
}

#[test]
fn remove_then_remove_again() {
    let (handler, registry, metrics) = handler();
    handler.handle(add(1, "gw-1"));
    let remove = StreamRequest::Remove {
        stream_id: Uuid::from_u128(1),
        receiver: "gw-1".to_string(),
    };

    assert!(handler.handle(remove.clone()));
    assert!(!handler.handle(remove));
    assert!(registry.is_empty());
    assert_eq!(metrics.snapshot().open_streams, 0);
}

#[test]
fn remove_all_only_touches_that_receiver() {
    let (handler, registry, metrics) = handler();
    handler.handle(add(1, "gw-1"));
    handler.handle(add(2, "gw-1"));
    handler.handle(add(3, "gw-2"));

    assert!(handler.handle(StreamRequest::RemoveAll {
        receiver: "gw-1".to_string()
    }));
    assert!(registry.contains(Uuid::from_u128(3), "gw-2"));
    assert_eq!(metrics.snapshot().open_streams, 1);
}

#[test]
fn departed_member_loses_its_streams() {
    let (handler, registry, metrics) = handler();
    handler.handle(add(1, "gw-1"));
    handler.handle(add(2, "gw-2"));

    handler.on_member_removed("gw-2");
    handler.on_member_removed("gw-9");

    assert_eq!(registry.len(), 1);
    assert!(!registry.contains(Uuid::from_u128(2), "gw-2"));
    assert_eq!(metrics.snapshot().open_streams, 1);
}

#[parameterized(
    remove_unknown = { StreamRequest::Remove { stream_id: Uuid::from_u128(5), receiver: "gw-1".to_string() } },
    remove_wrong_receiver = { StreamRequest::Remove { stream_id: Uuid::from_u128(1), receiver: "gw-2".to_string() } },
    remove_all_unknown = { StreamRequest::RemoveAll { receiver: "gw-3".to_string() } },
)]
fn requests_for_unknown_streams_change_nothing(request: StreamRequest<u32>) {
    let (handler, registry, metrics) = handler();
    handler.handle(add(1, "gw-1"));

    assert!(!handler.handle(request));
    assert!(registry.contains(Uuid::from_u128(1), "gw-1"));
    assert_eq!(metrics.snapshot().open_streams, 1);
}
