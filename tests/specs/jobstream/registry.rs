// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry specs
//!
//! Adding and removing streams is idempotent.

use crate::prelude::*;
use keel_jobstream::{
    FakeTransport, JobStreamMetrics, RemoteStreamApiHandler, RemoteStreamer, StreamRegistry,
    StreamRequest,
};
use uuid::Uuid;

fn add(stream_id: Uuid, receiver: &str) -> StreamRequest<&'static str> {
    StreamRequest::Add {
        job_type: "T".to_string(),
        stream_id,
        receiver: receiver.to_string(),
        properties: "p",
    }
}

#[test]
fn repeated_requests_leave_one_registration() {
    let registry = Arc::new(StreamRegistry::new());
    let metrics = Arc::new(JobStreamMetrics::new());
    let api = RemoteStreamApiHandler::new(Arc::clone(&registry), Arc::clone(&metrics));
    let id = Uuid::new_v4();

    api.handle(add(id, "gw-1"));
    api.handle(add(id, "gw-1"));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.streams_for("T")[0].consumers.len(), 1);

    let remove = StreamRequest::Remove {
        stream_id: id,
        receiver: "gw-1".to_string(),
    };
    api.handle(remove.clone());
    api.handle(remove);
    assert!(registry.is_empty());
    assert_eq!(metrics.snapshot().open_streams, 0);
}

#[test]
fn removed_streams_are_no_longer_picked() {
    let registry = Arc::new(StreamRegistry::new());
    let api = RemoteStreamApiHandler::new(Arc::clone(&registry), Arc::new(JobStreamMetrics::new()));
    let streamer = RemoteStreamer::new(Arc::clone(&registry), FakeTransport::new());

    api.handle(add(Uuid::new_v4(), "gw-1"));
    api.handle(add(Uuid::new_v4(), "gw-2"));
    api.on_member_removed("gw-1");

    for _ in 0..4 {
        assert_eq!(streamer.stream_for("T").unwrap().id().receiver, "gw-2");
    }
    api.on_member_removed("gw-2");
    assert!(streamer.stream_for("T").is_none());
}
