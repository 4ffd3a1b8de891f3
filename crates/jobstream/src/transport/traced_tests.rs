// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::transport::FakeTransport;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use uuid::Uuid;

/// A writer that captures log output for testing
#[derive(Clone, Default)]
struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    fn contents(&self) -> String {
        let logs = self.logs.lock().unwrap();
        String::from_utf8_lossy(&logs).to_string()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run a test with captured tracing output
fn with_tracing<F, Fut>(f: F) -> (String, Fut::Output)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future,
{
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f())
    });

    (logs.contents(), result)
}

fn target() -> RemoteStreamId {
    RemoteStreamId::new("gw-1", Uuid::from_u128(7))
}

#[tokio::test]
async fn traced_transport_delegates_pushes() {
    let fake = FakeTransport::new();
    let traced = TracedTransport::new(fake.clone());

    traced.push(&target(), Bytes::from_static(b"x")).await.unwrap();
    assert_eq!(fake.pushes(), vec![(target(), Bytes::from_static(b"x"))]);
}

#[tokio::test]
async fn traced_transport_delegates_broadcasts() {
    let fake = FakeTransport::new();
    let traced = TracedTransport::new(fake);
    traced.broadcast_work_available("T").await.unwrap();
    assert_eq!(traced.inner().calls().len(), 1);
}

#[test]
fn successful_push_is_logged_inside_its_span() {
    let traced = TracedTransport::new(FakeTransport::new());
    let (logs, result) = with_tracing(|| async {
        traced.push(&target(), Bytes::from_static(b"abc")).await
    });

    assert!(result.is_ok());
    assert!(logs.contains("stream.push"), "missing span: {logs}");
    assert!(logs.contains("bytes=3"), "missing size: {logs}");
    assert!(logs.contains("pushed"), "missing outcome: {logs}");
}

#[test]
fn failed_push_is_logged_with_its_error() {
    let fake = FakeTransport::new();
    fake.fail_next(TransportError::Rejected("full".to_string()));
    let traced = TracedTransport::new(fake);
    let (logs, result) = with_tracing(|| async { traced.push(&target(), Bytes::new()).await });

    assert_eq!(result, Err(TransportError::Rejected("full".to_string())));
    assert!(logs.contains("WARN"), "expected a warning: {logs}");
    assert!(logs.contains("receiver rejected push: full"), "{logs}");
}
