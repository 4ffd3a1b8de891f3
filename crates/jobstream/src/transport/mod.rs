// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivery of pushes and work-available hints to remote members

mod traced;

pub use traced::TracedTransport;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeTransport, TransportCall};

use crate::registry::RemoteStreamId;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors from transport operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("receiver unreachable: {0}")]
    Unreachable(String),
    #[error("receiver rejected push: {0}")]
    Rejected(String),
    #[error("stream closed: {0}")]
    StreamClosed(RemoteStreamId),
}

/// Sends payloads to the members that opened streams
#[async_trait]
pub trait StreamTransport: Clone + Send + Sync + 'static {
    /// Deliver `payload` to one stream; resolves once the receiver acked it
    async fn push(&self, target: &RemoteStreamId, payload: Bytes) -> Result<(), TransportError>;

    /// Tell every member that jobs of `job_type` are available
    async fn broadcast_work_available(&self, job_type: &str) -> Result<(), TransportError>;
}
