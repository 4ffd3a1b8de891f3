// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced transport wrapper for consistent observability

use super::{StreamTransport, TransportError};
use crate::registry::RemoteStreamId;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::Instrument;

/// Wrapper that adds tracing to any StreamTransport
#[derive(Clone)]
pub struct TracedTransport<T> {
    inner: T,
}

impl<T> TracedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: StreamTransport> StreamTransport for TracedTransport<T> {
    async fn push(&self, target: &RemoteStreamId, payload: Bytes) -> Result<(), TransportError> {
        let span = tracing::debug_span!("stream.push", %target, bytes = payload.len());
        async {
            let start = std::time::Instant::now();
            let result = self.inner.push(target, payload).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(()) => tracing::debug!(elapsed_ms, "pushed"),
                Err(e) => tracing::warn!(elapsed_ms, error = %e, "push failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn broadcast_work_available(&self, job_type: &str) -> Result<(), TransportError> {
        let span = tracing::debug_span!("stream.broadcast", job_type);
        let result = self
            .inner
            .broadcast_work_available(job_type)
            .instrument(span)
            .await;
        if let Err(e) = &result {
            tracing::debug!(job_type, error = %e, "broadcast failed");
        }
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
