// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Picking a remote stream and pushing to it
//!
//! Pushes are fire-and-forget for the caller. The outcome is only observable
//! through the [`ErrorHandler`] passed with the payload, which is called at
//! most once and only on failure. Failed pushes are never retried here.

use crate::metrics::JobStreamMetrics;
use crate::registry::{RemoteStreamId, StreamRegistry};
use crate::transport::{StreamTransport, TransportError};
use bytes::{Bytes, BytesMut};
use keel_core::{codec, ActivatedJob, CodecError, KeelConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default time a receiver has to acknowledge a push
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that can be pushed to a remote stream
pub trait StreamPayload: Send + Sync + 'static {
    fn encode(&self) -> Result<Bytes, CodecError>;
}

impl StreamPayload for ActivatedJob {
    fn encode(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::new();
        codec::encode_activated_job(&mut buf, self)?;
        Ok(buf.freeze())
    }
}

/// Why a push did not reach its receiver
#[derive(Debug, Error)]
pub enum PushError {
    #[error("failed to encode payload: {0}")]
    Encoding(#[from] CodecError),
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("push not acknowledged within {0:?}")]
    Timeout(Duration),
    #[error("no async runtime available to push on")]
    NoRuntime,
}

/// Receives payloads whose push failed
pub trait ErrorHandler<M>: Send + Sync {
    fn handle_error(&self, error: PushError, payload: M);
}

/// Hands out streams registered in a [`StreamRegistry`]
pub struct RemoteStreamer<P, T> {
    registry: Arc<StreamRegistry<P>>,
    transport: T,
    push_timeout: Duration,
    metrics: Arc<JobStreamMetrics>,
    next: AtomicUsize,
}

impl<P, T> RemoteStreamer<P, T>
where
    P: Clone + PartialEq + Send + Sync + 'static,
    T: StreamTransport,
{
    pub fn new(registry: Arc<StreamRegistry<P>>, transport: T) -> Self {
        Self {
            registry,
            transport,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            metrics: Arc::new(JobStreamMetrics::new()),
            next: AtomicUsize::new(0),
        }
    }

    /// A streamer whose pushes time out after `config.push_timeout`
    pub fn from_config(
        registry: Arc<StreamRegistry<P>>,
        transport: T,
        config: &KeelConfig,
    ) -> Self {
        Self::new(registry, transport).push_timeout(config.push_timeout)
    }

    pub fn push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    pub fn metrics(mut self, metrics: Arc<JobStreamMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn registry(&self) -> &Arc<StreamRegistry<P>> {
        &self.registry
    }

    pub fn job_stream_metrics(&self) -> &Arc<JobStreamMetrics> {
        &self.metrics
    }

    /// Best-effort broadcast that jobs of `job_type` can be activated
    pub fn notify_work_available(&self, job_type: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(job_type, "no runtime; skipping work-available broadcast");
            return;
        };
        let transport = self.transport.clone();
        let job_type = job_type.to_string();
        runtime.spawn(async move {
            if let Err(e) = transport.broadcast_work_available(&job_type).await {
                tracing::debug!(%job_type, error = %e, "work-available broadcast failed");
            }
        });
    }

    /// A stream for `job_type`, rotating over all registered consumers
    pub fn stream_for(&self, job_type: &str) -> Option<RemoteStream<P, T>> {
        let aggregates = self.registry.streams_for(job_type);
        let total: usize = aggregates.iter().map(|a| a.consumers.len()).sum();
        if total == 0 {
            return None;
        }
        let pick = self.next.fetch_add(1, Ordering::Relaxed) % total;
        let (properties, target) = aggregates
            .iter()
            .flat_map(|a| a.consumers.iter().map(move |c| (&a.properties, c)))
            .nth(pick)?;
        tracing::trace!(job_type, %target, "picked stream");
        Some(RemoteStream {
            target: target.clone(),
            properties: properties.clone(),
            transport: self.transport.clone(),
            push_timeout: self.push_timeout,
            metrics: Arc::clone(&self.metrics),
        })
    }
}

/// One consumer, picked for a single push
pub struct RemoteStream<P, T> {
    target: RemoteStreamId,
    properties: P,
    transport: T,
    push_timeout: Duration,
    metrics: Arc<JobStreamMetrics>,
}

impl<P, T: StreamTransport> RemoteStream<P, T> {
    pub fn id(&self) -> &RemoteStreamId {
        &self.target
    }

    pub fn properties(&self) -> &P {
        &self.properties
    }

    /// Push `payload` in the background.
    ///
    /// Returns immediately. On failure `error_handler` gets the payload back.
    pub fn push<M: StreamPayload>(&self, payload: M, error_handler: Arc<dyn ErrorHandler<M>>) {
        let bytes = match payload.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.metrics.push_failed();
                error_handler.handle_error(PushError::Encoding(e), payload);
                return;
            }
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.metrics.push_failed();
            error_handler.handle_error(PushError::NoRuntime, payload);
            return;
        };

        let transport = self.transport.clone();
        let target = self.target.clone();
        let timeout = self.push_timeout;
        let metrics = Arc::clone(&self.metrics);
        runtime.spawn(async move {
            let outcome = match tokio::time::timeout(timeout, transport.push(&target, bytes)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(PushError::Transport(e)),
                Err(_) => Err(PushError::Timeout(timeout)),
            };
            match outcome {
                Ok(()) => {
                    metrics.push_succeeded();
                    tracing::trace!(%target, "push acknowledged");
                }
                Err(error) => {
                    metrics.push_failed();
                    tracing::warn!(%target, error = %error, "push failed");
                    error_handler.handle_error(error, payload);
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "streamer_tests.rs"]
mod tests;
