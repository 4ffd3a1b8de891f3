// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! keel-jobstream: pushing activated jobs to remote workers
//!
//! Workers open streams for a job type. The engine asks for a stream when it
//! activates a job and pushes the job once the activation is written. A push
//! that fails is compensated by yielding the job on its partition.

mod api;
mod error_handler;
mod job_streamer;
mod metrics;
mod registry;
mod streamer;
pub mod transport;

pub use api::{RemoteStreamApiHandler, StreamRequest};
pub use error_handler::{
    PartitionListener, RemoteJobStreamErrorHandlerService, YieldingJobStreamErrorHandler,
};
pub use job_streamer::RemoteJobStreamer;
pub use metrics::{JobStreamMetrics, MetricsSnapshot};
pub use registry::{AggregatedStream, MemberId, RemoteStreamId, StreamRegistry};
pub use streamer::{ErrorHandler, PushError, RemoteStream, RemoteStreamer, StreamPayload};
pub use transport::{StreamTransport, TracedTransport, TransportError};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use transport::{FakeTransport, TransportCall};
