// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-engine: command processing for one partition
//!
//! This crate provides:
//! - Typed writers that stage follow-up records of a command
//! - Event application and the materialized job state
//! - Job command processing
//! - The stream processor that drives replay and processing

pub mod applier;
mod error;
pub mod processor;
pub mod snapshot;
pub mod state;
mod stream_processor;
pub mod streamer;
pub mod writers;

pub use applier::{ApplyError, EventApplier, JobEventApplier};
pub use error::ProcessingError;
pub use processor::{JobProcessor, ProcessingContext};
pub use snapshot::{ProcessorSnapshot, SnapshotError, SnapshotMeta, SnapshotStore};
pub use state::{JobEntry, JobLifecycle, JobState};
pub use stream_processor::{
    ProcessorMode, StreamProcessor, StreamProcessorBuilder, StreamProcessorHandle,
};
pub use streamer::{JobActivationProperties, JobStream, JobStreamer, NoopJobStreamer};
pub use writers::{
    AppliedStateWriter, ChannelResponseSink, CommandResponse, CommandResponseSink, FlushError,
    PostCommitTask, ProcessingResultBuilder, StateWriter, TypedCommandWriter, TypedEventWriter,
    TypedRejectionWriter, TypedResponseWriter, TypedStreamWriter, WriteError, Writers,
};
