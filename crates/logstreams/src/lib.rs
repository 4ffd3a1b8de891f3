// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-logstreams: the per-partition record log
//!
//! A [`LogStream`] assigns contiguous positions to batches of records, hands
//! them to a [`LogStorage`] and publishes the commit position. Admission is
//! bounded by [`FlowControl`]; readers are independent cursors.

mod batch;
pub mod flow_control;
mod log_stream;
mod reader;
pub mod storage;
mod writer;

pub use batch::FRAME_OVERHEAD;
pub use flow_control::{AimdLimiter, FlowControl, InFlightAppend, Limiter};
pub use log_stream::{
    FailureListener, HealthStatus, LogStream, LogStreamBuilder, LogStreamError,
    RecordsAvailableListener,
};
pub use reader::{LogStreamReader, ReadError};
pub use storage::{
    AppendListener, CommitListener, CommitMode, FileLogStorage, LogStorage, LogStorageReader,
    MemoryLogStorage, StorageError, StoredBlock,
};
pub use writer::{entry_size, LogStreamWriter, SequencedWriter, WriteFailure, WriteReservation};
