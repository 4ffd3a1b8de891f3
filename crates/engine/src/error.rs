// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream processor errors

use crate::applier::ApplyError;
use crate::snapshot::SnapshotError;
use keel_core::KeyError;
use keel_logstreams::{LogStreamError, ReadError, WriteFailure};
use thiserror::Error;

/// Failures that stop a stream processor
///
/// Problems with a single command never end up here; they become rejections.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("log stream error: {0}")]
    LogStream(#[from] LogStreamError),
    #[error("failed to read log: {0}")]
    Read(#[from] ReadError),
    #[error("failed to write log: {0}")]
    Write(#[from] WriteFailure),
    #[error("failed to apply event at position {position}: {source}")]
    Replay { position: i64, source: ApplyError },
    #[error(transparent)]
    Partition(#[from] KeyError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("stream processor has stopped")]
    Stopped,
}
