// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push counters and the open-stream gauge

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Shared by the streamer and the API handler
#[derive(Debug, Default)]
pub struct JobStreamMetrics {
    open_streams: AtomicUsize,
    pushes_succeeded: AtomicU64,
    pushes_failed: AtomicU64,
}

/// Point-in-time copy of [`JobStreamMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub open_streams: usize,
    pub pushes_succeeded: u64,
    pub pushes_failed: u64,
}

impl JobStreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_open_streams(&self, count: usize) {
        self.open_streams.store(count, Ordering::Relaxed);
    }

    pub fn push_succeeded(&self) {
        self.pushes_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn push_failed(&self) {
        self.pushes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            open_streams: self.open_streams.load(Ordering::Relaxed),
            pushes_succeeded: self.pushes_succeeded.load(Ordering::Relaxed),
            pushes_failed: self.pushes_failed.load(Ordering::Relaxed),
        }
    }
}
