// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling
//!
//! Two readings are exposed: a monotonic `Instant` for measuring latencies and
//! throttling, and wall-clock epoch milliseconds for record timestamps and job
//! deadlines.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time
///
/// Object safe, so long-lived components hold it as `Arc<dyn Clock>`.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Milliseconds since the Unix epoch
    fn epoch_millis(&self) -> i64;
}

/// Real system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct FakeTime {
    instant: Instant,
    epoch_millis: i64,
}

/// Fake clock for testing with controllable time
#[derive(Clone, Debug)]
pub struct FakeClock {
    current: Arc<Mutex<FakeTime>>,
}

impl FakeClock {
    /// Starts at an arbitrary but fixed wall-clock reading
    pub const START_EPOCH_MILLIS: i64 = 1_700_000_000_000;

    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(FakeTime {
                instant: Instant::now(),
                epoch_millis: Self::START_EPOCH_MILLIS,
            })),
        }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.instant += duration;
        current.epoch_millis += duration.as_millis() as i64;
    }

    /// Set the wall-clock reading; the monotonic reading is left untouched
    pub fn set_epoch_millis(&self, epoch_millis: i64) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.epoch_millis = epoch_millis;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .instant
    }

    fn epoch_millis(&self) -> i64 {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .epoch_millis
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn epoch_millis(&self) -> i64 {
        (**self).epoch_millis()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
