// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rate limiting for repeated log messages

use crate::clock::Clock;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct ThrottleState {
    last_logged: Option<Instant>,
    suppressed: u64,
}

/// Lets a message through at most once per interval
///
/// ```ignore
/// if let Some(suppressed) = throttle.permit() {
///     tracing::warn!(suppressed, "no writer for partition");
/// }
/// ```
#[derive(Debug)]
pub struct ThrottledLogger<C: Clock> {
    interval: Duration,
    clock: C,
    state: Mutex<ThrottleState>,
}

impl<C: Clock> ThrottledLogger<C> {
    pub fn new(interval: Duration, clock: C) -> Self {
        Self {
            interval,
            clock,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    /// Returns the number of messages suppressed since the last permitted
    /// one, or `None` if this message should be suppressed.
    pub fn permit(&self) -> Option<u64> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let due = match state.last_logged {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            state.last_logged = Some(now);
            Some(std::mem::take(&mut state.suppressed))
        } else {
            state.suppressed += 1;
            None
        }
    }
}

#[cfg(test)]
#[path = "throttle_tests.rs"]
mod tests;
