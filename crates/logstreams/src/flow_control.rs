// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission control for appends
//!
//! An append holds a permit from the moment it is admitted until storage
//! commits it. The limiter bounds how many permits are out at once and adapts
//! that bound with additive increase, multiplicative decrease: every fast
//! commit of a saturated window grows it by one, every slow or failed append
//! shrinks it by the backoff ratio.

use keel_core::{Clock, KeelConfig};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Bounds the number of in-flight appends
pub trait Limiter: Send + Sync {
    /// Take a permit without blocking; `false` if the window is full
    fn try_acquire(&self) -> bool;

    /// The permit's append committed after `latency`
    fn on_success(&self, latency: Duration);

    /// The permit's append failed
    fn on_dropped(&self);

    /// The permit was returned without being used
    fn on_ignore(&self);

    fn limit(&self) -> usize;

    fn in_flight(&self) -> usize;
}

#[derive(Debug)]
struct AimdState {
    limit: usize,
    in_flight: usize,
}

/// Additive-increase, multiplicative-decrease limiter
#[derive(Debug)]
pub struct AimdLimiter {
    min_limit: usize,
    max_limit: usize,
    backoff_ratio: f64,
    latency_threshold: Duration,
    state: Mutex<AimdState>,
}

impl AimdLimiter {
    pub fn new(
        initial_limit: usize,
        min_limit: usize,
        max_limit: usize,
        backoff_ratio: f64,
        latency_threshold: Duration,
    ) -> Self {
        let min_limit = min_limit.max(1);
        let max_limit = max_limit.max(min_limit);
        Self {
            min_limit,
            max_limit,
            backoff_ratio,
            latency_threshold,
            state: Mutex::new(AimdState {
                limit: initial_limit.clamp(min_limit, max_limit),
                in_flight: 0,
            }),
        }
    }

    pub fn from_config(config: &KeelConfig) -> Self {
        Self::new(
            config.limiter_window_initial,
            config.limiter_window_min,
            config.limiter_window_max,
            config.limiter_backoff_ratio,
            config.limiter_latency_threshold,
        )
    }

    /// A limiter with a fixed window, for tests that need exact admission
    pub fn fixed(limit: usize) -> Self {
        Self::new(limit, limit, limit, 0.9, Duration::MAX)
    }

    fn back_off(&self, state: &mut AimdState) {
        let reduced = (state.limit as f64 * self.backoff_ratio) as usize;
        state.limit = reduced.max(self.min_limit);
    }
}

impl Limiter for AimdLimiter {
    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.in_flight >= state.limit {
            return false;
        }
        state.in_flight += 1;
        true
    }

    fn on_success(&self, latency: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let in_flight = state.in_flight;
        state.in_flight = in_flight.saturating_sub(1);
        if latency > self.latency_threshold {
            self.back_off(&mut state);
        } else if in_flight * 2 >= state.limit {
            // Only grow when the window is actually used
            state.limit = (state.limit + 1).min(self.max_limit);
        }
    }

    fn on_dropped(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_flight = state.in_flight.saturating_sub(1);
        self.back_off(&mut state);
    }

    fn on_ignore(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    fn limit(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).limit
    }

    fn in_flight(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).in_flight
    }
}

/// Hands out [`InFlightAppend`] permits from a [`Limiter`]
#[derive(Clone)]
pub struct FlowControl {
    limiter: Arc<dyn Limiter>,
    clock: Arc<dyn Clock>,
}

impl FlowControl {
    pub fn new(limiter: Arc<dyn Limiter>, clock: Arc<dyn Clock>) -> Self {
        Self { limiter, clock }
    }

    pub fn try_acquire(&self) -> Option<InFlightAppend> {
        if !self.limiter.try_acquire() {
            return None;
        }
        Some(InFlightAppend {
            limiter: Arc::clone(&self.limiter),
            clock: Arc::clone(&self.clock),
            started: self.clock.now(),
            settled: false,
        })
    }

    pub fn limit(&self) -> usize {
        self.limiter.limit()
    }

    pub fn in_flight(&self) -> usize {
        self.limiter.in_flight()
    }
}

/// One admitted append
///
/// Settled exactly once: by commit, by failure, or by being dropped unused.
pub struct InFlightAppend {
    limiter: Arc<dyn Limiter>,
    clock: Arc<dyn Clock>,
    started: Instant,
    settled: bool,
}

impl InFlightAppend {
    /// Restart the latency measurement at the moment the append is issued
    pub fn start(&mut self) {
        self.started = self.clock.now();
    }

    pub fn on_commit(mut self) {
        let latency = self.clock.now().saturating_duration_since(self.started);
        self.settled = true;
        self.limiter.on_success(latency);
    }

    pub fn on_error(mut self) {
        self.settled = true;
        self.limiter.on_dropped();
    }
}

impl Drop for InFlightAppend {
    fn drop(&mut self) {
        if !self.settled {
            self.limiter.on_ignore();
        }
    }
}

impl std::fmt::Debug for InFlightAppend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightAppend")
            .field("started", &self.started)
            .field("settled", &self.settled)
            .finish()
    }
}

#[cfg(test)]
#[path = "flow_control_tests.rs"]
mod tests;
