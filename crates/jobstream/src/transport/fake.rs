// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake transport for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{StreamTransport, TransportError};
use crate::registry::RemoteStreamId;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Recorded transport call
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Push { target: RemoteStreamId, payload: Bytes },
    Broadcast { job_type: String },
}

#[derive(Default)]
struct FakeState {
    calls: Vec<TransportCall>,
    failures: VecDeque<TransportError>,
    fail_all: Option<TransportError>,
    delay: Option<Duration>,
}

/// Fake transport for testing
///
/// Records every call. Pushes fail with injected errors, first the queued
/// ones, then the permanent one if set.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// Payloads of all recorded pushes
    pub fn pushes(&self) -> Vec<(RemoteStreamId, Bytes)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Push { target, payload } => Some((target.clone(), payload.clone())),
                TransportCall::Broadcast { .. } => None,
            })
            .collect()
    }

    /// Fail the next push with `error`
    pub fn fail_next(&self, error: TransportError) {
        self.lock().failures.push_back(error);
    }

    /// Fail every push with `error` until cleared with `None`
    pub fn fail_all(&self, error: Option<TransportError>) {
        self.lock().fail_all = error;
    }

    /// Hold every push for `delay` before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn push(&self, target: &RemoteStreamId, payload: Bytes) -> Result<(), TransportError> {
        let (delay, outcome) = {
            let mut state = self.lock();
            state.calls.push(TransportCall::Push {
                target: target.clone(),
                payload,
            });
            let outcome = match state.failures.pop_front() {
                Some(error) => Err(error),
                None => match &state.fail_all {
                    Some(error) => Err(error.clone()),
                    None => Ok(()),
                },
            };
            (state.delay, outcome)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    async fn broadcast_work_available(&self, job_type: &str) -> Result<(), TransportError> {
        self.lock().calls.push(TransportCall::Broadcast {
            job_type: job_type.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
