// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream management requests from receivers

use crate::metrics::JobStreamMetrics;
use crate::registry::{MemberId, StreamRegistry};
use std::sync::Arc;
use uuid::Uuid;

/// A receiver opening or closing streams
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRequest<P> {
    Add {
        job_type: String,
        stream_id: Uuid,
        receiver: MemberId,
        properties: P,
    },
    Remove {
        stream_id: Uuid,
        receiver: MemberId,
    },
    RemoveAll {
        receiver: MemberId,
    },
}

/// Applies stream requests to the registry
pub struct RemoteStreamApiHandler<P> {
    registry: Arc<StreamRegistry<P>>,
    metrics: Arc<JobStreamMetrics>,
}

impl<P: Clone + PartialEq> RemoteStreamApiHandler<P> {
    pub fn new(registry: Arc<StreamRegistry<P>>, metrics: Arc<JobStreamMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Apply `request`; returns whether the registry changed
    pub fn handle(&self, request: StreamRequest<P>) -> bool {
        let changed = match request {
            StreamRequest::Add {
                job_type,
                stream_id,
                receiver,
                properties,
            } => {
                let added = self
                    .registry
                    .add(&job_type, stream_id, &receiver, properties);
                if added {
                    tracing::info!(%job_type, %stream_id, %receiver, "added remote stream");
                } else {
                    tracing::debug!(%job_type, %stream_id, %receiver, "remote stream already registered");
                }
                added
            }
            StreamRequest::Remove {
                stream_id,
                receiver,
            } => {
                let removed = self.registry.remove(stream_id, &receiver);
                if removed {
                    tracing::info!(%stream_id, %receiver, "removed remote stream");
                }
                removed
            }
            StreamRequest::RemoveAll { receiver } => self.remove_member(&receiver) > 0,
        };
        self.metrics.set_open_streams(self.registry.len());
        changed
    }

    /// Membership reported `member` gone; drop everything it opened
    pub fn on_member_removed(&self, member: &str) {
        self.remove_member(member);
        self.metrics.set_open_streams(self.registry.len());
    }

    fn remove_member(&self, member: &str) -> usize {
        let removed = self.registry.remove_all(member);
        if removed > 0 {
            tracing::info!(receiver = member, removed, "removed all streams of receiver");
        }
        removed
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
