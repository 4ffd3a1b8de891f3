// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of open remote streams
//!
//! Streams of one job type with equal properties are aggregated: any of
//! their consumers may take a job. Picking one is left to the streamer.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use uuid::Uuid;

/// Cluster member that receives pushes, typically a gateway
pub type MemberId = String;

/// A stream is identified by the receiver that opened it plus its own id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteStreamId {
    pub receiver: MemberId,
    pub stream_id: Uuid,
}

impl RemoteStreamId {
    pub fn new(receiver: impl Into<MemberId>, stream_id: Uuid) -> Self {
        Self {
            receiver: receiver.into(),
            stream_id,
        }
    }
}

impl fmt::Display for RemoteStreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.receiver, self.stream_id)
    }
}

/// Consumers sharing a job type and properties
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedStream<P> {
    pub job_type: String,
    pub properties: P,
    pub consumers: Vec<RemoteStreamId>,
}

struct Registered {
    job_type: String,
    aggregate: usize,
}

struct Streams<P> {
    by_type: HashMap<String, Vec<AggregatedStream<P>>>,
    by_id: HashMap<RemoteStreamId, Registered>,
}

impl<P> Default for Streams<P> {
    fn default() -> Self {
        Self {
            by_type: HashMap::new(),
            by_id: HashMap::new(),
        }
    }
}

impl<P> Streams<P> {
    fn unlink(&mut self, id: &RemoteStreamId) -> bool {
        let Some(registered) = self.by_id.remove(id) else {
            return false;
        };
        let Some(aggregates) = self.by_type.get_mut(&registered.job_type) else {
            return true;
        };
        if let Some(aggregate) = aggregates.get_mut(registered.aggregate) {
            aggregate.consumers.retain(|consumer| consumer != id);
        }
        if aggregates
            .get(registered.aggregate)
            .is_some_and(|aggregate| aggregate.consumers.is_empty())
        {
            aggregates.remove(registered.aggregate);
            // Later aggregates shifted down by one
            for other in self.by_id.values_mut() {
                if other.job_type == registered.job_type && other.aggregate > registered.aggregate {
                    other.aggregate -= 1;
                }
            }
        }
        if aggregates.is_empty() {
            self.by_type.remove(&registered.job_type);
        }
        true
    }
}

/// Concurrent registry; reads are frequent, writes rare
pub struct StreamRegistry<P> {
    streams: RwLock<Streams<P>>,
}

impl<P> Default for StreamRegistry<P> {
    fn default() -> Self {
        Self {
            streams: RwLock::new(Streams::default()),
        }
    }
}

impl<P: Clone + PartialEq> StreamRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream. Adding a stream id twice keeps the first
    /// registration and returns `false`.
    pub fn add(&self, job_type: &str, stream_id: Uuid, receiver: &str, properties: P) -> bool {
        let id = RemoteStreamId::new(receiver, stream_id);
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
        if streams.by_id.contains_key(&id) {
            return false;
        }
        let aggregates = streams.by_type.entry(job_type.to_string()).or_default();
        let index = match aggregates.iter().position(|a| a.properties == properties) {
            Some(index) => {
                aggregates[index].consumers.push(id.clone());
                index
            }
            None => {
                aggregates.push(AggregatedStream {
                    job_type: job_type.to_string(),
                    properties,
                    consumers: vec![id.clone()],
                });
                aggregates.len() - 1
            }
        };
        streams.by_id.insert(
            id,
            Registered {
                job_type: job_type.to_string(),
                aggregate: index,
            },
        );
        true
    }

    /// Remove one stream; unknown streams are ignored
    pub fn remove(&self, stream_id: Uuid, receiver: &str) -> bool {
        let id = RemoteStreamId::new(receiver, stream_id);
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
        streams.unlink(&id)
    }

    /// Remove every stream of `receiver` and return how many there were
    pub fn remove_all(&self, receiver: &str) -> usize {
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
        let ids: Vec<RemoteStreamId> = streams
            .by_id
            .keys()
            .filter(|id| id.receiver == receiver)
            .cloned()
            .collect();
        for id in &ids {
            streams.unlink(id);
        }
        ids.len()
    }

    /// Aggregated streams for `job_type`, in registration order
    pub fn streams_for(&self, job_type: &str) -> Vec<AggregatedStream<P>> {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        streams.by_type.get(job_type).cloned().unwrap_or_default()
    }

    pub fn contains(&self, stream_id: Uuid, receiver: &str) -> bool {
        let id = RemoteStreamId::new(receiver, stream_id);
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        streams.by_id.contains_key(&id)
    }

    /// Number of registered streams
    pub fn len(&self) -> usize {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        streams.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
