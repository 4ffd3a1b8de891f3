// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote streams behind the engine's [`JobStreamer`] seam

use crate::streamer::{ErrorHandler, RemoteStream, RemoteStreamer};
use crate::transport::StreamTransport;
use keel_core::ActivatedJob;
use keel_engine::{JobActivationProperties, JobStream, JobStreamer};
use std::sync::Arc;

/// Streams jobs to remote workers; failed pushes go to `error_handler`
pub struct RemoteJobStreamer<T> {
    streamer: RemoteStreamer<JobActivationProperties, T>,
    error_handler: Arc<dyn ErrorHandler<ActivatedJob>>,
}

impl<T: StreamTransport> RemoteJobStreamer<T> {
    pub fn new(
        streamer: RemoteStreamer<JobActivationProperties, T>,
        error_handler: Arc<dyn ErrorHandler<ActivatedJob>>,
    ) -> Self {
        Self {
            streamer,
            error_handler,
        }
    }

    pub fn streamer(&self) -> &RemoteStreamer<JobActivationProperties, T> {
        &self.streamer
    }
}

impl<T: StreamTransport> JobStreamer for RemoteJobStreamer<T> {
    fn stream_for(&self, job_type: &str) -> Option<Arc<dyn JobStream>> {
        let stream = self.streamer.stream_for(job_type)?;
        Some(Arc::new(RemoteJobStream {
            stream,
            error_handler: Arc::clone(&self.error_handler),
        }))
    }

    fn notify_work_available(&self, job_type: &str) {
        self.streamer.notify_work_available(job_type);
    }
}

struct RemoteJobStream<T> {
    stream: RemoteStream<JobActivationProperties, T>,
    error_handler: Arc<dyn ErrorHandler<ActivatedJob>>,
}

impl<T: StreamTransport> JobStream for RemoteJobStream<T> {
    fn properties(&self) -> &JobActivationProperties {
        self.stream.properties()
    }

    fn push(&self, job: ActivatedJob) {
        tracing::trace!(job_key = job.key, stream = %self.stream.id(), "pushing job");
        self.stream.push(job, Arc::clone(&self.error_handler));
    }
}

#[cfg(test)]
#[path = "job_streamer_tests.rs"]
mod tests;
