// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration
//!
//! Loaded from TOML with camelCase keys; every field has a default so an empty
//! document is a valid configuration.
//!
//! ```toml
//! pushTimeout = "5s"
//! limiterWindowInitial = 100
//! compactionHintIntervalRecords = 1000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct KeelConfig {
    /// How long a remote stream has to acknowledge a push
    #[serde(with = "humantime_serde")]
    pub push_timeout: Duration,
    pub limiter_window_initial: usize,
    pub limiter_window_min: usize,
    pub limiter_window_max: usize,
    /// Multiplicative decrease applied to the window on overload
    pub limiter_backoff_ratio: f64,
    /// Commit latency above which an append counts as overload
    #[serde(with = "humantime_serde")]
    pub limiter_latency_threshold: Duration,
    /// Processed records between snapshots and compaction hints
    pub compaction_hint_interval_records: u64,
    pub max_batch_size_bytes: usize,
    /// Back-off before retrying a command whose write was not admitted
    #[serde(with = "humantime_serde")]
    pub processing_retry_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub job_timeout_check_interval: Duration,
    /// Minimum interval between repeated "no writer" warnings
    #[serde(with = "humantime_serde")]
    pub no_writer_log_interval: Duration,
}

impl Default for KeelConfig {
    fn default() -> Self {
        Self {
            push_timeout: Duration::from_secs(5),
            limiter_window_initial: 100,
            limiter_window_min: 1,
            limiter_window_max: 1000,
            limiter_backoff_ratio: 0.9,
            limiter_latency_threshold: Duration::from_secs(1),
            compaction_hint_interval_records: 1000,
            max_batch_size_bytes: 4 * 1024 * 1024,
            processing_retry_delay: Duration::from_millis(250),
            job_timeout_check_interval: Duration::from_secs(1),
            no_writer_log_interval: Duration::from_secs(5),
        }
    }
}

impl KeelConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: KeelConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limiter_window_min == 0 {
            return Err(invalid("limiterWindowMin must be at least 1"));
        }
        if self.limiter_window_min > self.limiter_window_max {
            return Err(invalid("limiterWindowMin must not exceed limiterWindowMax"));
        }
        if !(self.limiter_window_min..=self.limiter_window_max)
            .contains(&self.limiter_window_initial)
        {
            return Err(invalid(
                "limiterWindowInitial must lie between limiterWindowMin and limiterWindowMax",
            ));
        }
        if !(self.limiter_backoff_ratio > 0.0 && self.limiter_backoff_ratio < 1.0) {
            return Err(invalid("limiterBackoffRatio must be in (0, 1)"));
        }
        if self.push_timeout.is_zero() {
            return Err(invalid("pushTimeout must be non-zero"));
        }
        if self.compaction_hint_interval_records == 0 {
            return Err(invalid("compactionHintIntervalRecords must be non-zero"));
        }
        if self.max_batch_size_bytes == 0 {
            return Err(invalid("maxBatchSizeBytes must be non-zero"));
        }
        if self.job_timeout_check_interval.is_zero() {
            return Err(invalid("jobTimeoutCheckInterval must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
