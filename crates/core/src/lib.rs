// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-core: shared vocabulary of the keel workflow engine
//!
//! This crate provides:
//! - The typed record model (commands, events, rejections)
//! - The binary record codec
//! - Partition-scoped key generation
//! - Configuration and a testable clock

pub mod clock;
pub mod codec;
pub mod config;
pub mod keys;
pub mod record;
pub mod throttle;

pub use clock::{Clock, FakeClock, SystemClock};
pub use codec::CodecError;
pub use config::{ConfigError, KeelConfig};
pub use keys::{
    check_partition_id, decode_partition_id, encode_partition_id, KeyError, KeyGenerator,
    MAX_PARTITION_ID,
};
pub use record::{
    ActivatedJob, Intent, InvalidRecord, JobBatchIntent, JobBatchRecord, JobIntent, JobRecord,
    LogAppendEntry, Record, RecordBody, RecordMetadata, RecordType, RecordValue, RejectionType,
    ValueType, NULL_KEY, NULL_POSITION,
};
pub use throttle::ThrottledLogger;

/// Identifies a partition; the upper bits of every key it generates
pub type PartitionId = u32;
