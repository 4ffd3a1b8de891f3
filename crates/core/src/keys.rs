// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Partition-scoped keys
//!
//! The upper bits of a key hold the partition that generated it, so any
//! component holding a key can find the partition owning the entity:
//!
//! ```text
//! key = (partition_id << 51) + counter
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub const KEY_BITS: u32 = 51;

/// Highest partition whose keys stay positive
pub const MAX_PARTITION_ID: u32 = (1 << (63 - KEY_BITS)) - 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("partition {0} exceeds the maximum partition id {max}", max = MAX_PARTITION_ID)]
    PartitionOutOfRange(u32),
}

/// Reject partitions whose keys would overflow into the sign bit
pub fn check_partition_id(partition_id: u32) -> Result<u32, KeyError> {
    if partition_id > MAX_PARTITION_ID {
        return Err(KeyError::PartitionOutOfRange(partition_id));
    }
    Ok(partition_id)
}

/// `partition_id` must not exceed [`MAX_PARTITION_ID`]
pub fn encode_partition_id(partition_id: u32, counter: i64) -> i64 {
    debug_assert!(partition_id <= MAX_PARTITION_ID);
    (i64::from(partition_id) << KEY_BITS) + counter
}

pub fn decode_partition_id(key: i64) -> u32 {
    (key >> KEY_BITS) as u32
}

/// Hands out unique keys for one partition
///
/// Clones share the counter. Replay moves it past every key seen in the log
/// with [`KeyGenerator::set_key_if_higher`].
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    partition_id: u32,
    next: Arc<AtomicI64>,
}

impl KeyGenerator {
    pub fn new(partition_id: u32) -> Result<Self, KeyError> {
        let partition_id = check_partition_id(partition_id)?;
        Ok(Self {
            partition_id,
            next: Arc::new(AtomicI64::new(encode_partition_id(partition_id, 1))),
        })
    }

    pub fn partition_id(&self) -> u32 {
        self.partition_id
    }

    pub fn next_key(&self) -> i64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// The key the next call to [`KeyGenerator::next_key`] returns
    pub fn peek(&self) -> i64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Ensure future keys are greater than `key`.
    ///
    /// Keys of other partitions are ignored.
    pub fn set_key_if_higher(&self, key: i64) {
        if key < 0 || decode_partition_id(key) != self.partition_id {
            return;
        }
        self.next.fetch_max(key + 1, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
