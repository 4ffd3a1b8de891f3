// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framing of a batch of records into one storage block
//!
//! A block payload is a sequence of `u32` length-prefixed encoded records, at
//! contiguous positions.

use bytes::{Buf, BufMut, BytesMut};
use keel_core::codec::{self, CodecError};
use keel_core::{LogAppendEntry, Record};

/// Bytes added per record by the framing
pub const FRAME_OVERHEAD: usize = 4;

/// Encode `entries` at positions `first_position..`
pub fn encode_batch(
    buf: &mut BytesMut,
    first_position: i64,
    source_position: i64,
    timestamp: i64,
    entries: &[LogAppendEntry],
) -> Result<(), CodecError> {
    let mut record = BytesMut::new();
    for (position, entry) in (first_position..).zip(entries) {
        record.clear();
        codec::encode_entry(&mut record, position, source_position, timestamp, entry)?;
        let len = u32::try_from(record.len()).map_err(|_| CodecError::FieldTooLarge(record.len()))?;
        buf.put_u32_le(len);
        buf.put_slice(&record);
    }
    Ok(())
}

pub fn decode_batch(mut payload: &[u8]) -> Result<Vec<Record>, CodecError> {
    let mut records = Vec::new();
    while payload.has_remaining() {
        if payload.remaining() < FRAME_OVERHEAD {
            return Err(CodecError::Truncated {
                needed: FRAME_OVERHEAD,
                remaining: payload.remaining(),
            });
        }
        let len = payload.get_u32_le() as usize;
        if payload.remaining() < len {
            return Err(CodecError::Truncated {
                needed: len,
                remaining: payload.remaining(),
            });
        }
        let (record, rest) = payload.split_at(len);
        records.push(codec::decode_record(record)?);
        payload = rest;
    }
    Ok(records)
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
