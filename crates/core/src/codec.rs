// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary codec for records and activated jobs
//!
//! Every message starts with an 8-byte little-endian header:
//!
//! ```text
//! +--------------+-------------+-----------+---------+
//! | block_length | template_id | schema_id | version |
//! |     u16      |     u16     |    u16    |   u16   |
//! +--------------+-------------+-----------+---------+
//! ```
//!
//! followed by a fixed-size block of `block_length` bytes and then the
//! variable-length fields. Strings and byte buffers are `u32` length-prefixed,
//! collections are `u32` count-prefixed. Decoders skip fixed-block bytes they do
//! not know, so a newer writer may append fixed fields.
//!
//! Null sentinels: `-1` for absent keys and positions, an empty buffer for
//! absent strings, `255` for an absent rejection type.

use crate::record::{
    ActivatedJob, Intent, InvalidRecord, JobBatchRecord, JobRecord, LogAppendEntry, Record,
    RecordBody, RecordMetadata, RecordType, RecordValue, RejectionType, ValueType,
};
use bytes::{Buf, BufMut, BytesMut};
use serde_json::{Map, Value};
use thiserror::Error;

pub const HEADER_LENGTH: usize = 8;
pub const SCHEMA_ID: u16 = 0x4b45;
pub const SCHEMA_VERSION: u16 = 1;

pub const RECORD_TEMPLATE_ID: u16 = 1;
pub const ACTIVATED_JOB_TEMPLATE_ID: u16 = 2;

/// position, source, key, timestamp, request id, operation reference (i64),
/// request stream id (i32), protocol version (u16), and four u8 codes
const RECORD_BLOCK_LENGTH: u16 = 6 * 8 + 4 + 2 + 4;
/// retries (i32), deadline and process instance key (i64)
const JOB_BLOCK_LENGTH: u16 = 4 + 8 + 8;
/// timeout (i64), max jobs (i32), truncated (u8)
const JOB_BATCH_BLOCK_LENGTH: u16 = 8 + 4 + 1;
const ACTIVATED_JOB_BLOCK_LENGTH: u16 = 8;

/// Errors that can occur while encoding or decoding
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("buffer truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("unknown template id {0}")]
    UnknownTemplate(u16),
    #[error("unsupported schema {schema_id} version {version}")]
    UnsupportedSchema { schema_id: u16, version: u16 },
    #[error("fixed block too short: expected at least {expected}, got {actual}")]
    BlockTooShort { expected: u16, actual: u16 },
    #[error("unknown record type {0}")]
    UnknownRecordType(u8),
    #[error("unknown value type {0}")]
    UnknownValueType(u8),
    #[error("unknown intent {code} for value type {value_type:?}")]
    UnknownIntent { value_type: ValueType, code: u8 },
    #[error("unknown rejection type {0}")]
    UnknownRejectionType(u8),
    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("invalid variables document: {0}")]
    Variables(#[from] serde_json::Error),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(#[from] InvalidRecord),
    #[error("field of {0} bytes exceeds the length prefix")]
    FieldTooLarge(usize),
}

/// Encode an entry as the record it becomes once positioned
pub fn encode_entry(
    buf: &mut BytesMut,
    position: i64,
    source_record_position: i64,
    timestamp: i64,
    entry: &LogAppendEntry,
) -> Result<(), CodecError> {
    let fixed = RecordFixed {
        position,
        source_record_position,
        key: entry.key,
        timestamp,
        metadata: entry.metadata,
    };
    encode_record_parts(buf, &fixed, &entry.body)
}

pub fn encode_record(buf: &mut BytesMut, record: &Record) -> Result<(), CodecError> {
    let fixed = RecordFixed {
        position: record.position,
        source_record_position: record.source_record_position,
        key: record.key,
        timestamp: record.timestamp,
        metadata: record.metadata,
    };
    encode_record_parts(buf, &fixed, &record.body)
}

/// Size of the entry once encoded, used to check batch limits before writing
pub fn encoded_len(entry: &LogAppendEntry) -> Result<usize, CodecError> {
    let mut scratch = BytesMut::new();
    encode_entry(&mut scratch, 0, 0, 0, entry)?;
    Ok(scratch.len())
}

pub fn decode_record(bytes: &[u8]) -> Result<Record, CodecError> {
    let mut reader = Reader::new(bytes);
    let block_length = reader.header(RECORD_TEMPLATE_ID)?;
    if block_length < RECORD_BLOCK_LENGTH {
        return Err(CodecError::BlockTooShort {
            expected: RECORD_BLOCK_LENGTH,
            actual: block_length,
        });
    }

    let position = reader.i64()?;
    let source_record_position = reader.i64()?;
    let key = reader.i64()?;
    let timestamp = reader.i64()?;
    let request_id = reader.i64()?;
    let operation_reference = reader.i64()?;
    let request_stream_id = reader.i32()?;
    let protocol_version = reader.u16()?;
    let record_type_code = reader.u8()?;
    let value_type_code = reader.u8()?;
    let intent_code = reader.u8()?;
    let rejection_type_code = reader.u8()?;
    reader.skip(usize::from(block_length - RECORD_BLOCK_LENGTH))?;

    let reason = reader.string()?;
    let value_bytes = reader.bytes()?;

    let record_type = RecordType::from_code(record_type_code)
        .ok_or(CodecError::UnknownRecordType(record_type_code))?;
    let value_type = ValueType::from_code(value_type_code)
        .ok_or(CodecError::UnknownValueType(value_type_code))?;
    let intent = Intent::from_code(value_type, intent_code).ok_or(CodecError::UnknownIntent {
        value_type,
        code: intent_code,
    })?;
    let rejection_type = RejectionType::from_code(rejection_type_code)
        .ok_or(CodecError::UnknownRejectionType(rejection_type_code))?;

    let mut value_reader = Reader::new(value_bytes);
    let value = match value_type {
        ValueType::Job => RecordValue::Job(decode_job(&mut value_reader)?),
        ValueType::JobBatch => RecordValue::JobBatch(decode_job_batch(&mut value_reader)?),
    };

    let body = match record_type {
        RecordType::Command => RecordBody::Command { intent, value },
        RecordType::Event => RecordBody::Event { intent, value },
        RecordType::CommandRejection => RecordBody::Rejection {
            intent,
            value,
            rejection_type,
            reason,
        },
    };
    body.validate()?;

    Ok(Record {
        position,
        source_record_position,
        key,
        timestamp,
        metadata: RecordMetadata {
            request_id,
            request_stream_id,
            operation_reference,
            protocol_version,
        },
        body,
    })
}

pub fn encode_activated_job(buf: &mut BytesMut, job: &ActivatedJob) -> Result<(), CodecError> {
    put_header(buf, ACTIVATED_JOB_BLOCK_LENGTH, ACTIVATED_JOB_TEMPLATE_ID);
    buf.put_i64_le(job.key);
    let mut record = BytesMut::new();
    encode_job(&mut record, &job.record)?;
    put_bytes(buf, &record)
}

pub fn decode_activated_job(bytes: &[u8]) -> Result<ActivatedJob, CodecError> {
    let mut reader = Reader::new(bytes);
    let block_length = reader.header(ACTIVATED_JOB_TEMPLATE_ID)?;
    if block_length < ACTIVATED_JOB_BLOCK_LENGTH {
        return Err(CodecError::BlockTooShort {
            expected: ACTIVATED_JOB_BLOCK_LENGTH,
            actual: block_length,
        });
    }
    let key = reader.i64()?;
    reader.skip(usize::from(block_length - ACTIVATED_JOB_BLOCK_LENGTH))?;
    let mut record = Reader::new(reader.bytes()?);
    Ok(ActivatedJob {
        key,
        record: decode_job(&mut record)?,
    })
}

struct RecordFixed {
    position: i64,
    source_record_position: i64,
    key: i64,
    timestamp: i64,
    metadata: RecordMetadata,
}

fn encode_record_parts(
    buf: &mut BytesMut,
    fixed: &RecordFixed,
    body: &RecordBody,
) -> Result<(), CodecError> {
    body.validate()?;
    let mut value = BytesMut::new();
    match body.value() {
        RecordValue::Job(job) => encode_job(&mut value, job)?,
        RecordValue::JobBatch(batch) => encode_job_batch(&mut value, batch)?,
    }

    put_header(buf, RECORD_BLOCK_LENGTH, RECORD_TEMPLATE_ID);
    buf.put_i64_le(fixed.position);
    buf.put_i64_le(fixed.source_record_position);
    buf.put_i64_le(fixed.key);
    buf.put_i64_le(fixed.timestamp);
    buf.put_i64_le(fixed.metadata.request_id);
    buf.put_i64_le(fixed.metadata.operation_reference);
    buf.put_i32_le(fixed.metadata.request_stream_id);
    buf.put_u16_le(fixed.metadata.protocol_version);
    buf.put_u8(body.record_type().code());
    buf.put_u8(body.value_type().code());
    buf.put_u8(body.intent().code());
    buf.put_u8(body.rejection_type().code());
    put_string(buf, body.rejection_reason())?;
    put_bytes(buf, &value)
}

fn encode_job(buf: &mut BytesMut, job: &JobRecord) -> Result<(), CodecError> {
    buf.put_u16_le(JOB_BLOCK_LENGTH);
    buf.put_i32_le(job.retries);
    buf.put_i64_le(job.deadline);
    buf.put_i64_le(job.process_instance_key);
    put_string(buf, &job.job_type)?;
    put_string(buf, &job.worker)?;
    put_string(buf, &job.error_message)?;
    put_string(buf, &job.element_id)?;
    if job.variables.is_empty() {
        put_bytes(buf, &[])
    } else {
        put_bytes(buf, &serde_json::to_vec(&job.variables)?)
    }
}

fn decode_job(reader: &mut Reader<'_>) -> Result<JobRecord, CodecError> {
    let block_length = reader.block_length(JOB_BLOCK_LENGTH)?;
    let retries = reader.i32()?;
    let deadline = reader.i64()?;
    let process_instance_key = reader.i64()?;
    reader.skip(usize::from(block_length - JOB_BLOCK_LENGTH))?;
    let job_type = reader.string()?;
    let worker = reader.string()?;
    let error_message = reader.string()?;
    let element_id = reader.string()?;
    let variables_bytes = reader.bytes()?;
    let variables = if variables_bytes.is_empty() {
        Map::new()
    } else {
        serde_json::from_slice::<Map<String, Value>>(variables_bytes)?
    };
    Ok(JobRecord {
        job_type,
        worker,
        retries,
        deadline,
        error_message,
        variables,
        process_instance_key,
        element_id,
    })
}

fn encode_job_batch(buf: &mut BytesMut, batch: &JobBatchRecord) -> Result<(), CodecError> {
    buf.put_u16_le(JOB_BATCH_BLOCK_LENGTH);
    buf.put_i64_le(batch.timeout);
    buf.put_i32_le(batch.max_jobs_to_activate);
    buf.put_u8(u8::from(batch.truncated));
    put_string(buf, &batch.job_type)?;
    put_string(buf, &batch.worker)?;

    put_len(buf, batch.job_keys.len())?;
    for key in &batch.job_keys {
        buf.put_i64_le(*key);
    }

    put_len(buf, batch.jobs.len())?;
    let mut job_bytes = BytesMut::new();
    for job in &batch.jobs {
        job_bytes.clear();
        encode_job(&mut job_bytes, job)?;
        put_bytes(buf, &job_bytes)?;
    }
    Ok(())
}

fn decode_job_batch(reader: &mut Reader<'_>) -> Result<JobBatchRecord, CodecError> {
    let block_length = reader.block_length(JOB_BATCH_BLOCK_LENGTH)?;
    let timeout = reader.i64()?;
    let max_jobs_to_activate = reader.i32()?;
    let truncated = reader.u8()? != 0;
    reader.skip(usize::from(block_length - JOB_BATCH_BLOCK_LENGTH))?;
    let job_type = reader.string()?;
    let worker = reader.string()?;

    let key_count = reader.count(8)?;
    let mut job_keys = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        job_keys.push(reader.i64()?);
    }

    let job_count = reader.count(4)?;
    let mut jobs = Vec::with_capacity(job_count);
    for _ in 0..job_count {
        let mut job = Reader::new(reader.bytes()?);
        jobs.push(decode_job(&mut job)?);
    }

    Ok(JobBatchRecord {
        job_type,
        worker,
        timeout,
        max_jobs_to_activate,
        job_keys,
        jobs,
        truncated,
    })
}

fn put_header(buf: &mut BytesMut, block_length: u16, template_id: u16) {
    buf.put_u16_le(block_length);
    buf.put_u16_le(template_id);
    buf.put_u16_le(SCHEMA_ID);
    buf.put_u16_le(SCHEMA_VERSION);
}

fn put_len(buf: &mut BytesMut, len: usize) -> Result<(), CodecError> {
    let len = u32::try_from(len).map_err(|_| CodecError::FieldTooLarge(len))?;
    buf.put_u32_le(len);
    Ok(())
}

fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) -> Result<(), CodecError> {
    put_len(buf, bytes.len())?;
    buf.put_slice(bytes);
    Ok(())
}

fn put_string(buf: &mut BytesMut, value: &str) -> Result<(), CodecError> {
    put_bytes(buf, value.as_bytes())
}

/// Bounds-checked cursor; `bytes::Buf` getters panic on short input.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, needed: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < needed {
            return Err(CodecError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Read and check a message header; returns the block length
    fn header(&mut self, expected_template: u16) -> Result<u16, CodecError> {
        self.need(HEADER_LENGTH)?;
        let block_length = self.buf.get_u16_le();
        let template_id = self.buf.get_u16_le();
        let schema_id = self.buf.get_u16_le();
        let version = self.buf.get_u16_le();
        if schema_id != SCHEMA_ID || version != SCHEMA_VERSION {
            return Err(CodecError::UnsupportedSchema { schema_id, version });
        }
        if template_id != expected_template {
            return Err(CodecError::UnknownTemplate(template_id));
        }
        Ok(block_length)
    }

    fn block_length(&mut self, minimum: u16) -> Result<u16, CodecError> {
        let block_length = self.u16()?;
        if block_length < minimum {
            return Err(CodecError::BlockTooShort {
                expected: minimum,
                actual: block_length,
            });
        }
        Ok(block_length)
    }

    fn skip(&mut self, len: usize) -> Result<(), CodecError> {
        self.need(len)?;
        self.buf.advance(len);
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        self.need(8)?;
        Ok(self.buf.get_i64_le())
    }

    fn len(&mut self) -> Result<usize, CodecError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le() as usize)
    }

    /// A collection count, checked against the smallest possible element size
    /// so a corrupt count cannot trigger a huge allocation.
    fn count(&mut self, min_element_size: usize) -> Result<usize, CodecError> {
        let count = self.len()?;
        self.need(count.saturating_mul(min_element_size))?;
        Ok(count)
    }

    fn bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.len()?;
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
