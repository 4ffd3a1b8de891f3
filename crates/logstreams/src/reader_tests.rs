// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::storage::{LogStorage, MemoryLogStorage};
use crate::{LogStream, LogStreamWriter};
use bytes::Bytes;
use keel_core::{JobIntent, JobRecord, LogAppendEntry, RecordBody};
use std::sync::Arc;

fn entry(job_type: &str) -> LogAppendEntry {
    LogAppendEntry::new(1, RecordBody::command(JobIntent::Create, JobRecord::new(job_type)))
}

/// Positions 1..=2 in one batch, 3 alone, 4..=6 in one batch
fn populated() -> (LogStream, Arc<dyn LogStreamWriter>) {
    let stream = LogStream::builder(1).build().unwrap();
    let writer = stream.new_writer().unwrap();
    writer.try_write(&[entry("a"), entry("b")], NULL_POSITION).unwrap();
    writer.try_write(&[entry("c")], NULL_POSITION).unwrap();
    writer.try_write(&[entry("d"), entry("e"), entry("f")], NULL_POSITION).unwrap();
    (stream, writer)
}

fn positions(reader: &mut LogStreamReader) -> Vec<i64> {
    reader.map(|r| r.unwrap().position).collect()
}

#[test]
fn reads_all_records_in_order() {
    let (stream, _writer) = populated();
    let mut reader = stream.new_reader().unwrap();
    assert_eq!(positions(&mut reader), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(reader.last_position(), 6);
    assert!(!reader.has_next());
}

#[test]
fn seek_inside_a_batch() {
    let (stream, _writer) = populated();
    let mut reader = stream.new_reader().unwrap();
    assert!(reader.seek(5));
    assert_eq!(positions(&mut reader), vec![5, 6]);
}

#[test]
fn seek_past_end_finds_nothing() {
    let (stream, _writer) = populated();
    let mut reader = stream.new_reader().unwrap();
    assert!(!reader.seek(99));
    assert!(!reader.has_next());
}

#[test]
fn seek_to_next_event_skips_the_given_position() {
    let (stream, _writer) = populated();
    let mut reader = stream.new_reader().unwrap();
    assert!(reader.seek_to_next_event(2));
    assert_eq!(positions(&mut reader), vec![3, 4, 5, 6]);

    assert!(reader.seek_to_next_event(-1));
    assert_eq!(positions(&mut reader).len(), 6);
}

#[test]
fn seek_to_end_then_read_new_records() {
    let (stream, writer) = populated();
    let mut reader = stream.new_reader().unwrap();
    reader.seek_to_end();
    assert!(!reader.has_next());

    writer.try_write(&[entry("g")], NULL_POSITION).unwrap();
    assert_eq!(positions(&mut reader), vec![7]);
}

#[test]
fn reader_is_restartable() {
    let (stream, _writer) = populated();
    let mut reader = stream.new_reader().unwrap();
    assert_eq!(positions(&mut reader).len(), 6);
    reader.seek_to_first_event();
    assert_eq!(positions(&mut reader).len(), 6);
}

#[test]
fn readers_do_not_affect_each_other() {
    let (stream, _writer) = populated();
    let mut first = stream.new_reader().unwrap();
    let mut second = stream.new_reader().unwrap();
    first.seek(4);
    assert_eq!(positions(&mut second), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(positions(&mut first), vec![4, 5, 6]);
}

#[test]
fn undecodable_block_is_reported() {
    let storage = Arc::new(MemoryLogStorage::new());
    storage.append(1, 1, Bytes::from_static(&[5, 0, 0, 0, 1]), Box::new(NoopListener));
    let stream = LogStream::builder(1).storage(storage).build().unwrap();
    let mut reader = stream.new_reader().unwrap();

    assert!(reader.has_next());
    assert!(matches!(
        reader.next_record(),
        Some(Err(ReadError::Codec { lowest: 1, .. }))
    ));
}

struct NoopListener;

impl crate::storage::AppendListener for NoopListener {}
