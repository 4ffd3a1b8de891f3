// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reader specs
//!
//! Readers are independent cursors over the same log.

use crate::prelude::*;

#[test]
fn readers_do_not_affect_each_other() {
    let partition = Partition::new(1);
    partition
        .writer()
        .try_write(&[job_entry("a"), job_entry("b"), job_entry("c")], NULL_POSITION)
        .unwrap();

    let mut first = partition.log.new_reader().unwrap();
    let mut second = partition.log.new_reader().unwrap();

    assert_eq!(first.next().unwrap().unwrap().position, 1);
    assert_eq!(first.next().unwrap().unwrap().position, 2);
    assert_eq!(second.next().unwrap().unwrap().position, 1);

    second.seek_to_end();
    assert!(second.next().is_none());
    assert_eq!(first.next().unwrap().unwrap().position, 3);
}

#[test]
fn reader_sees_records_written_after_it_was_opened() {
    let partition = Partition::new(1);
    let mut reader = partition.log.new_reader().unwrap();
    assert!(!reader.has_next());

    partition
        .writer()
        .try_write(&[job_entry("a")], NULL_POSITION)
        .unwrap();
    assert!(reader.has_next());
    assert_eq!(reader.next().unwrap().unwrap().position, 1);
}

#[test]
fn seek_lands_on_exact_or_next_position() {
    let partition = Partition::new(1);
    let writer = partition.writer();
    for name in ["a", "b", "c", "d"] {
        writer.try_write(&[job_entry(name)], NULL_POSITION).unwrap();
    }

    let mut reader = partition.log.new_reader().unwrap();
    assert!(reader.seek(3));
    assert_eq!(reader.next().unwrap().unwrap().position, 3);

    assert!(reader.seek_to_next_event(1));
    assert_eq!(reader.next().unwrap().unwrap().position, 2);

    reader.seek_to_first_event();
    assert_eq!(reader.next().unwrap().unwrap().position, 1);
}
