// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append specs
//!
//! Batches are atomic and positions are totally ordered per partition.

use crate::prelude::*;

#[test]
fn batch_gets_contiguous_positions_and_is_read_back_whole() {
    let partition = Partition::new(1);
    let writer = partition.writer();

    let last = writer
        .try_write(&[job_entry("a"), job_entry("b"), job_entry("c")], NULL_POSITION)
        .unwrap();
    assert_eq!(last, 3);

    let records = partition.records();
    let positions: Vec<i64> = records.iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![1, 2, 3]);
    let types: Vec<&str> = records
        .iter()
        .map(|r| r.value().as_job().unwrap().job_type.as_str())
        .collect();
    assert_eq!(types, vec!["a", "b", "c"]);
}

#[test]
fn invalid_batch_leaves_no_trace() {
    let partition = Partition::new(1);
    let writer = partition.writer();
    writer.try_write(&[job_entry("a")], NULL_POSITION).unwrap();

    let mismatched =
        LogAppendEntry::new(1, RecordBody::event(JobIntent::Complete, JobRecord::new("x")));
    let result = writer.try_write(&[job_entry("b"), mismatched], NULL_POSITION);
    assert!(matches!(result, Err(WriteFailure::InvalidArgument(_))));
    assert!(matches!(
        writer.try_write(&[], NULL_POSITION),
        Err(WriteFailure::InvalidArgument(_))
    ));

    assert_eq!(partition.records().len(), 1);
    assert_eq!(writer.try_write(&[job_entry("c")], NULL_POSITION), Ok(2));
}

#[test]
fn concurrent_writers_never_interleave_batches() {
    let partition = Partition::new(1);
    let threads: Vec<_> = (0..4)
        .map(|t| {
            let writer = partition.writer();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    let name = format!("w{t}");
                    writer
                        .try_write(&[job_entry(&name), job_entry(&name)], NULL_POSITION)
                        .unwrap();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let records = partition.records();
    assert_eq!(records.len(), 200);
    for (i, pair) in records.chunks(2).enumerate() {
        assert_eq!(pair[0].position, 2 * i as i64 + 1);
        assert_eq!(pair[1].position, pair[0].position + 1);
        assert_eq!(
            pair[0].value().as_job().unwrap().job_type,
            pair[1].value().as_job().unwrap().job_type
        );
    }
}

#[test]
fn full_window_admits_again_after_commit() {
    let storage = Arc::new(MemoryLogStorage::with_mode(CommitMode::Manual));
    let log = LogStream::builder(1)
        .storage(storage.clone() as Arc<dyn LogStorage>)
        .limiter(Arc::new(AimdLimiter::fixed(1)))
        .build()
        .unwrap();
    let barrier = Arc::new(std::sync::Barrier::new(2));

    let threads: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|name| {
            let writer = log.new_writer().unwrap();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                writer.try_write(&[job_entry(name)], NULL_POSITION)
            })
        })
        .collect();
    let mut outcomes: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
    outcomes.sort_by_key(|outcome| outcome.is_err());

    assert_eq!(outcomes, vec![Ok(1), Err(WriteFailure::Full)]);
    assert_eq!(storage.pending_count(), 1);

    storage.commit_pending();
    let writer = log.new_writer().unwrap();
    assert_eq!(writer.try_write(&[job_entry("c")], NULL_POSITION), Ok(2));
}

#[test]
fn positions_continue_after_reopen() {
    let partition = Partition::new(1);
    partition
        .writer()
        .try_write(&[job_entry("a"), job_entry("b")], NULL_POSITION)
        .unwrap();

    let reopened = partition.reopen();
    let position = reopened
        .new_writer()
        .unwrap()
        .try_write(&[job_entry("c")], NULL_POSITION)
        .unwrap();
    assert_eq!(position, 3);
}

#[test]
fn file_log_keeps_records_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partition-1.log");
    let open = || {
        let storage = Arc::new(FileLogStorage::open(&path).unwrap());
        LogStream::builder(1).storage(storage).build().unwrap()
    };

    {
        let log = open();
        let writer = log.new_writer().unwrap();
        writer
            .try_write(&[job_entry("a"), job_entry("b")], NULL_POSITION)
            .unwrap();
    }

    let log = open();
    assert_eq!(log.commit_position(), 2);
    let position = log
        .new_writer()
        .unwrap()
        .try_write(&[job_entry("c")], NULL_POSITION)
        .unwrap();
    assert_eq!(position, 3);

    let types: Vec<String> = read_all(&log)
        .iter()
        .map(|r| r.value().as_job().unwrap().job_type.clone())
        .collect();
    assert_eq!(types, vec!["a", "b", "c"]);
}
