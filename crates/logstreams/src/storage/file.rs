// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed log storage
//!
//! One append-only file of checksummed frames:
//!
//! ```text
//! +-------------+-------------+----------+----------+-----------------+
//! | payload len | crc32       | lowest   | highest  | payload         |
//! | u32         | u32         | i64      | i64      | payload len     |
//! +-------------+-------------+----------+----------+-----------------+
//! ```
//!
//! The checksum covers `lowest`, `highest` and the payload. Every append is
//! fsync'd before it is reported written and committed. On open the file is
//! scanned to rebuild the block index; the scan stops at the first truncated
//! or corrupt frame and the file is cut back to the last valid frame.

use super::{
    AppendListener, CommitListener, CommitListeners, LogStorage, LogStorageReader, StorageError,
    StoredBlock,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

const FRAME_HEADER_LENGTH: u64 = 4 + 4 + 8 + 8;

#[derive(Debug, Clone, Copy)]
struct BlockIndex {
    lowest: i64,
    highest: i64,
    offset: u64,
    payload_len: u32,
}

struct Appender {
    file: File,
    end: u64,
    next_index: u64,
}

/// Log storage in a single append-only file
pub struct FileLogStorage {
    path: PathBuf,
    appender: Mutex<Appender>,
    index: Arc<RwLock<Vec<BlockIndex>>>,
    commit_listeners: CommitListeners,
    compaction_bound: AtomicI64,
}

impl FileLogStorage {
    /// Open or create the log file at `path`
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let (index, valid_len) = scan(&mut file, file_len)?;
        if valid_len < file_len {
            tracing::warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "discarding truncated or corrupt tail of log file"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(valid_len))?;

        tracing::debug!(path = %path.display(), blocks = index.len(), "opened log file");
        Ok(Self {
            path: path.to_path_buf(),
            appender: Mutex::new(Appender {
                file,
                end: valid_len,
                next_index: index.len() as u64,
            }),
            index: Arc::new(RwLock::new(index)),
            commit_listeners: CommitListeners::default(),
            compaction_bound: AtomicI64::new(i64::MIN),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_count(&self) -> usize {
        self.index.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Highest position stored, if any
    pub fn last_position(&self) -> Option<i64> {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .map(|block| block.highest)
    }

    pub fn compaction_bound(&self) -> i64 {
        self.compaction_bound.load(Ordering::SeqCst)
    }

    fn write_frame(
        appender: &mut Appender,
        lowest: i64,
        highest: i64,
        payload: &[u8],
    ) -> Result<BlockIndex, StorageError> {
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| StorageError::Unavailable("payload exceeds frame limit".to_string()))?;
        let mut frame = BytesMut::with_capacity(FRAME_HEADER_LENGTH as usize + payload.len());
        frame.put_u32_le(payload_len);
        frame.put_u32_le(checksum(lowest, highest, payload));
        frame.put_i64_le(lowest);
        frame.put_i64_le(highest);
        frame.put_slice(payload);

        let offset = appender.end;
        let written = appender
            .file
            .write_all(&frame)
            .and_then(|()| appender.file.sync_data());
        if let Err(e) = written {
            // Cut off whatever part of the frame made it to disk
            if let Err(cut) = truncate_to(&mut appender.file, offset) {
                tracing::error!(
                    offset,
                    error = %cut,
                    "failed to remove partial frame; it is discarded on next open"
                );
            }
            return Err(e.into());
        }
        appender.end += frame.len() as u64;
        Ok(BlockIndex {
            lowest,
            highest,
            offset,
            payload_len,
        })
    }
}

/// Cut `file` back to `offset` and continue writing there
fn truncate_to(file: &mut File, offset: u64) -> std::io::Result<()> {
    file.set_len(offset)?;
    file.seek(SeekFrom::Start(offset))?;
    Ok(())
}

impl LogStorage for FileLogStorage {
    fn append(
        &self,
        lowest: i64,
        highest: i64,
        payload: Bytes,
        mut listener: Box<dyn AppendListener>,
    ) {
        let mut appender = self.appender.lock().unwrap_or_else(|e| e.into_inner());
        let last = self.last_position().unwrap_or(i64::MIN);
        let result = if lowest > highest || lowest <= last {
            Err(StorageError::OutOfOrder {
                lowest,
                highest,
                last,
            })
        } else {
            Self::write_frame(&mut appender, lowest, highest, &payload)
        };

        match result {
            Ok(block) => {
                let index = appender.next_index;
                appender.next_index += 1;
                self.index
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(block);
                drop(appender);
                listener.on_write(index, highest);
                listener.on_commit(index, highest);
                self.commit_listeners.notify();
            }
            Err(e) => {
                drop(appender);
                tracing::error!(error = %e, lowest, highest, "failed to append to log file");
                listener.on_write_error(&e);
            }
        }
    }

    fn new_reader(&self) -> Box<dyn LogStorageReader> {
        Box::new(FileReader {
            path: self.path.clone(),
            file: None,
            index: Arc::clone(&self.index),
            cursor: i64::MIN,
        })
    }

    fn add_commit_listener(&self, listener: Arc<dyn CommitListener>) {
        self.commit_listeners.add(listener);
    }

    fn remove_commit_listener(&self, listener: &Arc<dyn CommitListener>) {
        self.commit_listeners.remove(listener);
    }

    /// Recorded only; the single file is never rewritten in place.
    fn update_compaction_bound(&self, position: i64) {
        self.compaction_bound.fetch_max(position, Ordering::SeqCst);
    }
}

fn checksum(lowest: i64, highest: i64, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lowest.to_le_bytes());
    hasher.update(&highest.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// Rebuild the block index; returns it with the length of the valid prefix.
fn scan(file: &mut File, file_len: u64) -> Result<(Vec<BlockIndex>, u64), StorageError> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&mut *file);
    let mut index: Vec<BlockIndex> = Vec::new();
    let mut offset = 0u64;
    let mut header = [0u8; FRAME_HEADER_LENGTH as usize];

    loop {
        if reader.read_exact(&mut header).is_err() {
            break;
        }
        let mut fields = &header[..];
        let payload_len = fields.get_u32_le();
        let crc = fields.get_u32_le();
        let lowest = fields.get_i64_le();
        let highest = fields.get_i64_le();

        let frame_end = offset + FRAME_HEADER_LENGTH + u64::from(payload_len);
        if frame_end > file_len {
            break;
        }
        let mut payload = vec![0u8; payload_len as usize];
        if reader.read_exact(&mut payload).is_err() {
            break;
        }
        if checksum(lowest, highest, &payload) != crc {
            break;
        }
        let ordered = lowest <= highest && index.last().is_none_or(|last| lowest > last.highest);
        if !ordered {
            break;
        }

        index.push(BlockIndex {
            lowest,
            highest,
            offset,
            payload_len,
        });
        offset = frame_end;
    }

    Ok((index, offset))
}

/// Cursor over the blocks of a [`FileLogStorage`], with its own file handle
struct FileReader {
    path: PathBuf,
    file: Option<File>,
    index: Arc<RwLock<Vec<BlockIndex>>>,
    cursor: i64,
}

impl FileReader {
    fn next_block(&self) -> Option<BlockIndex> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        let i = index.partition_point(|block| block.highest < self.cursor);
        index.get(i).copied()
    }

    fn read_block(&mut self, block: BlockIndex) -> Result<StoredBlock, StorageError> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => File::open(&self.path)?,
        };
        file.seek(SeekFrom::Start(block.offset))?;
        let mut frame = vec![0u8; FRAME_HEADER_LENGTH as usize + block.payload_len as usize];
        file.read_exact(&mut frame)?;
        self.file = Some(file);

        let mut fields = &frame[..];
        let _len = fields.get_u32_le();
        let crc = fields.get_u32_le();
        let payload = Bytes::copy_from_slice(&frame[FRAME_HEADER_LENGTH as usize..]);
        if checksum(block.lowest, block.highest, &payload) != crc {
            return Err(StorageError::Corrupt {
                offset: block.offset,
            });
        }
        Ok(StoredBlock {
            lowest: block.lowest,
            highest: block.highest,
            payload,
        })
    }
}

impl LogStorageReader for FileReader {
    fn seek(&mut self, position: i64) {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        let after = index.partition_point(|block| block.lowest <= position);
        self.cursor = match after.checked_sub(1).and_then(|i| index.get(i)) {
            Some(block) => block.lowest,
            None => i64::MIN,
        };
    }

    fn seek_to_end(&mut self) {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        self.cursor = index
            .last()
            .map(|block| block.highest.saturating_add(1))
            .unwrap_or(i64::MIN);
    }

    fn has_next(&mut self) -> bool {
        self.next_block().is_some()
    }

    fn next(&mut self) -> Option<Result<StoredBlock, StorageError>> {
        let block = self.next_block()?;
        let result = self.read_block(block);
        if result.is_ok() {
            self.cursor = block.highest.saturating_add(1);
        }
        Some(result)
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
