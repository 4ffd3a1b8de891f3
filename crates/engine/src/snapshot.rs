// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Processor snapshots
//!
//! A snapshot captures job state together with the log positions it covers,
//! so recovery replays only what follows and the log below it can be
//! compacted.

use crate::state::JobState;
use chrono::{DateTime, Utc};
use keel_core::PartitionId;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot not found: {0}")]
    NotFound(String),
    #[error("invalid snapshot format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSnapshot {
    pub version: u32,
    pub partition_id: PartitionId,
    /// Highest command position whose follow-ups are in the log
    pub processed_position: i64,
    /// Every event at or below this position is reflected in `state`
    pub applied_position: i64,
    /// Next key the partition's generator hands out
    pub next_key: i64,
    pub timestamp: DateTime<Utc>,
    pub state: JobState,
}

impl ProcessorSnapshot {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(
        partition_id: PartitionId,
        processed_position: i64,
        applied_position: i64,
        next_key: i64,
        state: JobState,
    ) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            partition_id,
            processed_position,
            applied_position,
            next_key,
            timestamp: Utc::now(),
            state,
        }
    }

    /// Lowest position replay still needs
    pub fn replay_from(&self) -> i64 {
        self.processed_position.min(self.applied_position) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub id: String,
    pub position: i64,
    pub size_bytes: u64,
}

/// Directory of JSON snapshots, newest by position first
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    keep: usize,
}

impl SnapshotStore {
    pub const DEFAULT_KEEP: usize = 2;

    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            keep: Self::DEFAULT_KEEP,
        }
    }

    /// Number of snapshots retained after each new one
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn generate_id(position: i64, timestamp: DateTime<Utc>) -> String {
        format!("{:020}-{}", position.max(0), timestamp.format("%Y%m%d%H%M%S"))
    }

    /// Persist `snapshot` and drop all but the newest retained ones
    ///
    /// Written to a temporary file first, so a crash never leaves a partial
    /// snapshot under a valid name.
    pub fn persist(&self, snapshot: &ProcessorSnapshot) -> Result<SnapshotMeta, SnapshotError> {
        fs::create_dir_all(&self.dir)?;
        let id = Self::generate_id(snapshot.applied_position, snapshot.timestamp);
        let path = self.snapshot_path(&id);
        let tmp = self.dir.join(format!("{id}.json.tmp"));

        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, snapshot)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        let size_bytes = fs::metadata(&path)?.len();

        let deleted = self.cleanup()?;
        tracing::info!(
            id,
            position = snapshot.applied_position,
            size_bytes,
            deleted = deleted.len(),
            "snapshot persisted"
        );
        Ok(SnapshotMeta {
            id,
            position: snapshot.applied_position,
            size_bytes,
        })
    }

    pub fn load(&self, id: &str) -> Result<ProcessorSnapshot, SnapshotError> {
        let path = self.snapshot_path(id);
        if !path.exists() {
            return Err(SnapshotError::NotFound(id.to_string()));
        }
        let reader = BufReader::new(File::open(&path)?);
        let snapshot: ProcessorSnapshot = serde_json::from_reader(reader)?;
        if snapshot.version != ProcessorSnapshot::CURRENT_VERSION {
            return Err(SnapshotError::InvalidFormat(format!(
                "unsupported version: {} (expected {})",
                snapshot.version,
                ProcessorSnapshot::CURRENT_VERSION
            )));
        }
        Ok(snapshot)
    }

    /// Newest snapshot, if any
    pub fn latest(&self) -> Result<Option<ProcessorSnapshot>, SnapshotError> {
        match self.list()?.first() {
            Some(meta) => self.load(&meta.id).map(Some),
            None => Ok(None),
        }
    }

    /// All snapshots, highest position first
    pub fn list(&self) -> Result<Vec<SnapshotMeta>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.extension().map(|e| e == "json").unwrap_or(false) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(position) = stem
                .split_once('-')
                .and_then(|(position, _)| position.parse::<i64>().ok())
            else {
                continue;
            };
            snapshots.push(SnapshotMeta {
                id: stem.to_string(),
                position,
                size_bytes: fs::metadata(&path)?.len(),
            });
        }
        snapshots.sort_by(|a, b| b.position.cmp(&a.position).then_with(|| b.id.cmp(&a.id)));
        Ok(snapshots)
    }

    pub fn delete(&self, id: &str) -> Result<(), SnapshotError> {
        let path = self.snapshot_path(id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn cleanup(&self) -> Result<Vec<String>, SnapshotError> {
        let mut deleted = Vec::new();
        for meta in self.list()?.into_iter().skip(self.keep) {
            self.delete(&meta.id)?;
            deleted.push(meta.id);
        }
        Ok(deleted)
    }

    fn snapshot_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
