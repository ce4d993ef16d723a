// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device progress ledger.
//!
//! One JSON file per mapper under the ongoing directory. Every commit writes
//! the complete entry to a sibling temp file, syncs it, and renames it over
//! the ledger, so a reader sees either the previous or the new state and
//! never a mix. Finished ledgers are archived by a timestamped rename.

use ode_core::{Clock, EncryptionEnvironment, Phase, SystemClock};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("copy cursor recorded without a phase")]
    CursorWithoutPhase,
    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },
}

/// Everything persisted about one in-flight device.
///
/// Numeric fields are unsigned, so "non-negative or absent" holds by type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerEntry {
    pub original_device_path: Option<String>,
    pub mapper_name: Option<String>,
    pub luks_header_file_path: Option<PathBuf>,
    pub phase: Option<Phase>,
    /// Phase a `Resume` will hand back to
    pub resumed_from: Option<Phase>,
    pub file_system: Option<String>,
    pub mount_point: Option<PathBuf>,
    pub device_size_bytes: Option<u64>,
    pub copy_from_end: Option<bool>,
    pub header_slice_file_path: Option<PathBuf>,
    pub current_block_size_bytes: Option<u64>,
    pub current_source_path: Option<PathBuf>,
    pub current_destination_path: Option<PathBuf>,
    pub current_total_copy_size_bytes: Option<u64>,
    pub current_slice_index: Option<u64>,
}

impl LedgerEntry {
    /// True when any part of the copy cursor is set.
    pub fn has_cursor(&self) -> bool {
        self.current_block_size_bytes.is_some()
            || self.current_source_path.is_some()
            || self.current_destination_path.is_some()
            || self.current_total_copy_size_bytes.is_some()
            || self.current_slice_index.is_some()
    }

    pub fn clear_cursor(&mut self) {
        self.current_block_size_bytes = None;
        self.current_source_path = None;
        self.current_destination_path = None;
        self.current_total_copy_size_bytes = None;
        self.current_slice_index = None;
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if self.phase.is_none() && self.has_cursor() {
            return Err(LedgerError::CursorWithoutPhase);
        }
        Ok(())
    }
}

pub struct ProgressLedger {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    pub entry: LedgerEntry,
}

impl ProgressLedger {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self { path: path.into(), clock, entry: LedgerEntry::default() }
    }

    /// Ledger for `mapper_name` in the environment's ongoing directory.
    pub fn for_mapper(env: &EncryptionEnvironment, mapper_name: &str) -> Self {
        Self::new(env.ledger_path(mapper_name), Arc::new(SystemClock))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Current phase, `NotStarted` when none has been recorded.
    pub fn phase(&self) -> Phase {
        self.entry.phase.unwrap_or(Phase::NotStarted)
    }

    /// Populate from disk, or reset every field when no ledger exists.
    pub fn load_from_store(&mut self) -> Result<(), LedgerError> {
        self.entry = match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LedgerEntry::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(())
    }

    /// Validate and atomically replace the on-disk ledger.
    pub fn commit(&self) -> Result<(), LedgerError> {
        self.entry.validate()?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_vec_pretty(&self.entry)?;
        let tmp = self.tmp_path();
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Archive the ledger as `<file>_<UTC timestamp>`.
    ///
    /// Returns the archive path, or `None` when there was nothing to archive.
    pub fn clear(&mut self) -> Result<Option<PathBuf>, LedgerError> {
        if !self.path.exists() {
            self.entry = LedgerEntry::default();
            return Ok(None);
        }
        let stamp = self.clock.utc().format("%Y-%m-%d_%H-%M-%S%.3f").to_string();
        let mut archive = suffixed(&self.path, &format!("_{stamp}"));
        let mut n = 1;
        while archive.exists() {
            archive = suffixed(&self.path, &format!("_{stamp}.{n}"));
            n += 1;
        }
        fs::rename(&self.path, &archive)?;
        tracing::info!(ledger = %self.path.display(), archive = %archive.display(), "archived progress ledger");
        self.entry = LedgerEntry::default();
        Ok(Some(archive))
    }

    /// Move to `next` and commit, leaving memory untouched on failure.
    pub fn transition(&mut self, next: Phase) -> Result<(), LedgerError> {
        let from = self.phase();
        if !from.can_transition(next, self.entry.resumed_from) {
            return Err(LedgerError::InvalidTransition { from, to: next });
        }
        let previous = self.entry.clone();
        if next == Phase::Resume {
            if from != Phase::Resume {
                self.entry.resumed_from = Some(from);
            }
        } else {
            self.entry.resumed_from = None;
        }
        self.entry.phase = Some(next);
        self.commit_or_restore(previous)
    }

    /// Record that the current slice is done and commit.
    pub fn advance_slice(&mut self) -> Result<u64, LedgerError> {
        let previous = self.entry.clone();
        let next = self.entry.current_slice_index.unwrap_or(0) + 1;
        self.entry.current_slice_index = Some(next);
        self.commit_or_restore(previous)?;
        Ok(next)
    }

    fn commit_or_restore(&mut self, previous: LedgerEntry) -> Result<(), LedgerError> {
        if let Err(e) = self.commit() {
            self.entry = previous;
            return Err(e);
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        suffixed(&self.path, ".tmp")
    }

    /// Mapper names with a live ledger in `dir`.
    pub fn pending_mappers(dir: &Path) -> Vec<String> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name().to_str()?.to_string();
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
