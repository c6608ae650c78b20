// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Move journal for undo support

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::fsutil::{move_file, write_atomic};
use crate::Result;

/// A single file move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub original_path: PathBuf,
    pub new_path: PathBuf,
    pub category: String,
    pub file_hash: String,
    #[serde(default)]
    pub undone: bool,
}

/// What happened when undoing one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    Restored,
    WouldRestore,
    /// File no longer at its new location
    Missing,
    /// Something else now occupies the original location
    OriginalOccupied,
    /// File content changed since it was moved
    Modified,
    /// The file could not be read or moved back
    Failed(String),
}

/// Journal of file moves, one JSON object per line
pub struct History {
    path: PathBuf,
}

impl History {
    /// Create a new history manager
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append an entry to the history
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }

    /// Read all history entries
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Failed to parse history entry: {}", e);
                }
            }
        }

        Ok(entries)
    }

    /// Get the most recent N entries (newest first)
    pub fn get_recent(&self, count: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.read_all()?;
        entries.reverse();
        entries.truncate(count);
        Ok(entries)
    }

    /// Mark entries as undone, rewriting the journal atomically
    pub fn mark_undone(&self, ids: &[String]) -> Result<()> {
        let mut out = String::new();
        for mut entry in self.read_all()? {
            if ids.contains(&entry.id) {
                entry.undone = true;
            }
            out.push_str(&serde_json::to_string(&entry)?);
            out.push('\n');
        }
        write_atomic(&self.path, out.as_bytes())?;
        Ok(())
    }

    /// Entries that haven't been undone, oldest first
    pub fn get_undoable(&self) -> Result<Vec<HistoryEntry>> {
        let entries = self.read_all()?;
        Ok(entries.into_iter().filter(|e| !e.undone).collect())
    }

    /// Move the newest `count` undoable files back (0 = all)
    pub fn undo(&self, count: usize, dry_run: bool) -> Result<Vec<(HistoryEntry, UndoOutcome)>> {
        let mut entries = self.get_undoable()?;
        entries.reverse();
        if count > 0 {
            entries.truncate(count);
        }

        let mut results = Vec::new();
        let mut restored = Vec::new();
        for entry in entries {
            let outcome = undo_one(&entry, dry_run);
            if outcome == UndoOutcome::Restored {
                restored.push(entry.id.clone());
            }
            results.push((entry, outcome));
        }

        if !restored.is_empty() {
            self.mark_undone(&restored)?;
        }
        Ok(results)
    }

    /// Clear all history
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Get history file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn undo_one(entry: &HistoryEntry, dry_run: bool) -> UndoOutcome {
    if !entry.new_path.is_file() {
        return UndoOutcome::Missing;
    }
    if entry.original_path.exists() {
        return UndoOutcome::OriginalOccupied;
    }
    match file_hash(&entry.new_path) {
        Ok(hash) if hash == entry.file_hash => {}
        Ok(_) => return UndoOutcome::Modified,
        Err(e) => {
            tracing::warn!("Cannot read {:?}: {}", entry.new_path, e);
            return UndoOutcome::Failed(e.to_string());
        }
    }
    if dry_run {
        return UndoOutcome::WouldRestore;
    }
    if let Some(parent) = entry.original_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            tracing::warn!("Cannot recreate {:?}: {}", parent, e);
            return UndoOutcome::Failed(e.to_string());
        }
    }
    match move_file(&entry.new_path, &entry.original_path) {
        Ok(()) => {
            tracing::info!("Restored {:?} -> {:?}", entry.new_path, entry.original_path);
            UndoOutcome::Restored
        }
        Err(e) => {
            tracing::warn!("Failed to restore {:?}: {}", entry.new_path, e);
            UndoOutcome::Failed(e.to_string())
        }
    }
}

/// blake3 hash of a file's content
pub fn file_hash(path: &Path) -> Result<String> {
    let data = fs::read(path)?;
    Ok(blake3::hash(&data).to_hex().to_string())
}

/// Create a new history entry
pub fn create_entry(
    original_path: PathBuf,
    new_path: PathBuf,
    category: String,
    file_hash: String,
) -> HistoryEntry {
    HistoryEntry {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        original_path,
        new_path,
        category,
        file_hash,
        undone: false,
    }
}
