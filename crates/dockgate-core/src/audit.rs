//! Append-only record of every dispatched request.
//!
//! Entries are kept in memory for the life of the process and, when a path
//! is configured, mirrored to a JSONL file one line per entry. Nothing in
//! this module edits or removes an entry once appended.

use crate::error::Result;
use crate::types::{AuditEntry, OutcomeClass};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

// ---------------------------------------------------------------------------
// AuditFilter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub outcome: Option<OutcomeClass>,
    pub since: Option<DateTime<Utc>>,
    /// Keep only the most recent N matches.
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.action
            .as_deref()
            .is_none_or(|a| entry.request.action == a)
            && self.outcome.is_none_or(|o| entry.outcome == o)
            && self.since.is_none_or(|t| entry.timestamp >= t)
    }

    /// Apply the filter to entries in chronological order.
    pub fn apply<'a>(&self, entries: impl Iterator<Item = &'a AuditEntry>) -> Vec<AuditEntry> {
        let mut out: Vec<AuditEntry> = entries.filter(|e| self.matches(e)).cloned().collect();
        if let Some(limit) = self.limit {
            if out.len() > limit {
                out.drain(..out.len() - limit);
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Mirror new entries to `path` (JSONL). Earlier file contents are not loaded.
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record `entry`. The in-memory append always happens; the returned
    /// error only reports a failed write to the JSONL file.
    pub fn append(&self, entry: AuditEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let persisted = match &self.path {
            Some(path) => serde_json::to_string(&entry)
                .map_err(Into::into)
                .and_then(|line| crate::io::append_line(path, &line)),
            None => Ok(()),
        };
        entries.push(entry);
        persisted
    }

    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        filter.apply(entries.iter())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read a JSONL audit file written by [`AuditLog`]. Missing file → empty.
///
/// Malformed lines are skipped with a warning so one torn write does not
/// hide the rest of the history.
pub fn read_file(path: &Path) -> Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (n, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(path = %path.display(), line = n + 1, "skipping malformed audit line: {e}"),
        }
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
