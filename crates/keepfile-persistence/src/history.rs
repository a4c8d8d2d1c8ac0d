//! History ledger: timestamped copies of every successful write.
//!
//! Each write appends `<base>.<sequence>` to the history directory. The
//! sequence-id is a millisecond timestamp, bumped past the newest existing
//! entry when the clock has not moved. Callers must hold the path gate
//! while computing and appending a sequence-id, which is what makes ids
//! strictly increasing per path.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::atomic::{ensure_dir, write_atomic};
use crate::error::{PersistenceError, Result};
use crate::layout::StoreLayout;

/// Default number of history entries kept per path.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// A retained copy of one successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    sequence: u64,
    path: PathBuf,
}

impl HistoryEntry {
    /// Sequence-id of the write; orders entries and identifies them.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Location of the entry's payload.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the entry was written, as encoded in its sequence-id.
    ///
    /// Returns None for ids bumped past the representable range.
    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.sequence)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }

    /// Reads the entry's payload.
    pub fn read(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|source| PersistenceError::ReadError {
            path: self.path.clone(),
            source,
        })
    }
}

/// Outcome of a prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Entries left in place.
    pub kept: usize,
    /// Entries deleted.
    pub removed: usize,
    /// Entries that could not be deleted.
    pub failed: usize,
}

/// Lists history entries, newest first.
///
/// Only files named exactly `<base>.<digits>` count; anything else in the
/// directory is ignored. A missing history directory is an empty history.
pub fn list(layout: &StoreLayout) -> Result<Vec<HistoryEntry>> {
    let dir = layout.history_dir();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PersistenceError::ReadError {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut history = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| PersistenceError::ReadError {
            path: dir.to_path_buf(),
            source,
        })?;

        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let name = entry.file_name();
        if let Some(sequence) = name.to_str().and_then(|n| layout.parse_entry_name(n)) {
            history.push(HistoryEntry {
                sequence,
                path: entry.path(),
            });
        }
    }

    history.sort_by(|a, b| b.sequence.cmp(&a.sequence));
    Ok(history)
}

/// Computes the sequence-id for the next append.
///
/// Must be called with the path gate held, together with [`append`].
///
/// # Errors
/// Fails if the newest entry already carries the largest representable
/// sequence-id, since no later id exists.
pub fn next_sequence(layout: &StoreLayout) -> Result<u64> {
    let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    let newest = list(layout)?.first().map(HistoryEntry::sequence);

    match newest {
        Some(newest) if newest >= now => newest.checked_add(1).ok_or_else(|| {
            PersistenceError::InvalidData(format!(
                "history entry {} has the largest sequence-id; remove it to continue writing",
                layout.entry_path(newest).display()
            ))
        }),
        _ => Ok(now),
    }
}

/// Persists `payload` as the history entry for `sequence`.
///
/// The payload is staged and renamed into its final name, so any entry
/// visible under a `<base>.<digits>` name is complete.
pub fn append(layout: &StoreLayout, payload: &[u8], sequence: u64) -> Result<HistoryEntry> {
    ensure_dir(layout.history_dir())?;
    let path = layout.entry_path(sequence);
    write_atomic(&path, payload, layout.temp_dir())?;

    debug!(
        path = %layout.primary().display(),
        sequence = sequence,
        bytes = payload.len(),
        "appended history entry"
    );

    Ok(HistoryEntry { sequence, path })
}

/// Deletes all but the `keep` newest entries.
///
/// Best effort: listing and deletion failures are logged and counted,
/// never returned.
pub fn prune(layout: &StoreLayout, keep: usize) -> PruneReport {
    let history = match list(layout) {
        Ok(history) => history,
        Err(e) => {
            warn!(path = %layout.primary().display(), error = %e, "failed to list history for pruning");
            return PruneReport::default();
        }
    };

    let mut report = PruneReport {
        kept: history.len().min(keep),
        ..PruneReport::default()
    };

    for entry in history.iter().skip(keep) {
        match fs::remove_file(entry.path()) {
            Ok(()) => report.removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(
                    entry = %entry.path().display(),
                    error = %e,
                    "failed to prune history entry"
                );
                report.failed += 1;
            }
        }
    }

    if report.removed > 0 || report.failed > 0 {
        debug!(
            path = %layout.primary().display(),
            kept = report.kept,
            removed = report.removed,
            failed = report.failed,
            "pruned history"
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn layout_in(dir: &Path) -> StoreLayout {
        StoreLayout::new(dir.join("state.json"))
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let layout = layout_in(dir.path());

        assert!(list(&layout).unwrap().is_empty());
    }

    #[test]
    fn test_append_and_list_newest_first() {
        let dir = tempdir().unwrap();
        let layout = layout_in(dir.path());

        append(&layout, b"first", 100).unwrap();
        append(&layout, b"third", 300).unwrap();
        append(&layout, b"second", 200).unwrap();

        let history = list(&layout).unwrap();
        let sequences: Vec<u64> = history.iter().map(HistoryEntry::sequence).collect();

        assert_eq!(sequences, vec![300, 200, 100]);
        assert_eq!(history[0].read().unwrap(), b"third");
        assert_eq!(history[0].path(), layout.entry_path(300));
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        let layout = layout_in(dir.path());
        append(&layout, b"real", 5).unwrap();

        let history_dir = layout.history_dir();
        fs::write(history_dir.join("state.json.5.bak"), b"x").unwrap();
        fs::write(history_dir.join("state.json.latest"), b"x").unwrap();
        fs::write(history_dir.join("other.json.9"), b"x").unwrap();
        fs::write(history_dir.join("README"), b"x").unwrap();
        fs::create_dir(history_dir.join("state.json.77")).unwrap();

        let history = list(&layout).unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].sequence(), 5);
    }

    #[test]
    fn test_next_sequence_uses_clock() {
        let dir = tempdir().unwrap();
        let layout = layout_in(dir.path());

        let before = Utc::now().timestamp_millis() as u64;
        let sequence = next_sequence(&layout).unwrap();

        assert!(sequence >= before);
    }

    #[test]
    fn test_next_sequence_passes_newest_entry() {
        let dir = tempdir().unwrap();
        let layout = layout_in(dir.path());
        let future = Utc::now().timestamp_millis() as u64 + 60_000;
        append(&layout, b"from the future", future).unwrap();

        assert_eq!(next_sequence(&layout).unwrap(), future + 1);
    }

    #[test]
    fn test_next_sequence_refuses_to_wrap() {
        let dir = tempdir().unwrap();
        let layout = layout_in(dir.path());
        append(&layout, b"1", 1).unwrap();
        fs::write(layout.history_dir().join("state.json.18446744073709551615"), b"2").unwrap();

        let result = next_sequence(&layout);

        assert!(matches!(result, Err(PersistenceError::InvalidData(_))));
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = tempdir().unwrap();
        let layout = layout_in(dir.path());
        for sequence in 1..=15 {
            append(&layout, sequence.to_string().as_bytes(), sequence).unwrap();
        }

        let report = prune(&layout, DEFAULT_HISTORY_LIMIT);

        assert_eq!(report, PruneReport { kept: 10, removed: 5, failed: 0 });
        let sequences: Vec<u64> = list(&layout).unwrap().iter().map(HistoryEntry::sequence).collect();
        assert_eq!(sequences, (6..=15).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_prune_leaves_foreign_files() {
        let dir = tempdir().unwrap();
        let layout = layout_in(dir.path());
        for sequence in 1..=3 {
            append(&layout, b"x", sequence).unwrap();
        }
        let stray = layout.history_dir().join("state.json.notes");
        fs::write(&stray, b"keep me").unwrap();

        let report = prune(&layout, 1);

        assert_eq!(report.removed, 2);
        assert!(stray.exists());
    }

    #[test]
    fn test_prune_missing_dir() {
        let dir = tempdir().unwrap();
        let layout = layout_in(dir.path());

        assert_eq!(prune(&layout, 10), PruneReport::default());
    }

    #[test]
    fn test_written_at() {
        let entry = HistoryEntry {
            sequence: 1_700_000_000_000,
            path: PathBuf::from("x"),
        };

        assert_eq!(entry.written_at().unwrap().timestamp(), 1_700_000_000);
    }
}
