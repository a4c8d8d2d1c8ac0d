//! Read path with rollback to history.
//!
//! A read tries the primary file first. When it is missing or does not
//! decode, history entries are tried newest-first; the first that decodes
//! is written back over the primary and returned. If nothing decodes the
//! caller's fallback is returned. Entries that fail to decode are skipped,
//! never deleted.

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::atomic::{read_optional, write_atomic};
use crate::format::Format;
use crate::history;
use crate::layout::StoreLayout;

/// Where a read's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The primary file decoded.
    Primary,
    /// Rolled back to the history entry with this sequence-id.
    History(u64),
    /// Neither the primary nor any history entry was usable.
    Fallback,
}

/// A value together with the place it was recovered from.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered<T> {
    pub value: T,
    pub source: Source,
}

impl<T> Recovered<T> {
    /// True if the primary file had to be restored or the fallback used.
    pub fn is_degraded(&self) -> bool {
        self.source != Source::Primary
    }
}

/// Reads the stored value, rolling back through history if needed.
///
/// Must be called with the path gate held. Never fails: every error
/// degrades to the next state and finally to `fallback`.
pub fn read_with_rollback<T, F, D>(layout: &StoreLayout, format: &F, fallback: D) -> Recovered<T>
where
    T: DeserializeOwned,
    F: Format,
    D: FnOnce() -> T,
{
    let primary = layout.primary();

    match read_optional(primary) {
        Ok(Some(bytes)) => match format.decode(&bytes) {
            Ok(value) => {
                return Recovered {
                    value,
                    source: Source::Primary,
                }
            }
            Err(e) => warn!(path = %primary.display(), error = %e, "primary file is corrupt"),
        },
        Ok(None) => debug!(path = %primary.display(), "primary file missing"),
        Err(e) => warn!(path = %primary.display(), error = %e, "primary file unreadable"),
    }

    if let Some(recovered) = scan_history(layout, format) {
        return recovered;
    }

    debug!(path = %primary.display(), "no usable state, using fallback");
    Recovered {
        value: fallback(),
        source: Source::Fallback,
    }
}

fn scan_history<T, F>(layout: &StoreLayout, format: &F) -> Option<Recovered<T>>
where
    T: DeserializeOwned,
    F: Format,
{
    let entries = match history::list(layout) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %layout.primary().display(), error = %e, "failed to list history");
            return None;
        }
    };

    for entry in entries {
        let bytes = match entry.read() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(entry = %entry.path().display(), error = %e, "history entry unreadable");
                continue;
            }
        };
        let value = match format.decode(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(entry = %entry.path().display(), error = %e, "history entry is corrupt");
                continue;
            }
        };

        info!(
            path = %layout.primary().display(),
            sequence = entry.sequence(),
            "rolled back to history entry"
        );

        if let Err(e) = write_atomic(layout.primary(), &bytes, layout.temp_dir()) {
            warn!(path = %layout.primary().display(), error = %e, "failed to restore primary file");
        }

        return Some(Recovered {
            value,
            source: Source::History(entry.sequence()),
        });
    }

    None
}
