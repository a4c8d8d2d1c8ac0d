//! Per-path mutual exclusion.
//!
//! Every read, write, delete and prune of a stored value runs while holding
//! the gate for its primary path. Gates live in a process-wide registry
//! keyed by the normalized path, so independent `Storage` handles for the
//! same file still serialize. Entries are created on first use and never
//! removed.
//!
//! Gates are tokio mutexes, which hand the lock to waiters in the order
//! they queued. The guard is owned so it can be moved into the blocking
//! task doing the file system work; the gate then stays closed until that
//! work has finished even if the caller stops waiting for it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

use crate::layout::normalize;

type Gate = Arc<AsyncMutex<()>>;

static GATES: OnceLock<Mutex<HashMap<PathBuf, Gate>>> = OnceLock::new();

/// Exclusive access to one storage path. Released on drop.
#[derive(Debug)]
pub struct PathGuard {
    path: PathBuf,
    _guard: OwnedMutexGuard<()>,
}

impl PathGuard {
    /// The normalized path this guard holds.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Waits for exclusive access to `path`.
///
/// Cannot fail; it only waits for the current holder to finish.
pub async fn acquire(path: &Path) -> PathGuard {
    let key = normalize(path);
    let guard = gate_for(&key).lock_owned().await;
    trace!(path = %key.display(), "acquired path gate");
    PathGuard {
        path: key,
        _guard: guard,
    }
}

/// Takes the gate for `path` only if nobody holds it.
#[cfg(test)]
fn try_acquire(path: &Path) -> Option<PathGuard> {
    let key = normalize(path);
    let guard = gate_for(&key).try_lock_owned().ok()?;
    Some(PathGuard {
        path: key,
        _guard: guard,
    })
}

/// Returns the gate for a normalized path, creating it on first use.
///
/// Lookup and insertion happen under one registry lock, so concurrent
/// first uses of a path agree on a single gate.
fn gate_for(key: &Path) -> Gate {
    let registry = GATES.get_or_init(Default::default);
    // A panic while holding the registry lock cannot leave the map
    // half-updated, so a poisoned lock is still usable.
    let mut gates = registry.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(gates.entry(key.to_path_buf()).or_default())
}
