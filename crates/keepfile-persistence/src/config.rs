//! Storage configuration.

use crate::history::DEFAULT_HISTORY_LIMIT;

/// How history pruning runs after a write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PruneMode {
    /// Spawn a task that prunes once it gets the path gate; the write
    /// returns without waiting for it.
    #[default]
    Background,
    /// Prune before the write returns, after re-acquiring the path gate.
    Inline,
}

/// Configuration for a `Storage` handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Number of history entries kept per path.
    pub history_limit: usize,
    /// When pruning runs.
    pub prune_mode: PruneMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            prune_mode: PruneMode::Background,
        }
    }
}

impl StoreConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of history entries to keep (at least one).
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Sets the prune mode.
    pub fn with_prune_mode(mut self, mode: PruneMode) -> Self {
        self.prune_mode = mode;
        self
    }
}
