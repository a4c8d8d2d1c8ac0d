//! Storage handle: the public entry point.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::atomic::{remove_dir_if_exists, remove_file_if_exists, write_atomic};
use crate::config::{PruneMode, StoreConfig};
use crate::error::Result;
use crate::format::{Format, JsonFormat};
use crate::gate;
use crate::history::{self, HistoryEntry, PruneReport};
use crate::layout::StoreLayout;
use crate::rollback::{read_with_rollback, Recovered, Source};

/// The default stored value: a JSON object.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// A crash-safe store for a single value.
///
/// Writes replace the primary file atomically and append a history entry;
/// reads fall back to the newest decodable history entry when the primary
/// file is missing or corrupt, and to the fallback value when nothing is
/// usable. All operations on one path, across every handle in the process,
/// are serialized by the path gate.
///
/// File system work and encoding run on tokio's blocking pool.
///
/// # Example
///
/// ```no_run
/// use keepfile_persistence::Storage;
/// use serde_json::json;
///
/// # async fn example() -> keepfile_persistence::Result<()> {
/// let store: Storage = Storage::open("/home/user/.config/app/settings.json");
///
/// let mut settings = store.read().await;
/// settings.insert("theme".to_string(), json!("dark"));
/// store.write(settings).await?;
/// # Ok(())
/// # }
/// ```
pub struct Storage<T = Document, F = JsonFormat> {
    layout: Arc<StoreLayout>,
    fallback: T,
    format: Arc<F>,
    config: StoreConfig,
    /// Background prune tasks spawned by this handle.
    prunes: Mutex<Vec<JoinHandle<PruneReport>>>,
}

impl<T> Storage<T, JsonFormat>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Opens a store whose fallback is `T::default()` (an empty object for
    /// [`Document`]).
    ///
    /// Does not touch the file system.
    pub fn open(path: impl AsRef<Path>) -> Self
    where
        T: Default,
    {
        Self::with_fallback(path, T::default())
    }

    /// Opens a store with an explicit fallback value.
    pub fn with_fallback(path: impl AsRef<Path>, fallback: T) -> Self {
        Self::with_config(path, fallback, StoreConfig::default())
    }

    /// Opens a store with an explicit fallback and configuration.
    pub fn with_config(path: impl AsRef<Path>, fallback: T, config: StoreConfig) -> Self {
        Self::with_format(path, fallback, JsonFormat::default(), config)
    }
}

impl<T, F> Storage<T, F>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Format,
{
    /// Opens a store using a custom payload format.
    pub fn with_format(
        path: impl AsRef<Path>,
        fallback: T,
        format: F,
        config: StoreConfig,
    ) -> Self {
        Self {
            layout: Arc::new(StoreLayout::new(path)),
            fallback,
            format: Arc::new(format),
            config,
            prunes: Mutex::new(Vec::new()),
        }
    }

    /// The primary file path (normalized).
    pub fn path(&self) -> &Path {
        self.layout.primary()
    }

    /// Resolved on-disk layout.
    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// The value returned when nothing on disk is usable.
    pub fn fallback(&self) -> &T {
        &self.fallback
    }

    /// The handle's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Replaces the stored value.
    ///
    /// On success the primary file holds the encoded value and one history
    /// entry has been appended. Pruning follows according to the configured
    /// [`PruneMode`].
    ///
    /// # Errors
    /// Encoding and file system failures, and a history whose sequence-ids
    /// are exhausted. When the primary file could not be replaced it keeps
    /// its previous content. When the history append fails the primary file
    /// already holds the new value.
    pub async fn write(&self, value: T) -> Result<()> {
        let format = Arc::clone(&self.format);
        let payload = task::spawn_blocking(move || format.encode(&value)).await??;

        let layout = Arc::clone(&self.layout);
        let guard = gate::acquire(layout.primary()).await;
        let sequence = task::spawn_blocking(move || -> Result<u64> {
            let _guard = guard;
            let sequence = history::next_sequence(&layout)?;
            write_atomic(layout.primary(), &payload, layout.temp_dir())?;
            history::append(&layout, &payload, sequence)?;
            Ok(sequence)
        })
        .await??;

        debug!(path = %self.path().display(), sequence = sequence, "wrote value");

        self.prune_after_write().await;
        Ok(())
    }

    /// Reads the stored value. Never fails.
    pub async fn read(&self) -> T {
        self.read_recovered().await.value
    }

    /// Reads the stored value and reports where it came from.
    ///
    /// When the primary file was restored from history the repair has
    /// already been written by the time this returns.
    pub async fn read_recovered(&self) -> Recovered<T> {
        let layout = Arc::clone(&self.layout);
        let format = Arc::clone(&self.format);
        let fallback = self.fallback.clone();
        let guard = gate::acquire(layout.primary()).await;

        let result = task::spawn_blocking(move || {
            let _guard = guard;
            read_with_rollback(&layout, format.as_ref(), || fallback)
        })
        .await;

        match result {
            Ok(recovered) => {
                if let Source::History(sequence) = recovered.source {
                    info!(path = %self.path().display(), sequence = sequence, "recovered value from history");
                }
                recovered
            }
            Err(e) => {
                warn!(path = %self.path().display(), error = %e, "read task failed, using fallback");
                Recovered {
                    value: self.fallback.clone(),
                    source: Source::Fallback,
                }
            }
        }
    }

    /// Removes the primary file and its whole history.
    pub async fn delete(&self) -> Result<()> {
        let layout = Arc::clone(&self.layout);
        let guard = gate::acquire(layout.primary()).await;

        task::spawn_blocking(move || -> Result<()> {
            let _guard = guard;
            remove_file_if_exists(layout.primary())?;
            remove_dir_if_exists(layout.history_dir())?;
            remove_dir_if_exists(layout.temp_dir())?;
            Ok(())
        })
        .await??;

        info!(path = %self.path().display(), "deleted value and history");
        Ok(())
    }

    /// Lists history entries, newest first.
    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        let layout = Arc::clone(&self.layout);
        let guard = gate::acquire(layout.primary()).await;

        task::spawn_blocking(move || {
            let _guard = guard;
            history::list(&layout)
        })
        .await?
    }

    /// Waits for background prunes spawned by this handle to finish.
    pub async fn flush(&self) {
        let pending = std::mem::take(
            &mut *self.prunes.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(path = %self.path().display(), error = %e, "prune task failed");
            }
        }
    }

    async fn prune_after_write(&self) {
        let layout = Arc::clone(&self.layout);
        let keep = self.config.history_limit;

        match self.config.prune_mode {
            PruneMode::Inline => {
                prune_under_gate(layout, keep).await;
            }
            PruneMode::Background => {
                let handle = tokio::spawn(prune_under_gate(layout, keep));
                let mut prunes = self.prunes.lock().unwrap_or_else(PoisonError::into_inner);
                prunes.retain(|h| !h.is_finished());
                prunes.push(handle);
            }
        }
    }
}

/// Prunes history once the path gate is free.
async fn prune_under_gate(layout: Arc<StoreLayout>, keep: usize) -> PruneReport {
    let guard = gate::acquire(layout.primary()).await;
    let path = layout.primary().to_path_buf();

    task::spawn_blocking(move || {
        let _guard = guard;
        history::prune(&layout, keep)
    })
    .await
    .unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "prune task failed");
        PruneReport::default()
    })
}

impl<T, F> std::fmt::Debug for Storage<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.layout.primary())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use serde::Deserialize;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Window {
        width: u32,
        height: u32,
        maximized: bool,
    }

    #[test]
    fn test_open_does_not_touch_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep/nested/settings.json");

        let store: Storage = Storage::open(&path);

        assert_eq!(store.path(), path.as_path());
        assert!(store.fallback().is_empty());
        assert!(!dir.path().join("deep").exists());
    }

    #[tokio::test]
    async fn test_read_fresh_store_returns_fallback() {
        let dir = tempdir().unwrap();
        let fallback = Window { width: 800, height: 600, maximized: false };
        let store = Storage::with_fallback(dir.path().join("window.json"), fallback.clone());

        let recovered = store.read_recovered().await;

        assert_eq!(recovered.value, fallback);
        assert_eq!(recovered.source, Source::Fallback);
    }

    #[tokio::test]
    async fn test_write_then_read_struct() {
        let dir = tempdir().unwrap();
        let store: Storage<Window> = Storage::open(dir.path().join("window.json"));
        let window = Window { width: 1920, height: 1080, maximized: true };

        store.write(window.clone()).await.unwrap();

        assert_eq!(store.read().await, window);
        assert_eq!(store.history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_layout_on_disk() {
        let dir = tempdir().unwrap();
        let store: Storage = Storage::open(dir.path().join("settings.json"));
        let mut doc = Document::new();
        doc.insert("theme".to_string(), json!("dark"));

        store.write(doc).await.unwrap();
        store.flush().await;

        let layout = store.layout();
        let on_disk: serde_json::Value =
            serde_json::from_slice(&fs::read(layout.primary()).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"theme": "dark"}));

        let history = store.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(fs::read(history[0].path()).unwrap(), fs::read(layout.primary()).unwrap());
        assert_eq!(fs::read_dir(layout.temp_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_compact_format() {
        let dir = tempdir().unwrap();
        let store = Storage::with_format(
            dir.path().join("compact.json"),
            json!(null),
            JsonFormat::compact(),
            StoreConfig::default(),
        );

        store.write(json!({"a": [1, 2]})).await.unwrap();

        assert_eq!(fs::read(store.path()).unwrap(), br#"{"a":[1,2]}"#);
    }

    #[tokio::test]
    async fn test_history_sequences_strictly_increase() {
        let dir = tempdir().unwrap();
        let store = Storage::with_fallback(dir.path().join("n.json"), 0u32);

        for n in 1..=5u32 {
            store.write(n).await.unwrap();
        }
        store.flush().await;

        let sequences: Vec<u64> = store
            .history()
            .await
            .unwrap()
            .iter()
            .map(HistoryEntry::sequence)
            .collect();
        assert_eq!(sequences.len(), 5);
        assert!(sequences.windows(2).all(|w| w[0] > w[1]));
    }

    #[tokio::test]
    async fn test_inline_prune_mode() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new()
            .with_history_limit(3)
            .with_prune_mode(PruneMode::Inline);
        let store = Storage::with_config(dir.path().join("n.json"), 0u32, config);

        for n in 1..=7u32 {
            store.write(n).await.unwrap();
        }

        // no flush: inline pruning has already run
        let history = store.history().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].read().unwrap(), b"7");
        assert_eq!(history[2].read().unwrap(), b"5");
    }

    #[tokio::test]
    async fn test_exhausted_sequence_leaves_primary_unchanged() {
        let dir = tempdir().unwrap();
        let store = Storage::with_fallback(dir.path().join("n.json"), 0u32);
        store.write(1).await.unwrap();
        store.flush().await;
        let stray = store.layout().history_dir().join("n.json.18446744073709551615");
        fs::write(&stray, b"99").unwrap();

        let second = store.write(2).await;
        let third = store.write(3).await;

        assert!(matches!(second, Err(PersistenceError::InvalidData(_))));
        assert!(matches!(third, Err(PersistenceError::InvalidData(_))));
        assert_eq!(fs::read(store.path()).unwrap(), b"1");
        assert_eq!(store.history().await.unwrap().len(), 2);

        fs::remove_file(&stray).unwrap();
        store.write(4).await.unwrap();
        assert_eq!(store.read().await, 4);
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let dir = tempdir().unwrap();
        let store: Storage = Storage::open(dir.path().join("settings.json"));
        store.write(Document::new()).await.unwrap();
        store.flush().await;

        store.delete().await.unwrap();

        let layout = store.layout();
        assert!(!layout.primary().exists());
        assert!(!layout.history_dir().exists());
        assert!(!layout.temp_dir().exists());
        assert!(store.history().await.unwrap().is_empty());
        assert_eq!(store.read_recovered().await.source, Source::Fallback);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = tempdir().unwrap();
        let store: Storage = Storage::open(dir.path().join("never-written.json"));

        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_onto_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();
        let store: Storage = Storage::open(&path);

        let result = store.write(Document::new()).await;

        assert!(result.is_err());
        assert!(path.is_dir());
        assert!(store.history().await.unwrap().is_empty());
    }
}
