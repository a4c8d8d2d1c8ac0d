//! Crash-safe persistence of a single value.
//!
//! A [`Storage`] handle binds a file path and a fallback value. Every write
//! replaces the file atomically (stage, fsync, rename) and keeps a copy in
//! a rotating history next to it. Every read falls back to the newest
//! history entry that still decodes when the file is missing or corrupt,
//! restoring the file as a side effect, and to the fallback value when
//! nothing usable is left.
//!
//! ```text
//! <dir>/
//! ├── settings.json
//! ├── .settings.json.history/
//! │   ├── settings.json.1767225600000
//! │   └── settings.json.1767225601250
//! └── .settings.json.tmp/
//! ```
//!
//! # Example
//!
//! ```no_run
//! use keepfile_persistence::{Source, Storage};
//! use serde_json::json;
//!
//! # async fn example() -> keepfile_persistence::Result<()> {
//! let store: Storage = Storage::open("/home/user/.config/app/settings.json");
//!
//! let mut settings = store.read().await;
//! settings.insert("volume".to_string(), json!(7));
//! store.write(settings).await?;
//!
//! let recovered = store.read_recovered().await;
//! assert_eq!(recovered.source, Source::Primary);
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod config;
pub mod error;
pub mod format;
pub mod gate;
pub mod history;
pub mod layout;
pub mod rollback;
pub mod store;

pub use config::{PruneMode, StoreConfig};
pub use error::{PersistenceError, Result};
pub use format::{Format, JsonFormat};
pub use history::{HistoryEntry, PruneReport, DEFAULT_HISTORY_LIMIT};
pub use layout::StoreLayout;
pub use rollback::{Recovered, Source};
pub use store::{Document, Storage};
