//! On-disk layout of a stored value.
//!
//! For a primary file `<dir>/<base>` the store uses:
//! ```text
//! <dir>/
//! ├── <base>                     # primary file
//! ├── .<base>.history/
//! │   ├── <base>.1767225600000   # history entries, one per write
//! │   └── <base>.1767225600001
//! └── .<base>.tmp/               # staging area for atomic renames
//! ```

use std::path::{Component, Path, PathBuf};

/// Base name used when the configured path has no final component.
const UNNAMED_BASE: &str = "keepfile";

/// Resolved paths for one stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    primary: PathBuf,
    base_name: String,
    history_dir: PathBuf,
    temp_dir: PathBuf,
}

impl StoreLayout {
    /// Resolves the layout for a primary path.
    ///
    /// Does not touch the file system.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let primary = normalize(path.as_ref());
        let base_name = primary
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNNAMED_BASE.to_string());
        let dir = primary
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            history_dir: dir.join(format!(".{}.history", base_name)),
            temp_dir: dir.join(format!(".{}.tmp", base_name)),
            primary,
            base_name,
        }
    }

    /// The primary file holding the current value.
    pub fn primary(&self) -> &Path {
        &self.primary
    }

    /// The primary file's base name; history entries are `<base>.<sequence>`.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Directory holding history entries.
    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }

    /// Directory used to stage files before they are renamed into place.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Path of the history entry with the given sequence-id.
    pub fn entry_path(&self, sequence: u64) -> PathBuf {
        self.history_dir.join(format!("{}.{}", self.base_name, sequence))
    }

    /// Parses the sequence-id out of a history file name.
    ///
    /// Only names of the exact form `<base>.<digits>` match.
    pub fn parse_entry_name(&self, file_name: &str) -> Option<u64> {
        let suffix = file_name
            .strip_prefix(self.base_name.as_str())?
            .strip_prefix('.')?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        suffix.parse().ok()
    }
}

/// Makes a path absolute and folds `.` and `..` lexically.
///
/// This is the key used by the path gate, so two spellings of the same
/// path share one lock.
pub fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
