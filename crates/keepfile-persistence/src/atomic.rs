//! Atomic file operations for crash-safe persistence.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tracing::trace;

use crate::error::{PersistenceError, Result};

/// Writes data to a file atomically.
///
/// The payload is staged in a uniquely named file inside `temp_dir`,
/// synced to disk, then renamed over `path`. Readers of `path` see either
/// the previous content or the complete new content, never a mix.
///
/// `temp_dir` must be on the same file system as `path`; it is created if
/// missing.
///
/// # Errors
/// Returns an error if any step fails. The destination then keeps its
/// previous content and the staged file is removed.
pub fn write_atomic(path: &Path, data: &[u8], temp_dir: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    ensure_dir(temp_dir)?;

    let prefix = path
        .file_name()
        .map(|name| format!(".{}.", name.to_string_lossy()))
        .unwrap_or_else(|| ".staged.".to_string());
    let mut temp_file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(temp_dir)
        .map_err(|source| PersistenceError::WriteError {
            path: temp_dir.to_path_buf(),
            source,
        })?;

    let staged = temp_file.path().to_path_buf();
    let staged_error = |source: std::io::Error| PersistenceError::WriteError {
        path: staged.clone(),
        source,
    };

    temp_file.write_all(data).map_err(staged_error)?;
    temp_file.flush().map_err(staged_error)?;
    temp_file.as_file().sync_all().map_err(staged_error)?;

    trace!(staged = %staged.display(), target = %path.display(), "renaming staged file");

    temp_file
        .persist(path)
        .map_err(|e| PersistenceError::WriteError {
            path: path.to_path_buf(),
            source: e.error,
        })?;

    sync_parent(path);
    Ok(())
}

/// Reads a file, returning None if it doesn't exist.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(source) if source.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PersistenceError::ReadError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Creates a directory and its parents if it doesn't exist.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        fs::create_dir_all(dir).map_err(|source| PersistenceError::DirectoryError {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Removes a file; a missing file is not an error.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistenceError::RemoveError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Removes a directory tree; a missing directory is not an error.
pub fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistenceError::RemoveError {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Best-effort fsync of the directory containing `path`, making the rename durable.
#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}
