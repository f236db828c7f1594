//! Write-to-temp-then-rename helpers.
//!
//! A reader of the canonical path only ever sees the previous complete file
//! or the new complete file.

use crate::core::error::PersistenceError;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// New file contents written next to their destination but not yet visible.
pub struct StagedFile {
    inner: NamedTempFile,
}

impl StagedFile {
    pub fn temp_path(&self) -> &Path {
        self.inner.path()
    }

    /// Atomically replaces `dest` with the staged contents.
    pub fn commit(self, dest: &Path) -> Result<(), PersistenceError> {
        self.inner
            .persist(dest)
            .map_err(|e| PersistenceError::io(dest, e.error))?;
        Ok(())
    }
}

/// Serializes `value` as pretty JSON into a temp file in `dest`'s directory.
/// Dropping the result without committing removes the temp file.
pub fn stage_json<T: Serialize + ?Sized>(
    dest: &Path,
    value: &T,
) -> Result<StagedFile, PersistenceError> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;

    let bytes = serde_json::to_vec_pretty(value)?;
    let mut inner = NamedTempFile::new_in(dir).map_err(|e| PersistenceError::io(dir, e))?;
    inner
        .write_all(&bytes)
        .and_then(|_| inner.as_file().sync_all())
        .map_err(|e| PersistenceError::io(inner.path(), e))?;
    Ok(StagedFile { inner })
}

pub fn write_json_atomic<T: Serialize + ?Sized>(
    dest: &Path,
    value: &T,
) -> Result<(), PersistenceError> {
    stage_json(dest, value)?.commit(dest)
}
