//! Temporary file management utilities.
//!
//! Intermediate artifacts (extracted audio, PNG frame sequences) live in
//! `tempfile::TempDir`s created right before the step that needs them. The
//! directory is removed when the guard drops, so cleanup happens on success,
//! on `?` early returns and on panics alike.

use crate::config::PathsConfig;
use crate::error::CoreResult;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{Builder as TempFileBuilder, TempDir};

/// Creates a scoped temporary directory with `prefix`.
///
/// The directory is placed under the configured `temp_dir` when set,
/// otherwise under `fallback` (normally the stage's output directory).
pub fn create_temp_dir(paths: &PathsConfig, fallback: &Path, prefix: &str) -> CoreResult<TempDir> {
    let base = paths.temp_dir.as_deref().unwrap_or(fallback);
    fs::create_dir_all(base)?;

    Ok(TempFileBuilder::new()
        .prefix(&format!("{prefix}_"))
        .tempdir_in(base)?)
}

/// Moves `file` out of a scoped directory into `dest_dir` so it survives the
/// guard. Falls back to copying when the two are on different filesystems.
pub fn persist_file(file: &Path, dest_dir: &Path) -> CoreResult<PathBuf> {
    fs::create_dir_all(dest_dir)?;
    let name = file.file_name().unwrap_or_else(|| file.as_os_str());
    let dest = dest_dir.join(name);
    if fs::rename(file, &dest).is_err() {
        fs::copy(file, &dest)?;
        fs::remove_file(file)?;
    }
    Ok(dest)
}
