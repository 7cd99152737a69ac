// ============================================================================
// cinestage-cli/src/error.rs
// ============================================================================
//
// CLI ERROR HANDLING: Result alias and input checks at the binary boundary
//
// Commands return `anyhow::Result` so core errors can be wrapped with the
// context of the command that hit them. `main` prints the chain and exits
// with status 1.
//
// AI-ASSISTANT-INFO: CLI error handling utilities

use anyhow::{Context, bail};
use std::path::{Path, PathBuf};

/// Result type for CLI operations.
pub type CliResult<T> = anyhow::Result<T>;

/// Resolves `path` to an existing regular file.
pub fn require_input_file(path: &Path) -> CliResult<PathBuf> {
    let resolved = path
        .canonicalize()
        .with_context(|| format!("Invalid input path '{}'", path.display()))?;
    if !resolved.is_file() {
        bail!("Input path '{}' is not a file", path.display());
    }
    Ok(resolved)
}

/// Renders an error with its cause chain on one line.
pub fn render_chain(error: &anyhow::Error) -> String {
    error
        .chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}
