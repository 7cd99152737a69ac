// ============================================================================
// cinestage-core/src/error.rs
// ============================================================================
//
// ERROR HANDLING: Error Types for the Cinestage Core Library
//
// This module defines the error taxonomy used throughout cinestage-core. Every
// fallible operation in the crate returns `CoreResult<T>`; tool-level failures
// raised by the invoker (`ToolError`) are folded into the matching `CoreError`
// variant so the coordinator can decide between degrading and aborting.
//
// KEY COMPONENTS:
// - CoreError: Main error enum for all library operations
// - CoreResult: Result alias used across the crate
// - Classification helpers used by the coordinator's degradation rules

// ---- Internal crate imports ----
use crate::external::ToolError;

// ---- External crate imports ----
use thiserror::Error;

// ---- Standard library imports ----
use std::io;
use std::path::PathBuf;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Main error type for the Cinestage core library.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid input, missing input file or out-of-range configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The binary backing a stage could not be located.
    #[error("Required tool '{tool}' is unavailable")]
    ToolUnavailable { tool: String },

    /// The tool ran but exited unsuccessfully.
    #[error("Tool '{tool}' failed (exit code {code:?}): {stderr}")]
    ToolExecution {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The tool exited cleanly but an expected artifact was not produced.
    #[error("Tool '{tool}' reported success but did not produce {}", .path.display())]
    OutputMissing { tool: String, path: PathBuf },

    /// The tool exceeded its configured time limit and was terminated.
    #[error("Tool '{tool}' timed out after {secs}s")]
    ToolTimeout { tool: String, secs: u64 },

    /// The run (or the tool invocation) was cancelled.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// An artifact-producing stage failed and the run was aborted.
    #[error("Stage '{stage}' failed: {source}")]
    PartialPipelineFailure {
        stage: String,
        #[source]
        source: Box<CoreError>,
    },

    /// Master manifest variant count does not match the encoding ladder.
    #[error("Manifest integrity check failed: expected {expected} variants, found {actual}")]
    ManifestIntegrity { expected: usize, actual: usize },

    /// Multi-source merge inputs disagree on codec parameters.
    #[error("Incompatible merge sources: {0}")]
    IncompatibleSources(String),

    /// Media inspection failed for a file.
    #[error("Failed to probe '{}': {message}", .path.display())]
    Probe { path: PathBuf, message: String },

    /// Signal analysis could not complete.
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// The bounded worker pool could not be created.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse configuration file: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Notification error: {0}")]
    Notification(String),

    /// A run record was mutated after it reached a terminal state, or moved
    /// through the stage machine out of order.
    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),
}

/// Result alias used throughout cinestage-core.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Wraps a stage failure so the coordinator can report which stage aborted the run.
    pub fn stage_failed(stage: impl Into<String>, source: CoreError) -> Self {
        CoreError::PartialPipelineFailure {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// True when the failure means the backing binary is missing.
    pub fn is_tool_unavailable(&self) -> bool {
        matches!(self, CoreError::ToolUnavailable { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            CoreError::Cancelled(_) => true,
            CoreError::PartialPipelineFailure { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Short machine-readable label used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Configuration(_) => "configuration",
            CoreError::ToolUnavailable { .. } => "tool_unavailable",
            CoreError::ToolExecution { .. } => "tool_execution",
            CoreError::OutputMissing { .. } => "output_missing",
            CoreError::ToolTimeout { .. } => "tool_timeout",
            CoreError::Cancelled(_) => "cancelled",
            CoreError::PartialPipelineFailure { .. } => "partial_pipeline_failure",
            CoreError::ManifestIntegrity { .. } => "manifest_integrity",
            CoreError::IncompatibleSources(_) => "incompatible_sources",
            CoreError::Probe { .. } => "probe",
            CoreError::Analysis(_) => "analysis",
            CoreError::WorkerPool(_) => "worker_pool",
            CoreError::Io(_) => "io",
            CoreError::Json(_) => "json",
            CoreError::TomlParse(_) | CoreError::TomlSerialize(_) => "config_file",
            CoreError::Notification(_) => "notification",
            CoreError::InvalidState(_) => "invalid_state",
        }
    }
}

impl From<ToolError> for CoreError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotFound { tool } => CoreError::ToolUnavailable { tool },
            ToolError::NonZeroExit { tool, code, stderr } => {
                CoreError::ToolExecution { tool, code, stderr }
            }
            ToolError::OutputMissing { tool, path } => CoreError::OutputMissing { tool, path },
            ToolError::Timeout { tool, after } => CoreError::ToolTimeout {
                tool,
                secs: after.as_secs(),
            },
            ToolError::Cancelled { tool } => {
                CoreError::Cancelled(format!("'{tool}' was terminated"))
            }
            ToolError::Spawn { tool, source } => CoreError::ToolExecution {
                tool,
                code: None,
                stderr: source.to_string(),
            },
            ToolError::InvalidArgument(msg) => CoreError::Configuration(msg),
        }
    }
}
