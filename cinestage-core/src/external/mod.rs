// ============================================================================
// cinestage-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: The Single Choke Point for Subprocess Execution
//
// Every external binary the pipeline drives (ffmpeg, the speech-to-text tool,
// the super-resolution and frame-interpolation tools) is launched through the
// `ToolInvoker` trait. The invoker validates arguments, enforces timeouts and
// cancellation, verifies that promised artifacts exist, and removes partial
// outputs whenever an invocation does not complete cleanly.
//
// KEY COMPONENTS:
// - ToolInvoker: Trait implemented by the real process runner and test mocks
// - ToolError / ToolOutput: Typed results of one invocation
// - ToolCommand / FilterGraph: Structured argument builders
// - CancelToken: Cooperative cancellation
// - check_dependency: Startup probe for required binaries
//
// DESIGN PHILOSOPHY:
// Stages never spawn processes themselves; they build a `ToolCommand` and hand
// it to whichever invoker the coordinator was constructed with.

// ---- Internal crate imports ----
use crate::error::{CoreError, CoreResult};

// ---- External crate imports ----
use thiserror::Error;

// ---- Standard library imports ----
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

// ============================================================================
// SUBMODULES
// ============================================================================

pub mod cancel;
pub mod command;
pub mod filter;
pub mod process;

#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use cancel::CancelToken;
pub use command::{ExpectedOutput, Tool, ToolCommand};
pub use filter::{Filter, FilterChain, FilterGraph};
pub use process::ProcessInvoker;

// ============================================================================
// INVOCATION RESULTS
// ============================================================================

/// Failure modes of a single tool invocation.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("executable for '{tool}' not found")]
    NotFound { tool: String },

    #[error("'{tool}' exited with code {code:?}: {stderr}")]
    NonZeroExit {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("'{tool}' timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error("'{tool}' did not produce {}", .path.display())]
    OutputMissing { tool: String, path: PathBuf },

    #[error("'{tool}' was cancelled")]
    Cancelled { tool: String },

    #[error("failed to start '{tool}': {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid arguments: {0}")]
    InvalidArgument(String),
}

/// Captured result of a successful invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

// ============================================================================
// INVOKER TRAIT
// ============================================================================

/// Runs external tools on behalf of pipeline stages.
///
/// Implementations must guarantee that when `execute` returns an error, none
/// of the command's expected outputs are left on disk. Invocations are
/// at-most-once; retrying is the caller's decision.
pub trait ToolInvoker: Send + Sync {
    fn execute(&self, command: &ToolCommand, cancel: &CancelToken) -> Result<ToolOutput, ToolError>;
}

// ============================================================================
// DEPENDENCY CHECKING
// ============================================================================

/// Checks that an external command is available by running it with `version_arg`.
///
/// Only a missing executable is treated as an error; tools that print their
/// version and exit non-zero are still considered present.
pub fn check_dependency(cmd_name: &str, version_arg: &str) -> CoreResult<()> {
    log::debug!("Checking for dependency: {} {}", cmd_name, version_arg);
    let result = Command::new(cmd_name)
        .arg(version_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(status) => {
            log::debug!("'{}' found (exit status {})", cmd_name, status);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("Dependency '{}' not found", cmd_name);
            Err(CoreError::ToolUnavailable {
                tool: cmd_name.to_string(),
            })
        }
        Err(e) => Err(CoreError::ToolExecution {
            tool: cmd_name.to_string(),
            code: None,
            stderr: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dependency_is_reported_as_unavailable() {
        let err = check_dependency("cinestage-definitely-missing-binary", "-version")
            .expect_err("binary should not exist");
        assert!(err.is_tool_unavailable());
    }
}
