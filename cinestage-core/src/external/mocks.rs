// cinestage-core/src/external/mocks.rs

// --- Mocking Infrastructure (for testing) ---

// Compiled for unit tests and when the "test-mocks" feature is enabled.
#![cfg(any(test, feature = "test-mocks"))]

use super::*;
use crate::error::CoreResult;
use crate::media::{MediaArtifact, MediaProber, Resolution, canonicalize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// What a mocked invocation should do.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Exit 0 and materialize every expected output.
    Success { stdout: String, stderr: String },
    /// Exit with the given code; no outputs are left behind.
    Exit { code: i32, stderr: String },
    /// Exit 0 and write `contents` into every expected file output.
    Writes { contents: String, stderr: String },
    /// Exit 0 without producing the expected outputs.
    NoOutput,
    /// Behave as if the time limit was hit.
    Timeout,
}

impl MockResponse {
    pub fn ok() -> Self {
        MockResponse::Success {
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Success whose file outputs hold `contents`, such as a scripted JSON log.
    pub fn writes(contents: &str) -> Self {
        MockResponse::Writes {
            contents: contents.to_string(),
            stderr: String::new(),
        }
    }

    pub fn with_stderr(stderr: &str) -> Self {
        MockResponse::Success {
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

struct MockExpectation {
    tool: Tool,
    arg_pattern: Option<String>,
    response: MockResponse,
    delay: Option<Duration>,
}

/// Records every command and answers with scripted responses.
///
/// Expectations are matched in insertion order against the tool and a
/// substring of the space-joined arguments. Unmatched commands succeed.
#[derive(Default)]
pub struct MockInvoker {
    expectations: Mutex<Vec<MockExpectation>>,
    unavailable: Mutex<HashSet<Tool>>,
    received_calls: Mutex<Vec<ToolCommand>>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(&self, tool: Tool, arg_pattern: Option<&str>, response: MockResponse) {
        self.push(tool, arg_pattern, response, None);
    }

    /// Like `expect`, but sleeps before answering to reorder parallel completions.
    pub fn expect_delayed(
        &self,
        tool: Tool,
        arg_pattern: Option<&str>,
        response: MockResponse,
        delay: Duration,
    ) {
        self.push(tool, arg_pattern, response, Some(delay));
    }

    /// Every invocation of `tool` fails as if the binary were not installed.
    pub fn mark_unavailable(&self, tool: Tool) {
        lock(&self.unavailable).insert(tool);
    }

    pub fn calls(&self) -> Vec<ToolCommand> {
        lock(&self.received_calls).clone()
    }

    pub fn calls_for(&self, tool: Tool) -> Vec<ToolCommand> {
        self.calls()
            .into_iter()
            .filter(|c| c.tool() == tool)
            .collect()
    }

    fn push(&self, tool: Tool, arg_pattern: Option<&str>, response: MockResponse, delay: Option<Duration>) {
        lock(&self.expectations).push(MockExpectation {
            tool,
            arg_pattern: arg_pattern.map(str::to_string),
            response,
            delay,
        });
    }

    fn respond_to(&self, command: &ToolCommand) -> (MockResponse, Option<Duration>) {
        let joined = command.args_lossy().join(" ");
        lock(&self.expectations)
            .iter()
            .find(|e| {
                e.tool == command.tool()
                    && e.arg_pattern.as_ref().is_none_or(|p| joined.contains(p.as_str()))
            })
            .map(|e| (e.response.clone(), e.delay))
            .unwrap_or((MockResponse::ok(), None))
    }
}

impl ToolInvoker for MockInvoker {
    fn execute(&self, command: &ToolCommand, cancel: &CancelToken) -> Result<ToolOutput, ToolError> {
        command.validate()?;
        lock(&self.received_calls).push(command.clone());
        let tool = command.tool().label().to_string();
        log::debug!("MockInvoker: {}", command);

        if lock(&self.unavailable).contains(&command.tool()) {
            return Err(ToolError::NotFound { tool });
        }

        let (response, delay) = self.respond_to(command);
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if cancel.is_cancelled() {
            process::remove_outputs(command.expected_outputs());
            return Err(ToolError::Cancelled { tool });
        }

        match response {
            MockResponse::Success { stdout, stderr } => {
                for output in command.expected_outputs() {
                    materialize(output, b"mock output").map_err(|source| ToolError::Spawn {
                        tool: tool.clone(),
                        source,
                    })?;
                }
                Ok(ToolOutput {
                    exit_code: Some(0),
                    stdout,
                    stderr,
                    elapsed: delay.unwrap_or_default(),
                })
            }
            MockResponse::Writes { contents, stderr } => {
                for output in command.expected_outputs() {
                    materialize(output, contents.as_bytes()).map_err(|source| ToolError::Spawn {
                        tool: tool.clone(),
                        source,
                    })?;
                }
                Ok(ToolOutput {
                    exit_code: Some(0),
                    stdout: String::new(),
                    stderr,
                    elapsed: delay.unwrap_or_default(),
                })
            }
            MockResponse::Exit { code, stderr } => {
                process::remove_outputs(command.expected_outputs());
                Err(ToolError::NonZeroExit {
                    tool,
                    code: Some(code),
                    stderr,
                })
            }
            MockResponse::NoOutput => match command.expected_outputs().first() {
                Some(output) => Err(ToolError::OutputMissing {
                    tool,
                    path: output.path().to_path_buf(),
                }),
                None => Ok(ToolOutput::default()),
            },
            MockResponse::Timeout => {
                process::remove_outputs(command.expected_outputs());
                Err(ToolError::Timeout {
                    tool,
                    after: Duration::from_secs(1),
                })
            }
        }
    }
}

fn materialize(output: &ExpectedOutput, contents: &[u8]) -> std::io::Result<()> {
    match output {
        ExpectedOutput::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, contents)
        }
        ExpectedOutput::NonEmptyDir(path) => {
            fs::create_dir_all(path)?;
            fs::write(path.join("frame_000001.png"), b"mock frame")
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MOCK PROBER
// ============================================================================

/// `MediaProber` that answers from a table, falling back to a template.
#[derive(Default)]
pub struct MockProber {
    known: Mutex<HashMap<PathBuf, MediaArtifact>>,
    template: Option<MediaArtifact>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl MockProber {
    /// Any path probes as a 1280x720 H.264 clip at `frame_rate`.
    pub fn with_frame_rate(frame_rate: f64) -> Self {
        Self {
            template: Some(sample_artifact(Path::new("template.mp4"), frame_rate)),
            ..Self::default()
        }
    }

    pub fn insert(&self, artifact: MediaArtifact) {
        lock(&self.known).insert(artifact.path.clone(), artifact);
    }

    pub fn fail_on(&self, path: &Path) {
        lock(&self.failing).insert(path.to_path_buf());
    }
}

impl MediaProber for MockProber {
    fn probe(&self, path: &Path) -> CoreResult<MediaArtifact> {
        if lock(&self.failing).contains(path) {
            return Err(crate::error::CoreError::Probe {
                path: path.to_path_buf(),
                message: "mock probe failure".to_string(),
            });
        }
        if let Some(known) = lock(&self.known).get(path) {
            return Ok(known.clone());
        }
        match &self.template {
            Some(template) => Ok(MediaArtifact {
                path: path.to_path_buf(),
                canonical_path: canonicalize(path),
                ..template.clone()
            }),
            None => Err(crate::error::CoreError::Probe {
                path: path.to_path_buf(),
                message: "unknown path in MockProber".to_string(),
            }),
        }
    }
}

/// A plausible artifact for `path`, used by tests and the mock prober.
pub fn sample_artifact(path: &Path, frame_rate: f64) -> MediaArtifact {
    MediaArtifact {
        path: path.to_path_buf(),
        canonical_path: canonicalize(path),
        container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
        codec: Some("h264".to_string()),
        resolution: Resolution::new(1280, 720),
        frame_rate,
        duration_secs: 10.0,
        pix_fmt: Some("yuv420p".to_string()),
        frame_count: Some((10.0 * frame_rate) as u64),
        has_audio: true,
    }
}
