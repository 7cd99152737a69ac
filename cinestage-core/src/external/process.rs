// ============================================================================
// cinestage-core/src/external/process.rs
// ============================================================================
//
// PROCESS INVOKER: std::process Implementation of ToolInvoker
//
// Spawns the tool directly (no shell), drains stdout and stderr on helper
// threads, and polls the child so that timeouts and cancellation can kill it.
// Expected outputs are cleared before the run and removed again on any
// failure path. Reader threads of a killed child are detached rather than
// joined; they end once the pipes close.

// ---- Internal crate imports ----
use crate::external::{CancelToken, ExpectedOutput, ToolCommand, ToolError, ToolInvoker, ToolOutput};
use crate::logging::log_command;

// ---- Standard library imports ----
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lines of stderr kept in error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Runs tools as child processes of the current process.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    default_timeout: Option<Duration>,
    poll_interval: Duration,
}

impl Default for ProcessInvoker {
    fn default() -> Self {
        Self {
            default_timeout: None,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl ProcessInvoker {
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self {
            default_timeout,
            ..Self::default()
        }
    }

    fn spawn(&self, command: &ToolCommand) -> Result<Child, ToolError> {
        let tool = command.tool().label().to_string();
        Command::new(command.program())
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ToolError::NotFound { tool },
                _ => ToolError::Spawn { tool, source: e },
            })
    }
}

impl ToolInvoker for ProcessInvoker {
    fn execute(&self, command: &ToolCommand, cancel: &CancelToken) -> Result<ToolOutput, ToolError> {
        command.validate()?;
        let tool = command.tool().label().to_string();

        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled { tool });
        }

        prepare_outputs(command.expected_outputs())
            .map_err(|source| ToolError::Spawn { tool: tool.clone(), source })?;

        log_command(command);
        let started = Instant::now();
        let mut child = self.spawn(command)?;

        let stdout = child.stdout.take().map(|s| drain(s, false));
        let stderr = child.stderr.take().map(|s| drain(s, true));

        let limit = command.time_limit().or(self.default_timeout);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    terminate(&mut child);
                    remove_outputs(command.expected_outputs());
                    return Err(ToolError::Spawn { tool, source: e });
                }
            }
            if cancel.is_cancelled() {
                log::warn!("Cancelling {}", tool);
                terminate(&mut child);
                remove_outputs(command.expected_outputs());
                return Err(ToolError::Cancelled { tool });
            }
            if let Some(limit) = limit {
                if started.elapsed() >= limit {
                    log::error!("{} exceeded its {:?} time limit", tool, limit);
                    terminate(&mut child);
                    remove_outputs(command.expected_outputs());
                    return Err(ToolError::Timeout { tool, after: limit });
                }
            }
            thread::sleep(self.poll_interval);
        };

        let stdout = join(stdout);
        let stderr = join(stderr);
        let elapsed = started.elapsed();

        if !status.success() {
            remove_outputs(command.expected_outputs());
            log::error!("{} exited with {}", tool, status);
            return Err(ToolError::NonZeroExit {
                tool,
                code: status.code(),
                stderr: tail(&stderr, STDERR_TAIL_LINES),
            });
        }

        if let Some(missing) = command
            .expected_outputs()
            .iter()
            .find(|output| !output.is_satisfied())
        {
            let path = missing.path().to_path_buf();
            remove_outputs(command.expected_outputs());
            return Err(ToolError::OutputMissing { tool, path });
        }

        log::debug!("{} finished in {:.1}s", tool, elapsed.as_secs_f64());
        Ok(ToolOutput {
            exit_code: status.code(),
            stdout,
            stderr,
            elapsed,
        })
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn drain<R: Read + Send + 'static>(stream: R, is_stderr: bool) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut collected = String::new();
        for line in BufReader::new(stream).lines().map_while(Result::ok) {
            if is_stderr {
                log::trace!("STDERR: {}", line);
            } else {
                log::trace!("STDOUT: {}", line);
            }
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("kill failed (process may have exited): {}", e);
    }
    let _ = child.wait();
}

/// Clears stale artifacts from an earlier attempt and creates parent directories.
fn prepare_outputs(outputs: &[ExpectedOutput]) -> io::Result<()> {
    for output in outputs {
        match output {
            ExpectedOutput::File(path) => {
                if path.is_file() {
                    fs::remove_file(path)?;
                }
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
            }
            ExpectedOutput::NonEmptyDir(path) => {
                if path.is_dir() {
                    fs::remove_dir_all(path)?;
                }
                fs::create_dir_all(path)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn remove_outputs(outputs: &[ExpectedOutput]) {
    for output in outputs {
        let result = match output {
            ExpectedOutput::File(path) if path.exists() => fs::remove_file(path),
            ExpectedOutput::NonEmptyDir(path) if path.exists() => fs::remove_dir_all(path),
            _ => Ok(()),
        };
        if let Err(e) = result {
            log::warn!(
                "Failed to remove partial output {}: {}",
                output.path().display(),
                e
            );
        }
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
