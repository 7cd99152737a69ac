// ============================================================================
// cinestage-core/src/external/command.rs
// ============================================================================
//
// TOOL COMMANDS: Structured Argument Builder for External Binaries
//
// Commands are assembled as discrete argv entries and handed straight to the
// operating system, never through a shell. Paths stay `OsString`s end to end,
// so filenames with spaces or quotes need no escaping.
//
// KEY COMPONENTS:
// - Tool: The external binaries the pipeline drives
// - ToolCommand: Builder for one invocation plus its expected artifacts
// - ExpectedOutput: Artifact the invoker verifies after a clean exit

// ---- Internal crate imports ----
use crate::external::filter::FilterGraph;
use crate::external::ToolError;

// ---- External crate imports ----
use serde::{Deserialize, Serialize};

// ---- Standard library imports ----
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// TOOLS
// ============================================================================

/// External binaries used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    /// Decoding, filtering, encoding and segmenting.
    Ffmpeg,
    /// Media inspection.
    Ffprobe,
    /// Speech-to-text transcription.
    SpeechToText,
    /// Neural super-resolution.
    SuperResolution,
    /// Neural frame interpolation.
    FrameInterpolation,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
            Tool::SpeechToText => "speech-to-text",
            Tool::SuperResolution => "super-resolution",
            Tool::FrameInterpolation => "frame-interpolation",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// EXPECTED OUTPUTS
// ============================================================================

/// An artifact a command is expected to leave behind on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedOutput {
    /// A regular file that must exist after the tool exits.
    File(PathBuf),
    /// A directory that must exist and contain at least one entry.
    NonEmptyDir(PathBuf),
}

impl ExpectedOutput {
    pub fn path(&self) -> &Path {
        match self {
            ExpectedOutput::File(p) | ExpectedOutput::NonEmptyDir(p) => p,
        }
    }

    /// Whether the artifact is present in the form the tool promised.
    pub fn is_satisfied(&self) -> bool {
        match self {
            ExpectedOutput::File(p) => p.is_file(),
            ExpectedOutput::NonEmptyDir(p) => std::fs::read_dir(p)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false),
        }
    }
}

// ============================================================================
// TOOL COMMAND BUILDER
// ============================================================================

/// A single invocation of an external tool.
///
/// ```rust
/// use cinestage_core::external::{Tool, ToolCommand};
///
/// let cmd = ToolCommand::new(Tool::Ffmpeg, "ffmpeg")
///     .flag("-y")
///     .opt("-i", "input file.mp4")
///     .opt("-c", "copy")
///     .output("out.mp4");
/// assert_eq!(cmd.expected_outputs().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    tool: Tool,
    program: OsString,
    args: Vec<OsString>,
    expected: Vec<ExpectedOutput>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(tool: Tool, program: impl AsRef<OsStr>) -> Self {
        Self {
            tool,
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            expected: Vec::new(),
            timeout: None,
        }
    }

    /// Appends a bare flag such as `-y` or `-hide_banner`.
    pub fn flag(mut self, flag: &str) -> Self {
        self.args.push(flag.into());
        self
    }

    /// Appends a flag followed by its value.
    pub fn opt(mut self, flag: &str, value: impl AsRef<OsStr>) -> Self {
        self.args.push(flag.into());
        self.args.push(value.as_ref().to_os_string());
        self
    }

    /// Appends a flag followed by a rendered filter graph.
    pub fn filter(self, flag: &str, graph: &FilterGraph) -> Self {
        let rendered = graph.render();
        self.opt(flag, rendered)
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl AsRef<OsStr>) -> Self {
        self.args.push(value.as_ref().to_os_string());
        self
    }

    /// Appends an output file path and registers it as an expected artifact.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.args.push(path.as_os_str().to_os_string());
        self.expected.push(ExpectedOutput::File(path));
        self
    }

    /// Registers an artifact the tool writes without it appearing as the last argument.
    pub fn expect(mut self, output: ExpectedOutput) -> Self {
        self.expected.push(output);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn expected_outputs(&self) -> &[ExpectedOutput] {
        &self.expected
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.timeout
    }

    /// Lossy string view of the arguments, for logging and test assertions.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Value that follows the first occurrence of `flag`, if any.
    pub fn value_of(&self, flag: &str) -> Option<String> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|v| v.to_string_lossy().into_owned())
    }

    /// Rejects argument vectors the operating system could not pass intact.
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.program.is_empty() {
            return Err(ToolError::InvalidArgument(format!(
                "no executable configured for {}",
                self.tool
            )));
        }
        for arg in &self.args {
            if arg.to_string_lossy().contains('\0') {
                return Err(ToolError::InvalidArgument(format!(
                    "argument for {} contains a NUL byte",
                    self.tool
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_registers_expected_artifact() {
        let cmd = ToolCommand::new(Tool::Ffmpeg, "ffmpeg")
            .opt("-i", "in.mp4")
            .output("/tmp/out dir/out.mp4");
        assert_eq!(
            cmd.args_lossy(),
            vec!["-i", "in.mp4", "/tmp/out dir/out.mp4"]
        );
        assert_eq!(
            cmd.expected_outputs(),
            &[ExpectedOutput::File(PathBuf::from("/tmp/out dir/out.mp4"))]
        );
        assert_eq!(cmd.value_of("-i").as_deref(), Some("in.mp4"));
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let cmd = ToolCommand::new(Tool::Ffmpeg, "ffmpeg").opt("-i", "my clip.mp4");
        assert_eq!(cmd.to_string(), "ffmpeg -i \"my clip.mp4\"");
    }

    #[test]
    fn validate_rejects_empty_program() {
        let cmd = ToolCommand::new(Tool::SuperResolution, "");
        assert!(matches!(
            cmd.validate(),
            Err(ToolError::InvalidArgument(_))
        ));
    }
}
