// ============================================================================
// cinestage-core/src/pipeline/state.rs
// ============================================================================
//
// RUN STATE MACHINE
//
// INIT -> ANALYZE -> CAPTION -> DENOISE -> INTERPOLATE -> UPSCALE -> PACKAGE
//      -> QUALITY_CHECK -> REPORT -> DONE
//
// FAILED is reachable from every non-terminal state. DONE and FAILED are
// terminal.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Analyze,
    Caption,
    Denoise,
    Interpolate,
    Upscale,
    Package,
    QualityCheck,
    Report,
    Done,
    Failed,
}

/// Stage-bearing states in execution order.
pub const STAGE_ORDER: [PipelineState; 8] = [
    PipelineState::Analyze,
    PipelineState::Caption,
    PipelineState::Denoise,
    PipelineState::Interpolate,
    PipelineState::Upscale,
    PipelineState::Package,
    PipelineState::QualityCheck,
    PipelineState::Report,
];

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// The state that follows on success.
    pub fn next(self) -> Option<PipelineState> {
        use PipelineState::*;
        match self {
            Init => Some(Analyze),
            Analyze => Some(Caption),
            Caption => Some(Denoise),
            Denoise => Some(Interpolate),
            Interpolate => Some(Upscale),
            Upscale => Some(Package),
            Package => Some(QualityCheck),
            QualityCheck => Some(Report),
            Report => Some(Done),
            Done | Failed => None,
        }
    }

    pub fn can_transition_to(self, to: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == PipelineState::Failed || self.next() == Some(to)
    }

    /// Name used for the stage's entry in the run report.
    pub fn stage_name(self) -> Option<&'static str> {
        use PipelineState::*;
        match self {
            Analyze => Some("analysis"),
            Caption => Some("captions"),
            Denoise => Some("denoise"),
            Interpolate => Some("interpolate"),
            Upscale => Some("upscale"),
            Package => Some("packaging"),
            QualityCheck => Some("quality_check"),
            Report => Some("report"),
            Init | Done | Failed => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Init => "INIT",
            PipelineState::Analyze => "ANALYZE",
            PipelineState::Caption => "CAPTION",
            PipelineState::Denoise => "DENOISE",
            PipelineState::Interpolate => "INTERPOLATE",
            PipelineState::Upscale => "UPSCALE",
            PipelineState::Package => "PACKAGE",
            PipelineState::QualityCheck => "QUALITY_CHECK",
            PipelineState::Report => "REPORT",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        };
        f.write_str(label)
    }
}
