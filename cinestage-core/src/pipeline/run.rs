// ============================================================================
// cinestage-core/src/pipeline/run.rs
// ============================================================================
//
// RUN RECORD: Stage Results and the Append-Only PipelineRun
//
// The coordinator owns exactly one `PipelineRun`. Stage results are only
// ever appended, in execution order, and once the run reaches DONE or FAILED
// every mutator returns `InvalidState`.

use super::state::PipelineState;
use crate::decision::DecisionRecord;
use crate::error::{CoreError, CoreResult};
use crate::media::MediaArtifact;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use std::error::Error as _;
use std::path::{Path, PathBuf};

// ============================================================================
// STAGE RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Skipped,
    Failed,
    /// Advisory stage that finished with partial results.
    Degraded,
}

/// Outcome of one stage, as recorded in the run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub stage_name: String,
    pub executed: bool,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Artifact that is current after this stage; the input when skipped.
    pub output_artifact: PathBuf,
    pub metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageResult {
    pub fn completed(stage: &str, output: &Path, metadata: Value) -> Self {
        Self {
            stage_name: stage.to_string(),
            executed: true,
            status: StageStatus::Completed,
            skip_reason: None,
            output_artifact: output.to_path_buf(),
            metadata,
            error: None,
        }
    }

    /// A stage that did not run; `forwarded` is the unchanged current artifact.
    pub fn skipped(stage: &str, reason: impl Into<String>, forwarded: &Path) -> Self {
        Self {
            stage_name: stage.to_string(),
            executed: false,
            status: StageStatus::Skipped,
            skip_reason: Some(reason.into()),
            output_artifact: forwarded.to_path_buf(),
            metadata: Value::Null,
            error: None,
        }
    }

    pub fn failed(stage: &str, error: &CoreError, forwarded: &Path) -> Self {
        Self {
            stage_name: stage.to_string(),
            executed: true,
            status: StageStatus::Failed,
            skip_reason: None,
            output_artifact: forwarded.to_path_buf(),
            metadata: Value::Null,
            error: Some(error.to_string()),
        }
    }

    pub fn degraded(stage: &str, output: &Path, metadata: Value, error: impl Into<String>) -> Self {
        Self {
            stage_name: stage.to_string(),
            executed: true,
            status: StageStatus::Degraded,
            skip_reason: None,
            output_artifact: output.to_path_buf(),
            metadata,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// FAILURE TRACE
// ============================================================================

/// Why the run failed: the stage, the error kind and its source chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureTrace {
    pub stage: String,
    pub kind: String,
    pub message: String,
    /// `Display` of every error in the source chain, outermost first.
    pub chain: Vec<String>,
}

impl FailureTrace {
    pub fn from_error(error: &CoreError) -> Self {
        let (stage, root) = match error {
            CoreError::PartialPipelineFailure { stage, source } => (stage.clone(), source.as_ref()),
            other => ("pipeline".to_string(), other),
        };
        let mut chain = vec![error.to_string()];
        let mut next = error.source();
        while let Some(cause) = next {
            chain.push(cause.to_string());
            next = cause.source();
        }
        Self {
            stage,
            kind: root.kind().to_string(),
            message: root.to_string(),
            chain,
        }
    }
}

// ============================================================================
// PIPELINE RUN
// ============================================================================

/// Append-only record of one run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    run_id: String,
    original: MediaArtifact,
    state: PipelineState,
    stages: Vec<StageResult>,
    final_artifact: MediaArtifact,
    decision_record: Option<DecisionRecord>,
    start_time: DateTime<Local>,
    end_time: Option<DateTime<Local>>,
    final_report_path: Option<PathBuf>,
    delivery_video: Option<PathBuf>,
    failure: Option<FailureTrace>,
}

impl PipelineRun {
    pub fn new(run_id: &str, original: MediaArtifact, start_time: DateTime<Local>) -> Self {
        Self {
            run_id: run_id.to_string(),
            final_artifact: original.clone(),
            original,
            state: PipelineState::Init,
            stages: Vec::new(),
            decision_record: None,
            start_time,
            end_time: None,
            final_report_path: None,
            delivery_video: None,
            failure: None,
        }
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.state.is_terminal() {
            return Err(CoreError::InvalidState(format!(
                "run {} is already {}",
                self.run_id, self.state
            )));
        }
        Ok(())
    }

    /// Moves to `to`, rejecting transitions the state machine does not allow.
    pub fn advance(&mut self, to: PipelineState) -> CoreResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(CoreError::InvalidState(format!(
                "cannot move run {} from {} to {}",
                self.run_id, self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }

    /// Appends a stage result. Each stage may be recorded once.
    pub fn record(&mut self, result: StageResult) -> CoreResult<()> {
        self.ensure_open()?;
        if self.stage(&result.stage_name).is_some() {
            return Err(CoreError::InvalidState(format!(
                "stage '{}' already recorded for run {}",
                result.stage_name, self.run_id
            )));
        }
        self.stages.push(result);
        Ok(())
    }

    pub fn set_decision_record(&mut self, record: DecisionRecord) -> CoreResult<()> {
        self.ensure_open()?;
        self.decision_record = Some(record);
        Ok(())
    }

    /// Replaces the current artifact with the output of a completed stage.
    pub fn set_final_artifact(&mut self, artifact: MediaArtifact) -> CoreResult<()> {
        self.ensure_open()?;
        self.final_artifact = artifact;
        Ok(())
    }

    pub fn set_final_report(&mut self, report_path: PathBuf, delivery_video: PathBuf) -> CoreResult<()> {
        self.ensure_open()?;
        self.final_report_path = Some(report_path);
        self.delivery_video = Some(delivery_video);
        Ok(())
    }

    /// Seals the run: DONE without a failure, FAILED with one.
    pub fn finish(&mut self, end_time: DateTime<Local>, failure: Option<FailureTrace>) -> CoreResult<()> {
        let terminal = if failure.is_some() {
            PipelineState::Failed
        } else {
            PipelineState::Done
        };
        if terminal == PipelineState::Done && self.state != PipelineState::Report {
            return Err(CoreError::InvalidState(format!(
                "run {} cannot complete from {}",
                self.run_id, self.state
            )));
        }
        self.advance(terminal)?;
        self.end_time = Some(end_time);
        self.failure = failure;
        Ok(())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn original(&self) -> &MediaArtifact {
        &self.original
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage_name == name)
    }

    pub fn final_artifact(&self) -> &MediaArtifact {
        &self.final_artifact
    }

    pub fn decision_record(&self) -> Option<&DecisionRecord> {
        self.decision_record.as_ref()
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Local>> {
        self.end_time
    }

    pub fn final_report_path(&self) -> Option<&Path> {
        self.final_report_path.as_deref()
    }

    pub fn delivery_video(&self) -> Option<&Path> {
        self.delivery_video.as_deref()
    }

    pub fn failure(&self) -> Option<&FailureTrace> {
        self.failure.as_ref()
    }

    /// Wall-clock duration, once the run has finished.
    pub fn duration_secs(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }
}
