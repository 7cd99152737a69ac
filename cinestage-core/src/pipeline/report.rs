// ============================================================================
// cinestage-core/src/pipeline/report.rs
// ============================================================================
//
// REPORTS: Run Report, Final Delivery Report and Minimal Fallback
//
// - RunReport: the structured record of every stage, always attempted
// - FinalReport: delivery video (enhanced video + original audio) and the
//   overall quality grade
// - MinimalReport: input metadata plus the failure trace, written when the
//   full reports cannot be assembled

use super::run::{FailureTrace, PipelineRun};
use super::state::PipelineState;
use super::{RunLayout, StageContext};
use crate::analysis::VideoMetadata;
use crate::decision::DecisionRecord;
use crate::error::{CoreError, CoreResult};
use crate::logging::log_subsection;
use crate::media::MediaArtifact;
use crate::quality::{QualityGrade, QualityMetrics, QualityReport};
use crate::temp_files::create_temp_dir;

use chrono::{DateTime, Local};
use log::{info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

fn write_json<T: Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub original_video: PathBuf,
    pub run_id: String,
    pub status: PipelineState,
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    /// One entry per stage, in execution order.
    pub stages: Map<String, Value>,
    pub decision: Option<DecisionRecord>,
    pub final_video: PathBuf,
    pub final_report_path: Option<PathBuf>,
    pub delivery_video: Option<PathBuf>,
    pub failure: Option<FailureTrace>,
}

impl RunReport {
    pub fn from_run(run: &PipelineRun) -> CoreResult<Self> {
        let mut stages = Map::new();
        for stage in run.stages() {
            stages.insert(stage.stage_name.clone(), serde_json::to_value(stage)?);
        }
        Ok(Self {
            original_video: run.original().path.clone(),
            run_id: run.run_id().to_string(),
            status: run.state(),
            start_time: run.start_time(),
            end_time: run.end_time(),
            stages,
            decision: run.decision_record().cloned(),
            final_video: run.final_artifact().path.clone(),
            final_report_path: run.final_report_path().map(Path::to_path_buf),
            delivery_video: run.delivery_video().map(Path::to_path_buf),
            failure: run.failure().cloned(),
        })
    }

    pub fn write(&self, path: &Path) -> CoreResult<()> {
        write_json(path, self)
    }
}

// ============================================================================
// MINIMAL REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MinimalReport {
    pub original_video: PathBuf,
    pub run_id: String,
    pub status: PipelineState,
    pub input_metadata: VideoMetadata,
    pub stages_recorded: Vec<String>,
    pub failure: Option<FailureTrace>,
    pub generated_at: DateTime<Local>,
}

/// Writes the fallback report: input metadata and the failure trace only.
pub fn write_minimal_report(run: &PipelineRun, path: &Path) -> CoreResult<()> {
    let report = MinimalReport {
        original_video: run.original().path.clone(),
        run_id: run.run_id().to_string(),
        status: run.state(),
        input_metadata: VideoMetadata::from(run.original()),
        stages_recorded: run.stages().iter().map(|s| s.stage_name.clone()).collect(),
        failure: run.failure().cloned(),
        generated_at: Local::now(),
    };
    write_json(path, &report)?;
    warn!("Minimal report written to {}", path.display());
    Ok(())
}

// ============================================================================
// FINAL REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub video_name: String,
    pub run_id: String,
    pub input_video: PathBuf,
    pub enhanced_video: PathBuf,
    pub delivery_video: PathBuf,
    pub audio_included: bool,
    pub quality: Option<QualityMetrics>,
    pub quality_failures: Vec<String>,
    pub overall_grade: QualityGrade,
    pub generated_at: DateTime<Local>,
    #[serde(skip)]
    pub report_path: PathBuf,
}

/// Muxes the original audio onto the final video and writes the final report.
///
/// A failed audio extraction only drops the audio track; a failed mux or
/// report write is returned to the caller.
pub fn assemble_final_report(
    ctx: &StageContext<'_>,
    run_id: &str,
    original: &MediaArtifact,
    final_artifact: &MediaArtifact,
    quality: Option<&QualityReport>,
    layout: &RunLayout,
) -> CoreResult<FinalReport> {
    log_subsection("Final Report");
    let reports_dir = layout.reports_dir();
    fs::create_dir_all(&reports_dir)?;
    let name = layout.name();
    let tools = &ctx.config.tools;

    let scratch = create_temp_dir(&ctx.config.paths, &reports_dir, "final_audio")?;
    let audio = if original.has_audio {
        let audio_path = scratch.path().join(format!("{name}_audio.mka"));
        let extract = tools
            .ffmpeg()
            .opt("-i", &original.path)
            .flag("-vn")
            .opt("-c:a", "copy")
            .output(&audio_path);
        match ctx.invoker.execute(&extract, ctx.cancel) {
            Ok(_) => Some(audio_path),
            Err(e) => {
                let e = CoreError::from(e);
                if e.is_cancelled() {
                    return Err(e);
                }
                warn!("Audio extraction failed, delivering without audio: {}", e);
                None
            }
        }
    } else {
        info!("Input has no audio track");
        None
    };

    let delivery = layout.delivery_video();
    let mux = match &audio {
        Some(audio_path) => tools
            .ffmpeg()
            .opt("-i", &final_artifact.path)
            .opt("-i", audio_path)
            .opt("-c:v", "copy")
            .opt("-c:a", "aac")
            .opt("-b:a", "192k")
            .opt("-map", "0:v:0")
            .opt("-map", "1:a:0")
            .flag("-shortest"),
        None => tools
            .ffmpeg()
            .opt("-i", &final_artifact.path)
            .opt("-c:v", "copy"),
    }
    .output(&delivery);
    ctx.invoker.execute(&mux, ctx.cancel)?;
    drop(scratch);

    let vmaf = quality.and_then(|q| q.metrics.vmaf.score);
    let report = FinalReport {
        video_name: name.to_string(),
        run_id: run_id.to_string(),
        input_video: original.path.clone(),
        enhanced_video: final_artifact.path.clone(),
        delivery_video: delivery,
        audio_included: audio.is_some(),
        quality: quality.map(|q| q.metrics.clone()),
        quality_failures: quality.map(|q| q.failures.clone()).unwrap_or_default(),
        overall_grade: QualityGrade::from_vmaf(vmaf, &ctx.config.quality),
        generated_at: Local::now(),
        report_path: layout.final_report(),
    };
    write_json(&report.report_path, &report)?;
    info!(
        "Final report ({}): {}",
        report.overall_grade,
        report.report_path.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::external::mocks::{MockInvoker, MockProber, MockResponse, sample_artifact};
    use crate::external::{CancelToken, Tool};
    use crate::pipeline::RunId;
    use crate::pipeline::run::StageResult;
    use tempfile::tempdir;

    fn layout(root: &Path) -> RunLayout {
        RunLayout::new(root, "clip", &RunId::from_explicit("r1").unwrap())
    }

    #[test]
    fn run_report_keeps_stage_order() {
        let dir = tempdir().unwrap();
        let original = sample_artifact(Path::new("/v/clip.mp4"), 24.0);
        let mut run = PipelineRun::new("r1", original, Local::now());
        run.advance(PipelineState::Analyze).unwrap();
        run.record(StageResult::completed("analysis", Path::new("/v/clip.mp4"), Value::Null))
            .unwrap();
        run.advance(PipelineState::Caption).unwrap();
        run.record(StageResult::skipped("captions", "disabled", Path::new("/v/clip.mp4")))
            .unwrap();

        let path = dir.path().join("run_report.json");
        RunReport::from_run(&run).unwrap().write(&path).unwrap();
        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

        let stages: Vec<_> = value["stages"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(stages, vec!["analysis", "captions"]);
        assert_eq!(value["stages"]["captions"]["executed"], false);
        assert_eq!(value["stages"]["captions"]["skip_reason"], "disabled");
        assert_eq!(value["status"], "caption");
        assert_eq!(value["original_video"], "/v/clip.mp4");
    }

    #[test]
    fn minimal_report_carries_metadata_and_failure() {
        let dir = tempdir().unwrap();
        let original = sample_artifact(Path::new("/v/clip.mp4"), 24.0);
        let mut run = PipelineRun::new("r1", original, Local::now());
        run.advance(PipelineState::Analyze).unwrap();
        let err = CoreError::stage_failed("analysis", CoreError::Analysis("decoder gave up".into()));
        run.finish(Local::now(), Some(FailureTrace::from_error(&err))).unwrap();

        let path = layout(dir.path()).minimal_report();
        write_minimal_report(&run, &path).unwrap();
        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["input_metadata"]["width"], 1280);
        assert_eq!(value["failure"]["stage"], "analysis");
        assert_eq!(value["status"], "failed");
    }

    fn context<'a>(
        invoker: &'a MockInvoker,
        prober: &'a MockProber,
        config: &'a PipelineConfig,
        cancel: &'a CancelToken,
    ) -> StageContext<'a> {
        StageContext {
            invoker,
            prober,
            config,
            cancel,
        }
    }

    #[test]
    fn delivery_mux_maps_original_audio() {
        let dir = tempdir().unwrap();
        let invoker = MockInvoker::new();
        let prober = MockProber::with_frame_rate(30.0);
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let ctx = context(&invoker, &prober, &config, &cancel);
        let layout = layout(dir.path());

        let original = sample_artifact(Path::new("/v/clip.mp4"), 30.0);
        let upscaled = sample_artifact(&layout.upscaled(), 30.0);
        let report =
            assemble_final_report(&ctx, "r1", &original, &upscaled, None, &layout).unwrap();

        assert!(report.audio_included);
        assert_eq!(report.overall_grade, QualityGrade::NotMeasured);
        assert!(report.report_path.is_file());

        let calls = invoker.calls_for(Tool::Ffmpeg);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].value_of("-c:a").as_deref(), Some("copy"));
        assert_eq!(calls[1].value_of("-b:a").as_deref(), Some("192k"));
        assert!(calls[1].args_lossy().contains(&"-shortest".to_string()));
        // scoped audio is gone once the report is written
        let leftovers: Vec<_> = fs::read_dir(layout.reports_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("final_audio"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn failed_audio_extraction_falls_back_to_video_only() {
        let dir = tempdir().unwrap();
        let invoker = MockInvoker::new();
        invoker.expect(
            Tool::Ffmpeg,
            Some("-vn"),
            MockResponse::Exit {
                code: 1,
                stderr: "Output file #0 does not contain any stream".to_string(),
            },
        );
        let prober = MockProber::with_frame_rate(30.0);
        let config = PipelineConfig::default();
        let cancel = CancelToken::new();
        let ctx = context(&invoker, &prober, &config, &cancel);
        let layout = layout(dir.path());

        let original = sample_artifact(Path::new("/v/clip.mp4"), 30.0);
        let upscaled = sample_artifact(&layout.upscaled(), 30.0);
        let report =
            assemble_final_report(&ctx, "r1", &original, &upscaled, None, &layout).unwrap();

        assert!(!report.audio_included);
        let calls = invoker.calls_for(Tool::Ffmpeg);
        assert_eq!(calls[1].value_of("-map"), None);
        assert_eq!(calls[1].value_of("-c:v").as_deref(), Some("copy"));
    }
}
