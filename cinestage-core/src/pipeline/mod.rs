// ============================================================================
// cinestage-core/src/pipeline/mod.rs
// ============================================================================
//
// PIPELINE COORDINATOR: Staged Run of One Input
//
// This module sequences a run and owns its record:
//
//   ANALYZE -> CAPTION -> DENOISE? -> INTERPOLATE? -> UPSCALE -> PACKAGE
//           -> QUALITY_CHECK -> REPORT -> DONE
//
// with FAILED reachable from every non-terminal state. Exactly one artifact is
// current at any point. It lives in the `PipelineRun` and is only replaced by
// the output of a completed artifact-producing stage; a skipped stage forwards
// it unchanged.
//
// FAILURE RULES:
// - Analysis, upscale, and a gated stage failing for any reason other than a
//   missing binary abort the run; downstream stages are recorded as skipped
// - A gated stage whose binary is missing records executed=false and forwards
// - Captions and quality check are advisory and never abort (except on cancel)
// - A packaging failure is recorded, quality check and the final report still
//   run, and the run ends FAILED
// - A run report is always attempted; if it or the final report cannot be
//   written, a minimal report (input metadata + failure trace) is written
//
// AI-ASSISTANT-INFO: Coordinator state machine and stage threading

pub mod layout;
pub mod report;
pub mod run;
pub mod state;

// ---- Internal crate imports ----
use crate::analysis::{AnalysisContext, SignalAnalyzer, SignalProfile, run_analysis};
use crate::captions::generate_captions;
use crate::config::PipelineConfig;
use crate::decision::DecisionEngine;
use crate::enhance::{self, EnhanceOutput, GateDecision, denoise_gate, interpolate_gate};
use crate::error::{CoreError, CoreResult};
use crate::external::{CancelToken, ToolInvoker};
use crate::logging::log_section;
use crate::media::{MediaArtifact, MediaProber};
use crate::notifications::{NotificationSender, NotificationType, hostname};
use crate::packaging;
use crate::quality::{QualityReport, check_quality};

// ---- External crate imports ----
use chrono::Local;
use log::{error, info, warn};
use serde_json::{Value, json};

// ---- Standard library imports ----
use std::path::Path;
use std::time::Duration;

pub use layout::{RunId, RunLayout};
pub use report::{FinalReport, RunReport, assemble_final_report, write_minimal_report};
pub use run::{FailureTrace, PipelineRun, StageResult, StageStatus};
pub use state::{PipelineState, STAGE_ORDER};

/// Collaborators shared by every stage body.
pub struct StageContext<'a> {
    pub invoker: &'a dyn ToolInvoker,
    pub prober: &'a dyn MediaProber,
    pub config: &'a PipelineConfig,
    pub cancel: &'a CancelToken,
}

/// A finished run: the sealed record and, when it failed, the error that ended it.
#[derive(Debug)]
pub struct RunOutcome {
    pub run: PipelineRun,
    pub layout: RunLayout,
    pub error: Option<CoreError>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.run.succeeded()
    }
}

/// Runs the quality check unless the final artifact is the original input.
///
/// Metric failures degrade the stage; only cancellation and I/O errors are
/// returned as `Err`.
pub fn run_quality_stage(
    ctx: &StageContext<'_>,
    original: &MediaArtifact,
    final_artifact: &MediaArtifact,
    out_dir: &Path,
) -> CoreResult<(StageResult, Option<QualityReport>)> {
    const STAGE: &str = "quality_check";
    if final_artifact.is_same_file(original) {
        info!("No enhancement ran; skipping quality check");
        let result = StageResult::skipped(
            STAGE,
            "final artifact is the original input",
            &final_artifact.path,
        );
        return Ok((result, None));
    }

    let report = check_quality(ctx, original, final_artifact, out_dir)?;
    let metadata = serde_json::to_value(&report)?;
    let result = if report.is_degraded() {
        StageResult::degraded(
            STAGE,
            &final_artifact.path,
            metadata,
            report.failures.join("; "),
        )
    } else {
        StageResult::completed(STAGE, &final_artifact.path, metadata)
    };
    Ok((result, Some(report)))
}

/// Adds the gate reason to a stage's metadata object.
fn with_gate_reason(metadata: Value, reason: &str) -> Value {
    match metadata {
        Value::Object(mut map) => {
            map.insert("gate_reason".to_string(), json!(reason));
            Value::Object(map)
        }
        Value::Null => json!({ "gate_reason": reason }),
        other => json!({ "gate_reason": reason, "details": other }),
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Drives one input through every stage.
pub struct Coordinator<'a> {
    invoker: &'a dyn ToolInvoker,
    prober: &'a dyn MediaProber,
    analyzer: &'a dyn SignalAnalyzer,
    notifier: Option<&'a dyn NotificationSender>,
    config: &'a PipelineConfig,
    engine: DecisionEngine,
    cancel: CancelToken,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        invoker: &'a dyn ToolInvoker,
        prober: &'a dyn MediaProber,
        analyzer: &'a dyn SignalAnalyzer,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            invoker,
            prober,
            analyzer,
            notifier: None,
            config,
            engine: DecisionEngine::new(config.thresholds),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: &'a dyn NotificationSender) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Uses `cancel` so the caller can abort the run from another thread.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn stage_context(&self) -> StageContext<'_> {
        StageContext {
            invoker: self.invoker,
            prober: self.prober,
            config: self.config,
            cancel: &self.cancel,
        }
    }

    fn notify(&self, notification: NotificationType) {
        if let Some(sender) = self.notifier {
            if let Err(e) = sender.send_notification(&notification) {
                warn!("Failed to send notification: {}", e);
            }
        }
    }

    /// Runs the whole pipeline on `input`.
    ///
    /// Returns `Err` only when the run could not start (missing input, invalid
    /// configuration, unprobeable file or unwritable output root). Stage
    /// failures are reported through `RunOutcome::error`.
    pub fn run(&self, input: &Path) -> CoreResult<RunOutcome> {
        if !input.is_file() {
            return Err(CoreError::Configuration(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }
        self.config.validate()?;

        let original = self.prober.probe(input).map_err(|e| {
            CoreError::Configuration(format!("Cannot read input {}: {}", input.display(), e))
        })?;
        let run_id = match &self.config.run_id {
            Some(id) => RunId::from_explicit(id)?,
            None => RunId::derive(input)?,
        };
        let layout = RunLayout::new(&self.config.paths.output_root, &original.stem(), &run_id);
        layout.create_all()?;

        log_section(&format!("CINESTAGE RUN {}", run_id));
        info!("Input: {}", original.path.display());
        info!(
            "Source: {} {} @ {:.3} fps, {:.1}s",
            original.codec.as_deref().unwrap_or("unknown"),
            original.resolution,
            original.frame_rate,
            original.duration_secs
        );
        info!("Output: {}", layout.run_dir().display());

        let host = hostname();
        self.notify(NotificationType::RunStart {
            input_path: original.path.clone(),
            run_id: run_id.to_string(),
            hostname: host.clone(),
        });

        let mut run = PipelineRun::new(run_id.as_str(), original, Local::now());
        let error = self.execute(&mut run, &layout).err();

        if let Some(err) = &error {
            error!("Run failed: {}", err);
            record_unfinished(&mut run, err);
        }
        if let Err(e) = run.finish(Local::now(), error.as_ref().map(FailureTrace::from_error)) {
            warn!("Could not seal run record: {}", e);
        }

        let run_report = RunReport::from_run(&run).and_then(|r| r.write(&layout.run_report()));
        match &run_report {
            Ok(()) => info!("Run report: {}", layout.run_report().display()),
            Err(e) => warn!("Failed to write run report: {}", e),
        }
        if run_report.is_err() || run.final_report_path().is_none() {
            if let Err(e) = write_minimal_report(&run, &layout.minimal_report()) {
                error!("Failed to write minimal report: {}", e);
            }
        }

        match &error {
            None => {
                let duration = run.duration_secs().unwrap_or(0.0).max(0.0);
                info!("Run complete in {:.1}s", duration);
                self.notify(NotificationType::RunComplete {
                    input_path: run.original().path.clone(),
                    final_video: run.delivery_video().map(Path::to_path_buf),
                    duration: Duration::from_secs_f64(duration),
                    hostname: host,
                });
            }
            Some(err) => {
                let trace = FailureTrace::from_error(err);
                self.notify(NotificationType::RunFailed {
                    input_path: run.original().path.clone(),
                    stage: trace.stage,
                    message: trace.message,
                    hostname: host,
                });
            }
        }

        Ok(RunOutcome { run, layout, error })
    }

    /// Moves to `state`, refusing to start a stage once cancellation was requested.
    fn begin(&self, run: &mut PipelineRun, state: PipelineState) -> CoreResult<()> {
        run.advance(state)?;
        if self.cancel.is_cancelled() {
            let stage = state.stage_name().unwrap_or("pipeline");
            return Err(CoreError::stage_failed(
                stage,
                CoreError::Cancelled(format!("run cancelled before {stage}")),
            ));
        }
        Ok(())
    }

    fn execute(&self, run: &mut PipelineRun, layout: &RunLayout) -> CoreResult<()> {
        let ctx = self.stage_context();
        let original = run.original().clone();

        // ---- Analysis ----
        self.begin(run, PipelineState::Analyze)?;
        log_section("ANALYSIS");
        let analysis_ctx = AnalysisContext {
            analyzer: self.analyzer,
            invoker: self.invoker,
            engine: &self.engine,
            tools: &self.config.tools,
            settings: &self.config.analysis,
            cancel: &self.cancel,
        };
        let analysis = run_analysis(&analysis_ctx, &original, &layout.analysis_dir())
            .map_err(|e| CoreError::stage_failed("analysis", e))?;
        run.record(StageResult::completed(
            "analysis",
            &original.path,
            json!({
                "decision": serde_json::to_value(&analysis.record)?,
                "decision_path": analysis.decision_path,
                "metadata_path": analysis.metadata_path,
                "scene_cuts": analysis.scenes.as_ref().map(Vec::len),
                "reports": analysis.report_paths,
            }),
        ))?;
        run.set_decision_record(analysis.record.clone())?;

        // ---- Captions ----
        self.begin(run, PipelineState::Caption)?;
        log_section("CAPTIONS");
        self.caption_stage(&ctx, run, layout)?;

        // ---- Enhancement ----
        log_section("ENHANCEMENT");
        self.begin(run, PipelineState::Denoise)?;
        let evidence = self
            .gate_evidence(run, &analysis.profile)
            .map_err(|e| CoreError::stage_failed("denoise", e))?;
        let target = layout.denoised();
        self.gated_stage(run, "denoise", denoise_gate(&evidence, &self.config.gates), |input| {
            enhance::denoise(&ctx, input, &target, evidence.avg_noise_variance)
        })?;

        self.begin(run, PipelineState::Interpolate)?;
        let evidence = self
            .gate_evidence(run, &analysis.profile)
            .map_err(|e| CoreError::stage_failed("interpolate", e))?;
        let target = layout.interpolated();
        let target_fps = self.config.gates.target_frame_rate;
        self.gated_stage(
            run,
            "interpolate",
            interpolate_gate(&evidence, &self.config.gates),
            |input| enhance::interpolate(&ctx, input, &target, target_fps),
        )?;

        self.begin(run, PipelineState::Upscale)?;
        let current = run.final_artifact().clone();
        let upscaled = enhance::upscale(&ctx, &current, &layout.upscaled())
            .map_err(|e| CoreError::stage_failed("upscale", e))?;
        run.record(StageResult::completed(
            "upscale",
            &upscaled.artifact.path,
            upscaled.metadata,
        ))?;
        run.set_final_artifact(upscaled.artifact)?;

        // ---- Packaging ----
        self.begin(run, PipelineState::Package)?;
        log_section("PACKAGING");
        let current = run.final_artifact().clone();
        let mut deferred = None;
        match packaging::package(
            &ctx,
            std::slice::from_ref(&current),
            layout.name(),
            &layout.packaging_dir(),
        ) {
            Ok(result) => {
                run.record(StageResult::completed(
                    "packaging",
                    &result.master_manifest,
                    serde_json::to_value(&result)?,
                ))?;
            }
            Err(e) if e.is_cancelled() => return Err(CoreError::stage_failed("packaging", e)),
            Err(e) => {
                error!("Packaging failed: {}", e);
                run.record(StageResult::failed("packaging", &e, &current.path))?;
                deferred = Some(CoreError::stage_failed("packaging", e));
            }
        }

        // ---- Quality check ----
        self.begin(run, PipelineState::QualityCheck)?;
        log_section("QUALITY CHECK");
        let quality = match run_quality_stage(&ctx, &original, &current, &layout.quality_dir()) {
            Ok((result, report)) => {
                if result.status == StageStatus::Degraded {
                    warn!("Quality check degraded: {}", result.error.as_deref().unwrap_or(""));
                }
                run.record(result)?;
                report
            }
            Err(e) if e.is_cancelled() => {
                return Err(CoreError::stage_failed("quality_check", e));
            }
            Err(e) => {
                warn!("Quality check failed, continuing: {}", e);
                run.record(StageResult::failed("quality_check", &e, &current.path))?;
                None
            }
        };

        // ---- Report ----
        self.begin(run, PipelineState::Report)?;
        log_section("REPORT");
        match assemble_final_report(
            &ctx,
            run.run_id(),
            &original,
            &current,
            quality.as_ref(),
            layout,
        ) {
            Ok(report) => {
                run.record(StageResult::completed(
                    "report",
                    &report.delivery_video,
                    json!({
                        "final_report": report.report_path,
                        "overall_grade": report.overall_grade,
                        "audio_included": report.audio_included,
                    }),
                ))?;
                run.set_final_report(report.report_path, report.delivery_video)?;
            }
            Err(e) if e.is_cancelled() => return Err(CoreError::stage_failed("report", e)),
            Err(e) => {
                error!("Final report assembly failed: {}", e);
                run.record(StageResult::failed("report", &e, &current.path))?;
                deferred.get_or_insert(CoreError::stage_failed("report", e));
            }
        }

        match deferred {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn caption_stage(
        &self,
        ctx: &StageContext<'_>,
        run: &mut PipelineRun,
        layout: &RunLayout,
    ) -> CoreResult<()> {
        const STAGE: &str = "captions";
        let current = run.final_artifact().path.clone();
        let original = run.original().clone();

        if !self.config.captions.enabled {
            return run.record(StageResult::skipped(STAGE, "captions disabled", &current));
        }
        if !original.has_audio {
            return run.record(StageResult::skipped(STAGE, "input has no audio track", &current));
        }

        match generate_captions(ctx, &original, &layout.captions_dir()) {
            Ok(captions) => {
                info!("Captions: {}", captions.srt_path.display());
                run.record(StageResult::completed(
                    STAGE,
                    &current,
                    serde_json::to_value(&captions)?,
                ))
            }
            Err(e) if e.is_cancelled() => Err(CoreError::stage_failed(STAGE, e)),
            Err(e) if e.is_tool_unavailable() => {
                warn!("Skipping captions: {}", e);
                run.record(StageResult::skipped(STAGE, e.to_string(), &current))
            }
            Err(e) => {
                warn!("Caption generation failed, continuing: {}", e);
                run.record(StageResult::failed(STAGE, &e, &current))
            }
        }
    }

    /// Profile of the current artifact; the analysis profile while the
    /// current artifact is still the analysed input.
    fn gate_evidence(&self, run: &PipelineRun, analysed: &SignalProfile) -> CoreResult<SignalProfile> {
        let current = run.final_artifact();
        if current.is_same_file(run.original()) {
            return Ok(*analysed);
        }
        info!("Measuring {} for gate evidence", current.path.display());
        self.analyzer.profile(current, &self.cancel)
    }

    fn gated_stage<F>(
        &self,
        run: &mut PipelineRun,
        stage: &str,
        gate: GateDecision,
        body: F,
    ) -> CoreResult<()>
    where
        F: FnOnce(&MediaArtifact) -> CoreResult<EnhanceOutput>,
    {
        let current = run.final_artifact().clone();
        if !gate.should_run() {
            info!("Skipping {}: {}", stage, gate.reason());
            return run.record(StageResult::skipped(stage, gate.reason(), &current.path));
        }

        info!("Running {}: {}", stage, gate.reason());
        match body(&current) {
            Ok(output) => {
                run.record(StageResult::completed(
                    stage,
                    &output.artifact.path,
                    with_gate_reason(output.metadata, gate.reason()),
                ))?;
                run.set_final_artifact(output.artifact)
            }
            Err(e) if e.is_tool_unavailable() => {
                warn!("Skipping {}: {}", stage, e);
                run.record(StageResult::skipped(stage, e.to_string(), &current.path))
            }
            Err(e) => Err(CoreError::stage_failed(stage, e)),
        }
    }
}

/// Records the failed stage and skips everything downstream of it.
fn record_unfinished(run: &mut PipelineRun, error: &CoreError) {
    let (failed_stage, cause) = match error {
        CoreError::PartialPipelineFailure { stage, source } => (stage.as_str(), source.as_ref()),
        other => ("pipeline", other),
    };
    let forwarded = run.final_artifact().path.clone();
    let pending: Vec<&'static str> = STAGE_ORDER
        .iter()
        .filter_map(|s| s.stage_name())
        .filter(|name| run.stage(name).is_none())
        .collect();

    for name in pending {
        let result = if name == failed_stage {
            StageResult::failed(name, cause, &forwarded)
        } else {
            StageResult::skipped(
                name,
                format!("upstream stage '{failed_stage}' failed"),
                &forwarded,
            )
        };
        if let Err(e) = run.record(result) {
            warn!("Could not record stage '{}': {}", name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::mocks::MockSignalAnalyzer;
    use crate::config::PipelineConfigBuilder;
    use crate::external::Tool;
    use crate::external::mocks::{MockInvoker, MockProber, MockResponse};
    use crate::notifications::mocks::MockNotificationSender;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn setup(dir: &TempDir) -> (PipelineConfig, std::path::PathBuf) {
        let input = dir.path().join("clip.mp4");
        fs::write(&input, b"source").unwrap();
        let mut config = PipelineConfigBuilder::new()
            .output_root(dir.path().join("out"))
            .noise_threshold(100.0)
            .target_frame_rate(60.0)
            .captions_enabled(false)
            .run_id("test")
            .build();
        config.analysis.detect_scenes = false;
        (config, input)
    }

    fn stage<'r>(run: &'r PipelineRun, name: &str) -> &'r StageResult {
        run.stage(name).unwrap()
    }

    #[test]
    fn missing_input_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        let (config, _) = setup(&dir);
        let invoker = MockInvoker::new();
        let prober = MockProber::with_frame_rate(30.0);
        let analyzer = MockSignalAnalyzer::with_noise_and_fps(50.0, 30.0);
        let coordinator = Coordinator::new(&invoker, &prober, &analyzer, &config);

        let err = coordinator.run(&dir.path().join("absent.mp4")).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
        assert!(invoker.calls().is_empty());
    }

    #[test]
    fn successful_run_threads_artifacts_and_notifies() {
        let dir = tempdir().unwrap();
        let (config, input) = setup(&dir);
        let invoker = MockInvoker::new();
        let prober = MockProber::with_frame_rate(30.0);
        let analyzer = MockSignalAnalyzer::with_noise_and_fps(50.0, 30.0);
        let notifier = MockNotificationSender::new();
        let coordinator =
            Coordinator::new(&invoker, &prober, &analyzer, &config).with_notifier(&notifier);

        let outcome = coordinator.run(&input).unwrap();
        assert!(outcome.succeeded(), "{:?}", outcome.error);
        let run = &outcome.run;
        assert_eq!(run.state(), PipelineState::Done);

        let names: Vec<_> = run.stages().iter().map(|s| s.stage_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "analysis",
                "captions",
                "denoise",
                "interpolate",
                "upscale",
                "packaging",
                "quality_check",
                "report"
            ]
        );
        assert!(!stage(run, "captions").executed);
        assert!(stage(run, "denoise").executed);
        assert_eq!(stage(run, "denoise").output_artifact, outcome.layout.denoised());
        assert_eq!(run.final_artifact().path, outcome.layout.upscaled());
        assert!(outcome.layout.run_report().is_file());
        assert!(!outcome.layout.minimal_report().exists());

        let tags: Vec<_> = notifier.sent().iter().map(|n| n.tag()).collect();
        assert_eq!(tags, vec!["start", "complete"]);
    }

    #[test]
    fn denoised_artifact_is_measured_for_the_interpolation_gate() {
        let dir = tempdir().unwrap();
        let (config, input) = setup(&dir);
        let invoker = MockInvoker::new();
        let prober = MockProber::with_frame_rate(30.0);
        let analyzer = MockSignalAnalyzer::with_noise_and_fps(50.0, 30.0);
        let coordinator = Coordinator::new(&invoker, &prober, &analyzer, &config);

        let outcome = coordinator.run(&input).unwrap();
        let measured = analyzer.measured();
        assert_eq!(measured.len(), 2);
        assert_eq!(
            measured[1],
            crate::media::canonicalize(&outcome.layout.denoised())
        );
    }

    #[test]
    fn analysis_failure_skips_every_downstream_stage() {
        let dir = tempdir().unwrap();
        let (config, input) = setup(&dir);
        let invoker = MockInvoker::new();
        let prober = MockProber::with_frame_rate(30.0);
        let analyzer = MockSignalAnalyzer::with_noise_and_fps(50.0, 30.0);
        analyzer.fail_on(&input);
        let notifier = MockNotificationSender::new();
        let coordinator =
            Coordinator::new(&invoker, &prober, &analyzer, &config).with_notifier(&notifier);

        let outcome = coordinator.run(&input).unwrap();
        let run = &outcome.run;
        assert_eq!(run.state(), PipelineState::Failed);
        assert_eq!(stage(run, "analysis").status, StageStatus::Failed);
        assert_eq!(
            stage(run, "upscale").skip_reason.as_deref(),
            Some("upstream stage 'analysis' failed")
        );
        assert_eq!(run.stages().len(), 8);
        assert_eq!(run.failure().unwrap().stage, "analysis");
        assert_eq!(run.final_artifact().path, input);
        assert!(outcome.layout.run_report().is_file());
        assert!(outcome.layout.minimal_report().is_file());
        assert_eq!(notifier.sent().last().unwrap().tag(), "error");
    }

    #[test]
    fn packaging_failure_still_produces_the_final_report() {
        let dir = tempdir().unwrap();
        let (config, input) = setup(&dir);
        let invoker = MockInvoker::new();
        invoker.expect(
            Tool::Ffmpeg,
            Some("-hls_time"),
            MockResponse::Exit {
                code: 1,
                stderr: "encoder error".to_string(),
            },
        );
        let prober = MockProber::with_frame_rate(30.0);
        let analyzer = MockSignalAnalyzer::with_noise_and_fps(200.0, 90.0);
        let coordinator = Coordinator::new(&invoker, &prober, &analyzer, &config);

        let outcome = coordinator.run(&input).unwrap();
        let run = &outcome.run;
        assert!(!outcome.succeeded());
        assert_eq!(run.state(), PipelineState::Failed);
        assert_eq!(stage(run, "packaging").status, StageStatus::Failed);
        assert_eq!(stage(run, "report").status, StageStatus::Completed);
        assert!(run.final_report_path().unwrap().is_file());
        assert!(!outcome.layout.packaging_dir().join("hls/master.m3u8").exists());
        assert_eq!(run.failure().unwrap().stage, "packaging");
    }

    #[test]
    fn cancelled_token_stops_before_the_first_stage() {
        let dir = tempdir().unwrap();
        let (config, input) = setup(&dir);
        let invoker = MockInvoker::new();
        let prober = MockProber::with_frame_rate(30.0);
        let analyzer = MockSignalAnalyzer::with_noise_and_fps(50.0, 30.0);
        let cancel = CancelToken::new();
        let coordinator =
            Coordinator::new(&invoker, &prober, &analyzer, &config).with_cancel_token(cancel.clone());
        cancel.cancel();

        let outcome = coordinator.run(&input).unwrap();
        assert!(outcome.error.as_ref().unwrap().is_cancelled());
        assert!(analyzer.measured().is_empty());
        assert!(invoker.calls().is_empty());
        assert_eq!(outcome.run.failure().unwrap().kind, "cancelled");
    }

    #[cfg(unix)]
    #[test]
    fn cancel_during_analysis_kills_the_frame_decoder() {
        use crate::analysis::SignalExtractor;
        use std::os::unix::fs::PermissionsExt;
        use std::time::{Duration, Instant};

        let dir = tempdir().unwrap();
        let (mut config, input) = setup(&dir);
        let decoder = dir.path().join("slow-ffmpeg");
        fs::write(&decoder, "#!/bin/sh\nexec sleep 5\n").unwrap();
        fs::set_permissions(&decoder, fs::Permissions::from_mode(0o755)).unwrap();
        config.tools.ffmpeg = decoder.to_string_lossy().into_owned();

        let invoker = MockInvoker::new();
        let prober = MockProber::with_frame_rate(30.0);
        let analyzer = SignalExtractor::with_ffmpeg(&config.tools, config.analysis);
        let cancel = CancelToken::new();
        let coordinator =
            Coordinator::new(&invoker, &prober, &analyzer, &config).with_cancel_token(cancel.clone());

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            cancel.cancel();
        });
        let started = Instant::now();
        let outcome = coordinator.run(&input).unwrap();
        canceller.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(outcome.error.as_ref().unwrap().is_cancelled());
        let run = &outcome.run;
        assert_eq!(run.failure().unwrap().stage, "analysis");
        assert_eq!(stage(run, "analysis").status, StageStatus::Failed);
        assert_eq!(stage(run, "packaging").status, StageStatus::Skipped);
    }

    #[test]
    fn gate_reason_is_merged_into_metadata() {
        let merged = with_gate_reason(json!({ "filter": "hqdn3d" }), "noisy");
        assert_eq!(merged["gate_reason"], "noisy");
        assert_eq!(merged["filter"], "hqdn3d");
        assert_eq!(with_gate_reason(Value::Null, "x")["gate_reason"], "x");
    }
}
