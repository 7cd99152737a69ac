// cinestage-core/tests/report_fallback_tests.rs
//
// A structured report is always emitted: the full run report when possible,
// plus the minimal report when the final report could not be assembled.

use cinestage_core::analysis::mocks::MockSignalAnalyzer;
use cinestage_core::config::PipelineConfigBuilder;
use cinestage_core::external::Tool;
use cinestage_core::external::mocks::{MockInvoker, MockProber, MockResponse};
use cinestage_core::notifications::mocks::MockNotificationSender;
use cinestage_core::pipeline::{Coordinator, PipelineState, StageStatus};
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

#[test]
fn failed_delivery_mux_falls_back_to_minimal_report() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("interview.mp4");
    fs::write(&input, b"dummy content")?;
    let mut config = PipelineConfigBuilder::new()
        .output_root(dir.path().join("out"))
        .captions_enabled(false)
        .run_id("fallback")
        .build();
    config.analysis.detect_scenes = false;

    let invoker = MockInvoker::new();
    invoker.expect(
        Tool::Ffmpeg,
        Some("-c:v copy"),
        MockResponse::Exit {
            code: 1,
            stderr: "Could not write header for output file".to_string(),
        },
    );
    let prober = MockProber::with_frame_rate(30.0);
    let analyzer = MockSignalAnalyzer::with_noise_and_fps(300.0, 30.0);
    // delivery failures must not depend on the notifier working
    let notifier = MockNotificationSender::failing();

    let outcome = Coordinator::new(&invoker, &prober, &analyzer, &config)
        .with_notifier(&notifier)
        .run(&input)?;
    let run = &outcome.run;

    assert_eq!(run.state(), PipelineState::Failed);
    assert_eq!(run.stage("report").unwrap().status, StageStatus::Failed);
    assert_eq!(run.stage("packaging").unwrap().status, StageStatus::Completed);
    assert!(run.final_report_path().is_none());
    assert_eq!(notifier.sent().len(), 2);

    let run_report: Value = serde_json::from_str(&fs::read_to_string(outcome.layout.run_report())?)?;
    let stages: Vec<&String> = run_report["stages"].as_object().unwrap().keys().collect();
    assert_eq!(stages.len(), 8);
    assert_eq!(run_report["final_report_path"], Value::Null);

    let minimal: Value =
        serde_json::from_str(&fs::read_to_string(outcome.layout.minimal_report())?)?;
    assert_eq!(minimal["input_metadata"]["has_audio"], true);
    assert_eq!(minimal["failure"]["stage"], "report");
    assert_eq!(minimal["original_video"], input.to_str().unwrap());
    Ok(())
}
