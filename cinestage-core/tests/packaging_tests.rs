// cinestage-core/tests/packaging_tests.rs
//
// ABR packaging through the public API: manifest determinism under
// out-of-order rung completion, multi-source merge validation and the
// no-partial-manifest rule.

use cinestage_core::config::{PipelineConfig, PipelineConfigBuilder};
use cinestage_core::error::CoreError;
use cinestage_core::external::mocks::{MockInvoker, MockProber, MockResponse, sample_artifact};
use cinestage_core::external::{CancelToken, Tool};
use cinestage_core::media::Resolution;
use cinestage_core::packaging::{self, MergeMethod};
use cinestage_core::pipeline::StageContext;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn config(root: &Path) -> PipelineConfig {
    PipelineConfigBuilder::new()
        .output_root(root)
        .max_parallel_encodes(4)
        .segment_duration_secs(6)
        .build()
}

#[test]
fn manifest_order_ignores_completion_order() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = config(dir.path());
    let invoker = MockInvoker::new();
    // the top rung finishes last, the bottom rung first
    for (rung, millis) in [("1080p", 300), ("720p", 200), ("480p", 100), ("360p", 0)] {
        invoker.expect_delayed(
            Tool::Ffmpeg,
            Some(&format!("{rung}_%03d.ts")),
            MockResponse::ok(),
            Duration::from_millis(millis),
        );
    }
    let prober = MockProber::with_frame_rate(30.0);
    let cancel = CancelToken::new();
    let ctx = StageContext {
        invoker: &invoker,
        prober: &prober,
        config: &config,
        cancel: &cancel,
    };

    let source = sample_artifact(Path::new("/videos/clip_upscaled.mp4"), 30.0);
    let result = packaging::package(&ctx, &[source], "clip", &dir.path().join("packaging"))?;
    assert_eq!(result.merge_method, MergeMethod::Copy);
    assert_eq!(result.variants.len(), 4);

    let manifest = fs::read_to_string(&result.master_manifest)?;
    let bandwidths: Vec<&str> = manifest
        .lines()
        .filter_map(|l| l.strip_prefix("#EXT-X-STREAM-INF:BANDWIDTH="))
        .map(|l| l.split(',').next().unwrap_or(""))
        .collect();
    assert_eq!(bandwidths, vec!["5000000", "2800000", "1400000", "800000"]);
    assert!(manifest.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n"));
    assert!(manifest.contains("variants/1080p/1080p.m3u8"));

    // every rung carries the closed-GOP settings for 6s segments at 30 fps
    let rungs: Vec<_> = invoker
        .calls_for(Tool::Ffmpeg)
        .into_iter()
        .filter(|c| c.value_of("-hls_time").is_some())
        .collect();
    assert_eq!(rungs.len(), 4);
    for rung in rungs {
        assert_eq!(rung.value_of("-g").as_deref(), Some("180"));
        assert_eq!(rung.value_of("-keyint_min").as_deref(), Some("180"));
        assert_eq!(rung.value_of("-sc_threshold").as_deref(), Some("0"));
    }
    Ok(())
}

#[test]
fn failed_rung_leaves_no_manifest() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = config(dir.path());
    let invoker = MockInvoker::new();
    invoker.expect(
        Tool::Ffmpeg,
        Some("480p_%03d.ts"),
        MockResponse::Exit {
            code: 1,
            stderr: "Conversion failed!".to_string(),
        },
    );
    let prober = MockProber::with_frame_rate(30.0);
    let cancel = CancelToken::new();
    let ctx = StageContext {
        invoker: &invoker,
        prober: &prober,
        config: &config,
        cancel: &cancel,
    };

    let source = sample_artifact(Path::new("/videos/clip.mp4"), 30.0);
    let out = dir.path().join("packaging");
    let err = packaging::package(&ctx, &[source], "clip", &out).unwrap_err();
    assert!(matches!(err, CoreError::ToolExecution { .. }), "{err}");
    assert!(!out.join("hls/master.m3u8").exists());
    Ok(())
}

#[test]
fn mismatched_sources_are_rejected_before_concatenation() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = config(dir.path());
    let invoker = MockInvoker::new();
    let prober = MockProber::with_frame_rate(30.0);
    let cancel = CancelToken::new();
    let ctx = StageContext {
        invoker: &invoker,
        prober: &prober,
        config: &config,
        cancel: &cancel,
    };

    let first = sample_artifact(Path::new("/videos/part1.mp4"), 30.0);
    let mut second = sample_artifact(Path::new("/videos/part2.mp4"), 30.0);
    second.resolution = Resolution::new(1920, 1080);

    let err = packaging::package(&ctx, &[first, second], "joined", &dir.path().join("p"))
        .unwrap_err();
    assert!(matches!(err, CoreError::IncompatibleSources(_)));
    assert!(invoker.calls().is_empty());
    Ok(())
}

#[test]
fn matching_sources_are_concatenated_losslessly() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = config(dir.path());
    let invoker = MockInvoker::new();
    let prober = MockProber::with_frame_rate(30.0);
    let cancel = CancelToken::new();
    let ctx = StageContext {
        invoker: &invoker,
        prober: &prober,
        config: &config,
        cancel: &cancel,
    };

    let parts = vec![
        sample_artifact(Path::new("/videos/part1.mp4"), 30.0),
        sample_artifact(Path::new("/videos/part2.mp4"), 30.0),
    ];
    let result = packaging::package(&ctx, &parts, "joined", &dir.path().join("p"))?;
    assert_eq!(result.merge_method, MergeMethod::Concat);

    let concat = &invoker.calls_for(Tool::Ffmpeg)[0];
    assert_eq!(concat.value_of("-f").as_deref(), Some("concat"));
    assert_eq!(concat.value_of("-c").as_deref(), Some("copy"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn failed_rung_leaves_no_segments_behind() -> Result<(), Box<dyn std::error::Error>> {
    use cinestage_core::external::ProcessInvoker;
    use cinestage_core::packaging::EncodingProfile;
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir()?;
    // Copies succeed; a rung writes its first segment and then fails.
    let ffmpeg = dir.path().join("ffmpeg");
    fs::write(
        &ffmpeg,
        r#"#!/bin/sh
seg=""
prev=""
last=""
for arg in "$@"; do
  if [ "$prev" = "-hls_segment_filename" ]; then seg="$arg"; fi
  prev="$arg"
  last="$arg"
done
if [ -n "$seg" ]; then
  touch "$(echo "$seg" | sed 's/%03d/000/')"
  echo "Conversion failed!" >&2
  exit 1
fi
touch "$last"
"#,
    )?;
    fs::set_permissions(&ffmpeg, fs::Permissions::from_mode(0o755))?;

    let mut config = PipelineConfigBuilder::new()
        .output_root(dir.path())
        .normalize_master(false)
        .build();
    config.packaging.ladder = vec![EncodingProfile::new("360p", 640, 360, 800)];
    config.tools.ffmpeg = ffmpeg.to_string_lossy().into_owned();

    let invoker = ProcessInvoker::default();
    let prober = MockProber::with_frame_rate(30.0);
    let cancel = CancelToken::new();
    let ctx = StageContext {
        invoker: &invoker,
        prober: &prober,
        config: &config,
        cancel: &cancel,
    };

    let source = sample_artifact(Path::new("/videos/clip_upscaled.mp4"), 30.0);
    let out_dir = dir.path().join("packaging");
    let err = packaging::package(&ctx, &[source], "clip", &out_dir).unwrap_err();
    assert!(matches!(err, CoreError::ToolExecution { .. }), "unexpected error: {err}");

    let variant_dir = out_dir.join("hls/variants/360p");
    assert!(!variant_dir.join("360p_000.ts").exists());
    assert!(!variant_dir.join("360p.m3u8").exists());
    assert!(!out_dir.join("hls/master.m3u8").exists());
    Ok(())
}
