//! Tests for loading and saving pipeline configuration files
//!
//! These tests verify:
//! - Partial TOML files fall back to defaults for missing keys
//! - Saved configurations load back unchanged
//! - Invalid values are rejected at load time

use cinestage_core::config::PipelineConfig;
use cinestage_core::enhance::InterpolationEngine;
use cinestage_core::error::CoreError;
use std::fs;
use tempfile::tempdir;

#[test]
fn partial_file_keeps_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("cinestage.toml");
    fs::write(
        &path,
        r#"
[gates]
noise_threshold = 80.0
target_frame_rate = 48.0

[enhance]
interpolation_engine = "rife"

[packaging]
segment_duration_secs = 4

[[packaging.ladder]]
name = "720p"
resolution = "1280x720"
bitrate_kbps = 2800

[[packaging.ladder]]
name = "360p"
resolution = "640x360"
bitrate_kbps = 800
"#,
    )?;

    let config = PipelineConfig::from_toml_file(&path)?;
    assert_eq!(config.gates.noise_threshold, 80.0);
    assert_eq!(config.gates.target_frame_rate, 48.0);
    assert_eq!(config.enhance.interpolation_engine, InterpolationEngine::Rife);
    assert_eq!(config.packaging.segment_duration_secs, 4);
    assert_eq!(config.packaging.ladder.len(), 2);
    assert_eq!(config.packaging.ladder[0].bandwidth(), 2_800_000);
    // untouched sections keep their defaults
    assert_eq!(config.thresholds.motion.lower, 1.0);
    assert_eq!(config.quality.grade_excellent, 90.0);
    Ok(())
}

#[test]
fn saved_config_loads_back() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("nested").join("cinestage.toml");
    let mut config = PipelineConfig::default();
    config.captions.language = Some("de".to_string());
    config.packaging.max_parallel_encodes = Some(2);
    config.save_toml_file(&path)?;

    let loaded = PipelineConfig::from_toml_file(&path)?;
    assert_eq!(loaded, config);
    Ok(())
}

#[test]
fn invalid_values_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[packaging]\nsegment_duration_secs = 0\n")?;
    assert!(matches!(
        PipelineConfig::from_toml_file(&path),
        Err(CoreError::Configuration(_))
    ));

    fs::write(&path, "[thresholds.motion]\nlower = 5.0\nupper = 1.0\n")?;
    assert!(PipelineConfig::from_toml_file(&path).is_err());

    fs::write(&path, "[gates\nnoise_threshold = 1")?;
    assert!(matches!(
        PipelineConfig::from_toml_file(&path),
        Err(CoreError::TomlParse(_))
    ));
    Ok(())
}

#[test]
fn missing_file_is_a_configuration_error() {
    let err = PipelineConfig::from_toml_file(std::path::Path::new("/nonexistent/cinestage.toml"))
        .unwrap_err();
    assert!(matches!(err, CoreError::Configuration(_)));
}
