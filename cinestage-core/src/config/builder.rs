// ============================================================================
// cinestage-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for PipelineConfig
//
// Fluent construction of a `PipelineConfig` starting from the defaults (which
// already include environment overrides). The CLI layers its flags on top of
// a file-loaded or default configuration through this builder.
//
// KEY COMPONENTS:
// - PipelineConfigBuilder: Builder struct wrapping a PipelineConfig

// ---- Standard library imports ----
use std::path::PathBuf;

// ---- Internal crate imports ----
use super::{PipelineConfig, ToolPaths};
use crate::decision::ClassificationThresholds;
use crate::enhance::InterpolationEngine;
use crate::packaging::EncodingProfile;

/// Builder for `PipelineConfig`.
///
/// ```rust
/// use cinestage_core::config::PipelineConfigBuilder;
/// use cinestage_core::enhance::InterpolationEngine;
///
/// let config = PipelineConfigBuilder::new()
///     .output_root("/srv/renders")
///     .captions_enabled(false)
///     .interpolation_engine(InterpolationEngine::Rife)
///     .max_parallel_encodes(2)
///     .build();
/// assert!(!config.captions.enabled);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration, e.g. one loaded from a file.
    pub fn from_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.paths.output_root = path.into();
        self
    }

    pub fn log_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.paths.log_dir = Some(path.into());
        self
    }

    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.paths.temp_dir = Some(path.into());
        self
    }

    pub fn thresholds(mut self, thresholds: ClassificationThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn noise_threshold(mut self, value: f64) -> Self {
        self.config.gates.noise_threshold = value;
        self
    }

    pub fn target_frame_rate(mut self, fps: f64) -> Self {
        self.config.gates.target_frame_rate = fps;
        self
    }

    pub fn interpolation_engine(mut self, engine: InterpolationEngine) -> Self {
        self.config.enhance.interpolation_engine = engine;
        self
    }

    pub fn captions_enabled(mut self, enabled: bool) -> Self {
        self.config.captions.enabled = enabled;
        self
    }

    pub fn caption_language(mut self, language: impl Into<String>) -> Self {
        self.config.captions.language = Some(language.into());
        self
    }

    pub fn ladder(mut self, ladder: Vec<EncodingProfile>) -> Self {
        self.config.packaging.ladder = ladder;
        self
    }

    pub fn segment_duration_secs(mut self, secs: u32) -> Self {
        self.config.packaging.segment_duration_secs = secs;
        self
    }

    pub fn max_parallel_encodes(mut self, workers: usize) -> Self {
        self.config.packaging.max_parallel_encodes = Some(workers);
        self
    }

    pub fn normalize_master(mut self, enabled: bool) -> Self {
        self.config.packaging.normalize_master = enabled;
        self
    }

    pub fn tools(mut self, tools: ToolPaths) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn ntfy_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.ntfy_topic = Some(topic.into());
        self
    }

    pub fn run_id(mut self, id: impl Into<String>) -> Self {
        self.config.run_id = Some(id.into());
        self
    }

    /// Returns the configuration. Call `validate()` on it before running.
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_only_what_it_is_told() {
        let config = PipelineConfigBuilder::new()
            .noise_threshold(55.0)
            .segment_duration_secs(2)
            .run_id("fixed")
            .build();
        assert_eq!(config.gates.noise_threshold, 55.0);
        assert_eq!(config.packaging.segment_duration_secs, 2);
        assert_eq!(config.run_id.as_deref(), Some("fixed"));
        assert_eq!(config.thresholds, ClassificationThresholds::default());
    }

    #[test]
    fn from_config_keeps_loaded_values() {
        let mut base = PipelineConfig::default();
        base.quality.vmaf_target = 80.0;
        let config = PipelineConfigBuilder::from_config(base)
            .captions_enabled(false)
            .build();
        assert_eq!(config.quality.vmaf_target, 80.0);
        assert!(!config.captions.enabled);
    }
}
