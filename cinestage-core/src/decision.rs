// ============================================================================
// cinestage-core/src/decision.rs
// ============================================================================
//
// DECISION ENGINE: Signal Profile → Classification, Score, Recommendations
//
// Pure mapping from a `SignalProfile` to categorical labels, a bounded quality
// score and a list of recommendations. Thresholds are supplied by the caller
// through `ClassificationThresholds`; nothing here reads configuration, the
// clock, or the filesystem except `DecisionRecord::write`.
//
// KEY COMPONENTS:
// - Band / ClassificationThresholds: Two-cut banding with strict `<` comparisons
// - MotionClass, ComplexityClass, NoiseClass, BlurClass: Labels
// - QualityScore: Weighted, clipped score in [0, 100]
// - Recommendation: Additive advisory rules
// - DecisionRecord: Persisted JSON document consumed by reporting
//
// NOTE: noise and blur are both derived from the same Laplacian variance
// statistic, banded in opposite directions. Both labels are kept because the
// recommendation rules key off each one independently.

// ---- Internal crate imports ----
use crate::analysis::SignalProfile;
use crate::error::{CoreError, CoreResult};

// ---- External crate imports ----
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// ---- Standard library imports ----
use std::fmt;
use std::fs;
use std::path::Path;

// ============================================================================
// THRESHOLDS
// ============================================================================

/// Two cut points splitting a channel into three bands.
///
/// `value < lower` is band 0, `lower <= value < upper` is band 1, anything else
/// is band 2. Boundary values therefore belong to the upper band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub lower: f64,
    pub upper: f64,
}

impl Band {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn index(&self, value: f64) -> usize {
        if value < self.lower {
            0
        } else if value < self.upper {
            1
        } else {
            2
        }
    }

    fn validate(&self, channel: &str) -> CoreResult<()> {
        if !(self.lower.is_finite() && self.upper.is_finite()) || self.lower >= self.upper {
            return Err(CoreError::Configuration(format!(
                "{channel} band must satisfy lower < upper (got {} / {})",
                self.lower, self.upper
            )));
        }
        Ok(())
    }
}

/// Divisors that map each channel onto [0, 1] before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreNormalizers {
    pub motion: f64,
    pub complexity: f64,
    pub noise: f64,
    pub blur: f64,
}

impl Default for ScoreNormalizers {
    fn default() -> Self {
        Self {
            motion: 10.0,
            complexity: 0.2,
            noise: 1000.0,
            blur: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub motion: f64,
    pub complexity: f64,
    pub noise: f64,
    pub blur: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            motion: 0.2,
            complexity: 0.2,
            noise: 0.3,
            blur: 0.3,
        }
    }
}

/// Every tunable the decision engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationThresholds {
    /// Average optical-flow magnitude.
    pub motion: Band,
    /// Canny edge-pixel density.
    pub complexity: Band,
    /// Laplacian variance; lower values mean more noise.
    pub noise: Band,
    /// Laplacian variance; lower values mean more blur.
    pub blur: Band,
    pub normalizers: ScoreNormalizers,
    pub weights: ScoreWeights,
}

impl Default for ClassificationThresholds {
    fn default() -> Self {
        Self {
            motion: Band::new(1.0, 5.0),
            complexity: Band::new(0.05, 0.15),
            noise: Band::new(100.0, 500.0),
            blur: Band::new(100.0, 500.0),
            normalizers: ScoreNormalizers::default(),
            weights: ScoreWeights::default(),
        }
    }
}

impl ClassificationThresholds {
    pub fn validate(&self) -> CoreResult<()> {
        self.motion.validate("motion")?;
        self.complexity.validate("complexity")?;
        self.noise.validate("noise")?;
        self.blur.validate("blur")?;

        let n = &self.normalizers;
        if [n.motion, n.complexity, n.noise, n.blur]
            .iter()
            .any(|v| !v.is_finite() || *v <= 0.0)
        {
            return Err(CoreError::Configuration(
                "score normalizers must be positive".to_string(),
            ));
        }

        let w = &self.weights;
        let weights = [w.motion, w.complexity, w.noise, w.blur];
        if weights.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(CoreError::Configuration(
                "score weights must be non-negative".to_string(),
            ));
        }
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(CoreError::Configuration(format!(
                "score weights must sum to 1.0 (got {total})"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// CLASSIFICATION LABELS
// ============================================================================

macro_rules! banded_label {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            const ORDER: [$name; 3] = [$($name::$variant),+];

            fn from_band(index: usize) -> Self {
                Self::ORDER[index.min(2)]
            }

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

banded_label!(MotionClass {
    StaticLow => "Static/Low Motion",
    Moderate => "Moderate Motion",
    High => "High Motion",
});

banded_label!(ComplexityClass {
    SimpleLow => "Simple/Low Complexity",
    Moderate => "Moderate Complexity",
    High => "High Complexity",
});

banded_label!(NoiseClass {
    High => "High Noise",
    Moderate => "Moderate Noise",
    Low => "Low Noise",
});

banded_label!(BlurClass {
    Heavy => "Heavily Blurred",
    Moderate => "Moderately Blurred",
    Sharp => "Sharp/Clear",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub motion: MotionClass,
    pub complexity: ComplexityClass,
    pub noise: NoiseClass,
    pub blur: BlurClass,
}

// ============================================================================
// QUALITY SCORE
// ============================================================================

/// Quality score rounded to two decimals, always within [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityScore(f64);

impl QualityScore {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 100.0;

    fn from_raw(raw: f64) -> Self {
        let rounded = (raw * 100.0).round() / 100.0;
        Self(rounded.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ============================================================================
// RECOMMENDATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    AddCameraMovement,
    AddVisualElements,
    ReduceNoise,
    CheckFocus,
    QualityGood,
}

impl Recommendation {
    pub fn message(&self) -> &'static str {
        match self {
            Recommendation::AddCameraMovement => {
                "Consider adding dynamic camera movements or action"
            }
            Recommendation::AddVisualElements => {
                "Scene appears simple - consider adding more visual elements"
            }
            Recommendation::ReduceNoise => "Video has significant noise - consider noise reduction",
            Recommendation::CheckFocus => "Video appears blurred - check focus and stabilization",
            Recommendation::QualityGood => "Video quality is good across all metrics",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl Serialize for Recommendation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.message())
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Output of one classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub classification: Classification,
    pub score: QualityScore,
    pub recommendations: Vec<Recommendation>,
}

/// Holds the thresholds so repeated classifications share one configuration.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    thresholds: ClassificationThresholds,
}

impl DecisionEngine {
    pub fn new(thresholds: ClassificationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ClassificationThresholds {
        &self.thresholds
    }

    pub fn classify(&self, profile: &SignalProfile) -> Decision {
        classify(profile, &self.thresholds)
    }
}

/// Classifies a profile. Deterministic and free of side effects.
pub fn classify(profile: &SignalProfile, thresholds: &ClassificationThresholds) -> Decision {
    let motion = sanitize(profile.avg_motion);
    let complexity = sanitize(profile.avg_edge_density);
    let noise = sanitize(profile.avg_noise_variance);
    let blur = sanitize(profile.avg_blur_variance);

    let classification = Classification {
        motion: MotionClass::from_band(thresholds.motion.index(motion)),
        complexity: ComplexityClass::from_band(thresholds.complexity.index(complexity)),
        noise: NoiseClass::from_band(thresholds.noise.index(noise)),
        blur: BlurClass::from_band(thresholds.blur.index(blur)),
    };

    let n = &thresholds.normalizers;
    let w = &thresholds.weights;
    let raw = 100.0
        * (w.motion * unit(motion / n.motion)
            + w.complexity * unit(complexity / n.complexity)
            + w.noise * unit(noise / n.noise)
            + w.blur * unit(blur / n.blur));

    Decision {
        classification,
        score: QualityScore::from_raw(raw),
        recommendations: recommend(&classification),
    }
}

fn recommend(c: &Classification) -> Vec<Recommendation> {
    let mut out = Vec::new();
    if c.motion == MotionClass::StaticLow {
        out.push(Recommendation::AddCameraMovement);
    }
    if c.complexity == ComplexityClass::SimpleLow {
        out.push(Recommendation::AddVisualElements);
    }
    if c.noise == NoiseClass::High {
        out.push(Recommendation::ReduceNoise);
    }
    if matches!(c.blur, BlurClass::Heavy | BlurClass::Moderate) {
        out.push(Recommendation::CheckFocus);
    }
    if out.is_empty() {
        out.push(Recommendation::QualityGood);
    }
    out
}

fn sanitize(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

// ============================================================================
// DECISION RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub average: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub peak: Option<f64>,
    pub classification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub motion: ChannelSummary,
    pub complexity: ChannelSummary,
    pub noise: ChannelSummary,
    pub blur: ChannelSummary,
}

/// JSON document persisted after analysis and consumed by report generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub video_name: String,
    pub analysis_timestamp: DateTime<Local>,
    pub frame_rate: f64,
    pub frames_analyzed: usize,
    pub metrics: DecisionMetrics,
    pub overall_quality_score: f64,
    pub recommendations: Vec<String>,
}

impl DecisionRecord {
    pub fn new(
        video_name: &str,
        profile: &SignalProfile,
        decision: &Decision,
        analysis_timestamp: DateTime<Local>,
    ) -> Self {
        let c = &decision.classification;
        Self {
            video_name: video_name.to_string(),
            analysis_timestamp,
            frame_rate: profile.frame_rate,
            frames_analyzed: profile.frames_analyzed,
            metrics: DecisionMetrics {
                motion: ChannelSummary {
                    average: profile.avg_motion,
                    peak: Some(profile.peak_motion),
                    classification: c.motion.label().to_string(),
                },
                complexity: ChannelSummary {
                    average: profile.avg_edge_density,
                    peak: None,
                    classification: c.complexity.label().to_string(),
                },
                noise: ChannelSummary {
                    average: profile.avg_noise_variance,
                    peak: None,
                    classification: c.noise.label().to_string(),
                },
                blur: ChannelSummary {
                    average: profile.avg_blur_variance,
                    peak: None,
                    classification: c.blur.label().to_string(),
                },
            },
            overall_quality_score: decision.score.value(),
            recommendations: decision
                .recommendations
                .iter()
                .map(|r| r.message().to_string())
                .collect(),
        }
    }

    pub fn write(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(motion: f64, complexity: f64, noise: f64, blur: f64) -> SignalProfile {
        SignalProfile {
            avg_motion: motion,
            peak_motion: motion,
            avg_edge_density: complexity,
            avg_noise_variance: noise,
            avg_blur_variance: blur,
            frame_rate: 30.0,
            frames_analyzed: 100,
        }
    }

    fn classes(p: &SignalProfile) -> Classification {
        classify(p, &ClassificationThresholds::default()).classification
    }

    #[test]
    fn motion_boundaries_belong_to_upper_band() {
        assert_eq!(classes(&profile(0.999, 0.1, 300.0, 300.0)).motion, MotionClass::StaticLow);
        assert_eq!(classes(&profile(1.0, 0.1, 300.0, 300.0)).motion, MotionClass::Moderate);
        assert_eq!(classes(&profile(4.999, 0.1, 300.0, 300.0)).motion, MotionClass::Moderate);
        assert_eq!(classes(&profile(5.0, 0.1, 300.0, 300.0)).motion, MotionClass::High);
    }

    #[test]
    fn complexity_boundaries() {
        assert_eq!(classes(&profile(2.0, 0.049, 300.0, 300.0)).complexity, ComplexityClass::SimpleLow);
        assert_eq!(classes(&profile(2.0, 0.05, 300.0, 300.0)).complexity, ComplexityClass::Moderate);
        assert_eq!(classes(&profile(2.0, 0.1499, 300.0, 300.0)).complexity, ComplexityClass::Moderate);
        assert_eq!(classes(&profile(2.0, 0.15, 300.0, 300.0)).complexity, ComplexityClass::High);
    }

    #[test]
    fn noise_and_blur_boundaries() {
        let c = classes(&profile(2.0, 0.1, 99.9, 99.9));
        assert_eq!((c.noise, c.blur), (NoiseClass::High, BlurClass::Heavy));
        let c = classes(&profile(2.0, 0.1, 100.0, 100.0));
        assert_eq!((c.noise, c.blur), (NoiseClass::Moderate, BlurClass::Moderate));
        let c = classes(&profile(2.0, 0.1, 499.9, 499.9));
        assert_eq!((c.noise, c.blur), (NoiseClass::Moderate, BlurClass::Moderate));
        let c = classes(&profile(2.0, 0.1, 500.0, 500.0));
        assert_eq!((c.noise, c.blur), (NoiseClass::Low, BlurClass::Sharp));
    }

    #[test]
    fn labels_match_report_strings() {
        assert_eq!(MotionClass::StaticLow.label(), "Static/Low Motion");
        assert_eq!(ComplexityClass::High.label(), "High Complexity");
        assert_eq!(NoiseClass::Low.label(), "Low Noise");
        assert_eq!(BlurClass::Sharp.label(), "Sharp/Clear");
        assert_eq!(
            serde_json::to_string(&BlurClass::Heavy).unwrap(),
            "\"Heavily Blurred\""
        );
    }

    #[test]
    fn score_formula_and_rounding() {
        let t = ClassificationThresholds::default();
        // 0.2*0.5 + 0.2*0.5 + 0.3*0.25 + 0.3*0.75 = 0.5
        let d = classify(&profile(5.0, 0.1, 250.0, 750.0), &t);
        assert_eq!(d.score.value(), 50.0);

        let d = classify(&profile(1.0 / 3.0, 0.0, 0.0, 0.0), &t);
        assert_eq!(d.score.value(), 0.67);
    }

    #[test]
    fn score_is_bounded_for_extreme_inputs() {
        let t = ClassificationThresholds::default();
        for p in [
            profile(0.0, 0.0, 0.0, 0.0),
            profile(1e9, 1e9, 1e9, 1e9),
            profile(-5.0, -1.0, -100.0, -100.0),
            profile(f64::NAN, f64::INFINITY, f64::NAN, f64::NEG_INFINITY),
        ] {
            let s = classify(&p, &t).score.value();
            assert!((0.0..=100.0).contains(&s), "score {s} out of range");
        }
        assert_eq!(classify(&profile(1e9, 1e9, 1e9, 1e9), &t).score.value(), 100.0);
    }

    #[test]
    fn score_is_monotonic_in_each_channel() {
        let t = ClassificationThresholds::default();
        let base = [3.0, 0.08, 300.0, 300.0];
        for channel in 0..4 {
            let mut previous = f64::MIN;
            for step in 0..60 {
                let mut values = base;
                values[channel] = match channel {
                    0 => step as f64 * 0.25,
                    1 => step as f64 * 0.005,
                    _ => step as f64 * 25.0,
                };
                let s = classify(&profile(values[0], values[1], values[2], values[3]), &t)
                    .score
                    .value();
                assert!(s >= previous, "channel {channel} decreased at step {step}");
                previous = s;
            }
        }
    }

    #[test]
    fn raising_blur_variance_never_lowers_score() {
        let t = ClassificationThresholds::default();
        let low = classify(&profile(2.0, 0.1, 300.0, 50.0), &t).score;
        let high = classify(&profile(2.0, 0.1, 300.0, 200.0), &t).score;
        assert!(high >= low);
    }

    #[test]
    fn recommendations_are_additive() {
        let t = ClassificationThresholds::default();
        let d = classify(&profile(0.5, 0.01, 50.0, 50.0), &t);
        assert_eq!(
            d.recommendations,
            vec![
                Recommendation::AddCameraMovement,
                Recommendation::AddVisualElements,
                Recommendation::ReduceNoise,
                Recommendation::CheckFocus,
            ]
        );

        let d = classify(&profile(3.0, 0.1, 800.0, 800.0), &t);
        assert_eq!(d.recommendations, vec![Recommendation::QualityGood]);
    }

    #[test]
    fn zero_frames_fall_to_lowest_bands() {
        let d = classify(&SignalProfile::empty(0.0), &ClassificationThresholds::default());
        assert_eq!(d.classification.motion, MotionClass::StaticLow);
        assert_eq!(d.classification.complexity, ComplexityClass::SimpleLow);
        assert_eq!(d.classification.noise, NoiseClass::High);
        assert_eq!(d.classification.blur, BlurClass::Heavy);
        assert_eq!(d.score.value(), 0.0);
    }

    #[test]
    fn custom_thresholds_are_honoured() {
        let t = ClassificationThresholds {
            motion: Band::new(0.5, 2.0),
            ..ClassificationThresholds::default()
        };
        let d = classify(&profile(2.0, 0.1, 300.0, 300.0), &t);
        assert_eq!(d.classification.motion, MotionClass::High);
    }

    #[test]
    fn validation_rejects_inverted_bands_and_bad_weights() {
        let mut t = ClassificationThresholds::default();
        assert!(t.validate().is_ok());
        t.noise = Band::new(500.0, 100.0);
        assert!(t.validate().is_err());

        let mut t = ClassificationThresholds::default();
        t.weights.motion = 0.9;
        assert!(t.validate().is_err());
    }

    #[test]
    fn record_serializes_expected_fields() {
        let p = profile(0.5, 0.2, 600.0, 600.0);
        let d = classify(&p, &ClassificationThresholds::default());
        let record = DecisionRecord::new("clip", &p, &d, Local::now());
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["video_name"], "clip");
        assert_eq!(json["metrics"]["motion"]["classification"], "Static/Low Motion");
        assert_eq!(json["metrics"]["complexity"]["classification"], "High Complexity");
        assert!(json["overall_quality_score"].is_number());
        assert_eq!(
            json["recommendations"][0],
            "Consider adding dynamic camera movements or action"
        );
    }
}
