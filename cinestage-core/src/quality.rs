// ============================================================================
// cinestage-core/src/quality.rs
// ============================================================================
//
// QUALITY CHECK: VMAF, PSNR and SSIM Against the Original Input
//
// The enhanced artifact is scaled and resampled onto the reference's
// resolution and frame rate, then compared with three separate ffmpeg passes.
// Each metric degrades independently: a pass that fails or prints nothing
// parseable leaves that metric NOT_MEASURED and is listed in `failures`,
// while the other metrics are still reported. Only cancellation and report
// I/O errors escape as `Err`.
//
// KEY COMPONENTS:
// - MetricScore / MetricStatus: One metric against its target
// - QualityReport: JSON + CSV report of the three metrics
// - QualityGrade: Overall grade derived from VMAF

use crate::config::QualityConfig;
use crate::enhance::fps_arg;
use crate::error::{CoreError, CoreResult};
use crate::external::{ExpectedOutput, Filter, FilterChain, FilterGraph, ToolCommand};
use crate::logging::log_subsection;
use crate::media::MediaArtifact;
use crate::pipeline::StageContext;

use chrono::{DateTime, Local};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

static PSNR_AVERAGE_RE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?i)average:\s*([0-9]+(?:\.[0-9]+)?)"));

static SSIM_ALL_RE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"All:\s*([0-9]+(?:\.[0-9]+)?)"));

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricStatus {
    Pass,
    Fail,
    NotMeasured,
}

impl fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MetricStatus::Pass => "PASS",
            MetricStatus::Fail => "FAIL",
            MetricStatus::NotMeasured => "NOT_MEASURED",
        })
    }
}

/// One perceptual metric compared against its pass threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricScore {
    pub score: Option<f64>,
    pub target: f64,
    /// `0-100`, `dB` or `0-1`.
    pub scale: &'static str,
    pub status: MetricStatus,
}

impl MetricScore {
    pub fn new(score: Option<f64>, target: f64, scale: &'static str) -> Self {
        let status = match score {
            Some(s) if s >= target => MetricStatus::Pass,
            Some(_) => MetricStatus::Fail,
            None => MetricStatus::NotMeasured,
        };
        Self {
            score,
            target,
            scale,
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub vmaf: MetricScore,
    pub psnr: MetricScore,
    pub ssim: MetricScore,
}

impl QualityMetrics {
    pub fn from_scores(
        vmaf: Option<f64>,
        psnr: Option<f64>,
        ssim: Option<f64>,
        targets: &QualityConfig,
    ) -> Self {
        Self {
            vmaf: MetricScore::new(vmaf, targets.vmaf_target, "0-100"),
            psnr: MetricScore::new(psnr, targets.psnr_target, "dB"),
            ssim: MetricScore::new(ssim, targets.ssim_target, "0-1"),
        }
    }
}

/// Overall delivery grade, banded on the VMAF score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityGrade {
    Excellent,
    Good,
    Acceptable,
    Poor,
    NotMeasured,
}

impl QualityGrade {
    pub fn from_vmaf(vmaf: Option<f64>, bands: &QualityConfig) -> Self {
        match vmaf {
            None => QualityGrade::NotMeasured,
            Some(v) if v >= bands.grade_excellent => QualityGrade::Excellent,
            Some(v) if v >= bands.grade_good => QualityGrade::Good,
            Some(v) if v >= bands.grade_acceptable => QualityGrade::Acceptable,
            Some(_) => QualityGrade::Poor,
        }
    }
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QualityGrade::Excellent => "EXCELLENT",
            QualityGrade::Good => "GOOD",
            QualityGrade::Acceptable => "ACCEPTABLE",
            QualityGrade::Poor => "POOR",
            QualityGrade::NotMeasured => "NOT_MEASURED",
        })
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub video_name: String,
    pub reference_video: PathBuf,
    pub enhanced_video: PathBuf,
    pub timestamp: DateTime<Local>,
    pub metrics: QualityMetrics,
    /// Metrics that could not be measured, with the reason.
    pub failures: Vec<String>,
    pub json_report: PathBuf,
    pub csv_report: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vmaf_log: Option<PathBuf>,
}

impl QualityReport {
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// `Metric,Score,Status` table mirroring the JSON report.
pub fn render_csv(metrics: &QualityMetrics) -> String {
    let cell = |score: Option<f64>, precision: usize, suffix: &str| match score {
        Some(s) => format!("{s:.precision$}{suffix}"),
        None => "n/a".to_string(),
    };
    let mut out = String::from("Metric,Score,Status\n");
    let _ = writeln!(out, "VMAF,{},{}", cell(metrics.vmaf.score, 2, ""), metrics.vmaf.status);
    let _ = writeln!(out, "PSNR,{},{}", cell(metrics.psnr.score, 2, " dB"), metrics.psnr.status);
    let _ = writeln!(out, "SSIM,{},{}", cell(metrics.ssim.score, 4, ""), metrics.ssim.status);
    out
}

// ============================================================================
// STAGE
// ============================================================================

/// Compares `enhanced` against `reference` and writes the reports into `out_dir`.
pub fn check_quality(
    ctx: &StageContext<'_>,
    reference: &MediaArtifact,
    enhanced: &MediaArtifact,
    out_dir: &Path,
) -> CoreResult<QualityReport> {
    log_subsection("Quality Check");
    fs::create_dir_all(out_dir)?;
    let name = reference.stem();
    let targets = &ctx.config.quality;
    let mut failures = Vec::new();

    info!("Calculating VMAF");
    let vmaf_log = out_dir.join(format!("{name}_vmaf.json"));
    let vmaf_graph = comparison_graph(
        reference,
        Filter::new("libvmaf")
            .kv("log_fmt", "json")
            .kv("log_path", vmaf_log.display())
            .kv("n_threads", targets.vmaf_threads),
    );
    let vmaf_cmd = comparison_command(ctx, reference, enhanced, &vmaf_graph)
        .expect(ExpectedOutput::File(vmaf_log.clone()));
    let vmaf = measure("VMAF", &mut failures, || {
        ctx.invoker.execute(&vmaf_cmd, ctx.cancel)?;
        parse_vmaf_log(&fs::read_to_string(&vmaf_log)?)
    })?;

    info!("Calculating PSNR");
    let psnr_cmd = comparison_command(
        ctx,
        reference,
        enhanced,
        &comparison_graph(reference, Filter::new("psnr")),
    );
    let psnr = measure("PSNR", &mut failures, || {
        let output = ctx.invoker.execute(&psnr_cmd, ctx.cancel)?;
        parse_psnr(&output.stderr)
    })?;

    info!("Calculating SSIM");
    let ssim_cmd = comparison_command(
        ctx,
        reference,
        enhanced,
        &comparison_graph(reference, Filter::new("ssim")),
    );
    let ssim = measure("SSIM", &mut failures, || {
        let output = ctx.invoker.execute(&ssim_cmd, ctx.cancel)?;
        parse_ssim(&output.stderr)
    })?;

    let metrics = QualityMetrics::from_scores(vmaf, psnr, ssim, targets);
    let report = QualityReport {
        video_name: name.clone(),
        reference_video: reference.path.clone(),
        enhanced_video: enhanced.path.clone(),
        timestamp: Local::now(),
        metrics,
        failures,
        json_report: out_dir.join(format!("{name}_quality.json")),
        csv_report: out_dir.join(format!("{name}_quality.csv")),
        vmaf_log: vmaf.map(|_| vmaf_log),
    };
    fs::write(&report.json_report, serde_json::to_string_pretty(&report)?)?;
    fs::write(&report.csv_report, render_csv(&report.metrics))?;

    info!(
        "VMAF {} ({}), PSNR {} ({}), SSIM {} ({})",
        display_score(report.metrics.vmaf.score, 2),
        report.metrics.vmaf.status,
        display_score(report.metrics.psnr.score, 2),
        report.metrics.psnr.status,
        display_score(report.metrics.ssim.score, 4),
        report.metrics.ssim.status
    );
    Ok(report)
}

/// Runs one metric pass, turning any failure except cancellation into a
/// recorded gap.
fn measure(
    metric: &str,
    failures: &mut Vec<String>,
    pass: impl FnOnce() -> CoreResult<f64>,
) -> CoreResult<Option<f64>> {
    match pass() {
        Ok(score) => Ok(Some(score)),
        Err(e) if e.is_cancelled() => Err(e),
        Err(e) => {
            warn!("{} could not be measured: {}", metric, e);
            failures.push(format!("{metric}: {e}"));
            Ok(None)
        }
    }
}

fn display_score(score: Option<f64>, precision: usize) -> String {
    score
        .map(|s| format!("{s:.precision$}"))
        .unwrap_or_else(|| "n/a".to_string())
}

/// `[0:v]fps,scale,setpts[main];[1:v]setpts[ref];[main][ref]<metric>`.
fn comparison_graph(reference: &MediaArtifact, metric: Filter) -> FilterGraph {
    let mut main = FilterChain::new().input("0:v");
    if reference.frame_rate.is_finite() && reference.frame_rate > 0.0 {
        main = main.then(Filter::new("fps").pos(fps_arg(reference.frame_rate)));
    }
    let main = main
        .then(
            Filter::new("scale")
                .pos(reference.resolution.width)
                .pos(reference.resolution.height)
                .kv("flags", "bicubic"),
        )
        .then(Filter::new("setpts").pos("PTS-STARTPTS"))
        .output("main");

    FilterGraph::new()
        .chain(main)
        .chain(
            FilterChain::new()
                .input("1:v")
                .then(Filter::new("setpts").pos("PTS-STARTPTS"))
                .output("ref"),
        )
        .chain(FilterChain::new().input("main").input("ref").then(metric))
}

fn comparison_command(
    ctx: &StageContext<'_>,
    reference: &MediaArtifact,
    enhanced: &MediaArtifact,
    graph: &FilterGraph,
) -> ToolCommand {
    ctx.config
        .tools
        .ffmpeg()
        .opt("-i", &enhanced.path)
        .opt("-i", &reference.path)
        .filter("-lavfi", graph)
        .opt("-f", "null")
        .arg("-")
}

// ============================================================================
// PARSERS
// ============================================================================

/// Pooled mean VMAF from a libvmaf JSON log.
pub fn parse_vmaf_log(json: &str) -> CoreResult<f64> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    value
        .pointer("/pooled_metrics/vmaf/mean")
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| CoreError::Analysis("VMAF log has no pooled_metrics.vmaf.mean".to_string()))
}

/// Average PSNR from the filter's summary line (the last one wins).
pub fn parse_psnr(stderr: &str) -> CoreResult<f64> {
    last_capture(&PSNR_AVERAGE_RE, stderr, "PSNR")
}

/// Combined SSIM from the `All:` field of the summary line.
pub fn parse_ssim(stderr: &str) -> CoreResult<f64> {
    last_capture(&SSIM_ALL_RE, stderr, "SSIM")
}

fn last_capture(
    re: &'static Lazy<Result<Regex, regex::Error>>,
    text: &str,
    metric: &str,
) -> CoreResult<f64> {
    let re = re
        .as_ref()
        .map_err(|e| CoreError::Analysis(format!("invalid {metric} regex: {e}")))?;
    text.lines()
        .filter_map(|line| re.captures(line)?.get(1)?.as_str().parse::<f64>().ok())
        .last()
        .ok_or_else(|| CoreError::Analysis(format!("no {metric} summary in ffmpeg output")))
}
