// ============================================================================
// cinestage-core/src/analysis/scenes.rs
// ============================================================================
//
// SCENE-CUT DETECTION
//
// Runs ffmpeg's `select` + `showinfo` filters over the input and scrapes the
// diagnostic stream for the timestamps of selected frames. Frames only reach
// `showinfo` when their scene score exceeds the threshold, so every
// `pts_time:` line is a cut.

// ---- Internal crate imports ----
use crate::config::ToolPaths;
use crate::error::{CoreError, CoreResult};
use crate::external::{CancelToken, Filter, FilterGraph, ToolInvoker};
use crate::media::MediaArtifact;

// ---- External crate imports ----
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

// ---- Standard library imports ----
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

static PTS_TIME_RE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"pts_time:\s*([0-9]+(?:\.[0-9]+)?)"));

static SCENE_SCORE_RE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?:scene:|lavfi\.scene_score=)\s*([0-9]+(?:\.[0-9]+)?)"));

/// A detected cut.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneCut {
    pub timestamp: f64,
    /// Scene score, when the filter reported one.
    pub score: Option<f64>,
}

/// Detects scene cuts in `artifact` above `threshold`.
pub fn detect_scenes(
    invoker: &dyn ToolInvoker,
    tools: &ToolPaths,
    artifact: &MediaArtifact,
    threshold: f64,
    cancel: &CancelToken,
) -> CoreResult<Vec<SceneCut>> {
    let graph = FilterGraph::simple([
        Filter::new("select").pos(format!("gt(scene,{threshold})")),
        Filter::new("showinfo"),
    ]);
    let command = tools
        .ffmpeg()
        .opt("-i", &artifact.path)
        .filter("-filter:v", &graph)
        .opt("-f", "null")
        .arg("-");

    let output = invoker.execute(&command, cancel)?;
    let cuts = parse_showinfo(&output.stderr, threshold)?;
    debug!("Scene detection found {} cuts in {}", cuts.len(), artifact.path.display());
    Ok(cuts)
}

/// Extracts cuts from `showinfo` diagnostics.
///
/// Lines that carry an explicit scene score at or below `threshold` are
/// dropped; lines without a score are trusted because `select` already
/// filtered them.
pub fn parse_showinfo(stderr: &str, threshold: f64) -> CoreResult<Vec<SceneCut>> {
    let pts_re = compiled(&PTS_TIME_RE)?;
    let score_re = compiled(&SCENE_SCORE_RE)?;

    let mut cuts = Vec::new();
    for line in stderr.lines() {
        let Some(timestamp) = pts_re
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
        else {
            continue;
        };
        let score = score_re
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok());
        if score.is_some_and(|s| s <= threshold) {
            continue;
        }
        cuts.push(SceneCut { timestamp, score });
    }
    Ok(cuts)
}

fn compiled(re: &'static Lazy<Result<Regex, regex::Error>>) -> CoreResult<&'static Regex> {
    re.as_ref()
        .map_err(|e| CoreError::Analysis(format!("invalid scene regex: {e}")))
}

/// Writes the human-readable scene report.
pub fn write_scene_report(path: &Path, cuts: &[SceneCut], threshold: f64) -> CoreResult<()> {
    let mut text = String::new();
    let _ = writeln!(text, "Scene Detection (threshold={threshold})");
    let _ = writeln!(text, "{}", "=".repeat(50));
    let _ = writeln!(text);

    if cuts.is_empty() {
        let _ = writeln!(text, "No scene cuts detected above threshold.");
        let _ = writeln!(text, "This video appears to be a single continuous scene.");
    } else {
        for cut in cuts {
            match cut.score {
                Some(score) => {
                    let _ = writeln!(text, "Scene cut at {:.3}s (score: {:.3})", cut.timestamp, score);
                }
                None => {
                    let _ = writeln!(text, "Scene cut at {:.3}s", cut.timestamp);
                }
            }
        }
        let _ = writeln!(text);
        let _ = writeln!(text, "Total scene cuts: {}", cuts.len());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}
