// ============================================================================
// cinestage-core/src/captions.rs
// ============================================================================
//
// CAPTIONS: Speech-to-Text Subtitles in SRT and WebVTT
//
// 1. Extract 16 kHz mono PCM audio into a scoped temp directory
// 2. Run the speech-to-text tool with JSON output
// 3. Emit SRT and WebVTT files from the transcript segments
//
// The extracted audio is removed on every exit path unless `keep_audio` is
// set, in which case it is moved next to the caption files. Captions never
// feed the artifact chain, so the coordinator treats a failure here as
// advisory.

use crate::error::{CoreError, CoreResult};
use crate::external::Tool;
use crate::logging::log_subsection;
use crate::media::MediaArtifact;
use crate::pipeline::StageContext;
use crate::temp_files::{create_temp_dir, persist_file};

use log::info;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// One timed line of the transcript.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct Transcript {
    #[serde(default)]
    segments: Vec<TranscriptSegment>,
}

/// Files written by the caption stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionResult {
    pub video_name: String,
    pub srt_path: PathBuf,
    pub vtt_path: PathBuf,
    pub segment_count: usize,
    pub model_used: String,
    /// Present only when the extracted audio was kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
}

/// Generates captions for `input`, writing them into `out_dir`.
pub fn generate_captions(
    ctx: &StageContext<'_>,
    input: &MediaArtifact,
    out_dir: &Path,
) -> CoreResult<CaptionResult> {
    log_subsection("Captions");
    let settings = &ctx.config.captions;
    let tools = &ctx.config.tools;
    let name = input.stem();
    fs::create_dir_all(out_dir)?;

    let scratch = create_temp_dir(&ctx.config.paths, out_dir, "captions")?;
    let audio = scratch.path().join(format!("{name}.wav"));
    let transcript_dir = scratch.path().join("transcript");

    info!("Extracting audio from {}", input.path.display());
    let extract = tools
        .ffmpeg()
        .opt("-i", &input.path)
        .flag("-vn")
        .opt("-acodec", "pcm_s16le")
        .opt("-ar", "16000")
        .opt("-ac", "1")
        .output(&audio);
    ctx.invoker.execute(&extract, ctx.cancel)?;

    info!("Transcribing with model '{}'", settings.model);
    let transcript_path = transcript_dir.join(format!("{name}.json"));
    let mut transcribe = tools
        .command(Tool::SpeechToText)
        .arg(&audio)
        .opt("--model", &settings.model)
        .opt("--output_format", "json")
        .opt("--output_dir", &transcript_dir);
    if let Some(language) = &settings.language {
        transcribe = transcribe.opt("--language", language);
    }
    let transcribe = transcribe.output(&transcript_path);
    ctx.invoker.execute(&transcribe, ctx.cancel)?;

    let segments = parse_transcript(&fs::read_to_string(&transcript_path)?)?;
    info!("Transcription complete: {} segments", segments.len());

    let srt_path = out_dir.join(format!("{name}.srt"));
    fs::write(&srt_path, render_srt(&segments))?;
    let vtt_path = out_dir.join(format!("{name}.vtt"));
    fs::write(&vtt_path, render_vtt(&segments))?;

    let audio_path = if settings.keep_audio {
        Some(persist_file(&audio, out_dir)?)
    } else {
        None
    };

    Ok(CaptionResult {
        video_name: name,
        srt_path,
        vtt_path,
        segment_count: segments.len(),
        model_used: settings.model.clone(),
        audio_path,
    })
}

/// Reads the segments of a speech-to-text JSON document.
pub fn parse_transcript(json: &str) -> CoreResult<Vec<TranscriptSegment>> {
    let transcript: Transcript = serde_json::from_str(json)?;
    let segments = transcript
        .segments
        .into_iter()
        .map(|s| TranscriptSegment {
            text: s.text.trim().to_string(),
            ..s
        })
        .collect::<Vec<_>>();
    if let Some(bad) = segments.iter().find(|s| s.end < s.start) {
        return Err(CoreError::ToolExecution {
            tool: Tool::SpeechToText.label().to_string(),
            code: None,
            stderr: format!(
                "transcript segment ends before it starts ({} > {})",
                bad.start, bad.end
            ),
        });
    }
    Ok(segments)
}

/// `HH:MM:SS` plus truncated milliseconds, joined by `separator`.
fn timestamp(seconds: f64, separator: char) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).floor() as u64
    } else {
        0
    };
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (secs, millis) = (rest / 1000, rest % 1000);
    format!("{hours:02}:{minutes:02}:{secs:02}{separator}{millis:03}")
}

pub fn srt_timestamp(seconds: f64) -> String {
    timestamp(seconds, ',')
}

pub fn vtt_timestamp(seconds: f64) -> String {
    timestamp(seconds, '.')
}

pub fn render_srt(segments: &[TranscriptSegment]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            srt_timestamp(seg.start),
            srt_timestamp(seg.end),
            seg.text
        );
    }
    out
}

pub fn render_vtt(segments: &[TranscriptSegment]) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for seg in segments {
        let _ = write!(
            out,
            "{} --> {}\n{}\n\n",
            vtt_timestamp(seg.start),
            vtt_timestamp(seg.end),
            seg.text
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::external::CancelToken;
    use crate::external::mocks::{MockInvoker, MockProber, MockResponse, sample_artifact};
    use tempfile::tempdir;

    fn segment(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn timestamps_truncate_milliseconds() {
        assert_eq!(srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(srt_timestamp(3661.5), "01:01:01,500");
        assert_eq!(vtt_timestamp(59.9999), "00:00:59.999");
        assert_eq!(vtt_timestamp(-2.0), "00:00:00.000");
    }

    #[test]
    fn srt_cues_are_numbered_from_one() {
        let text = render_srt(&[segment(0.0, 2.5, "Hello."), segment(2.5, 4.0, "World.")]);
        assert_eq!(
            text,
            "1\n00:00:00,000 --> 00:00:02,500\nHello.\n\n2\n00:00:02,500 --> 00:00:04,000\nWorld.\n\n"
        );
    }

    #[test]
    fn vtt_starts_with_header() {
        let text = render_vtt(&[segment(1.0, 2.0, "Hi")]);
        assert_eq!(text, "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nHi\n\n");
        assert_eq!(render_vtt(&[]), "WEBVTT\n\n");
    }

    #[test]
    fn transcript_text_is_trimmed() {
        let json = r#"{"text":" a b","segments":[{"id":0,"start":0.0,"end":1.2,"text":" a "},{"id":1,"start":1.2,"end":2.0,"text":"b"}]}"#;
        let segments = parse_transcript(json).unwrap();
        assert_eq!(segments, vec![segment(0.0, 1.2, "a"), segment(1.2, 2.0, "b")]);
    }

    #[test]
    fn inverted_segment_is_a_tool_failure() {
        let err = parse_transcript(r#"{"segments":[{"start":3.0,"end":1.0,"text":"x"}]}"#).unwrap_err();
        assert!(matches!(err, CoreError::ToolExecution { ref tool, .. } if tool == "speech-to-text"));
    }

    const TRANSCRIPT: &str =
        r#"{"segments":[{"start":0.0,"end":1.5,"text":" Welcome back."},{"start":1.5,"end":3.25,"text":"Let's begin."}]}"#;

    fn run_with(config: PipelineConfig, out: &Path) -> (CoreResult<CaptionResult>, MockInvoker) {
        let invoker = MockInvoker::new();
        invoker.expect(Tool::SpeechToText, None, MockResponse::writes(TRANSCRIPT));
        let prober = MockProber::with_frame_rate(30.0);
        let cancel = CancelToken::new();
        let ctx = StageContext {
            invoker: &invoker,
            prober: &prober,
            config: &config,
            cancel: &cancel,
        };
        let input = sample_artifact(Path::new("/videos/talk.mp4"), 30.0);
        let result = generate_captions(&ctx, &input, out);
        (result, invoker)
    }

    #[test]
    fn captions_are_written_and_audio_removed() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("captions");
        let (result, invoker) = run_with(PipelineConfig::default(), &out);
        let result = result.unwrap();

        assert_eq!(result.segment_count, 2);
        assert_eq!(result.model_used, "base");
        assert_eq!(result.audio_path, None);
        let srt = fs::read_to_string(&result.srt_path).unwrap();
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:01,500\nWelcome back.\n"));
        assert!(fs::read_to_string(&result.vtt_path).unwrap().starts_with("WEBVTT\n\n"));

        let mut names: Vec<_> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["talk.srt", "talk.vtt"]);

        let calls = invoker.calls_for(Tool::SpeechToText);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].value_of("--output_format").as_deref(), Some("json"));
        assert_eq!(calls[0].value_of("--language"), None);
    }

    #[test]
    fn kept_audio_moves_next_to_captions() {
        let dir = tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.captions.keep_audio = true;
        config.captions.language = Some("en".to_string());
        let (result, invoker) = run_with(config, dir.path());
        let result = result.unwrap();

        assert_eq!(result.audio_path, Some(dir.path().join("talk.wav")));
        assert!(dir.path().join("talk.wav").is_file());
        let calls = invoker.calls_for(Tool::SpeechToText);
        assert_eq!(calls[0].value_of("--language").as_deref(), Some("en"));
    }

    #[test]
    fn missing_speech_tool_surfaces_as_unavailable() {
        let dir = tempdir().unwrap();
        let invoker = MockInvoker::new();
        invoker.mark_unavailable(Tool::SpeechToText);
        invoker.expect(Tool::Ffmpeg, Some("pcm_s16le"), MockResponse::ok());
        let prober = MockProber::with_frame_rate(30.0);
        let cancel = CancelToken::new();
        let config = PipelineConfig::default();
        let ctx = StageContext {
            invoker: &invoker,
            prober: &prober,
            config: &config,
            cancel: &cancel,
        };
        let input = sample_artifact(Path::new("/videos/talk.mp4"), 30.0);
        let err = generate_captions(&ctx, &input, dir.path()).unwrap_err();
        assert!(err.is_tool_unavailable());
    }
}
