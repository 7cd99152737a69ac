//! Core library for the Cinestage video pipeline.
//!
//! This crate measures a video's motion, complexity, noise and blur, turns
//! those measurements into classifications and a quality score, runs the
//! enhancement stages the measurements call for, and packages the result as
//! an adaptive-bitrate HLS ladder with a quality report.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use cinestage_core::analysis::SignalExtractor;
//! use cinestage_core::config::PipelineConfigBuilder;
//! use cinestage_core::external::ProcessInvoker;
//! use cinestage_core::media::FfprobeProber;
//! use cinestage_core::pipeline::Coordinator;
//! use std::path::Path;
//!
//! let config = PipelineConfigBuilder::new()
//!     .output_root("/tmp/cinestage")
//!     .noise_threshold(80.0)
//!     .build();
//! config.validate().unwrap();
//!
//! let invoker = ProcessInvoker::default();
//! let prober = FfprobeProber;
//! let analyzer = SignalExtractor::with_ffmpeg(&config.tools, config.analysis);
//!
//! let outcome = Coordinator::new(&invoker, &prober, &analyzer, &config)
//!     .run(Path::new("/videos/clip.mp4"))
//!     .unwrap();
//! println!("final artifact: {}", outcome.run.final_artifact().path.display());
//! ```

pub mod analysis;
pub mod captions;
pub mod config;
pub mod decision;
pub mod enhance;
pub mod error;
pub mod external;
pub mod logging;
pub mod media;
pub mod notifications;
pub mod packaging;
pub mod pipeline;
pub mod quality;
pub mod temp_files;

// Re-exports for public API
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use decision::{ClassificationThresholds, DecisionEngine, DecisionRecord};
pub use error::{CoreError, CoreResult};
pub use media::{MediaArtifact, MediaProber};
pub use notifications::{NotificationSender, NtfyNotificationSender};
pub use pipeline::{Coordinator, PipelineRun, RunOutcome, StageResult, StageStatus};
pub use temp_files::{create_temp_dir, persist_file};
