#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # IMG.LY Video Object Removal Library
//!
//! Removes every instance of one object class from a video. Each frame goes
//! through a YOLO-style detector, the boxes of the chosen class become an erase
//! mask, and the masked regions are filled with Telea inpainting before the
//! frame is re-encoded.
//!
//! ## Features
//!
//! - **Multiple Backends**: ONNX Runtime (GPU acceleration) and Tract (Pure Rust)
//! - **Hardware Acceleration**: CUDA, `CoreML`, and CPU execution providers
//! - **Model Management**: Automatic downloading and caching of detector models from `HuggingFace`
//! - **Video I/O**: FFmpeg decoding and encoding (enable with `video-support`), in-memory clips for tests
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imgly_objremove::{EraseConfig, ModelSpec, ModelDownloader, remove_object_from_video};
//!
//! # async fn example() -> anyhow::Result<()> {
//! // Download and cache the detector (one-time setup)
//! let downloader = ModelDownloader::new()?;
//! let model_id = downloader
//!     .download_model("https://huggingface.co/imgly/yolov8n-onnx", true)
//!     .await?;
//!
//! let config = EraseConfig::builder()
//!     .model_spec(ModelSpec::downloaded(model_id))
//!     .build()?;
//!
//! let summary = remove_object_from_video("walk.mp4", "output/removed_person_walk.mp4", "person", &config)?;
//! println!("{} of {} frames inpainted", summary.frames_modified, summary.frames_processed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Frame-level API
//!
//! [`ObjectRemovalPipeline`] works on any [`FrameSource`] and [`FrameSink`], so
//! frames can come from memory instead of a file:
//!
//! ```rust,no_run
//! use imgly_objremove::{
//!     EraseConfig, FrameSource, MemorySink, MemorySource, ObjectRemovalPipeline, VideoJob,
//! };
//!
//! # fn example(frames: Vec<image::RgbImage>) -> anyhow::Result<()> {
//! let mut pipeline = ObjectRemovalPipeline::from_config(EraseConfig::default())?;
//! let mut source = MemorySource::from_frames(frames, 30.0)?;
//! let job = VideoJob::new("memory", "memory-out", "dog", source.metadata().clone())?;
//! let mut sink = MemorySink::new();
//! pipeline.run(&job, &mut source, &mut sink)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `video-support` (default): FFmpeg decoding and encoding
//! - `cli` (default): Command-line interface and progress bars
//! - `tracing-json`, `tracing-files`: extra log outputs for the CLI

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod detector;
pub mod download;
pub mod error;
pub mod inference;
pub mod inpaint;
pub mod mask;
pub mod models;
pub mod pipeline;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::video::{
    frame_rate_fraction, FourCc, FrameSink, FrameSource, MemorySink, MemorySource, SinkGuard,
    VideoFormat, VideoFrame, VideoMetadata,
};
#[cfg(feature = "video-support")]
pub use backends::video::{FFmpegSink, FFmpegSource};
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{
    BackendType, DetectorParams, EraseConfig, EraseConfigBuilder, ExecutionProvider,
    UnknownTargetPolicy, WorkspaceDirs,
};
pub use detector::{coco_labels, ObjectDetector, YoloDetector, COCO_LABELS};
pub use download::{parse_huggingface_url, validate_model_url, ModelDownloader};
pub use error::{ObjRemovalError, Result};
pub use inference::{BackendFactory, DefaultBackendFactory, InferenceBackend};
pub use inpaint::{Inpainter, TeleaInpainter, INPAINT_RADIUS};
pub use mask::{build_mask, LabelMatch, MaskBuilder, MaskPolicy};
pub use models::{ModelManager, ModelSource, ModelSpec};
pub use pipeline::{FrameOutcome, ObjectRemovalPipeline};
pub use services::{
    ConsoleProgressReporter, FrameProgress, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressTracker, ProgressUpdate, VideoIOService,
};
pub use types::{BoundingBox, Detection, JobSummary, Mask, ProcessingTimings, VideoJob};
pub use utils::{ExecutionProviderManager, ProviderInfo};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, spans, TracingConfig, TracingFormat, TracingOutput};

/// Remove `target_class` from the video at `input` and write the result to `output`
///
/// Resolves the model from `config.model_spec`, probes the input, and runs the
/// frame loop with FFmpeg on both ends. The model must already be available
/// locally; see [`ModelDownloader`] for fetching it.
///
/// # Examples
/// ```rust,no_run
/// use imgly_objremove::{remove_object_from_video, EraseConfig, ModelSpec};
///
/// # fn example() -> anyhow::Result<()> {
/// let config = EraseConfig::builder()
///     .model_spec(ModelSpec::external("models/yolov8n.onnx"))
///     .build()?;
/// remove_object_from_video("input/park.mov", "output/removed_dog_park.mov", "dog", &config)?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "video-support")]
pub fn remove_object_from_video<P: AsRef<std::path::Path>, Q: AsRef<std::path::Path>>(
    input: P,
    output: Q,
    target_class: &str,
    config: &EraseConfig,
) -> Result<JobSummary> {
    let job = VideoJob::probe(input.as_ref(), output.as_ref(), target_class)?;
    let mut pipeline = ObjectRemovalPipeline::from_config(config.clone())?;
    pipeline.run_file(&job)
}
