//! Frame loop tying detection, masking, inpainting and encoding together
//!
//! Per frame: `detect -> build mask -> (empty mask ? pass through : inpaint) -> encode`.
//! The loop is synchronous and single-threaded. The sink is held by a
//! [`SinkGuard`] so the output is finalized on every exit path.

use crate::backends::video::{FrameSink, FrameSource, SinkGuard, VideoFrame};
use crate::config::{EraseConfig, UnknownTargetPolicy};
use crate::detector::{ObjectDetector, YoloDetector};
use crate::error::{ObjRemovalError, Result};
use crate::inference::{BackendFactory, DefaultBackendFactory};
use crate::inpaint::{Inpainter, TeleaInpainter};
use crate::mask::MaskBuilder;
use crate::models::ModelManager;
use crate::services::progress::{ProcessingStage, ProgressReporter, ProgressTracker};
use crate::types::{JobSummary, Mask, ProcessingTimings, VideoJob};
use instant::Instant;
use tracing::{instrument, span, Level};

/// Result of processing a single frame
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    /// Frame to encode; identical to the input when `passed_through`
    pub frame: VideoFrame,
    /// Erase mask built for the frame
    pub mask: Mask,
    /// Detections of the target class that went into the mask
    pub detections_matched: usize,
    /// True when the mask was empty and the frame was not inpainted
    pub passed_through: bool,
}

/// Time spent in each stage of one frame, in milliseconds
#[derive(Debug, Clone, Copy, Default)]
struct FrameTimings {
    detection_ms: u64,
    mask_ms: u64,
    inpaint_ms: u64,
}

/// Video object removal pipeline
pub struct ObjectRemovalPipeline {
    detector: Box<dyn ObjectDetector>,
    mask_builder: MaskBuilder,
    inpainter: Box<dyn Inpainter>,
    config: EraseConfig,
    progress: ProgressTracker,
    model_load_ms: u64,
}

impl std::fmt::Debug for ObjectRemovalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRemovalPipeline")
            .field("mask_builder", &self.mask_builder)
            .field("labels", &self.detector.labels().len())
            .field("model_load_ms", &self.model_load_ms)
            .finish_non_exhaustive()
    }
}

impl ObjectRemovalPipeline {
    /// Assemble a pipeline from ready components
    #[must_use]
    pub fn new(
        detector: Box<dyn ObjectDetector>,
        inpainter: Box<dyn Inpainter>,
        config: EraseConfig,
    ) -> Self {
        Self {
            detector,
            mask_builder: MaskBuilder::new(config.mask_policy),
            inpainter,
            config,
            progress: ProgressTracker::no_op(),
            model_load_ms: 0,
        }
    }

    /// Resolve the model and build the detector with the compiled-in backends
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Model missing or failing to load
    pub fn from_config(config: EraseConfig) -> Result<Self> {
        Self::with_factory(config, &DefaultBackendFactory)
    }

    /// Like [`ObjectRemovalPipeline::from_config`] with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Model missing or failing to load
    pub fn with_factory(config: EraseConfig, factory: &dyn BackendFactory) -> Result<Self> {
        config.validate()?;
        let model_manager = ModelManager::from_spec(&config.model_spec)?;
        Self::with_model_manager(config, model_manager, factory)
    }

    /// Build the detector from an already resolved model
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Label table invalid or model failing to load
    pub fn with_model_manager(
        config: EraseConfig,
        model_manager: ModelManager,
        factory: &dyn BackendFactory,
    ) -> Result<Self> {
        config.validate()?;

        let load_start = Instant::now();
        let detector = {
            let _span = span!(Level::INFO, "model_load", backend = %config.backend_type).entered();
            YoloDetector::from_model_manager(&config, model_manager, factory)?
        };
        let model_load_ms = load_start.elapsed().as_millis() as u64;

        let inpainter = TeleaInpainter::with_radius(config.inpaint_radius)?;
        let mut pipeline = Self::new(Box::new(detector), Box::new(inpainter), config);
        pipeline.model_load_ms = model_load_ms;
        Ok(pipeline)
    }

    /// Replace the progress reporter
    #[must_use]
    pub fn with_progress(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.progress = ProgressTracker::new(reporter);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EraseConfig {
        &self.config
    }

    /// Labels the detector can produce
    #[must_use]
    pub fn labels(&self) -> &[String] {
        self.detector.labels()
    }

    /// Whether any detector label matches `target` under the mask policy
    #[must_use]
    pub fn is_known_target(&self, target: &str) -> bool {
        let label_match = self.mask_builder.policy().label_match;
        self.detector
            .labels()
            .iter()
            .any(|label| label_match.matches(label, target))
    }

    /// Detect, mask and (when needed) inpaint one frame
    ///
    /// # Errors
    /// - Detector inference failures
    /// - Inpainting failures
    pub fn process_frame(&mut self, frame: VideoFrame, target_class: &str) -> Result<FrameOutcome> {
        self.process_frame_timed(frame, target_class)
            .map(|(outcome, _)| outcome)
    }

    fn process_frame_timed(
        &mut self,
        frame: VideoFrame,
        target_class: &str,
    ) -> Result<(FrameOutcome, FrameTimings)> {
        let mut timings = FrameTimings::default();

        let start = Instant::now();
        let detections = self
            .detector
            .detect(&frame.image)
            .map_err(|e| match e {
                ObjRemovalError::Inference(msg) => ObjRemovalError::Inference(format!(
                    "frame {}: {}",
                    frame.index, msg
                )),
                other => other,
            })?;
        timings.detection_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let mask = self
            .mask_builder
            .build(&detections, target_class, frame.dimensions());
        let detections_matched = self.mask_builder.matched_count(&detections, target_class);
        timings.mask_ms = start.elapsed().as_millis() as u64;

        if mask.is_empty() {
            return Ok((
                FrameOutcome {
                    frame,
                    mask,
                    detections_matched,
                    passed_through: true,
                },
                timings,
            ));
        }

        let start = Instant::now();
        let image = self.inpainter.inpaint(&frame.image, &mask)?;
        timings.inpaint_ms = start.elapsed().as_millis() as u64;

        log::debug!(
            "Frame {}: {} '{}' detections, {} pixels inpainted",
            frame.index,
            detections_matched,
            target_class,
            mask.erased_count()
        );

        Ok((
            FrameOutcome {
                frame: frame.with_image(image),
                mask,
                detections_matched,
                passed_through: false,
            },
            timings,
        ))
    }

    /// Run a job over a frame source into a frame sink
    ///
    /// Frames are read until the source is exhausted. Every frame is written,
    /// inpainted or not. The sink is finished on success and on failure.
    ///
    /// # Errors
    /// - Target outside the label set under [`UnknownTargetPolicy::Reject`]
    /// - Decode, inference or encode failures
    #[instrument(
        skip_all,
        fields(
            target = %job.target_class(),
            input = %job.input_path().display(),
            output = %job.output_path().display()
        )
    )]
    pub fn run<S, K>(&mut self, job: &VideoJob, source: &mut S, sink: &mut K) -> Result<JobSummary>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        let result = self.run_frames(job, source, sink);
        if let Err(ref e) = result {
            self.progress.report_error(&e.to_string());
        }
        result
    }

    fn check_target(&self, target: &str) -> Result<bool> {
        let known = self.is_known_target(target);
        if known {
            return Ok(true);
        }
        match self.config.unknown_target {
            UnknownTargetPolicy::Reject => Err(ObjRemovalError::invalid_config(format!(
                "Target class '{target}' is not one of the {} detector labels",
                self.detector.labels().len()
            ))),
            UnknownTargetPolicy::Warn => {
                log::warn!(
                    "⚠️ '{}' is not a label of the detector; every frame will be copied unchanged",
                    target
                );
                Ok(false)
            },
            UnknownTargetPolicy::Ignore => Ok(false),
        }
    }

    /// End-of-run warning for a job that left every frame untouched
    ///
    /// Unknown targets under `Ignore` stay silent.
    fn warns_nothing_erased(&self, known_target: bool, frames_modified: u64) -> bool {
        frames_modified == 0
            && (known_target || self.config.unknown_target == UnknownTargetPolicy::Warn)
    }

    fn run_frames<S, K>(
        &mut self,
        job: &VideoJob,
        source: &mut S,
        sink: &mut K,
    ) -> Result<JobSummary>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        let total_start = Instant::now();
        let target = job.target_class();

        let mut sink = SinkGuard::new(sink);
        self.progress.report_stage(ProcessingStage::Initialization);
        let known_target = self.check_target(target)?;

        let mut timings = ProcessingTimings {
            model_load_ms: self.model_load_ms,
            ..ProcessingTimings::default()
        };
        let frames_total = source.metadata().frame_count;
        let mut frames_processed = 0u64;
        let mut frames_modified = 0u64;
        let mut detections_matched = 0u64;

        self.progress.report_stage_with_description(
            ProcessingStage::FrameProcessing,
            format!("Removing '{target}'"),
        );

        loop {
            let start = Instant::now();
            let Some(frame) = source.next_frame()? else {
                break;
            };
            timings.decode_ms += start.elapsed().as_millis() as u64;

            let (outcome, frame_timings) = self.process_frame_timed(frame, target)?;
            timings.detection_ms += frame_timings.detection_ms;
            timings.mask_ms += frame_timings.mask_ms;
            timings.inpaint_ms += frame_timings.inpaint_ms;

            let start = Instant::now();
            sink.write_frame(&outcome.frame)?;
            timings.encode_ms += start.elapsed().as_millis() as u64;

            frames_processed += 1;
            detections_matched += outcome.detections_matched as u64;
            if !outcome.passed_through {
                frames_modified += 1;
            }
            self.progress
                .report_frame(frames_processed, frames_total, !outcome.passed_through);
        }

        self.progress.report_stage(ProcessingStage::VideoFinalization);
        let start = Instant::now();
        sink.finish()?;
        timings.encode_ms += start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64 + self.model_load_ms;

        if self.warns_nothing_erased(known_target, frames_modified) {
            log::warn!(
                "⚠️ No frame contained '{}'; the output is a copy of the input",
                target
            );
        }

        let summary = JobSummary {
            frames_processed,
            frames_modified,
            detections_matched,
            timings,
            output_path: job.output_path().to_path_buf(),
        };
        self.progress.report_completion(&summary);
        Ok(summary)
    }

    /// Decode `job.input_path()` with FFmpeg and encode to `job.output_path()`
    ///
    /// # Errors
    /// - Input cannot be opened or output cannot be created
    /// - Any error of [`ObjectRemovalPipeline::run`]
    #[cfg(feature = "video-support")]
    pub fn run_file(&mut self, job: &VideoJob) -> Result<JobSummary> {
        use crate::backends::video::{FFmpegSink, FFmpegSource};
        use crate::services::VideoIOService;

        // A rejected target must fail before the output container exists
        if self.config.unknown_target == UnknownTargetPolicy::Reject {
            self.check_target(job.target_class())?;
        }

        self.progress.report_stage(ProcessingStage::VideoAnalysis);
        let mut source = FFmpegSource::open(job.input_path())?;
        VideoIOService::prepare_output(job.output_path())?;
        let mut sink = FFmpegSink::create(job.output_path(), job.metadata(), self.config.fourcc)?;
        self.run(job, &mut source, &mut sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockYoloBackend;
    use crate::backends::video::{MemorySink, MemorySource};
    use crate::config::DetectorParams;
    use crate::detector::coco_labels;
    use image::{Rgb, RgbImage};

    fn frames(count: usize) -> Vec<RgbImage> {
        (0..count)
            .map(|i| RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 3) as u8, (y * 3) as u8, i as u8])))
            .collect()
    }

    fn pipeline(backend: MockYoloBackend, config: EraseConfig) -> ObjectRemovalPipeline {
        let params = DetectorParams {
            input_size: 64,
            ..DetectorParams::default()
        };
        let mut detector = YoloDetector::new(Box::new(backend), coco_labels(), params);
        detector.initialize(&config).unwrap();
        ObjectRemovalPipeline::new(Box::new(detector), Box::new(TeleaInpainter::new()), config)
    }

    fn job(source: &MemorySource, target: &str) -> VideoJob {
        VideoJob::new("in.mp4", "out.mp4", target, source.metadata().clone()).unwrap()
    }

    #[test]
    fn test_process_frame_pass_through_without_matches() {
        let backend = MockYoloBackend::new(80).with_box(32.0, 32.0, 20.0, 20.0, 2, 0.9);
        let mut pipeline = pipeline(backend, EraseConfig::default());
        let image = frames(1).remove(0);
        let frame = VideoFrame::new(image.clone(), 0, std::time::Duration::ZERO);

        let outcome = pipeline.process_frame(frame, "person").unwrap();
        assert!(outcome.passed_through);
        assert_eq!(outcome.detections_matched, 0);
        assert!(outcome.mask.is_empty());
        assert_eq!(outcome.frame.image.as_raw(), image.as_raw());
    }

    #[test]
    fn test_process_frame_inpaints_matched_box() {
        let backend = MockYoloBackend::new(80).with_box(32.0, 32.0, 20.0, 20.0, 0, 0.9);
        let mut pipeline = pipeline(backend, EraseConfig::default());
        let image = frames(1).remove(0);
        let frame = VideoFrame::new(image.clone(), 0, std::time::Duration::ZERO);

        let outcome = pipeline.process_frame(frame, "person").unwrap();
        assert!(!outcome.passed_through);
        assert_eq!(outcome.detections_matched, 1);
        assert_eq!(outcome.mask.dimensions(), (64, 64));
        assert!(outcome.mask.is_erased(32, 32));
        assert!(!outcome.mask.is_erased(5, 5));
        assert_eq!(outcome.frame.image.get_pixel(5, 5), image.get_pixel(5, 5));
    }

    #[test]
    fn test_run_counts_frames_and_finishes_sink() {
        let backend = MockYoloBackend::new(80).with_box(32.0, 32.0, 20.0, 20.0, 0, 0.9);
        let mut pipeline = pipeline(backend, EraseConfig::default());
        let mut source = MemorySource::from_frames(frames(3), 25.0).unwrap();
        let job = job(&source, "person");
        let mut sink = MemorySink::new();

        let summary = pipeline.run(&job, &mut source, &mut sink).unwrap();
        assert_eq!(summary.frames_processed, 3);
        assert_eq!(summary.frames_modified, 3);
        assert_eq!(summary.detections_matched, 3);
        assert_eq!(summary.output_path, std::path::PathBuf::from("out.mp4"));
        assert!(sink.is_finished());
        assert_eq!(sink.finish_calls(), 1);
        assert_eq!(sink.frames().len(), 3);
    }

    #[test]
    fn test_unknown_target_reject() {
        let config = EraseConfig::builder()
            .unknown_target(UnknownTargetPolicy::Reject)
            .build()
            .unwrap();
        let mut pipeline = pipeline(MockYoloBackend::new(80), config);
        let mut source = MemorySource::from_frames(frames(2), 25.0).unwrap();
        let job = job(&source, "unicorn");
        let mut sink = MemorySink::new();

        let err = pipeline.run(&job, &mut source, &mut sink).unwrap_err();
        assert!(matches!(err, ObjRemovalError::InvalidConfig(_)));
        assert!(sink.frames().is_empty());
        assert_eq!(sink.finish_calls(), 1);
    }

    #[cfg(feature = "video-support")]
    #[test]
    fn test_run_file_reject_creates_no_output() {
        let config = EraseConfig::builder()
            .unknown_target(UnknownTargetPolicy::Reject)
            .build()
            .unwrap();
        let mut pipeline = pipeline(MockYoloBackend::new(80), config);
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output").join("removed_unicorn_clip.mp4");
        let metadata = crate::backends::video::VideoMetadata::new(
            64,
            64,
            25.0,
            2,
            crate::backends::video::VideoFormat::Mp4,
        );
        // The input does not exist; the target check must fail first
        let job = VideoJob::new(dir.path().join("clip.mp4"), &output, "unicorn", metadata).unwrap();

        let err = pipeline.run_file(&job).unwrap_err();
        assert!(matches!(err, ObjRemovalError::InvalidConfig(_)));
        assert!(!output.exists());
    }

    #[test]
    fn test_nothing_erased_warning_conditions() {
        let warn = pipeline(MockYoloBackend::new(80), EraseConfig::default());
        assert!(warn.warns_nothing_erased(true, 0));
        assert!(warn.warns_nothing_erased(false, 0));
        assert!(!warn.warns_nothing_erased(true, 4));

        let config = EraseConfig::builder()
            .unknown_target(UnknownTargetPolicy::Ignore)
            .build()
            .unwrap();
        let ignore = pipeline(MockYoloBackend::new(80), config);
        assert!(ignore.warns_nothing_erased(true, 0));
        assert!(!ignore.warns_nothing_erased(false, 0));
    }

    #[test]
    fn test_unknown_target_warn_passes_through() {
        let backend = MockYoloBackend::new(80).with_box(32.0, 32.0, 20.0, 20.0, 0, 0.9);
        let mut pipeline = pipeline(backend, EraseConfig::default());
        let mut source = MemorySource::from_frames(frames(2), 25.0).unwrap();
        let job = job(&source, "unicorn");
        let mut sink = MemorySink::new();

        let summary = pipeline.run(&job, &mut source, &mut sink).unwrap();
        assert_eq!(summary.frames_processed, 2);
        assert_eq!(summary.frames_modified, 0);
        assert!(!pipeline.is_known_target("unicorn"));
        assert!(pipeline.is_known_target("person"));
    }

    #[test]
    fn test_inference_failure_is_reported_with_frame_index() {
        let backend = MockYoloBackend::new(80).failing_inference();
        let mut pipeline = pipeline(backend, EraseConfig::default());
        let mut source = MemorySource::from_frames(frames(2), 25.0).unwrap();
        let job = job(&source, "person");
        let mut sink = MemorySink::new();

        let err = pipeline.run(&job, &mut source, &mut sink).unwrap_err();
        assert!(err.to_string().contains("frame 0"));
        assert!(sink.is_finished());
    }
}
