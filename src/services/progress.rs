//! Progress reporting service
//!
//! Keeps progress output out of the frame loop so that the CLI, tests and
//! library users can each plug in their own reporter.

use crate::types::{JobSummary, ProcessingTimings};
use instant::Instant;

/// Stages of one removal run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Resolving the model and starting the backend
    Initialization,
    /// Probing the input container
    VideoAnalysis,
    /// Detecting, masking and inpainting frames
    FrameProcessing,
    /// Flushing the encoder and writing the trailer
    VideoFinalization,
    /// Run finished
    Completed,
}

impl ProcessingStage {
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Initialization => "Initializing model and backend",
            ProcessingStage::VideoAnalysis => "Analyzing video metadata",
            ProcessingStage::FrameProcessing => "Processing video frames",
            ProcessingStage::VideoFinalization => "Finalizing video file",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Nominal progress when a stage starts
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Initialization => 0,
            ProcessingStage::VideoAnalysis => 2,
            ProcessingStage::FrameProcessing => 5,
            ProcessingStage::VideoFinalization => 99,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Stage transition with timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
    /// Estimated time remaining (milliseconds, if available)
    pub eta_ms: Option<u64>,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            eta_ms: None,
            stage,
        }
    }

    #[must_use]
    pub fn with_description(
        stage: ProcessingStage,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            eta_ms: None,
            stage,
            description,
        }
    }

    #[must_use]
    pub fn with_eta(mut self, eta_ms: u64) -> Self {
        self.eta_ms = Some(eta_ms);
        self
    }
}

/// Per-frame progress emitted after a frame has been written
#[derive(Debug, Clone, PartialEq)]
pub struct FrameProgress {
    /// Frames written so far (1-based count)
    pub frames_done: u64,
    /// Frame count reported by the container; 0 when unknown
    pub frames_total: u64,
    /// Whether the last frame was inpainted
    pub modified: bool,
}

impl FrameProgress {
    #[must_use]
    pub fn new(frames_done: u64, frames_total: u64, modified: bool) -> Self {
        Self {
            frames_done,
            frames_total,
            modified,
        }
    }

    /// `frames_done / frames_total` as a percentage, capped at 100.
    ///
    /// `None` when the container did not report a frame count.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        if self.frames_total == 0 {
            return None;
        }
        let percent = self.frames_done as f64 / self.frames_total as f64 * 100.0;
        Some(percent.min(100.0))
    }
}

/// Sink for progress events of a removal run
pub trait ProgressReporter: Send + Sync {
    /// Report a stage transition
    fn report_progress(&self, update: ProgressUpdate);

    /// Report that one more frame has been written
    fn report_frame(&self, progress: FrameProgress);

    /// Report the finished run
    fn report_completion(&self, summary: &JobSummary);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// Reporter that discards everything
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_frame(&self, _progress: FrameProgress) {}

    fn report_completion(&self, _summary: &JobSummary) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

fn log_timings(timings: &ProcessingTimings) {
    log::info!("  📊 Detailed timings:");
    log::info!("    • Model load: {}ms", timings.model_load_ms);
    log::info!("    • Decode: {}ms", timings.decode_ms);
    log::info!("    • Detection: {}ms", timings.detection_ms);
    log::info!("    • Mask: {}ms", timings.mask_ms);
    log::info!("    • Inpaint: {}ms", timings.inpaint_ms);
    log::info!("    • Encode: {}ms", timings.encode_ms);
}

/// Plain console reporter printing `\rProgress: 42.0%` after every frame
#[derive(Debug)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::debug!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_frame(&self, progress: FrameProgress) {
        use std::io::Write;

        match progress.percent() {
            Some(percent) => eprint!("\rProgress: {percent:.1}%"),
            None => eprint!("\rProcessed frames: {}", progress.frames_done),
        }
        let _ = std::io::stderr().flush();
    }

    fn report_completion(&self, summary: &JobSummary) {
        eprintln!();
        log::info!(
            "✅ Processed {} frames ({} modified) in {}ms",
            summary.frames_processed,
            summary.frames_modified,
            summary.timings.total_ms
        );
        if self.verbose {
            log_timings(&summary.timings);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        eprintln!();
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}

/// Terminal progress bar driven by frame events
#[cfg(feature = "cli")]
#[derive(Debug)]
pub struct IndicatifProgressReporter {
    bar: indicatif::ProgressBar,
    verbose: bool,
}

#[cfg(feature = "cli")]
impl IndicatifProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        let bar = indicatif::ProgressBar::new(0);
        if let Ok(style) = indicatif::ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) {msg}",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar, verbose }
    }
}

#[cfg(feature = "cli")]
impl ProgressReporter for IndicatifProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.set_message(update.description.clone());
        if self.verbose {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_frame(&self, progress: FrameProgress) {
        // Containers may under-report; grow the bar instead of overflowing it.
        let len = progress.frames_total.max(progress.frames_done);
        if self.bar.length() != Some(len) {
            self.bar.set_length(len);
        }
        self.bar.set_position(progress.frames_done);
    }

    fn report_completion(&self, summary: &JobSummary) {
        self.bar.finish_with_message(format!(
            "{} of {} frames modified",
            summary.frames_modified, summary.frames_processed
        ));
        if self.verbose {
            log_timings(&summary.timings);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar.abandon_with_message(format!("failed during {}", stage.description()));
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}

/// Tracks the current stage and elapsed time for a reporter
pub struct ProgressTracker {
    reporter: Box<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current_stage", &self.current_stage)
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Box<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Tracker with a no-op reporter (tests, library default)
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Box::new(NoOpProgressReporter))
    }

    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Box::new(ConsoleProgressReporter::new(verbose)))
    }

    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    pub fn report_stage_with_description(&mut self, stage: ProcessingStage, description: String) {
        self.current_stage = Some(stage);
        self.reporter.report_progress(ProgressUpdate::with_description(
            stage,
            description,
            self.start_time,
        ));
    }

    pub fn report_frame(&self, frames_done: u64, frames_total: u64, modified: bool) {
        self.reporter
            .report_frame(FrameProgress::new(frames_done, frames_total, modified));
    }

    pub fn report_completion(&mut self, summary: &JobSummary) {
        self.current_stage = Some(ProcessingStage::Completed);
        self.reporter.report_completion(summary);
    }

    /// Report an error against the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self
            .current_stage
            .unwrap_or(ProcessingStage::Initialization);
        self.reporter.report_error(stage, error);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::no_op()
    }
}

/// Pick a reporter for the command line
///
/// Progress bars need a terminal; `--no-progress` or non-interactive output
/// falls back to the plain `Progress: x%` line.
#[must_use]
pub fn create_cli_progress_reporter(show_bar: bool, verbose: bool) -> Box<dyn ProgressReporter> {
    #[cfg(feature = "cli")]
    {
        if show_bar {
            return Box::new(IndicatifProgressReporter::new(verbose));
        }
    }
    #[cfg(not(feature = "cli"))]
    {
        let _ = show_bar;
    }
    Box::new(ConsoleProgressReporter::new(verbose))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct TestProgressReporter {
        updates: Arc<Mutex<Vec<ProgressUpdate>>>,
        frames: Arc<Mutex<Vec<FrameProgress>>>,
        completions: Arc<Mutex<Vec<JobSummary>>>,
        errors: Arc<Mutex<Vec<(ProcessingStage, String)>>>,
    }

    impl ProgressReporter for TestProgressReporter {
        fn report_progress(&self, update: ProgressUpdate) {
            self.updates.lock().unwrap().push(update);
        }

        fn report_frame(&self, progress: FrameProgress) {
            self.frames.lock().unwrap().push(progress);
        }

        fn report_completion(&self, summary: &JobSummary) {
            self.completions.lock().unwrap().push(summary.clone());
        }

        fn report_error(&self, stage: ProcessingStage, error: &str) {
            self.errors.lock().unwrap().push((stage, error.to_string()));
        }
    }

    fn summary() -> JobSummary {
        JobSummary {
            frames_processed: 10,
            frames_modified: 5,
            detections_matched: 5,
            timings: ProcessingTimings::default(),
            output_path: PathBuf::from("output/removed_person_clip.mp4"),
        }
    }

    #[test]
    fn test_frame_progress_percent() {
        assert_eq!(FrameProgress::new(1, 4, false).percent(), Some(25.0));
        assert_eq!(FrameProgress::new(4, 4, true).percent(), Some(100.0));
        assert_eq!(FrameProgress::new(3, 0, false).percent(), None);
    }

    #[test]
    fn test_frame_progress_caps_under_reported_totals() {
        assert_eq!(FrameProgress::new(12, 10, false).percent(), Some(100.0));
    }

    #[test]
    fn test_stage_descriptions() {
        assert_eq!(
            ProcessingStage::FrameProcessing.description(),
            "Processing video frames"
        );
        assert_eq!(ProcessingStage::Completed.progress_percentage(), 100);
    }

    #[test]
    fn test_progress_update_with_eta() {
        let update = ProgressUpdate::new(ProcessingStage::VideoAnalysis, Instant::now()).with_eta(1500);
        assert_eq!(update.eta_ms, Some(1500));
        assert_eq!(update.progress, 2);
        assert!(update.elapsed_ms < 1000);
    }

    #[test]
    fn test_no_op_reporter_accepts_everything() {
        let reporter = NoOpProgressReporter;
        reporter.report_progress(ProgressUpdate::new(
            ProcessingStage::Initialization,
            Instant::now(),
        ));
        reporter.report_frame(FrameProgress::new(1, 1, false));
        reporter.report_completion(&summary());
        reporter.report_error(ProcessingStage::FrameProcessing, "boom");
    }

    #[test]
    fn test_progress_tracker_forwards_events() {
        let reporter = TestProgressReporter::default();
        let updates = reporter.updates.clone();
        let frames = reporter.frames.clone();
        let completions = reporter.completions.clone();
        let errors = reporter.errors.clone();

        let mut tracker = ProgressTracker::new(Box::new(reporter));
        assert_eq!(tracker.current_stage(), None);

        tracker.report_stage(ProcessingStage::Initialization);
        tracker.report_stage_with_description(
            ProcessingStage::FrameProcessing,
            "Removing 'person'".to_string(),
        );
        tracker.report_frame(1, 2, true);
        tracker.report_frame(2, 2, false);
        tracker.report_error("encoder closed");
        tracker.report_completion(&summary());

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].description, "Removing 'person'");

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].percent(), Some(100.0));
        assert!(frames[0].modified);

        assert_eq!(
            errors.lock().unwrap()[0],
            (ProcessingStage::FrameProcessing, "encoder closed".to_string())
        );
        assert_eq!(completions.lock().unwrap()[0].frames_passed_through(), 5);
        assert_eq!(tracker.current_stage(), Some(ProcessingStage::Completed));
    }

    #[test]
    fn test_error_before_any_stage_uses_initialization() {
        let reporter = TestProgressReporter::default();
        let errors = reporter.errors.clone();
        let tracker = ProgressTracker::new(Box::new(reporter));
        tracker.report_error("model missing");
        assert_eq!(errors.lock().unwrap()[0].0, ProcessingStage::Initialization);
    }

    #[test]
    fn test_create_cli_progress_reporter() {
        let reporter = create_cli_progress_reporter(false, false);
        reporter.report_progress(ProgressUpdate::new(
            ProcessingStage::Initialization,
            Instant::now(),
        ));
    }
}
