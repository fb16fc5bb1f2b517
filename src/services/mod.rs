//! Services that keep I/O placement and progress reporting out of the pipeline

pub mod io;
pub mod progress;

pub use io::{VideoIOService, OUTPUT_PREFIX};
#[cfg(feature = "cli")]
pub use progress::IndicatifProgressReporter;
pub use progress::{
    create_cli_progress_reporter, ConsoleProgressReporter, FrameProgress, NoOpProgressReporter,
    ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
