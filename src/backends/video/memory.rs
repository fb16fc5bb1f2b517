//! In-memory frame source and sink
//!
//! Used for headless runs over already decoded frames and by the test suite.

use super::{FrameSink, FrameSource, VideoFormat, VideoFrame, VideoMetadata};
use crate::error::{ObjRemovalError, Result};
use image::RgbImage;
use std::collections::VecDeque;

/// Frame source over a list of RGB images
#[derive(Debug, Clone)]
pub struct MemorySource {
    metadata: VideoMetadata,
    frames: VecDeque<RgbImage>,
    next_index: u64,
    fail_at: Option<u64>,
}

impl MemorySource {
    /// Create a source from frames sharing the first frame's dimensions
    ///
    /// # Errors
    /// - Frames of differing dimensions
    pub fn from_frames(frames: Vec<RgbImage>, fps: f64) -> Result<Self> {
        let (width, height) = frames.first().map_or((0, 0), RgbImage::dimensions);
        if frames.iter().any(|f| f.dimensions() != (width, height)) {
            return Err(ObjRemovalError::video(
                "All frames of a video must share the same dimensions",
            ));
        }
        let metadata = VideoMetadata::new(width, height, fps, frames.len() as u64, VideoFormat::Mp4);
        Ok(Self {
            metadata,
            frames: frames.into(),
            next_index: 0,
            fail_at: None,
        })
    }

    /// Make decoding fail when the given frame index is reached
    #[must_use]
    pub fn with_decode_failure_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Override the reported frame count, e.g. to mimic a container that under-reports
    #[must_use]
    pub fn with_reported_frame_count(mut self, frame_count: u64) -> Self {
        self.metadata.frame_count = frame_count;
        self
    }
}

impl FrameSource for MemorySource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        if self.fail_at == Some(self.next_index) {
            return Err(ObjRemovalError::frame_error(
                "decode",
                self.next_index,
                "corrupt packet",
            ));
        }
        let Some(image) = self.frames.pop_front() else {
            return Ok(None);
        };
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(VideoFrame::new(
            image,
            index,
            VideoFrame::timestamp_for(index, self.metadata.fps),
        )))
    }
}

/// Frame sink collecting encoded frames in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    frames: Vec<VideoFrame>,
    finish_calls: usize,
    fail_at: Option<u64>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make encoding fail when the given frame index is written
    #[must_use]
    pub fn with_encode_failure_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    #[must_use]
    pub fn frames(&self) -> &[VideoFrame] {
        &self.frames
    }

    #[must_use]
    pub fn into_frames(self) -> Vec<VideoFrame> {
        self.frames
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finish_calls > 0
    }

    #[must_use]
    pub fn finish_calls(&self) -> usize {
        self.finish_calls
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        if self.is_finished() {
            return Err(ObjRemovalError::video("Cannot write to a finished sink"));
        }
        if self.fail_at == Some(frame.index) {
            return Err(ObjRemovalError::frame_error("encode", frame.index, "disk full"));
        }
        if let Some(first) = self.frames.first() {
            if first.dimensions() != frame.dimensions() {
                return Err(ObjRemovalError::video(format!(
                    "Frame {} is {}x{}, output stream is {}x{}",
                    frame.index,
                    frame.width(),
                    frame.height(),
                    first.width(),
                    first.height()
                )));
            }
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.is_finished() {
            self.finish_calls += 1;
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames.len() as u64
    }
}
