//! Video container backend module
//!
//! This module provides frame-by-frame decoding and encoding of video files.
//! The pipeline only talks to the [`FrameSource`] and [`FrameSink`] traits, so
//! FFmpeg-backed files and in-memory clips are interchangeable.

pub mod codec;
pub mod frame;
pub mod memory;

#[cfg(feature = "video-support")]
pub mod ffmpeg;

pub use codec::FourCc;
pub use frame::VideoFrame;
pub use memory::{MemorySink, MemorySource};

#[cfg(feature = "video-support")]
pub use ffmpeg::{FFmpegSink, FFmpegSource};

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Video container format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoFormat {
    /// MP4 format (H.264/H.265)
    Mp4,
    /// AVI format
    Avi,
    /// MOV format (QuickTime)
    Mov,
    /// MKV format (Matroska)
    Mkv,
    /// WebM format
    WebM,
}

impl VideoFormat {
    /// Get file extension for the video format
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Avi => "avi",
            Self::Mov => "mov",
            Self::Mkv => "mkv",
            Self::WebM => "webm",
        }
    }

    /// Get MIME type for the video format
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Avi => "video/x-msvideo",
            Self::Mov => "video/quicktime",
            Self::Mkv => "video/x-matroska",
            Self::WebM => "video/webm",
        }
    }

    /// Detect format from file extension
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp4" | "m4v" => Some(Self::Mp4),
            "avi" => Some(Self::Avi),
            "mov" | "qt" => Some(Self::Mov),
            "mkv" => Some(Self::Mkv),
            "webm" => Some(Self::WebM),
            _ => None,
        }
    }

    /// Detect format from a file path
    #[must_use]
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Get all supported formats
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[Self::Mp4, Self::Avi, Self::Mov, Self::Mkv, Self::WebM]
    }
}

/// Stream properties of a video, read once when the job is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: f64,
    /// Number of frames reported by the container (0 when unknown)
    pub frame_count: u64,
    /// Duration in seconds
    pub duration: f64,
    /// Container format
    pub format: VideoFormat,
    /// Codec name of the video stream
    pub codec: String,
}

impl VideoMetadata {
    #[must_use]
    pub fn new(width: u32, height: u32, fps: f64, frame_count: u64, format: VideoFormat) -> Self {
        let duration = if fps > 0.0 {
            frame_count as f64 / fps
        } else {
            0.0
        };
        Self {
            width,
            height,
            fps,
            frame_count,
            duration,
            format,
            codec: "rawvideo".to_string(),
        }
    }
}

/// Largest numerator or denominator an encoder time base may carry
///
/// MPEG-4 part 2 stores the time base in 16 bits.
pub const MAX_FRAME_RATE_TERM: i32 = 65_535;

/// Closest fraction to `fps` with both terms at most [`MAX_FRAME_RATE_TERM`]
///
/// Walks the continued fraction of `fps` and stops at the last convergent that
/// fits, trying one semiconvergent before giving up. Exact broadcast rates
/// such as 30000/1001 come back unchanged. Returns `None` for non-finite or
/// non-positive rates.
#[must_use]
pub fn frame_rate_fraction(fps: f64) -> Option<(i32, i32)> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    let max = i64::from(MAX_FRAME_RATE_TERM);
    let target = fps.clamp(1.0 / max as f64, max as f64);

    // (h0, k0) and (h1, k1) are the two latest convergents
    let (mut h0, mut h1, mut k0, mut k1) = (0i64, 1i64, 1i64, 0i64);
    let mut x = target;
    loop {
        let a = (x.floor() as i64).min(max);
        let (h2, k2) = (a * h1 + h0, a * k1 + k0);
        if h2 > max || k2 > max {
            let by_h = (max - h0).checked_div(h1);
            let by_k = (max - k0).checked_div(k1);
            let n = match (by_h, by_k) {
                (Some(h), Some(k)) => h.min(k),
                (Some(h), None) => h,
                (None, Some(k)) => k,
                (None, None) => 0,
            };
            if n > 0 {
                let (hs, ks) = (n * h1 + h0, n * k1 + k0);
                let semi_error = (hs as f64 / ks as f64 - target).abs();
                if k1 == 0 || semi_error < (h1 as f64 / k1 as f64 - target).abs() {
                    h1 = hs;
                    k1 = ks;
                }
            }
            break;
        }
        (h0, h1, k0, k1) = (h1, h2, k1, k2);
        let rest = x - a as f64;
        if rest < 1e-9 {
            break;
        }
        x = 1.0 / rest;
    }

    if h1 == 0 || k1 == 0 {
        return None;
    }
    Some((i32::try_from(h1).ok()?, i32::try_from(k1).ok()?))
}

/// Sequential frame decoder
pub trait FrameSource {
    /// Stream properties of the source
    fn metadata(&self) -> &VideoMetadata;

    /// Decode the next frame, `Ok(None)` at end of stream
    ///
    /// # Errors
    /// - Corrupt packets or unsupported codecs
    fn next_frame(&mut self) -> Result<Option<VideoFrame>>;
}

/// Sequential frame encoder
pub trait FrameSink {
    /// Encode one frame
    ///
    /// # Errors
    /// - Frame dimensions differ from the output stream
    /// - Encoder or muxer failures
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()>;

    /// Flush pending packets and close the output. Calling it twice is a no-op.
    ///
    /// # Errors
    /// - Encoder flush or trailer write failures
    fn finish(&mut self) -> Result<()>;

    /// Number of frames accepted so far
    fn frames_written(&self) -> u64;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn metadata(&self) -> &VideoMetadata {
        (**self).metadata()
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        (**self).next_frame()
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }

    fn frames_written(&self) -> u64 {
        (**self).frames_written()
    }
}

/// Scope guard finishing a sink on every exit path
///
/// `finish` reports errors to the caller; if the guard is dropped without it
/// (an early `?` return), the sink is finished in `Drop` and any error there is
/// logged so that the original failure is not masked.
pub struct SinkGuard<'a, K: FrameSink + ?Sized> {
    sink: &'a mut K,
    finished: bool,
}

impl<'a, K: FrameSink + ?Sized> SinkGuard<'a, K> {
    pub fn new(sink: &'a mut K) -> Self {
        Self {
            sink,
            finished: false,
        }
    }

    /// Forward a frame to the guarded sink
    ///
    /// # Errors
    /// - Any error of the underlying sink
    pub fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        self.sink.write_frame(frame)
    }

    #[must_use]
    pub fn frames_written(&self) -> u64 {
        self.sink.frames_written()
    }

    /// Finish the sink and disarm the guard
    ///
    /// # Errors
    /// - Any error of the underlying sink's `finish`
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.sink.finish()
    }
}

impl<K: FrameSink + ?Sized> Drop for SinkGuard<'_, K> {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!("Releasing video sink on early exit");
            if let Err(e) = self.sink.finish() {
                log::error!("Failed to finalize video output: {}", e);
            }
        }
    }
}
