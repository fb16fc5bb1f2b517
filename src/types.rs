//! Core data types shared by the detector, mask builder, inpainter and pipeline

use crate::backends::video::VideoMetadata;
use crate::error::{ObjRemovalError, Result};
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Mask value marking a pixel for replacement
pub const ERASE: u8 = 255;

/// Mask value marking a pixel to keep
pub const KEEP: u8 = 0;

/// Axis-aligned bounding box in frame pixel coordinates (`x2`/`y2` exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from center/size form as produced by YOLO heads
    #[must_use]
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box
    #[must_use]
    pub fn iou(&self, other: &Self) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Clamp the box into `[0, width] x [0, height]`
    #[must_use]
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    /// Integer pixel span `[x1, x2) x [y1, y2)` inside a frame of the given size.
    ///
    /// Coordinates are truncated toward zero and then clamped, so a box reaching
    /// past the frame edge covers up to the last row/column. Returns `None` when
    /// the span is empty.
    #[must_use]
    pub fn pixel_span(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let truncate = |v: f32, max: u32| -> u32 {
            if v.is_nan() || v <= 0.0 {
                0
            } else {
                (v.trunc() as u64).min(u64::from(max)) as u32
            }
        };
        let x1 = truncate(self.x1, width);
        let y1 = truncate(self.y1, height);
        let x2 = truncate(self.x2, width);
        let y2 = truncate(self.y2, height);
        if x2 > x1 && y2 > y1 {
            Some((x1, y1, x2, y2))
        } else {
            None
        }
    }
}

/// A single detector output for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: usize,
    pub label: String,
}

impl Detection {
    #[must_use]
    pub fn new<S: Into<String>>(bbox: BoundingBox, confidence: f32, class_id: usize, label: S) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            label: label.into(),
        }
    }
}

/// Single-channel erase/keep raster with the same dimensions as its frame
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    /// Create an all-keep mask
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::from_pixel(width, height, Luma([KEEP])),
        }
    }

    /// Wrap an existing gray image, rejecting values other than 0/255
    pub fn from_gray(image: GrayImage) -> Result<Self> {
        if image.pixels().any(|p| p.0[0] != KEEP && p.0[0] != ERASE) {
            return Err(ObjRemovalError::processing(
                "Mask values must be either 0 (keep) or 255 (erase)",
            ));
        }
        Ok(Self { image })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Whether a pixel is marked for replacement
    #[must_use]
    pub fn is_erased(&self, x: u32, y: u32) -> bool {
        self.image
            .get_pixel_checked(x, y)
            .is_some_and(|p| p.0[0] == ERASE)
    }

    /// True when no pixel is marked for replacement
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image.as_raw().iter().all(|&v| v == KEEP)
    }

    /// Number of pixels marked for replacement
    #[must_use]
    pub fn erased_count(&self) -> usize {
        self.image.as_raw().iter().filter(|&&v| v == ERASE).count()
    }

    pub(crate) fn image_mut(&mut self) -> &mut GrayImage {
        &mut self.image
    }

    #[must_use]
    pub fn as_gray(&self) -> &GrayImage {
        &self.image
    }

    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.image
    }
}

/// Per-stage timings accumulated over a job, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub model_load_ms: u64,
    pub decode_ms: u64,
    pub detection_ms: u64,
    pub mask_ms: u64,
    pub inpaint_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}

/// Outcome of a finished removal run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Frames read from the source and written to the sink
    pub frames_processed: u64,
    /// Frames where at least one pixel was inpainted
    pub frames_modified: u64,
    /// Detections of the target class over all frames
    pub detections_matched: u64,
    pub timings: ProcessingTimings,
    pub output_path: PathBuf,
}

impl JobSummary {
    /// Frames written unchanged
    #[must_use]
    pub fn frames_passed_through(&self) -> u64 {
        self.frames_processed.saturating_sub(self.frames_modified)
    }
}

/// Fully resolved description of one removal run
///
/// Built once per input and never mutated afterwards; the pipeline only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoJob {
    input_path: PathBuf,
    output_path: PathBuf,
    target_class: String,
    metadata: VideoMetadata,
}

impl VideoJob {
    /// Create a job from already known metadata
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>, S: Into<String>>(
        input_path: P,
        output_path: Q,
        target_class: S,
        metadata: VideoMetadata,
    ) -> Result<Self> {
        let target_class = target_class.into();
        if target_class.trim().is_empty() {
            return Err(ObjRemovalError::invalid_config(
                "Target class must not be empty",
            ));
        }
        if metadata.width == 0 || metadata.height == 0 {
            return Err(ObjRemovalError::video(format!(
                "Invalid frame dimensions {}x{}",
                metadata.width, metadata.height
            )));
        }
        Ok(Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            target_class,
            metadata,
        })
    }

    /// Create a job by probing the input container
    #[cfg(feature = "video-support")]
    pub fn probe<P: AsRef<Path>, Q: Into<PathBuf>, S: Into<String>>(
        input_path: P,
        output_path: Q,
        target_class: S,
    ) -> Result<Self> {
        let metadata = crate::backends::video::FFmpegSource::probe(input_path.as_ref())?;
        Self::new(
            input_path.as_ref().to_path_buf(),
            output_path,
            target_class,
            metadata,
        )
    }

    #[must_use]
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    #[must_use]
    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    #[must_use]
    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn frame_dimensions(&self) -> (u32, u32) {
        (self.metadata.width, self.metadata.height)
    }

    #[must_use]
    pub fn frame_rate(&self) -> f64 {
        self.metadata.fps
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.metadata.frame_count
    }
}
