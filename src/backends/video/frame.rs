//! Decoded video frame representation

use image::RgbImage;
use std::time::Duration;

/// A decoded frame: RGB pixels plus its position in the stream
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// RGB pixel data
    pub image: RgbImage,
    /// Zero-based frame index in decode order
    pub index: u64,
    /// Presentation timestamp
    pub timestamp: Duration,
}

impl VideoFrame {
    #[must_use]
    pub fn new(image: RgbImage, index: u64, timestamp: Duration) -> Self {
        Self {
            image,
            index,
            timestamp,
        }
    }

    /// Timestamp derived from the frame index at a constant frame rate
    #[must_use]
    pub fn timestamp_for(index: u64, fps: f64) -> Duration {
        if fps > 0.0 {
            Duration::from_secs_f64(index as f64 / fps)
        } else {
            Duration::ZERO
        }
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

    /// Replace the pixels, keeping index and timestamp
    #[must_use]
    pub fn with_image(self, image: RgbImage) -> Self {
        Self { image, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_for() {
        assert_eq!(VideoFrame::timestamp_for(50, 25.0), Duration::from_secs(2));
        assert_eq!(VideoFrame::timestamp_for(3, 0.0), Duration::ZERO);
    }

    #[test]
    fn test_with_image_keeps_position() {
        let frame = VideoFrame::new(RgbImage::new(4, 4), 9, Duration::from_millis(360));
        let replaced = frame.with_image(RgbImage::new(4, 4));
        assert_eq!(replaced.index, 9);
        assert_eq!(replaced.timestamp, Duration::from_millis(360));
        assert_eq!(replaced.dimensions(), (4, 4));
    }
}
