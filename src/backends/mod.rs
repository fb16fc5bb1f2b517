//! Inference engines and video I/O
//!
//! - ONNX Runtime backend (GPU acceleration where available)
//! - Tract backend (pure Rust)
//! - Video frame sources and sinks (in-memory always, FFmpeg behind `video-support`)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub mod video;

#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

pub use self::video::*;
