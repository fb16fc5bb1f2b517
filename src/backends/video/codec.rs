//! Output codec selection by four-character code
//!
//! The output stream is always written with one fixed codec tag. The tag picks
//! the FFmpeg encoder; the container derives the stored tag from that encoder.

use crate::error::{ObjRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Four-character codec tag, e.g. `mp4v`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FourCc([u8; 4]);

impl FourCc {
    /// MPEG-4 Part 2, the default tag for `.mp4` output
    pub const MP4V: Self = Self(*b"mp4v");
    /// H.264/AVC
    pub const AVC1: Self = Self(*b"avc1");
    /// Motion JPEG
    pub const MJPG: Self = Self(*b"MJPG");
    /// Xvid (MPEG-4 Part 2 in AVI)
    pub const XVID: Self = Self(*b"XVID");

    /// Create from raw bytes, which must be printable ASCII
    pub fn new(bytes: [u8; 4]) -> Result<Self> {
        if bytes.iter().all(|b| b.is_ascii_graphic()) {
            Ok(Self(bytes))
        } else {
            Err(ObjRemovalError::invalid_config(format!(
                "FourCC must be four printable ASCII characters, got {:?}",
                bytes
            )))
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> [u8; 4] {
        self.0
    }

    /// Little-endian numeric tag as stored in containers
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// FFmpeg encoder implementing this tag
    pub fn encoder_name(&self) -> Result<&'static str> {
        let tag = String::from_utf8_lossy(&self.0).to_ascii_lowercase();
        match tag.as_str() {
            "mp4v" | "xvid" | "divx" | "fmp4" => Ok("mpeg4"),
            "avc1" | "h264" | "x264" => Ok("libx264"),
            "hvc1" | "hev1" | "hevc" => Ok("libx265"),
            "mjpg" => Ok("mjpeg"),
            "vp80" => Ok("libvpx"),
            "vp90" | "vp09" => Ok("libvpx-vp9"),
            _ => Err(ObjRemovalError::invalid_config(format!(
                "Unsupported codec tag '{}'. Supported: mp4v, xvid, divx, avc1, h264, hvc1, mjpg, vp80, vp90",
                self
            ))),
        }
    }
}

impl Default for FourCc {
    fn default() -> Self {
        Self::MP4V
    }
}

impl FromStr for FourCc {
    type Err = ObjRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; 4] = s.as_bytes().try_into().map_err(|_| {
            ObjRemovalError::invalid_config(format!(
                "FourCC must be exactly four characters, got '{}'",
                s
            ))
        })?;
        let fourcc = Self::new(bytes)?;
        fourcc.encoder_name()?;
        Ok(fourcc)
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}
