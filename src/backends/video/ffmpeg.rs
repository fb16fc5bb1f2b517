//! FFmpeg integration for video decoding and encoding
//!
//! [`FFmpegSource`] decodes the best video stream of a container into RGB
//! frames; [`FFmpegSink`] scales RGB frames to YUV 4:2:0 and encodes them with
//! the encoder selected by a [`FourCc`].

use crate::{
    backends::video::{
        frame_rate_fraction, FourCc, FrameSink, FrameSource, VideoFormat, VideoFrame, VideoMetadata,
    },
    error::{ObjRemovalError, Result},
};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Frame rate assumed when the container does not report a usable one
const FALLBACK_FPS: f64 = 30.0;

/// Bits per pixel used to derive the default output bit rate
const BITS_PER_PIXEL: f64 = 0.2;

fn ensure_initialized() -> Result<()> {
    ffmpeg::init().map_err(|e| ObjRemovalError::video(format!("Failed to initialize FFmpeg: {}", e)))
}

fn stream_fps(stream: &ffmpeg::format::stream::Stream<'_>) -> f64 {
    [stream.avg_frame_rate(), stream.rate()]
        .into_iter()
        .filter(|r| r.numerator() > 0 && r.denominator() > 0)
        .map(f64::from)
        .find(|fps| fps.is_finite() && *fps > 0.0)
        .unwrap_or_else(|| {
            log::warn!(
                "Container reports no frame rate, assuming {} fps",
                FALLBACK_FPS
            );
            FALLBACK_FPS
        })
}

/// Decoder over the best video stream of a container
pub struct FFmpegSource {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    metadata: VideoMetadata,
    next_index: u64,
    eof_sent: bool,
    path: PathBuf,
}

impl FFmpegSource {
    /// Open a container for decoding
    ///
    /// # Errors
    /// - The file cannot be opened or holds no video stream
    /// - No decoder is available for the stream codec
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        ensure_initialized()?;
        let path = path.as_ref();

        let input = ffmpeg::format::input(&path).map_err(|e| {
            ObjRemovalError::video(format!(
                "Failed to open video file {}: {}",
                path.display(),
                e
            ))
        })?;

        let (stream_index, time_base, decoder, metadata) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| {
                    ObjRemovalError::video(format!("No video stream found in {}", path.display()))
                })?;

            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .map_err(|e| {
                    ObjRemovalError::video(format!("Failed to create codec context: {}", e))
                })?;
            let decoder = context.decoder().video().map_err(|e| {
                ObjRemovalError::video(format!("Failed to create video decoder: {}", e))
            })?;

            let metadata = Self::read_metadata(path, &input, &stream, &decoder);
            (stream.index(), stream.time_base(), decoder, metadata)
        };

        log::debug!(
            "Opened {} ({}x{} @ {:.2} fps, {} frames, codec {})",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.frame_count,
            metadata.codec
        );

        Ok(Self {
            input,
            decoder,
            scaler: None,
            stream_index,
            time_base,
            metadata,
            next_index: 0,
            eof_sent: false,
            path: path.to_path_buf(),
        })
    }

    /// Read stream properties without decoding any frame
    ///
    /// # Errors
    /// - Same conditions as [`FFmpegSource::open`]
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<VideoMetadata> {
        Self::open(path).map(|source| source.metadata)
    }

    fn read_metadata(
        path: &Path,
        input: &ffmpeg::format::context::Input,
        stream: &ffmpeg::format::stream::Stream<'_>,
        decoder: &ffmpeg::decoder::Video,
    ) -> VideoMetadata {
        let fps = stream_fps(stream);

        let stream_duration = stream.duration() as f64 * f64::from(stream.time_base());
        let duration = if stream.duration() > 0 && stream_duration.is_finite() {
            stream_duration
        } else if input.duration() > 0 {
            input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
        } else {
            0.0
        };

        let frame_count = if stream.frames() > 0 {
            stream.frames() as u64
        } else {
            (duration * fps).round().max(0.0) as u64
        };

        let format = VideoFormat::from_path(path).unwrap_or(VideoFormat::Mp4);
        VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            frame_count,
            duration,
            format,
            codec: decoder.id().name().to_string(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn convert_frame(&mut self, decoded: &ffmpeg::frame::Video) -> Result<VideoFrame> {
        let (width, height) = (decoded.width(), decoded.height());
        let index = self.next_index;

        if self.scaler.is_none() {
            let scaler = ffmpeg::software::scaling::Context::get(
                decoded.format(),
                width,
                height,
                ffmpeg::format::Pixel::RGB24,
                width,
                height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )
            .map_err(|e| ObjRemovalError::frame_error("decode", index, e))?;
            self.scaler = Some(scaler);
        }
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| ObjRemovalError::internal("Frame scaler missing"))?;

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        scaler
            .run(decoded, &mut rgb_frame)
            .map_err(|e| ObjRemovalError::frame_error("decode", index, e))?;

        let row_len = width as usize * 3;
        let stride = rgb_frame.stride(0);
        let mut buffer = Vec::with_capacity(row_len * height as usize);
        for row in rgb_frame.data(0).chunks(stride).take(height as usize) {
            let pixels = row.get(..row_len).ok_or_else(|| {
                ObjRemovalError::frame_error("decode", index, "short pixel row")
            })?;
            buffer.extend_from_slice(pixels);
        }
        let image = RgbImage::from_raw(width, height, buffer)
            .ok_or_else(|| ObjRemovalError::frame_error("decode", index, "truncated frame"))?;

        let timestamp = decoded
            .pts()
            .map(|pts| pts as f64 * f64::from(self.time_base))
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map_or_else(
                || VideoFrame::timestamp_for(index, self.metadata.fps),
                Duration::from_secs_f64,
            );

        self.next_index += 1;
        Ok(VideoFrame::new(image, index, timestamp))
    }
}

impl FrameSource for FFmpegSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        loop {
            let mut decoded = ffmpeg::frame::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert_frame(&decoded).map(Some);
            }
            if self.eof_sent {
                log::debug!("Decoded {} frames from {}", self.next_index, self.path.display());
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        self.decoder
                            .send_packet(&packet)
                            .map_err(|e| ObjRemovalError::frame_error("decode", self.next_index, e))?;
                    }
                },
                Err(ffmpeg::Error::Eof) => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| ObjRemovalError::frame_error("decode", self.next_index, e))?;
                    self.eof_sent = true;
                },
                Err(e) => {
                    return Err(ObjRemovalError::frame_error("decode", self.next_index, e));
                },
            }
        }
    }
}

/// Encoder writing RGB frames into a new container
pub struct FFmpegSink {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    frames_written: u64,
    finished: bool,
    path: PathBuf,
}

impl FFmpegSink {
    /// Create the output file with the given dimensions, frame rate and codec tag
    ///
    /// # Errors
    /// - The output directory or file cannot be created
    /// - The encoder for `fourcc` is not available in the linked FFmpeg
    pub fn create<P: AsRef<Path>>(path: P, metadata: &VideoMetadata, fourcc: FourCc) -> Result<Self> {
        ensure_initialized()?;
        let path = path.as_ref();
        let (width, height) = (metadata.width, metadata.height);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ObjRemovalError::file_io_error("create output directory", parent, &e))?;
        }

        let mut output = ffmpeg::format::output(&path).map_err(|e| {
            ObjRemovalError::video(format!(
                "Failed to create output file {}: {}",
                path.display(),
                e
            ))
        })?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let encoder_name = fourcc.encoder_name()?;
        let codec = ffmpeg::encoder::find_by_name(encoder_name).ok_or_else(|| {
            ObjRemovalError::video(format!(
                "Encoder '{}' for codec tag '{}' is not available in this FFmpeg build",
                encoder_name, fourcc
            ))
        })?;

        let (num, den) = frame_rate_fraction(metadata.fps).ok_or_else(|| {
            ObjRemovalError::video(format!("Invalid output frame rate {}", metadata.fps))
        })?;
        let frame_rate = ffmpeg::Rational::new(num, den);
        let encoder_time_base = frame_rate.invert();

        let mut config = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| ObjRemovalError::video(format!("Failed to create video encoder: {}", e)))?;
        config.set_width(width);
        config.set_height(height);
        config.set_format(ffmpeg::format::Pixel::YUV420P);
        config.set_frame_rate(Some(frame_rate));
        config.set_time_base(encoder_time_base);
        config.set_bit_rate((f64::from(width) * f64::from(height) * metadata.fps * BITS_PER_PIXEL) as usize);
        if global_header {
            config.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = config.open_as(codec).map_err(|e| {
            ObjRemovalError::video(format!("Failed to open encoder '{}': {}", encoder_name, e))
        })?;

        let stream_index = {
            let mut stream = output
                .add_stream(codec)
                .map_err(|e| ObjRemovalError::video(format!("Failed to add output stream: {}", e)))?;
            stream.set_parameters(&encoder);
            stream.set_time_base(encoder_time_base);
            stream.index()
        };

        output
            .write_header()
            .map_err(|e| ObjRemovalError::video(format!("Failed to write container header: {}", e)))?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .ok_or_else(|| ObjRemovalError::internal("Output stream vanished after header write"))?;

        let scaler = ffmpeg::software::scaling::Context::get(
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| ObjRemovalError::video(format!("Failed to create frame scaler: {}", e)))?;

        log::info!(
            "Encoding {} with {} ({}x{} @ {:.2} fps)",
            path.display(),
            fourcc,
            width,
            height,
            metadata.fps
        );

        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            width,
            height,
            frames_written: 0,
            finished: false,
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| ObjRemovalError::video(format!("Failed to write packet: {}", e)))?;
        }
        Ok(())
    }
}

impl FrameSink for FFmpegSink {
    fn write_frame(&mut self, frame: &VideoFrame) -> Result<()> {
        if self.finished {
            return Err(ObjRemovalError::video("Cannot write to a finished output"));
        }
        if frame.dimensions() != (self.width, self.height) {
            return Err(ObjRemovalError::frame_error(
                "encode",
                frame.index,
                format!(
                    "frame is {}x{}, output stream is {}x{}",
                    frame.width(),
                    frame.height(),
                    self.width,
                    self.height
                ),
            ));
        }

        let mut rgb_frame = ffmpeg::frame::Video::new(ffmpeg::format::Pixel::RGB24, self.width, self.height);
        let row_len = self.width as usize * 3;
        let stride = rgb_frame.stride(0);
        for (dst, src) in rgb_frame
            .data_mut(0)
            .chunks_mut(stride)
            .zip(frame.image.as_raw().chunks_exact(row_len))
        {
            if let Some(dst) = dst.get_mut(..row_len) {
                dst.copy_from_slice(src);
            }
        }

        let mut yuv_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb_frame, &mut yuv_frame)
            .map_err(|e| ObjRemovalError::frame_error("encode", frame.index, e))?;
        yuv_frame.set_pts(Some(self.frames_written as i64));

        self.encoder
            .send_frame(&yuv_frame)
            .map_err(|e| ObjRemovalError::frame_error("encode", frame.index, e))?;
        self.drain_packets()?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.encoder
            .send_eof()
            .map_err(|e| ObjRemovalError::video(format!("Failed to flush encoder: {}", e)))?;
        self.drain_packets()?;
        self.output
            .write_trailer()
            .map_err(|e| ObjRemovalError::video(format!("Failed to write container trailer: {}", e)))?;

        log::info!(
            "Wrote {} frames to {}",
            self.frames_written,
            self.path.display()
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_fails() {
        let result = FFmpegSource::open("/nonexistent/clip.mp4");
        assert!(matches!(result, Err(ObjRemovalError::Video(_))));
    }

    #[test]
    fn test_encode_then_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clip.mp4");
        let metadata = VideoMetadata::new(64, 48, 25.0, 5, VideoFormat::Mp4);

        let mut sink = match FFmpegSink::create(&path, &metadata, FourCc::MP4V) {
            Ok(sink) => sink,
            Err(e) => {
                eprintln!("Skipping: mpeg4 encoder unavailable ({})", e);
                return;
            },
        };
        for index in 0..5 {
            let image = RgbImage::from_pixel(64, 48, image::Rgb([40 * index as u8, 90, 160]));
            sink.write_frame(&VideoFrame::new(image, index, Duration::ZERO)).unwrap();
        }
        sink.finish().unwrap();
        sink.finish().unwrap();

        let mut source = FFmpegSource::open(&path).unwrap();
        assert_eq!(source.metadata().width, 64);
        assert_eq!(source.metadata().height, 48);
        assert!((source.metadata().fps - 25.0).abs() < 0.01);

        let mut decoded = 0;
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.dimensions(), (64, 48));
            decoded += 1;
        }
        assert_eq!(decoded, 5);
    }

    #[test]
    fn test_sink_accepts_variable_frame_rate_average() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = VideoMetadata::new(32, 32, 2_997_000.0 / 100_033.0, 2, VideoFormat::Mp4);
        ensure_initialized().unwrap();
        if ffmpeg::encoder::find_by_name("mpeg4").is_none() {
            return;
        }
        let mut sink = FFmpegSink::create(dir.path().join("vfr.mp4"), &metadata, FourCc::MP4V).unwrap();
        sink.write_frame(&VideoFrame::new(RgbImage::new(32, 32), 0, Duration::ZERO))
            .unwrap();
        sink.finish().unwrap();
    }

    #[test]
    fn test_sink_rejects_wrong_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = VideoMetadata::new(32, 32, 10.0, 1, VideoFormat::Mp4);
        let Ok(mut sink) = FFmpegSink::create(dir.path().join("out.mp4"), &metadata, FourCc::MP4V)
        else {
            return;
        };
        let frame = VideoFrame::new(RgbImage::new(16, 16), 0, Duration::ZERO);
        assert!(sink.write_frame(&frame).is_err());
    }
}
