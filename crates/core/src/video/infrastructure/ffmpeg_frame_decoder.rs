use std::path::Path;

use ffmpeg_next::format::context::Input;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;
use ffmpeg_next::Rational;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_frame_decoder::VideoFrameDecoder;

/// Decodes individual video frames by timestamp via ffmpeg-next.
///
/// Each request seeks to the nearest keyframe at or before the target, then
/// decodes forward to the first frame whose presentation time reaches it.
/// Frames are converted to RGB24.
pub struct FfmpegFrameDecoder {
    stream: Option<OpenStream>,
}

struct OpenStream {
    ictx: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    time_base: Rational,
    width: u32,
    height: u32,
    fps: f64,
}

// Safety: FfmpegFrameDecoder is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameDecoder {}

impl FfmpegFrameDecoder {
    pub fn new() -> Self {
        Self { stream: None }
    }
}

impl Default for FfmpegFrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoFrameDecoder for FfmpegFrameDecoder {
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        let ictx = ffmpeg_next::format::input(path)?;

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let rate = stream.rate();
        let fps = if rate.denominator() != 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            0.0
        };
        let stream_duration_ms = pts_to_ms(stream.duration(), time_base);

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;
        let width = decoder.width();
        let height = decoder.height();
        let scaler = scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )?;

        // Container duration is in AV_TIME_BASE (microsecond) units.
        let container_us = ictx.duration();
        let duration_ms = if container_us > 0 {
            Some(container_us as f64 / 1000.0)
        } else if stream_duration_ms > 0.0 {
            Some(stream_duration_ms)
        } else {
            None
        };

        let metadata = VideoMetadata {
            width,
            height,
            fps,
            duration_ms,
            codec: decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_default(),
            source_path: Some(path.to_path_buf()),
        };
        log::debug!(
            "Opened {}: {}x{} @ {:.2} fps, duration {:?}ms",
            path.display(),
            width,
            height,
            fps,
            duration_ms
        );

        self.stream = Some(OpenStream {
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            width,
            height,
            fps,
        });
        Ok(metadata)
    }

    fn decode_frame_at(&mut self, timestamp_ms: f64) -> Option<Frame> {
        let stream = self.stream.as_mut()?;
        match stream.decode_at(timestamp_ms) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Decode at {timestamp_ms:.1}ms failed: {e}");
                None
            }
        }
    }

    fn close(&mut self) {
        self.stream = None;
    }
}

impl OpenStream {
    fn decode_at(&mut self, timestamp_ms: f64) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if !timestamp_ms.is_finite() || timestamp_ms < 0.0 {
            return Ok(None);
        }
        let target_us = (timestamp_ms * 1000.0) as i64;
        self.ictx.seek(target_us, ..target_us)?;
        self.decoder.flush();

        let mut decoded = Video::empty();
        let mut found = false;
        for (stream, packet) in self.ictx.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }
            if receive_until(&mut self.decoder, &mut decoded, self.time_base, timestamp_ms) {
                found = true;
                break;
            }
        }
        if !found {
            let _ = self.decoder.send_eof();
            found = receive_until(&mut self.decoder, &mut decoded, self.time_base, timestamp_ms);
        }
        if !found {
            return Ok(None);
        }

        let mut rgb = Video::empty();
        self.scaler.run(&decoded, &mut rgb)?;
        let pixels = extract_rgb_pixels(&rgb, self.width, self.height);
        let index = (timestamp_ms * self.fps / 1000.0).round().max(0.0) as usize;
        Ok(Some(Frame::new(pixels, self.width, self.height, 3, index)))
    }
}

/// Drains decoded frames until one is presented at or after `timestamp_ms`.
/// Frames without a timestamp are accepted as-is.
fn receive_until(
    decoder: &mut ffmpeg_next::decoder::Video,
    decoded: &mut Video,
    time_base: Rational,
    timestamp_ms: f64,
) -> bool {
    while decoder.receive_frame(decoded).is_ok() {
        match decoded.timestamp().or(decoded.pts()) {
            Some(pts) if pts_to_ms(pts, time_base) < timestamp_ms => continue,
            _ => return true,
        }
    }
    false
}

fn pts_to_ms(pts: i64, time_base: Rational) -> f64 {
    if time_base.denominator() == 0 || pts <= 0 {
        return 0.0;
    }
    pts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64 * 1000.0
}

/// Copies an RGB24 ffmpeg frame into a tightly packed buffer, dropping the
/// per-row stride padding.
fn extract_rgb_pixels(rgb: &Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb.stride(0);
    let data = rgb.data(0);
    let row_bytes = width as usize * 3;
    (0..height as usize)
        .flat_map(|row| &data[row * stride..row * stride + row_bytes])
        .copied()
        .collect()
}
