use std::path::Path;

use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;

/// Random-access frame decoding for sampled video walks.
///
/// Unlike a sequential reader, the sampler asks for individual timestamps and
/// never materializes the whole stream.
pub trait VideoFrameDecoder: Send {
    /// Opens a video file and returns its metadata.
    fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>>;

    /// Decodes the frame displayed at `timestamp_ms`.
    ///
    /// `None` means this timestamp could not be decoded; callers treat it as a
    /// skip, not a fatal error.
    fn decode_frame_at(&mut self, timestamp_ms: f64) -> Option<Frame>;

    /// Releases any resources held by the decoder.
    fn close(&mut self);
}
