use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage};

use crate::shared::frame::Frame;
use crate::video::domain::frame_sequence_reader::FrameSequenceReader;

/// Decodes every frame of an animated GIF to RGB. Display durations are
/// ignored; frames are indexed in playback order.
pub struct GifFrameReader;

impl GifFrameReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GifFrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSequenceReader for GifFrameReader {
    fn read_frames(&self, path: &Path) -> Result<Vec<Frame>, Box<dyn std::error::Error>> {
        let decoder = GifDecoder::new(BufReader::new(File::open(path)?))?;
        let frames = decoder.into_frames().collect_frames()?;
        log::debug!("Decoded {} GIF frame(s) from {}", frames.len(), path.display());

        Ok(frames
            .into_iter()
            .enumerate()
            .map(|(index, frame)| {
                let rgb = DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
                let (width, height) = rgb.dimensions();
                Frame::new(rgb.into_raw(), width, height, 3, index)
            })
            .collect())
    }
}
