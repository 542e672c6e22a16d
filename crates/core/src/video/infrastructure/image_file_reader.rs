use std::path::Path;

use crate::shared::frame::Frame;

/// Decodes still images with the `image` crate. Bursts are assembled by
/// reading each member file and re-indexing the frames.
pub struct ImageFileReader;

impl ImageFileReader {
    pub fn new() -> Self {
        Self
    }

    pub fn read(&self, path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
        let rgb = image::open(path)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Frame::from_raw(rgb.into_raw(), width, height, 3)?)
    }
}

impl Default for ImageFileReader {
    fn default() -> Self {
        Self::new()
    }
}
