use std::path::Path;

use crate::shared::frame::Frame;

/// Writes a single frame (typically a face thumbnail) to an image file.
pub trait ImageWriter: Send {
    /// Writes `frame` to `path`, resized to `size` when given.
    fn write(
        &self,
        path: &Path,
        frame: &Frame,
        size: Option<(u32, u32)>,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
