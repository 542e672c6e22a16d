use std::path::Path;

use crate::shared::frame::Frame;

/// Decodes a file into its constituent frames, indexed from 0.
///
/// Used for animated GIFs, which are small enough to materialize up front.
pub trait FrameSequenceReader: Send {
    fn read_frames(&self, path: &Path) -> Result<Vec<Frame>, Box<dyn std::error::Error>>;
}
