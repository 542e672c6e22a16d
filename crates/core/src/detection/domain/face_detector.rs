use crate::detection::domain::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// Domain interface for face detection.
///
/// Implementations may hold inference sessions or scratch buffers, hence
/// `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>>;
}
