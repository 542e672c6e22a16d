use thiserror::Error;

/// Failure analyzing one frame.
///
/// Absorbed per frame for multi-frame sources; surfaced to the caller for a
/// single still image.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("face detection failed: {0}")]
    DetectionFailed(String),

    #[error("embedding extraction failed: {0}")]
    ExtractionFailed(String),
}
