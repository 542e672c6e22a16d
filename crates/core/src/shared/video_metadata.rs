use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// `None` when the container does not report a duration.
    pub duration_ms: Option<f64>,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl VideoMetadata {
    /// Duration usable for sampling: known and strictly positive.
    pub fn sampling_duration_ms(&self) -> Option<f64> {
        self.duration_ms.filter(|d| d.is_finite() && *d > 0.0)
    }
}
