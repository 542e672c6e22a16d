use crate::identity::domain::embedding::DEFAULT_SIMILARITY_THRESHOLD;
use crate::shared::constants::{
    DEFAULT_MAX_IMAGES, DEFAULT_MIN_FACE_CONFIDENCE, FALLBACK_FRAME_COST_MS,
};

/// Tunables for a [`DetectionPipeline`](crate::pipeline::detection_pipeline::DetectionPipeline).
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Cosine distance at or below which two faces are one identity.
    pub similarity_threshold: f32,
    /// Frames examined from a burst or GIF.
    pub max_images: usize,
    /// Per-frame cost assumed when calibration fails.
    pub fallback_frame_cost_ms: f64,
    /// Detections below this confidence are dropped.
    pub min_face_confidence: f32,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.similarity_threshold.is_finite() || self.similarity_threshold < 0.0 {
            return Err(format!(
                "similarity threshold must be a non-negative number, got {}",
                self.similarity_threshold
            ));
        }
        if !self.fallback_frame_cost_ms.is_finite() || self.fallback_frame_cost_ms <= 0.0 {
            return Err(format!(
                "fallback frame cost must be positive, got {}",
                self.fallback_frame_cost_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.min_face_confidence) {
            return Err(format!(
                "minimum face confidence must be between 0.0 and 1.0, got {}",
                self.min_face_confidence
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_images: DEFAULT_MAX_IMAGES,
            fallback_frame_cost_ms: FALLBACK_FRAME_COST_MS,
            min_face_confidence: DEFAULT_MIN_FACE_CONFIDENCE,
        }
    }
}
