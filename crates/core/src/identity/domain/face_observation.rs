use serde::Serialize;

use crate::identity::domain::embedding::EmbeddingVector;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// One face sighting on one frame.
///
/// After deduplication a surviving observation stands in for every sighting
/// merged into it; its `embedding` is the blended centroid and
/// `blend_iteration` counts how many blends produced it.
#[derive(Clone, Debug)]
pub struct FaceObservation {
    pub embedding: EmbeddingVector,
    pub bounds: BoundingBox,
    pub thumbnail: Frame,
    pub label: Option<String>,
    pub blend_iteration: u32,
    pub confidence: f32,
}

impl FaceObservation {
    pub fn new(embedding: EmbeddingVector, bounds: BoundingBox, thumbnail: Frame) -> Self {
        Self {
            embedding,
            bounds,
            thumbnail,
            label: None,
            blend_iteration: 1,
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_same_identity(&self, other: &FaceObservation, threshold: f32) -> bool {
        self.embedding.is_same_identity(&other.embedding, threshold)
    }

    /// Caller-visible view: everything except the embedding.
    pub fn summary(&self) -> ObservationSummary {
        ObservationSummary {
            bounds: self.bounds,
            label: self.label.clone(),
            blend_iteration: self.blend_iteration,
            confidence: self.confidence,
            thumbnail_size: (self.thumbnail.width(), self.thumbnail.height()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ObservationSummary {
    pub bounds: BoundingBox,
    pub label: Option<String>,
    pub blend_iteration: u32,
    pub confidence: f32,
    pub thumbnail_size: (u32, u32),
}
