use crate::identity::domain::embedding::EmbeddingVector;
use crate::shared::frame::Frame;

/// Produces an identity embedding from a face crop.
pub trait EmbeddingExtractor: Send {
    fn extract(&mut self, crop: &Frame) -> Result<EmbeddingVector, Box<dyn std::error::Error>>;
}
