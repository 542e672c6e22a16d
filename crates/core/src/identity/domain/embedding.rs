//! Fixed-length face embedding and the similarity math used for identity
//! decisions.
//!
//! Every comparison is total: vectors that cannot be compared (length
//! mismatch, empty, zero magnitude) yield [`INCOMPARABLE`] rather than an
//! error, and the sentinel never satisfies a similarity threshold.

use std::ops::Index;

/// Sentinel distance for vectors that cannot be compared.
pub const INCOMPARABLE: f32 = f32::INFINITY;

/// Cosine distance at or below which two faces are the same identity.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.4;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmbeddingVector {
    values: Vec<f32>,
}

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_comparable_with(&self, other: &EmbeddingVector) -> bool {
        !self.is_empty() && self.len() == other.len()
    }

    /// `1 − dot(a,b) / (‖a‖·‖b‖)`, or [`INCOMPARABLE`].
    pub fn cosine_distance(&self, other: &EmbeddingVector) -> f32 {
        if !self.is_comparable_with(other) {
            return INCOMPARABLE;
        }
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = (norm_a * norm_b).sqrt();
        if denom == 0.0 || !denom.is_finite() {
            return INCOMPARABLE;
        }
        1.0 - dot / denom
    }

    /// L2 distance, or [`INCOMPARABLE`].
    pub fn euclidean_distance(&self, other: &EmbeddingVector) -> f32 {
        if !self.is_comparable_with(other) {
            return INCOMPARABLE;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    /// Running-average update toward `incoming`.
    ///
    /// `result[i] = self[i]·(1/iteration) + incoming[i]·(1 − 1/iteration)`.
    /// The weight on the existing vector shrinks as the iteration grows, so
    /// iteration 1 returns `self` unchanged and iteration 2 is the midpoint.
    ///
    /// Returns `None` when the vectors are incomparable or `iteration` is 0.
    pub fn blend(&self, incoming: &EmbeddingVector, iteration: u32) -> Option<EmbeddingVector> {
        if !self.is_comparable_with(incoming) || iteration == 0 {
            return None;
        }
        let f = 1.0 / iteration as f32;
        let values = self
            .values
            .iter()
            .zip(incoming.values.iter())
            .map(|(existing, new)| existing * f + new * (1.0 - f))
            .collect();
        Some(EmbeddingVector { values })
    }

    /// True when `other` is within `threshold` cosine distance.
    pub fn is_same_identity(&self, other: &EmbeddingVector, threshold: f32) -> bool {
        // INFINITY and NaN both fail this comparison.
        self.cosine_distance(other) <= threshold
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

impl Index<usize> for EmbeddingVector {
    type Output = f32;

    fn index(&self, index: usize) -> &f32 {
        &self.values[index]
    }
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
