use std::fmt;

use serde::Serialize;

use crate::identity::domain::face_observation::{FaceObservation, ObservationSummary};
use crate::identity::domain::observation_store::{ObservationId, ObservationStore};

/// Where in the source a frame came from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FramePosition {
    Still,
    /// Milliseconds from the start of a video.
    Timestamp(f64),
    /// Zero-based index into a burst or GIF.
    Index(usize),
}

impl fmt::Display for FramePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramePosition::Still => write!(f, "still"),
            FramePosition::Timestamp(ms) => write!(f, "t={ms:.0}ms"),
            FramePosition::Index(i) => write!(f, "#{i}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    /// Identities seen in the frame, one per kept face.
    Faces(Vec<ObservationId>),
    /// Detection or embedding failed; the frame contributed nothing.
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameFaces {
    pub position: FramePosition,
    pub outcome: FrameOutcome,
}

/// Result of one detection run.
///
/// `identities` lists the distinct faces, prior identities first. Per-frame
/// handles are already resolved to entries of `identities`.
///
/// Prior identities occupy the first `prior_identities.len()` store slots in
/// the order they were supplied. `prior_identities[k]` is the identity prior
/// `k` is represented by after the run: its own slot when nothing matched it,
/// otherwise the slot that absorbed it.
#[derive(Debug)]
pub struct DetectionReport {
    pub store: ObservationStore,
    pub identities: Vec<ObservationId>,
    pub prior_identities: Vec<ObservationId>,
    pub frames: Vec<FrameFaces>,
    /// Video timestamps whose frame could not be decoded.
    pub skipped_timestamps_ms: Vec<f64>,
}

impl DetectionReport {
    pub fn identity_observations(&self) -> Vec<&FaceObservation> {
        self.identities.iter().map(|&id| &self.store[id]).collect()
    }

    /// Whether `id` is a slot seeded from the prior identity set.
    pub fn is_prior_slot(&self, id: ObservationId) -> bool {
        id.index() < self.prior_identities.len()
    }

    /// Identities that at least one frame of this run saw, in identity order.
    pub fn seen_identities(&self) -> Vec<ObservationId> {
        self.identities
            .iter()
            .copied()
            .filter(|&id| {
                self.frames.iter().any(|frame| match &frame.outcome {
                    FrameOutcome::Faces(ids) => ids.contains(&id),
                    FrameOutcome::Failed(_) => false,
                })
            })
            .collect()
    }

    pub fn identity_index(&self, id: ObservationId) -> Option<usize> {
        self.identities.iter().position(|&i| i == id)
    }

    pub fn sampled_timestamps_ms(&self) -> Vec<f64> {
        self.frames
            .iter()
            .filter_map(|f| match f.position {
                FramePosition::Timestamp(ms) => Some(ms),
                _ => None,
            })
            .collect()
    }

    pub fn visited_indices(&self) -> Vec<usize> {
        self.frames
            .iter()
            .filter_map(|f| match f.position {
                FramePosition::Index(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    pub fn failed_frame_count(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| matches!(f.outcome, FrameOutcome::Failed(_)))
            .count()
    }

    /// Serializable view with frames pointing at identity indices.
    pub fn summaries(&self) -> ReportSummary {
        ReportSummary {
            identities: self
                .identity_observations()
                .into_iter()
                .map(FaceObservation::summary)
                .collect(),
            frames: self
                .frames
                .iter()
                .map(|frame| match &frame.outcome {
                    FrameOutcome::Faces(ids) => FrameSummary {
                        position: frame.position,
                        identities: ids.iter().filter_map(|&id| self.identity_index(id)).collect(),
                        error: None,
                    },
                    FrameOutcome::Failed(reason) => FrameSummary {
                        position: frame.position,
                        identities: Vec::new(),
                        error: Some(reason.clone()),
                    },
                })
                .collect(),
            skipped_timestamps_ms: self.skipped_timestamps_ms.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameSummary {
    pub position: FramePosition,
    pub identities: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportSummary {
    pub identities: Vec<ObservationSummary>,
    pub frames: Vec<FrameSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_timestamps_ms: Vec<f64>,
}
