use thiserror::Error;

use crate::detection::domain::detection_error::DetectionError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source could not be opened or decoded; nothing was analyzed.
    #[error("bad source: {0}")]
    BadSource(String),

    /// Analysis of a single still image failed.
    #[error(transparent)]
    DetectionFailed(#[from] DetectionError),

    #[error("a detection is already in progress")]
    DetectionInProgress,

    /// Every sampled frame of a multi-frame source failed.
    #[error("all {attempted} sampled frame(s) failed")]
    AllFramesFailed { attempted: usize },

    #[error("invalid processing budget: {0}")]
    InvalidBudget(String),

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The background worker has shut down.
    #[error("detection worker is not running")]
    WorkerUnavailable,
}
