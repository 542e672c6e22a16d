use std::time::Duration;

use crate::shared::constants::DEFAULT_MAX_DURATION_MS;

/// Wall-clock allowance for walking a video.
///
/// `start_offset` is the media timestamp the walk starts from; `max_duration`
/// bounds the total time spent extracting and analyzing frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessingBudget {
    pub start_offset: Duration,
    pub max_duration: Duration,
}

impl ProcessingBudget {
    pub fn new(start_offset: Duration, max_duration: Duration) -> Self {
        Self {
            start_offset,
            max_duration,
        }
    }

    pub fn from_millis(start_offset_ms: u64, max_duration_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(start_offset_ms),
            Duration::from_millis(max_duration_ms),
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_duration.is_zero() {
            return Err("max duration must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn start_offset_ms(&self) -> f64 {
        self.start_offset.as_secs_f64() * 1000.0
    }

    pub fn max_duration_ms(&self) -> f64 {
        self.max_duration.as_secs_f64() * 1000.0
    }
}

impl Default for ProcessingBudget {
    fn default() -> Self {
        Self::from_millis(0, DEFAULT_MAX_DURATION_MS)
    }
}
