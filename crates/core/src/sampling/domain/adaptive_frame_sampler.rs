//! Time-bounded walk over a video whose per-frame cost is only known
//! empirically.
//!
//! The sampler is an iterator. Each call to `next` first charges the
//! previously emitted frame with the wall-clock time since its extraction
//! began, which includes whatever the caller did with it (detection,
//! embedding). It then re-plans: with `time_left` on the budget and the latest
//! per-frame cost, `floor(time_left / cost)` more frames are affordable, and
//! they are spread evenly over the rest of the video. The walk ends as soon as
//! the budget cannot cover another frame or the next timestamp would fall past
//! the end.

use std::iter::FusedIterator;
use std::time::Duration;

use crate::sampling::domain::clock::{as_millis_f64, Clock};
use crate::sampling::domain::processing_budget::ProcessingBudget;
use crate::shared::constants::MAX_CONSECUTIVE_DECODE_FAILURES;
use crate::shared::frame::Frame;
use crate::video::domain::video_frame_decoder::VideoFrameDecoder;

/// Floor for measured or seeded costs so the step size stays finite.
const MIN_FRAME_COST_MS: f64 = 1.0;

#[derive(Clone, Debug)]
pub struct SampledFrame {
    pub timestamp_ms: f64,
    pub frame: Frame,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum SamplerState {
    /// Nothing outstanding.
    Ready,
    /// A frame was emitted; its extraction began at this clock reading.
    Outstanding(Duration),
    Exhausted,
}

pub struct AdaptiveFrameSampler<'a> {
    decoder: &'a mut dyn VideoFrameDecoder,
    clock: &'a dyn Clock,
    duration_ms: f64,
    max_duration_ms: f64,
    started_at: Duration,
    last_timestamp_ms: f64,
    per_frame_cost_ms: f64,
    state: SamplerState,
    consecutive_failures: usize,
    visited: Vec<f64>,
    skipped: Vec<f64>,
}

impl<'a> AdaptiveFrameSampler<'a> {
    /// Starts the budget clock now (see [`with_origin`](Self::with_origin)).
    /// `initial_cost_ms` is the calibrated cost
    /// of one frame; `duration_ms` of zero or non-finite yields no frames.
    pub fn new(
        decoder: &'a mut dyn VideoFrameDecoder,
        clock: &'a dyn Clock,
        duration_ms: f64,
        budget: &ProcessingBudget,
        initial_cost_ms: f64,
    ) -> Self {
        let usable = duration_ms.is_finite() && duration_ms > 0.0;
        Self {
            decoder,
            clock,
            duration_ms: if usable { duration_ms } else { 0.0 },
            max_duration_ms: budget.max_duration_ms(),
            started_at: clock.now(),
            last_timestamp_ms: budget.start_offset_ms(),
            per_frame_cost_ms: sanitize_cost(initial_cost_ms),
            state: if usable {
                SamplerState::Ready
            } else {
                SamplerState::Exhausted
            },
            consecutive_failures: 0,
            visited: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Measures the budget from `started_at` instead of construction time, so
    /// work done before sampling (calibration) counts against it.
    pub fn with_origin(mut self, started_at: Duration) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn per_frame_cost_ms(&self) -> f64 {
        self.per_frame_cost_ms
    }

    /// Timestamps of frames emitted so far, in order.
    pub fn visited_timestamps(&self) -> &[f64] {
        &self.visited
    }

    /// Timestamps the decoder could not produce.
    pub fn skipped_timestamps(&self) -> &[f64] {
        &self.skipped
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == SamplerState::Exhausted
    }

    pub fn elapsed_ms(&self) -> f64 {
        as_millis_f64(self.clock.now().saturating_sub(self.started_at))
    }

    /// Next timestamp under the current accounting, or `None` when the walk
    /// is over.
    fn plan_next(&self) -> Option<f64> {
        let time_left = self.max_duration_ms - self.elapsed_ms();
        if time_left <= self.per_frame_cost_ms {
            return None;
        }
        let affordable = (time_left / self.per_frame_cost_ms).floor();
        let remaining = self.duration_ms - self.last_timestamp_ms;
        if remaining <= 0.0 {
            return None;
        }
        let next = self.last_timestamp_ms + remaining / affordable;
        if next >= self.duration_ms {
            return None;
        }
        Some(next)
    }

    fn settle_outstanding(&mut self) {
        if let SamplerState::Outstanding(since) = self.state {
            let cost = as_millis_f64(self.clock.now().saturating_sub(since));
            self.per_frame_cost_ms = sanitize_cost(cost);
            self.state = SamplerState::Ready;
        }
    }

    fn finish(&mut self) -> Option<SampledFrame> {
        if self.state != SamplerState::Exhausted {
            log::debug!(
                "Sampler finished: {} frame(s), {} skipped, {:.0}ms elapsed",
                self.visited.len(),
                self.skipped.len(),
                self.elapsed_ms()
            );
        }
        self.state = SamplerState::Exhausted;
        None
    }
}

impl Iterator for AdaptiveFrameSampler<'_> {
    type Item = SampledFrame;

    fn next(&mut self) -> Option<SampledFrame> {
        if self.state == SamplerState::Exhausted {
            return None;
        }
        self.settle_outstanding();

        loop {
            let Some(timestamp_ms) = self.plan_next() else {
                return self.finish();
            };
            let extraction_start = self.clock.now();
            self.last_timestamp_ms = timestamp_ms;

            match self.decoder.decode_frame_at(timestamp_ms) {
                Some(frame) => {
                    self.consecutive_failures = 0;
                    self.visited.push(timestamp_ms);
                    self.state = SamplerState::Outstanding(extraction_start);
                    return Some(SampledFrame {
                        timestamp_ms,
                        frame,
                    });
                }
                None => {
                    log::debug!("Skipping undecodable frame at {timestamp_ms:.1}ms");
                    self.skipped.push(timestamp_ms);
                    self.consecutive_failures += 1;
                    if self.consecutive_failures >= MAX_CONSECUTIVE_DECODE_FAILURES {
                        log::warn!(
                            "Giving up after {} consecutive undecodable frames",
                            self.consecutive_failures
                        );
                        return self.finish();
                    }
                }
            }
        }
    }
}

impl FusedIterator for AdaptiveFrameSampler<'_> {}

fn sanitize_cost(cost_ms: f64) -> f64 {
    if cost_ms.is_finite() {
        cost_ms.max(MIN_FRAME_COST_MS)
    } else {
        MIN_FRAME_COST_MS
    }
}
