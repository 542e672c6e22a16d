use std::collections::HashMap;
use std::time::Instant;

/// Observer for detection-run events.
///
/// Lets the CLI report progress and per-stage timing without the pipeline
/// knowing where the output goes.
pub trait DetectionLogger: Send {
    /// A frame was analyzed; `faces` is the number of faces kept from it.
    fn frame_analyzed(&mut self, position: &str, faces: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. identity count).
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards all events.
pub struct NullDetectionLogger;

impl DetectionLogger for NullDetectionLogger {
    fn frame_analyzed(&mut self, _position: &str, _faces: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Forwards events to the `log` crate and keeps per-stage timings for a
/// summary at the end of the run.
pub struct LogDetectionLogger {
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    frames: usize,
    faces: usize,
}

impl LogDetectionLogger {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames: 0,
            faces: 0,
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.frames == 0 && self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Detection summary ({} frame(s), {} face(s), {:.1}s total):",
            self.frames,
            self.faces,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({} call(s))",
                durations.len()
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            if let Some(last) = self.metrics[name].last() {
                lines.push(format!("  {name}: {last:.1}"));
            }
        }

        Some(lines.join("\n"))
    }
}

impl Default for LogDetectionLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionLogger for LogDetectionLogger {
    fn frame_analyzed(&mut self, position: &str, faces: usize) {
        self.frames += 1;
        self.faces += faces;
        log::info!("Frame {position}: {faces} face(s)");
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
