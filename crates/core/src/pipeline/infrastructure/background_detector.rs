use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;

use crate::pipeline::detection_pipeline::{DetectionPipeline, DetectionRequest, InFlightGuard};
use crate::pipeline::detection_report::DetectionReport;
use crate::pipeline::pipeline_error::PipelineError;

pub type DetectionResult = Result<DetectionReport, PipelineError>;

type Completion = Box<dyn FnOnce(DetectionResult) + Send>;

struct Job {
    request: DetectionRequest,
    guard: InFlightGuard,
    on_complete: Completion,
}

/// Runs detections on one dedicated worker thread.
///
/// `submit` claims the pipeline on the caller's thread, so a busy pipeline is
/// rejected immediately rather than queued. The worker releases the claim
/// before invoking the completion, which therefore may submit again.
pub struct BackgroundDetector {
    pipeline: Arc<DetectionPipeline>,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundDetector {
    pub fn new(pipeline: Arc<DetectionPipeline>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let worker_pipeline = Arc::clone(&pipeline);
        let worker = std::thread::spawn(move || {
            for job in receiver {
                let Job {
                    request,
                    guard,
                    on_complete,
                } = job;
                let result = worker_pipeline.run_acquired(&guard, request);
                drop(guard);
                on_complete(result);
            }
            log::debug!("Detection worker stopped");
        });

        Self {
            pipeline,
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    pub fn pipeline(&self) -> &Arc<DetectionPipeline> {
        &self.pipeline
    }

    pub fn is_busy(&self) -> bool {
        self.pipeline.is_busy()
    }

    /// Queues `request`; `on_complete` is called exactly once on the worker
    /// thread with the outcome. Fails without calling it when the pipeline is
    /// busy or the worker is gone.
    pub fn submit<F>(&self, request: DetectionRequest, on_complete: F) -> Result<(), PipelineError>
    where
        F: FnOnce(DetectionResult) + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(PipelineError::WorkerUnavailable)?;
        let guard = self.pipeline.try_acquire()?;
        sender
            .send(Job {
                request,
                guard,
                on_complete: Box::new(on_complete),
            })
            .map_err(|_| PipelineError::WorkerUnavailable)
    }
}

impl Drop for BackgroundDetector {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Detection worker panicked");
            }
        }
    }
}
