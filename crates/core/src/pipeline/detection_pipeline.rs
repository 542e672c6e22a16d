//! Per-source face detection: sampling, detection, embedding and identity
//! folding for one media item at a time.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::detection::domain::detection_error::DetectionError;
use crate::detection::domain::embedding_extractor::EmbeddingExtractor;
use crate::detection::domain::face_crop::square_crop;
use crate::detection::domain::face_detector::FaceDetector;
use crate::identity::domain::deduplicator::{Deduplicator, IdentityRedirects};
use crate::identity::domain::face_observation::FaceObservation;
use crate::identity::domain::observation_store::{ObservationId, ObservationStore};
use crate::pipeline::detection_logger::{DetectionLogger, NullDetectionLogger};
use crate::pipeline::detection_report::{DetectionReport, FrameFaces, FrameOutcome, FramePosition};
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::pipeline_error::PipelineError;
use crate::sampling::domain::adaptive_frame_sampler::AdaptiveFrameSampler;
use crate::sampling::domain::clock::{as_millis_f64, Clock, SystemClock};
use crate::sampling::domain::processing_budget::ProcessingBudget;
use crate::sampling::domain::stride_sampler::stride_indices;
use crate::shared::frame::Frame;
use crate::shared::media_source::MediaSource;
use crate::video::domain::frame_sequence_reader::FrameSequenceReader;
use crate::video::domain::video_frame_decoder::VideoFrameDecoder;

/// One media item plus what the run should know going in.
#[derive(Clone, Debug)]
pub struct DetectionRequest {
    pub source: MediaSource,
    /// Only consulted for video sources.
    pub budget: ProcessingBudget,
    /// Identities from earlier runs; new faces are merged against them.
    pub prior: Vec<FaceObservation>,
}

impl DetectionRequest {
    pub fn new(source: MediaSource) -> Self {
        Self {
            source,
            budget: ProcessingBudget::default(),
            prior: Vec::new(),
        }
    }

    pub fn with_budget(mut self, budget: ProcessingBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_prior(mut self, prior: Vec<FaceObservation>) -> Self {
        self.prior = prior;
        self
    }
}

/// Marks a pipeline busy until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, PipelineError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::DetectionInProgress)?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Detector plus embedder: turns one frame into face observations.
struct FrameAnalyzer {
    detector: Box<dyn FaceDetector>,
    extractor: Box<dyn EmbeddingExtractor>,
    min_confidence: f32,
}

impl FrameAnalyzer {
    fn analyze(
        &mut self,
        frame: &Frame,
        clock: &dyn Clock,
        logger: &mut dyn DetectionLogger,
    ) -> Result<Vec<FaceObservation>, DetectionError> {
        let started = clock.now();
        let regions = self
            .detector
            .detect(frame)
            .map_err(|e| DetectionError::DetectionFailed(e.to_string()))?;
        let detected = clock.now();
        logger.timing("detect", as_millis_f64(detected.saturating_sub(started)));

        let mut faces = Vec::new();
        for region in regions
            .into_iter()
            .filter(|r| r.confidence >= self.min_confidence)
        {
            let crop = square_crop(frame, &region);
            if !crop.is_decodable() {
                log::debug!("Dropping face outside frame bounds: {region:?}");
                continue;
            }
            let embedding = self
                .extractor
                .extract(&crop)
                .map_err(|e| DetectionError::ExtractionFailed(e.to_string()))?;
            let bounds = region.to_bounding_box(frame.width(), frame.height());
            faces.push(FaceObservation::new(embedding, bounds, crop).with_confidence(region.confidence));
        }
        if !faces.is_empty() {
            logger.timing("embed", as_millis_f64(clock.now().saturating_sub(detected)));
        }
        Ok(faces)
    }
}

struct Collaborators {
    analyzer: FrameAnalyzer,
    decoder: Box<dyn VideoFrameDecoder>,
    sequence_reader: Box<dyn FrameSequenceReader>,
    logger: Box<dyn DetectionLogger>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunPhase {
    Idle,
    Sampling,
    Finalizing,
    Done,
}

/// Identity accumulator owned by one in-flight run.
struct DetectionRun {
    phase: RunPhase,
    store: ObservationStore,
    /// Slots seeded from the prior identity set.
    prior: Vec<ObservationId>,
    identities: Vec<ObservationId>,
    /// Observations not yet folded into `identities`.
    pending: Vec<ObservationId>,
    redirects: IdentityRedirects,
    frames: Vec<FrameFaces>,
    skipped_timestamps_ms: Vec<f64>,
    deduplicator: Deduplicator,
}

impl DetectionRun {
    fn new(prior: Vec<FaceObservation>, similarity_threshold: f32) -> Self {
        let mut store = ObservationStore::new();
        let prior: Vec<ObservationId> = prior.into_iter().map(|o| store.insert(o)).collect();
        Self {
            phase: RunPhase::Idle,
            store,
            identities: prior.clone(),
            prior,
            pending: Vec::new(),
            redirects: IdentityRedirects::new(),
            frames: Vec::new(),
            skipped_timestamps_ms: Vec::new(),
            deduplicator: Deduplicator::new(similarity_threshold),
        }
    }

    fn enter(&mut self, next: RunPhase) {
        log::trace!("Detection run {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn record_faces(&mut self, position: FramePosition, faces: Vec<FaceObservation>) {
        debug_assert_eq!(self.phase, RunPhase::Sampling);
        let ids: Vec<ObservationId> = faces.into_iter().map(|f| self.store.insert(f)).collect();
        self.pending.extend_from_slice(&ids);
        self.frames.push(FrameFaces {
            position,
            outcome: FrameOutcome::Faces(ids),
        });
    }

    fn record_failure(&mut self, position: FramePosition, reason: String) {
        debug_assert_eq!(self.phase, RunPhase::Sampling);
        log::warn!("Frame {position} failed: {reason}");
        self.frames.push(FrameFaces {
            position,
            outcome: FrameOutcome::Failed(reason),
        });
    }

    fn fold_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let outcome = self
            .deduplicator
            .merge_into(&mut self.store, &self.identities, &self.pending);
        if outcome.merge_count() > 0 {
            log::debug!(
                "Merged {} observation(s); {} identit(ies)",
                outcome.merge_count(),
                outcome.survivors.len()
            );
        }
        self.redirects.record(&outcome);
        self.identities = outcome.survivors;
        self.pending.clear();
    }

    /// Folds faces that share one frame, matching them against the known
    /// identities but never against each other.
    fn fold_pending_distinct(&mut self) {
        let outcome = self
            .deduplicator
            .merge_distinct(&mut self.store, &self.identities, &self.pending);
        self.redirects.record(&outcome);
        self.identities = outcome.survivors;
        self.pending.clear();
    }

    fn finish(mut self) -> Result<DetectionReport, PipelineError> {
        self.enter(RunPhase::Finalizing);
        self.fold_pending();

        // undecodable video timestamps count as failed attempts
        let skipped = self.skipped_timestamps_ms.len();
        let attempted = self.frames.len() + skipped;
        let failed = skipped
            + self
                .frames
                .iter()
                .filter(|f| matches!(f.outcome, FrameOutcome::Failed(_)))
                .count();
        if attempted > 0 && failed == attempted {
            return Err(PipelineError::AllFramesFailed { attempted });
        }

        let redirects = &self.redirects;
        for frame in &mut self.frames {
            if let FrameOutcome::Faces(ids) = &mut frame.outcome {
                for id in ids.iter_mut() {
                    *id = redirects.resolve(*id);
                }
            }
        }
        let prior_identities = self.prior.iter().map(|&id| redirects.resolve(id)).collect();
        self.enter(RunPhase::Done);

        Ok(DetectionReport {
            store: self.store,
            identities: self.identities,
            prior_identities,
            frames: self.frames,
            skipped_timestamps_ms: self.skipped_timestamps_ms,
        })
    }
}

/// Runs face detection over one media source at a time.
///
/// Collaborators sit behind a mutex so the pipeline can be shared with a
/// worker thread; the in-flight flag rejects a second run instead of queueing
/// it.
pub struct DetectionPipeline {
    config: PipelineConfig,
    clock: Arc<dyn Clock>,
    collaborators: Mutex<Collaborators>,
    in_flight: Arc<AtomicBool>,
}

impl DetectionPipeline {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        extractor: Box<dyn EmbeddingExtractor>,
        decoder: Box<dyn VideoFrameDecoder>,
        sequence_reader: Box<dyn FrameSequenceReader>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate().map_err(PipelineError::InvalidConfig)?;
        Ok(Self {
            collaborators: Mutex::new(Collaborators {
                analyzer: FrameAnalyzer {
                    detector,
                    extractor,
                    min_confidence: config.min_face_confidence,
                },
                decoder,
                sequence_reader,
                logger: Box::new(NullDetectionLogger),
            }),
            config,
            clock: Arc::new(SystemClock::new()),
            in_flight: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_logger(mut self, logger: Box<dyn DetectionLogger>) -> Self {
        self.collaborators
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .logger = logger;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claims the pipeline, failing with `DetectionInProgress` when a run is
    /// already in flight.
    pub fn try_acquire(&self) -> Result<InFlightGuard, PipelineError> {
        InFlightGuard::acquire(&self.in_flight)
    }

    pub fn detect(&self, request: DetectionRequest) -> Result<DetectionReport, PipelineError> {
        let guard = self.try_acquire()?;
        self.run_acquired(&guard, request)
    }

    /// Runs a request under a guard obtained from [`try_acquire`](Self::try_acquire).
    pub(crate) fn run_acquired(
        &self,
        guard: &InFlightGuard,
        request: DetectionRequest,
    ) -> Result<DetectionReport, PipelineError> {
        debug_assert!(Arc::ptr_eq(&guard.flag, &self.in_flight));
        let DetectionRequest {
            source,
            budget,
            prior,
        } = request;
        budget.validate().map_err(PipelineError::InvalidBudget)?;

        let mut locked = self
            .collaborators
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let parts = &mut *locked;
        parts.logger.info(&format!(
            "Detecting faces in {} source ({} prior identit(ies))",
            source.kind(),
            prior.len()
        ));

        let started = self.clock.now();
        let mut run = DetectionRun::new(prior, self.config.similarity_threshold);
        let sampled = match source {
            MediaSource::StillImage(frame) => self.detect_still(parts, &mut run, &frame),
            MediaSource::VideoFile(path) => self.detect_video(parts, &mut run, &path, &budget),
            MediaSource::LivePhotoBurst(frames) => self.detect_sequence(parts, &mut run, &frames),
            MediaSource::AnimatedGif(path) => match parts.sequence_reader.read_frames(&path) {
                Ok(frames) => self.detect_sequence(parts, &mut run, &frames),
                Err(e) => Err(PipelineError::BadSource(format!("{}: {e}", path.display()))),
            },
        };
        let report = sampled.and_then(|()| run.finish());

        parts.logger.timing(
            "run",
            as_millis_f64(self.clock.now().saturating_sub(started)),
        );
        match &report {
            Ok(report) => parts
                .logger
                .metric("identities", report.identities.len() as f64),
            Err(e) => parts.logger.info(&format!("Detection failed: {e}")),
        }
        parts.logger.summary();
        report
    }

    fn detect_still(
        &self,
        parts: &mut Collaborators,
        run: &mut DetectionRun,
        frame: &Frame,
    ) -> Result<(), PipelineError> {
        if !frame.is_decodable() {
            return Err(PipelineError::BadSource("still image has no pixels".into()));
        }
        run.enter(RunPhase::Sampling);
        let faces = parts
            .analyzer
            .analyze(frame, self.clock.as_ref(), parts.logger.as_mut())?;
        parts
            .logger
            .frame_analyzed(&FramePosition::Still.to_string(), faces.len());
        run.record_faces(FramePosition::Still, faces);
        run.fold_pending_distinct();
        Ok(())
    }

    fn detect_sequence(
        &self,
        parts: &mut Collaborators,
        run: &mut DetectionRun,
        frames: &[Frame],
    ) -> Result<(), PipelineError> {
        if frames.is_empty() {
            return Err(PipelineError::BadSource("source has no frames".into()));
        }
        if !frames.iter().any(Frame::is_decodable) {
            return Err(PipelineError::BadSource(
                "source has no decodable frames".into(),
            ));
        }

        run.enter(RunPhase::Sampling);
        for index in stride_indices(frames.len(), self.config.max_images) {
            let position = FramePosition::Index(index);
            let frame = &frames[index];
            if !frame.is_decodable() {
                run.record_failure(position, "frame has no pixels".into());
                continue;
            }
            self.analyze_into(
                &mut parts.analyzer,
                parts.logger.as_mut(),
                run,
                position,
                frame,
            );
        }
        Ok(())
    }

    fn detect_video(
        &self,
        parts: &mut Collaborators,
        run: &mut DetectionRun,
        path: &Path,
        budget: &ProcessingBudget,
    ) -> Result<(), PipelineError> {
        let metadata = parts
            .decoder
            .open(path)
            .map_err(|e| PipelineError::BadSource(format!("{}: {e}", path.display())))?;
        let Collaborators {
            analyzer,
            decoder,
            logger,
            ..
        } = parts;
        // calibration is charged against the budget
        let budget_origin = self.clock.now();

        let duration_ms = match metadata.sampling_duration_ms() {
            Some(duration_ms) => duration_ms,
            None => {
                log::warn!("{} reports no duration; nothing to sample", path.display());
                0.0
            }
        };
        let cost_ms = if duration_ms > 0.0 {
            self.calibrate(analyzer, decoder.as_mut(), logger.as_mut(), budget.start_offset_ms())
        } else {
            self.config.fallback_frame_cost_ms
        };

        run.enter(RunPhase::Sampling);
        let mut sampler = AdaptiveFrameSampler::new(
            decoder.as_mut(),
            self.clock.as_ref(),
            duration_ms,
            budget,
            cost_ms,
        )
        .with_origin(budget_origin);
        for sampled in &mut sampler {
            let position = FramePosition::Timestamp(sampled.timestamp_ms);
            self.analyze_into(analyzer, logger.as_mut(), run, position, &sampled.frame);
            run.fold_pending();
        }
        run.skipped_timestamps_ms = sampler.skipped_timestamps().to_vec();
        logger.metric("per_frame_cost_ms", sampler.per_frame_cost_ms());
        drop(sampler);

        decoder.close();
        Ok(())
    }

    /// Times decode plus detection at `at_ms`. Results are discarded; any
    /// failure falls back to the configured cost.
    fn calibrate(
        &self,
        analyzer: &mut FrameAnalyzer,
        decoder: &mut dyn VideoFrameDecoder,
        logger: &mut dyn DetectionLogger,
        at_ms: f64,
    ) -> f64 {
        let fallback = self.config.fallback_frame_cost_ms;
        let started = self.clock.now();
        let Some(frame) = decoder.decode_frame_at(at_ms) else {
            log::warn!("Calibration frame at {at_ms:.0}ms undecodable; assuming {fallback}ms per frame");
            return fallback;
        };
        if let Err(e) = analyzer.detector.detect(&frame) {
            log::warn!("Calibration detection failed ({e}); assuming {fallback}ms per frame");
            return fallback;
        }
        let cost_ms = as_millis_f64(self.clock.now().saturating_sub(started));
        logger.timing("calibrate", cost_ms);
        log::debug!("Calibrated per-frame cost: {cost_ms:.1}ms");
        cost_ms
    }

    fn analyze_into(
        &self,
        analyzer: &mut FrameAnalyzer,
        logger: &mut dyn DetectionLogger,
        run: &mut DetectionRun,
        position: FramePosition,
        frame: &Frame,
    ) {
        match analyzer.analyze(frame, self.clock.as_ref(), logger) {
            Ok(faces) => {
                logger.frame_analyzed(&position.to_string(), faces.len());
                run.record_faces(position, faces);
            }
            Err(e) => run.record_failure(position, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_region::FaceRegion;
    use crate::identity::domain::embedding::EmbeddingVector;
    use crate::identity::domain::face_session::{FaceSession, MediaEntry};
    use crate::sampling::domain::clock::ManualClock;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::video_metadata::VideoMetadata;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::path::PathBuf;

    const BLOCK: u32 = 20;

    /// One 20×20 block per person; the pixel value is the person's
    /// embedding angle in degrees.
    fn people(angles: &[u8], index: usize) -> Frame {
        let width = BLOCK * angles.len() as u32;
        let mut data = Vec::with_capacity((width * BLOCK * 3) as usize);
        for _ in 0..BLOCK {
            for &angle in angles {
                data.extend(std::iter::repeat(angle).take((BLOCK * 3) as usize));
            }
        }
        Frame::new(data, width, BLOCK, 3, index)
    }

    type FailWhen = Box<dyn Fn(&Frame) -> bool + Send>;

    struct StubDetector {
        clock: ManualClock,
        cost_ms: f64,
        confidence: f32,
        fail_when: FailWhen,
    }

    impl StubDetector {
        fn new(clock: &ManualClock) -> Self {
            Self {
                clock: clock.clone(),
                cost_ms: 0.0,
                confidence: 0.9,
                fail_when: Box::new(|_| false),
            }
        }

        fn costing(mut self, cost_ms: f64) -> Self {
            self.cost_ms = cost_ms;
            self
        }

        fn failing_when(mut self, fail_when: impl Fn(&Frame) -> bool + Send + 'static) -> Self {
            self.fail_when = Box::new(fail_when);
            self
        }
    }

    impl FaceDetector for StubDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
            self.clock.advance_ms(self.cost_ms);
            if (self.fail_when)(frame) {
                return Err("detector exploded".into());
            }
            let blocks = (frame.width() / BLOCK) as i32;
            Ok((0..blocks)
                .map(|i| FaceRegion::new(i * BLOCK as i32, 0, BLOCK as i32, BLOCK as i32, self.confidence))
                .collect())
        }
    }

    #[derive(Default)]
    struct StubExtractor {
        fail: bool,
    }

    impl EmbeddingExtractor for StubExtractor {
        fn extract(&mut self, crop: &Frame) -> Result<EmbeddingVector, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("extractor exploded".into());
            }
            let angle = (crop.data()[0] as f32).to_radians();
            Ok(EmbeddingVector::new(vec![angle.cos(), angle.sin()]))
        }
    }

    struct StubDecoder {
        duration_ms: Option<f64>,
        open_fails: bool,
        nothing_decodes: bool,
        undecodable: Vec<f64>,
        closed: Arc<AtomicBool>,
    }

    impl StubDecoder {
        fn new(duration_ms: f64) -> Self {
            Self {
                duration_ms: Some(duration_ms),
                open_fails: false,
                nothing_decodes: false,
                undecodable: Vec::new(),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl VideoFrameDecoder for StubDecoder {
        fn open(&mut self, path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            if self.open_fails {
                return Err("not a video".into());
            }
            Ok(VideoMetadata {
                width: BLOCK,
                height: BLOCK,
                fps: 30.0,
                duration_ms: self.duration_ms,
                codec: "stub".into(),
                source_path: Some(path.to_path_buf()),
            })
        }

        fn decode_frame_at(&mut self, timestamp_ms: f64) -> Option<Frame> {
            if self.nothing_decodes || self.undecodable.contains(&timestamp_ms) {
                return None;
            }
            Some(people(&[0], timestamp_ms as usize))
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct StubReader {
        frames: Option<Vec<Frame>>,
    }

    impl FrameSequenceReader for StubReader {
        fn read_frames(&self, _path: &Path) -> Result<Vec<Frame>, Box<dyn std::error::Error>> {
            self.frames.clone().ok_or_else(|| "not a gif".into())
        }
    }

    fn pipeline_with(
        clock: &ManualClock,
        detector: StubDetector,
        extractor: StubExtractor,
        decoder: StubDecoder,
        reader: StubReader,
    ) -> DetectionPipeline {
        DetectionPipeline::new(
            Box::new(detector),
            Box::new(extractor),
            Box::new(decoder),
            Box::new(reader),
            PipelineConfig::default(),
        )
        .unwrap()
        .with_clock(Arc::new(clock.clone()))
    }

    fn pipeline(clock: &ManualClock, detector: StubDetector) -> DetectionPipeline {
        pipeline_with(
            clock,
            detector,
            StubExtractor::default(),
            StubDecoder::new(10_000.0),
            StubReader { frames: None },
        )
    }

    fn still(angles: &[u8]) -> DetectionRequest {
        DetectionRequest::new(MediaSource::StillImage(people(angles, 0)))
    }

    fn burst(count: usize) -> DetectionRequest {
        DetectionRequest::new(MediaSource::LivePhotoBurst(
            (0..count).map(|i| people(&[0], i)).collect(),
        ))
    }

    fn video(max_duration_ms: u64) -> DetectionRequest {
        DetectionRequest::new(MediaSource::VideoFile(PathBuf::from("clip.mov")))
            .with_budget(ProcessingBudget::from_millis(0, max_duration_ms))
    }

    // --- still images ---

    #[test]
    fn test_still_image_keeps_look_alikes_apart() {
        let clock = ManualClock::new();
        let report = pipeline(&clock, StubDetector::new(&clock))
            .detect(still(&[0, 2, 90]))
            .unwrap();

        assert_eq!(report.identities.len(), 3);
        assert_eq!(report.frames.len(), 1);
        assert_eq!(report.frames[0].position, FramePosition::Still);
        assert_eq!(report.summaries().frames[0].identities, vec![0, 1, 2]);
        assert!(report
            .identity_observations()
            .iter()
            .all(|face| face.blend_iteration == 1));
    }

    #[test]
    fn test_prior_absorbs_only_one_look_alike_per_still() {
        let clock = ManualClock::new();
        let angle = 1f32.to_radians();
        let prior = FaceObservation::new(
            EmbeddingVector::new(vec![angle.cos(), angle.sin()]),
            BoundingBox::default(),
            people(&[1], 0),
        )
        .with_label("alice");

        let report = pipeline(&clock, StubDetector::new(&clock))
            .detect(still(&[0, 2]).with_prior(vec![prior]))
            .unwrap();

        let identities = report.identity_observations();
        assert_eq!(identities.len(), 2);
        assert_eq!(identities[0].label.as_deref(), Some("alice"));
        assert_eq!(identities[0].blend_iteration, 2);
        assert_eq!(identities[1].label, None);
        assert_eq!(report.summaries().frames[0].identities, vec![0, 1]);
    }

    #[test]
    fn test_still_image_bounds_and_thumbnail() {
        let clock = ManualClock::new();
        let report = pipeline(&clock, StubDetector::new(&clock))
            .detect(still(&[0, 90]))
            .unwrap();

        let faces = report.identity_observations();
        assert_eq!(faces[1].bounds, BoundingBox::from_pixel_rect(20, 0, 20, 20, 40, 20));
        assert_eq!((faces[1].thumbnail.width(), faces[1].thumbnail.height()), (20, 20));
        assert_relative_eq!(faces[1].confidence, 0.9);
    }

    #[test]
    fn test_still_detection_failure_is_error() {
        let clock = ManualClock::new();
        let detector = StubDetector::new(&clock).failing_when(|_| true);
        let result = pipeline(&clock, detector).detect(still(&[0]));

        assert!(matches!(
            result,
            Err(PipelineError::DetectionFailed(DetectionError::DetectionFailed(_)))
        ));
    }

    #[test]
    fn test_still_extraction_failure_is_error() {
        let clock = ManualClock::new();
        let result = pipeline_with(
            &clock,
            StubDetector::new(&clock),
            StubExtractor { fail: true },
            StubDecoder::new(0.0),
            StubReader { frames: None },
        )
        .detect(still(&[0]));

        assert!(matches!(
            result,
            Err(PipelineError::DetectionFailed(DetectionError::ExtractionFailed(_)))
        ));
    }

    #[test]
    fn test_still_without_pixels_is_bad_source() {
        let clock = ManualClock::new();
        let empty = Frame::new(Vec::new(), 0, 0, 3, 0);
        let result = pipeline(&clock, StubDetector::new(&clock))
            .detect(DetectionRequest::new(MediaSource::StillImage(empty)));
        assert!(matches!(result, Err(PipelineError::BadSource(_))));
    }

    #[test]
    fn test_low_confidence_faces_are_dropped() {
        let clock = ManualClock::new();
        let mut detector = StubDetector::new(&clock);
        detector.confidence = 0.1;
        let report = pipeline(&clock, detector).detect(still(&[0, 90])).unwrap();

        assert!(report.identities.is_empty());
        assert_eq!(report.frames[0].outcome, FrameOutcome::Faces(vec![]));
    }

    #[test]
    fn test_prior_identity_absorbs_new_sighting() {
        let clock = ManualClock::new();
        let angle = 1f32.to_radians();
        let prior = FaceObservation::new(
            EmbeddingVector::new(vec![angle.cos(), angle.sin()]),
            BoundingBox::default(),
            people(&[1], 0),
        )
        .with_label("alice");

        let report = pipeline(&clock, StubDetector::new(&clock))
            .detect(still(&[0]).with_prior(vec![prior]))
            .unwrap();

        let identities = report.identity_observations();
        assert_eq!(identities.len(), 1);
        assert_eq!(identities[0].label.as_deref(), Some("alice"));
        assert_eq!(identities[0].blend_iteration, 2);
        assert_eq!(report.summaries().frames[0].identities, vec![0]);
        assert_eq!(report.prior_identities, report.identities);
        assert!(!report.is_prior_slot(report.identities[0]));
    }

    #[test]
    fn test_untouched_prior_keeps_its_slot() {
        let clock = ManualClock::new();
        let prior = FaceObservation::new(
            EmbeddingVector::new(vec![0.0, 1.0]),
            BoundingBox::default(),
            people(&[90], 0),
        );

        let report = pipeline(&clock, StubDetector::new(&clock))
            .detect(still(&[0]).with_prior(vec![prior]))
            .unwrap();

        assert_eq!(report.identities.len(), 2);
        assert_eq!(report.prior_identities, vec![report.identities[0]]);
        assert!(report.is_prior_slot(report.identities[0]));
        assert_eq!(report.seen_identities(), vec![report.identities[1]]);
    }

    // --- bursts and GIFs ---

    #[test]
    fn test_burst_visits_stride_indices() {
        let clock = ManualClock::new();
        let report = pipeline(&clock, StubDetector::new(&clock))
            .detect(burst(10))
            .unwrap();

        assert_eq!(report.visited_indices(), vec![0, 2, 4, 6, 8]);
        assert_eq!(report.identities.len(), 1);
        assert_eq!(report.identity_observations()[0].blend_iteration, 5);
    }

    #[test]
    fn test_burst_frame_failure_does_not_abort() {
        let clock = ManualClock::new();
        let detector = StubDetector::new(&clock).failing_when(|f| f.index() == 2);
        let report = pipeline(&clock, detector).detect(burst(5)).unwrap();

        assert_eq!(report.frames.len(), 5);
        assert_eq!(report.failed_frame_count(), 1);
        assert!(matches!(report.frames[2].outcome, FrameOutcome::Failed(_)));
        assert_eq!(report.identities.len(), 1);
    }

    #[test]
    fn test_every_frame_failing_is_error() {
        let clock = ManualClock::new();
        let detector = StubDetector::new(&clock).failing_when(|_| true);
        let result = pipeline(&clock, detector).detect(burst(8));

        assert!(matches!(
            result,
            Err(PipelineError::AllFramesFailed { attempted: 5 })
        ));
    }

    #[test]
    fn test_empty_burst_is_bad_source() {
        let clock = ManualClock::new();
        let result = pipeline(&clock, StubDetector::new(&clock))
            .detect(DetectionRequest::new(MediaSource::LivePhotoBurst(vec![])));
        assert!(matches!(result, Err(PipelineError::BadSource(_))));
    }

    #[test]
    fn test_undecodable_burst_is_bad_source() {
        let clock = ManualClock::new();
        let frames = vec![Frame::new(Vec::new(), 0, 0, 3, 0); 3];
        let result = pipeline(&clock, StubDetector::new(&clock))
            .detect(DetectionRequest::new(MediaSource::LivePhotoBurst(frames)));
        assert!(matches!(result, Err(PipelineError::BadSource(_))));
    }

    #[test]
    fn test_gif_frames_come_from_reader() {
        let clock = ManualClock::new();
        let frames = vec![people(&[0], 0), people(&[0, 90], 1), people(&[90], 2)];
        let report = pipeline_with(
            &clock,
            StubDetector::new(&clock),
            StubExtractor::default(),
            StubDecoder::new(0.0),
            StubReader {
                frames: Some(frames),
            },
        )
        .detect(DetectionRequest::new(MediaSource::AnimatedGif(PathBuf::from("a.gif"))))
        .unwrap();

        assert_eq!(report.visited_indices(), vec![0, 1, 2]);
        assert_eq!(report.identities.len(), 2);
        let summary = report.summaries();
        assert_eq!(summary.frames[1].identities, vec![0, 1]);
        assert_eq!(summary.frames[2].identities, vec![1]);
    }

    #[test]
    fn test_unreadable_gif_is_bad_source() {
        let clock = ManualClock::new();
        let result = pipeline(&clock, StubDetector::new(&clock))
            .detect(DetectionRequest::new(MediaSource::AnimatedGif(PathBuf::from("a.gif"))));
        assert!(matches!(result, Err(PipelineError::BadSource(_))));
    }

    // --- video ---

    #[test]
    fn test_video_follows_budget() {
        // calibration measures 200ms of a 1000ms budget over 10s
        let clock = ManualClock::new();
        let decoder = StubDecoder::new(10_000.0);
        let closed = Arc::clone(&decoder.closed);
        let report = pipeline_with(
            &clock,
            StubDetector::new(&clock).costing(200.0),
            StubExtractor::default(),
            decoder,
            StubReader { frames: None },
        )
        .detect(video(1000))
        .unwrap();

        assert_eq!(report.sampled_timestamps_ms(), vec![2500.0, 5000.0, 7500.0]);
        assert_eq!(report.identities.len(), 1);
        assert_eq!(report.identity_observations()[0].blend_iteration, 3);
        assert!(report
            .summaries()
            .frames
            .iter()
            .all(|f| f.identities == vec![0]));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[rstest]
    #[case::affordable(300.0, vec![5000.0])]
    #[case::calibration_eats_budget(900.0, vec![])]
    fn test_video_calibration_counts_against_budget(
        #[case] frame_cost_ms: f64,
        #[case] expected: Vec<f64>,
    ) {
        let clock = ManualClock::new();
        let report = pipeline_with(
            &clock,
            StubDetector::new(&clock).costing(frame_cost_ms),
            StubExtractor::default(),
            StubDecoder::new(10_000.0),
            StubReader { frames: None },
        )
        .detect(video(1000))
        .unwrap();

        assert_eq!(report.sampled_timestamps_ms(), expected);
        let spent_ms = as_millis_f64(clock.now());
        assert!(spent_ms <= 1000.0 + frame_cost_ms, "spent {spent_ms}ms");
    }

    #[test]
    fn test_video_calibration_failure_uses_fallback_cost() {
        // 5000 / 720 → 6 affordable frames over 10s
        let clock = ManualClock::new();
        let mut decoder = StubDecoder::new(10_000.0);
        decoder.undecodable = vec![0.0];
        let report = pipeline_with(
            &clock,
            StubDetector::new(&clock).costing(500.0),
            StubExtractor::default(),
            decoder,
            StubReader { frames: None },
        )
        .detect(video(5000))
        .unwrap();

        let timestamps = report.sampled_timestamps_ms();
        assert_relative_eq!(timestamps[0], 10_000.0 / 6.0, epsilon = 1e-9);
        assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
        assert!(timestamps.iter().all(|&t| t < 10_000.0));
    }

    #[test]
    fn test_video_skips_undecodable_timestamps() {
        let clock = ManualClock::new();
        let mut decoder = StubDecoder::new(10_000.0);
        decoder.undecodable = vec![5000.0];
        let report = pipeline_with(
            &clock,
            StubDetector::new(&clock).costing(200.0),
            StubExtractor::default(),
            decoder,
            StubReader { frames: None },
        )
        .detect(video(1000))
        .unwrap();

        assert_eq!(report.skipped_timestamps_ms, vec![5000.0]);
        assert!(!report.sampled_timestamps_ms().contains(&5000.0));
        assert_eq!(report.sampled_timestamps_ms()[0], 2500.0);
    }

    #[test]
    fn test_video_with_no_decodable_frame_is_error() {
        let clock = ManualClock::new();
        let mut decoder = StubDecoder::new(10_000.0);
        decoder.nothing_decodes = true;
        let closed = Arc::clone(&decoder.closed);
        let result = pipeline_with(
            &clock,
            StubDetector::new(&clock).costing(200.0),
            StubExtractor::default(),
            decoder,
            StubReader { frames: None },
        )
        .detect(video(5000));

        assert!(matches!(
            result,
            Err(PipelineError::AllFramesFailed { attempted: 8 })
        ));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_video_without_duration_yields_empty_report() {
        let clock = ManualClock::new();
        let mut decoder = StubDecoder::new(0.0);
        decoder.duration_ms = None;
        let report = pipeline_with(
            &clock,
            StubDetector::new(&clock).costing(200.0),
            StubExtractor::default(),
            decoder,
            StubReader { frames: None },
        )
        .detect(video(1000))
        .unwrap();

        assert!(report.frames.is_empty());
        assert!(report.identities.is_empty());
    }

    #[test]
    fn test_video_open_failure_is_bad_source() {
        let clock = ManualClock::new();
        let mut decoder = StubDecoder::new(10_000.0);
        decoder.open_fails = true;
        let result = pipeline_with(
            &clock,
            StubDetector::new(&clock),
            StubExtractor::default(),
            decoder,
            StubReader { frames: None },
        )
        .detect(video(1000));

        match result {
            Err(PipelineError::BadSource(reason)) => assert!(reason.contains("clip.mov")),
            other => panic!("expected BadSource, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let clock = ManualClock::new();
        let result = pipeline(&clock, StubDetector::new(&clock)).detect(video(0));
        assert!(matches!(result, Err(PipelineError::InvalidBudget(_))));
    }

    // --- sessions across runs ---

    #[test]
    fn test_session_fed_from_prior_files_faces_per_media() {
        let clock = ManualClock::new();
        let pipeline = pipeline(&clock, StubDetector::new(&clock));
        let mut session = FaceSession::default();

        for (label, angles) in [("a.jpg", [0u8]), ("b.jpg", [90]), ("c.jpg", [90])] {
            let report = pipeline
                .detect(still(&angles).with_prior(session.prior()))
                .unwrap();
            session.record(label, &report);
        }

        let labels = |media: Vec<&MediaEntry>| -> Vec<String> {
            media.iter().map(|m| m.label.clone()).collect()
        };
        let first = session.identities()[0].clone();
        assert_eq!(labels(session.media_containing(&first)), vec!["a.jpg"]);
        assert_eq!(
            labels(session.media_for_identity(session.identity_ids()[1])),
            vec!["b.jpg", "c.jpg"]
        );
        let iterations: Vec<u32> = session
            .identities()
            .iter()
            .map(|f| f.blend_iteration)
            .collect();
        assert_eq!(iterations, vec![1, 2]);
    }

    #[test]
    fn test_session_keeps_video_sightings_under_one_identity() {
        let clock = ManualClock::new();
        let pipeline = pipeline_with(
            &clock,
            StubDetector::new(&clock).costing(200.0),
            StubExtractor::default(),
            StubDecoder::new(10_000.0),
            StubReader { frames: None },
        );
        let mut session = FaceSession::default();

        let report = pipeline.detect(still(&[0])).unwrap();
        let handles = session.record("photo.jpg", &report);
        let report = pipeline
            .detect(video(1000).with_prior(session.prior()))
            .unwrap();
        session.record("clip.mov", &report);

        assert_eq!(session.identities().len(), 1);
        assert_eq!(session.identities()[0].blend_iteration, 4);
        let media = session.media_for_identity(handles[0]);
        assert_eq!(media.len(), 2);
        assert_eq!(media[1].faces.len(), 1);
    }

    // --- guard and configuration ---

    #[test]
    fn test_guard_rejects_concurrent_detect() {
        let clock = ManualClock::new();
        let pipeline = pipeline(&clock, StubDetector::new(&clock));

        let guard = pipeline.try_acquire().unwrap();
        assert!(pipeline.is_busy());
        assert!(matches!(
            pipeline.detect(still(&[0])),
            Err(PipelineError::DetectionInProgress)
        ));
        assert!(matches!(
            pipeline.try_acquire(),
            Err(PipelineError::DetectionInProgress)
        ));

        drop(guard);
        assert!(!pipeline.is_busy());
        assert!(pipeline.detect(still(&[0])).is_ok());
    }

    #[test]
    fn test_guard_released_after_failed_run() {
        let clock = ManualClock::new();
        let detector = StubDetector::new(&clock).failing_when(|_| true);
        let pipeline = pipeline(&clock, detector);

        assert!(pipeline.detect(still(&[0])).is_err());
        assert!(!pipeline.is_busy());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let clock = ManualClock::new();
        let result = DetectionPipeline::new(
            Box::new(StubDetector::new(&clock)),
            Box::new(StubExtractor::default()),
            Box::new(StubDecoder::new(0.0)),
            Box::new(StubReader { frames: None }),
            PipelineConfig {
                fallback_frame_cost_ms: -1.0,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }
}
