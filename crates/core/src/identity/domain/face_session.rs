use crate::identity::domain::deduplicator::IdentityRedirects;
use crate::identity::domain::embedding::{EmbeddingVector, DEFAULT_SIMILARITY_THRESHOLD};
use crate::identity::domain::face_observation::FaceObservation;
use crate::identity::domain::observation_store::{ObservationId, ObservationStore};
use crate::pipeline::detection_report::DetectionReport;
use crate::shared::bounding_box::BoundingBox;

/// One face as it appeared in a recorded media item.
#[derive(Clone, Debug)]
pub struct MediaFace {
    pub bounds: BoundingBox,
    pub embedding: EmbeddingVector,
    observation: ObservationId,
}

#[derive(Clone, Debug)]
pub struct MediaEntry {
    pub label: String,
    pub faces: Vec<MediaFace>,
}

/// Caller-owned accumulation of identities across detection runs.
///
/// Each run is seeded with [`prior`](FaceSession::prior) and already merges
/// its faces against it, so [`record`](FaceSession::record) adopts the run's
/// identity list as is. Session handles stay valid: an identity the run
/// absorbed resolves to the identity that replaced it.
#[derive(Debug)]
pub struct FaceSession {
    store: ObservationStore,
    identities: Vec<ObservationId>,
    redirects: IdentityRedirects,
    media: Vec<MediaEntry>,
    similarity_threshold: f32,
}

impl FaceSession {
    pub fn new(similarity_threshold: f32) -> Self {
        Self {
            store: ObservationStore::new(),
            identities: Vec::new(),
            redirects: IdentityRedirects::new(),
            media: Vec::new(),
            similarity_threshold,
        }
    }

    /// Takes over the identities of a report produced from [`prior`](Self::prior)
    /// and files the faces its frames saw under `media_label`.
    ///
    /// Returns the session handle for each of the report's identities, in
    /// report order.
    pub fn record(
        &mut self,
        media_label: impl Into<String>,
        report: &DetectionReport,
    ) -> Vec<ObservationId> {
        let handles: Vec<ObservationId> = report
            .identities
            .iter()
            .map(|&id| {
                let observation = report.store[id].clone();
                let known = if report.is_prior_slot(id) {
                    self.identities.get(id.index()).copied()
                } else {
                    None
                };
                match known {
                    Some(handle) => {
                        self.store[handle] = observation;
                        handle
                    }
                    None => self.store.insert(observation),
                }
            })
            .collect();
        let handle_for = |id: ObservationId| {
            report
                .identity_index(id)
                .map(|index| handles[index])
        };

        for (&known, &current) in self.identities.iter().zip(&report.prior_identities) {
            if let Some(handle) = handle_for(current) {
                self.redirects.link(known, handle);
            }
        }

        let entry = MediaEntry {
            label: media_label.into(),
            faces: report
                .seen_identities()
                .into_iter()
                .filter_map(|id| {
                    let face = &report.store[id];
                    handle_for(id).map(|observation| MediaFace {
                        bounds: face.bounds,
                        embedding: face.embedding.clone(),
                        observation,
                    })
                })
                .collect(),
        };
        self.identities = handles.clone();

        log::debug!(
            "Session recorded '{}': {} face(s), {} identit(ies) total",
            entry.label,
            entry.faces.len(),
            self.identities.len()
        );
        self.media.push(entry);
        handles
    }

    pub fn identities(&self) -> Vec<&FaceObservation> {
        self.identities.iter().map(|&id| &self.store[id]).collect()
    }

    pub fn identity_ids(&self) -> &[ObservationId] {
        &self.identities
    }

    /// Identity set to pass as prior knowledge to the next detection.
    pub fn prior(&self) -> Vec<FaceObservation> {
        self.identities
            .iter()
            .map(|&id| self.store[id].clone())
            .collect()
    }

    pub fn media(&self) -> &[MediaEntry] {
        &self.media
    }

    /// Current identity standing in for a handle issued by [`record`](Self::record).
    pub fn resolve(&self, id: ObservationId) -> ObservationId {
        self.redirects.resolve(id)
    }

    /// Media items with at least one face matching `face`.
    pub fn media_containing(&self, face: &FaceObservation) -> Vec<&MediaEntry> {
        let threshold = self.similarity_threshold;
        self.media
            .iter()
            .filter(|entry| {
                entry
                    .faces
                    .iter()
                    .any(|f| face.embedding.is_same_identity(&f.embedding, threshold))
            })
            .collect()
    }

    /// Media items whose faces were merged into `identity`.
    pub fn media_for_identity(&self, identity: ObservationId) -> Vec<&MediaEntry> {
        let target = self.resolve(identity);
        self.media
            .iter()
            .filter(|entry| {
                entry
                    .faces
                    .iter()
                    .any(|f| self.resolve(f.observation) == target)
            })
            .collect()
    }

    /// Index of the closest candidate within the similarity threshold.
    pub fn best_match(&self, face: &FaceObservation, candidates: &[FaceObservation]) -> Option<usize> {
        let threshold = self.similarity_threshold;
        candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (i, face.embedding.cosine_distance(&c.embedding)))
            .filter(|&(_, d)| d <= threshold)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Names an identity. Returns false when the handle is unknown.
    pub fn label(&mut self, id: ObservationId, name: impl Into<String>) -> bool {
        let target = self.resolve(id);
        match self.store.get_mut(target) {
            Some(observation) => {
                observation.label = Some(name.into());
                true
            }
            None => false,
        }
    }
}

impl Default for FaceSession {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::domain::deduplicator::Deduplicator;
    use crate::pipeline::detection_report::{FrameFaces, FrameOutcome, FramePosition};
    use crate::shared::frame::Frame;

    fn face(degrees: f32) -> FaceObservation {
        let r = degrees.to_radians();
        FaceObservation::new(
            EmbeddingVector::new(vec![r.cos(), r.sin()]),
            BoundingBox::from_pixel_rect(10, 10, 20, 20, 100, 100),
            Frame::new(vec![0u8; 3], 1, 1, 3, 0),
        )
    }

    /// Report for one still showing `faces`, matched against `prior` the way
    /// a detection run matches a single frame.
    fn detected(prior: Vec<FaceObservation>, faces: Vec<FaceObservation>) -> DetectionReport {
        let mut store = ObservationStore::new();
        let prior_ids: Vec<ObservationId> = prior.into_iter().map(|o| store.insert(o)).collect();
        let new_ids: Vec<ObservationId> = faces.into_iter().map(|o| store.insert(o)).collect();
        let outcome = Deduplicator::default().merge_distinct(&mut store, &prior_ids, &new_ids);
        let mut redirects = IdentityRedirects::new();
        redirects.record(&outcome);

        DetectionReport {
            prior_identities: prior_ids.iter().map(|&id| redirects.resolve(id)).collect(),
            frames: vec![FrameFaces {
                position: FramePosition::Still,
                outcome: FrameOutcome::Faces(new_ids.iter().map(|&id| redirects.resolve(id)).collect()),
            }],
            identities: outcome.survivors,
            store,
            skipped_timestamps_ms: Vec::new(),
        }
    }

    fn record(session: &mut FaceSession, label: &str, faces: Vec<FaceObservation>) -> Vec<ObservationId> {
        let report = detected(session.prior(), faces);
        session.record(label, &report)
    }

    fn labels(media: Vec<&MediaEntry>) -> Vec<&str> {
        media.iter().map(|m| m.label.as_str()).collect()
    }

    #[test]
    fn test_record_merges_same_person_across_media() {
        let mut session = FaceSession::default();
        record(&mut session, "beach.jpg", vec![face(0.0), face(90.0)]);
        record(&mut session, "party.jpg", vec![face(5.0)]);

        assert_eq!(session.identities().len(), 2);
        assert_eq!(session.media().len(), 2);
        assert_eq!(session.media()[1].faces.len(), 1);
    }

    #[test]
    fn test_unseen_prior_identities_stay_out_of_media() {
        let mut session = FaceSession::default();
        record(&mut session, "a.jpg", vec![face(0.0)]);
        record(&mut session, "b.jpg", vec![face(90.0)]);
        record(&mut session, "c.jpg", vec![face(90.0)]);

        assert_eq!(labels(session.media_containing(&face(0.0))), vec!["a.jpg"]);
        let iterations: Vec<u32> = session
            .identities()
            .iter()
            .map(|f| f.blend_iteration)
            .collect();
        assert_eq!(iterations, vec![1, 2]);
    }

    #[test]
    fn test_record_returns_handles_in_report_order() {
        let mut session = FaceSession::default();
        let first = record(&mut session, "a.jpg", vec![face(0.0), face(90.0)]);
        let second = record(&mut session, "b.jpg", vec![face(180.0)]);

        assert_eq!(second.len(), 3);
        assert_eq!(&second[..2], &first[..]);
        assert_eq!(session.identity_ids(), &second[..]);
    }

    #[test]
    fn test_prior_clones_identities() {
        let mut session = FaceSession::default();
        record(&mut session, "a.jpg", vec![face(0.0), face(90.0)]);
        let prior = session.prior();
        assert_eq!(prior.len(), 2);
        assert_eq!(prior[0].embedding, session.identities()[0].embedding);
    }

    #[test]
    fn test_media_containing_filters_by_face() {
        let mut session = FaceSession::default();
        record(&mut session, "alice.jpg", vec![face(0.0)]);
        record(&mut session, "bob.jpg", vec![face(90.0)]);
        record(&mut session, "both.jpg", vec![face(3.0), face(88.0)]);

        assert_eq!(
            labels(session.media_containing(&face(1.0))),
            vec!["alice.jpg", "both.jpg"]
        );
    }

    #[test]
    fn test_media_for_identity_follows_merges() {
        let mut session = FaceSession::default();
        let first = record(&mut session, "one.jpg", vec![face(0.0)]);
        record(&mut session, "two.jpg", vec![face(4.0)]);
        record(&mut session, "three.jpg", vec![face(90.0)]);

        assert_eq!(
            labels(session.media_for_identity(first[0])),
            vec!["one.jpg", "two.jpg"]
        );
    }

    #[test]
    fn test_best_match_picks_closest_within_threshold() {
        let session = FaceSession::default();
        let candidates = vec![face(90.0), face(20.0), face(5.0)];
        assert_eq!(session.best_match(&face(0.0), &candidates), Some(2));
        assert_eq!(session.best_match(&face(0.0), &[face(90.0)]), None);
    }

    #[test]
    fn test_label_applies_to_surviving_identity() {
        let mut session = FaceSession::default();
        let first = record(&mut session, "one.jpg", vec![face(0.0)]);
        record(&mut session, "two.jpg", vec![face(2.0)]);

        assert!(session.label(first[0], "alice"));
        assert_eq!(session.identities()[0].label.as_deref(), Some("alice"));
    }

    #[test]
    fn test_label_survives_later_merge() {
        let mut session = FaceSession::default();
        let first = record(&mut session, "one.jpg", vec![face(0.0)]);
        session.label(first[0], "alice");
        record(&mut session, "two.jpg", vec![face(2.0)]);

        assert_eq!(session.identities()[0].label.as_deref(), Some("alice"));
    }
}
