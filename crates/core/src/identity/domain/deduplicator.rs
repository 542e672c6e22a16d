//! Order-dependent merge of near-duplicate observations into identities.
//!
//! The pass walks the input once. Each unconsumed entry `i` starts a chain
//! whose representative is `i`; every later unconsumed entry within the
//! similarity threshold of the *current* representative absorbs it: the later
//! slot receives `blend(rep, later, rep.blend_iteration + 1)` and becomes the
//! representative for the rest of the chain. The chain's final
//! representative is emitted at the chain's starting position.
//!
//! Because comparisons continue from the blended representative, the result
//! depends on input order. This reproduces the observed identity behavior and
//! is kept as is. The pass is O(n²), fine for the tens of faces a session
//! holds.

use std::collections::HashMap;

use crate::identity::domain::embedding::DEFAULT_SIMILARITY_THRESHOLD;
use crate::identity::domain::observation_store::{ObservationId, ObservationStore};

/// Result of one dedup pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DedupOutcome {
    /// One representative per identity, in order of first appearance.
    pub survivors: Vec<ObservationId>,
    /// `(absorbed, absorber)` pairs in merge order.
    pub superseded: Vec<(ObservationId, ObservationId)>,
}

impl DedupOutcome {
    pub fn merge_count(&self) -> usize {
        self.superseded.len()
    }
}

#[derive(Clone, Debug)]
pub struct Deduplicator {
    threshold: f32,
}

impl Deduplicator {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn dedupe(&self, store: &mut ObservationStore, handles: &[ObservationId]) -> DedupOutcome {
        let n = handles.len();
        let mut consumed = vec![false; n];
        let mut outcome = DedupOutcome::default();

        for i in 0..n {
            if consumed[i] {
                continue;
            }
            consumed[i] = true;
            let mut representative = handles[i];

            for j in (i + 1)..n {
                if consumed[j] {
                    continue;
                }
                let candidate = handles[j];
                if candidate == representative {
                    consumed[j] = true;
                    continue;
                }
                if !store[representative].is_same_identity(&store[candidate], self.threshold) {
                    continue;
                }
                if self.fold(store, representative, candidate) {
                    consumed[j] = true;
                    outcome.superseded.push((representative, candidate));
                    representative = candidate;
                }
            }

            outcome.survivors.push(representative);
        }

        outcome
    }

    /// Re-runs the full pass over the current identities followed by newly
    /// observed faces.
    pub fn merge_into(
        &self,
        store: &mut ObservationStore,
        identities: &[ObservationId],
        new_observations: &[ObservationId],
    ) -> DedupOutcome {
        let mut handles = Vec::with_capacity(identities.len() + new_observations.len());
        handles.extend_from_slice(identities);
        handles.extend_from_slice(new_observations);
        self.dedupe(store, &handles)
    }

    /// Matches faces seen together in one frame against `identities` only.
    ///
    /// Each identity absorbs at most one new face, the first within threshold;
    /// new faces never absorb each other. Unmatched faces follow the
    /// identities as survivors of their own.
    pub fn merge_distinct(
        &self,
        store: &mut ObservationStore,
        identities: &[ObservationId],
        new_observations: &[ObservationId],
    ) -> DedupOutcome {
        let mut consumed = vec![false; new_observations.len()];
        let mut outcome = DedupOutcome::default();

        for &identity in identities {
            let mut representative = identity;
            for (j, &candidate) in new_observations.iter().enumerate() {
                if consumed[j] || candidate == identity {
                    continue;
                }
                if !store[identity].is_same_identity(&store[candidate], self.threshold) {
                    continue;
                }
                if self.fold(store, identity, candidate) {
                    consumed[j] = true;
                    outcome.superseded.push((identity, candidate));
                    representative = candidate;
                    break;
                }
            }
            outcome.survivors.push(representative);
        }

        outcome.survivors.extend(
            new_observations
                .iter()
                .zip(&consumed)
                .filter(|&(_, &taken)| !taken)
                .map(|(&id, _)| id),
        );
        outcome
    }

    /// Writes the blend of `representative` and `target` into `target`'s slot.
    fn fold(
        &self,
        store: &mut ObservationStore,
        representative: ObservationId,
        target: ObservationId,
    ) -> bool {
        let iteration = store[representative].blend_iteration + 1;
        let Some(blended) = store[representative]
            .embedding
            .blend(&store[target].embedding, iteration)
        else {
            return false;
        };
        let inherited_label = store[representative].label.clone();

        let slot = &mut store[target];
        slot.embedding = blended;
        slot.blend_iteration = iteration;
        if slot.label.is_none() {
            slot.label = inherited_label;
        }
        true
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

/// Accumulated `absorbed → absorber` links across dedup passes, so handles
/// recorded for earlier frames can be resolved to the identity that
/// currently represents them.
#[derive(Clone, Debug, Default)]
pub struct IdentityRedirects {
    links: HashMap<ObservationId, ObservationId>,
}

impl IdentityRedirects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &DedupOutcome) {
        for &(absorbed, absorber) in &outcome.superseded {
            self.link(absorbed, absorber);
        }
    }

    pub fn link(&mut self, absorbed: ObservationId, absorber: ObservationId) {
        if absorbed != absorber {
            self.links.insert(absorbed, absorber);
        }
    }

    pub fn resolve(&self, id: ObservationId) -> ObservationId {
        let mut current = id;
        // Each link points to a strictly later merge, so the chain cannot
        // exceed the number of links.
        for _ in 0..=self.links.len() {
            match self.links.get(&current) {
                Some(&next) if next != current => current = next,
                _ => break,
            }
        }
        current
    }
}
