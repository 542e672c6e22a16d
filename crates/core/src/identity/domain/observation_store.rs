use std::ops::{Index, IndexMut};

use serde::Serialize;

use crate::identity::domain::face_observation::FaceObservation;

/// Stable handle to an observation slot.
///
/// Handles are never reassigned: merging rewrites slot content, so a handle a
/// caller holds keeps pointing at the same sighting (or at a superseded
/// sighting that [`IdentityRedirects`](crate::identity::domain::deduplicator::IdentityRedirects)
/// resolves to its survivor).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObservationId(usize);

impl ObservationId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Append-only arena of observations for one detection run or session.
#[derive(Clone, Debug, Default)]
pub struct ObservationStore {
    slots: Vec<FaceObservation>,
}

impl ObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, observation: FaceObservation) -> ObservationId {
        self.slots.push(observation);
        ObservationId(self.slots.len() - 1)
    }

    pub fn get(&self, id: ObservationId) -> Option<&FaceObservation> {
        self.slots.get(id.0)
    }

    pub fn get_mut(&mut self, id: ObservationId) -> Option<&mut FaceObservation> {
        self.slots.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ObservationId> {
        (0..self.slots.len()).map(ObservationId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObservationId, &FaceObservation)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, obs)| (ObservationId(i), obs))
    }
}

impl Index<ObservationId> for ObservationStore {
    type Output = FaceObservation;

    fn index(&self, id: ObservationId) -> &FaceObservation {
        &self.slots[id.0]
    }
}

impl IndexMut<ObservationId> for ObservationStore {
    fn index_mut(&mut self, id: ObservationId) -> &mut FaceObservation {
        &mut self.slots[id.0]
    }
}
