pub mod deduplicator;
pub mod embedding;
pub mod face_observation;
pub mod face_session;
pub mod observation_store;
