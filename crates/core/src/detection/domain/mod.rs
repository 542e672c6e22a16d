pub mod detection_error;
pub mod embedding_extractor;
pub mod face_crop;
pub mod face_detector;
pub mod face_region;
