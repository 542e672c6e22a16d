pub mod bounding_box;
pub mod constants;
pub mod frame;
pub mod media_source;
pub mod video_metadata;
