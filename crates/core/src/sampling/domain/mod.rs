pub mod adaptive_frame_sampler;
pub mod clock;
pub mod processing_budget;
pub mod stride_sampler;
