pub mod detection_logger;
pub mod detection_pipeline;
pub mod detection_report;
pub mod infrastructure;
pub mod pipeline_config;
pub mod pipeline_error;
