pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Per-frame cost assumed when the calibration probe cannot be timed.
pub const FALLBACK_FRAME_COST_MS: f64 = 720.0;

/// Frames examined from a burst or GIF.
pub const DEFAULT_MAX_IMAGES: usize = 5;

/// Wall-clock allowance for sampling a video.
pub const DEFAULT_MAX_DURATION_MS: u64 = 5000;

/// Detector confidence below which a face is too poor to keep.
pub const DEFAULT_MIN_FACE_CONFIDENCE: f32 = 0.22;

/// Consecutive undecodable timestamps after which a video walk ends.
pub const MAX_CONSECUTIVE_DECODE_FAILURES: usize = 8;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const GIF_EXTENSIONS: &[&str] = &["gif"];
