pub mod math;
pub mod model_resolver;
pub mod onnx_arcface_extractor;
pub mod onnx_session;
pub mod onnx_yolo_detector;
