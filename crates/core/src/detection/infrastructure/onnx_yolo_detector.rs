//! YOLO face detector using ONNX Runtime via `ort`.
//!
//! Letterbox preprocessing, inference, then NMS over the decoded boxes. Boxes
//! come back in source-frame pixels with a top-left origin.

use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_region::FaceRegion;
use crate::shared::frame::Frame;

use super::math::non_max_suppression;
use super::onnx_session::{declared_input_size, open_session};

/// Input resolution used when the model's shape is dynamic.
const DEFAULT_INPUT_SIZE: u32 = 640;

pub const DEFAULT_CONFIDENCE: f32 = 0.25;

const NMS_IOU_THRESH: f64 = 0.45;

/// Letterbox fill, YOLO convention.
const PAD_VALUE: f32 = 114.0 / 255.0;

pub struct OnnxYoloDetector {
    session: ort::session::Session,
    confidence: f32,
    input_size: u32,
}

impl OnnxYoloDetector {
    pub fn new(model_path: &Path, confidence: f32) -> Result<Self, Box<dyn std::error::Error>> {
        let session = open_session(model_path)?;
        let input_size = declared_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);
        log::debug!("YOLO input size {input_size}, confidence {confidence}");
        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
        if !frame.is_decodable() {
            return Err("frame has no pixels".into());
        }
        let (input, geometry) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or("YOLO output is not contiguous")?;

        let candidates = decode_predictions(data, &shape, self.confidence, &geometry)?;
        let boxes: Vec<([f64; 4], f64)> = candidates
            .iter()
            .map(|c| (c.corners, c.confidence as f64))
            .collect();

        Ok(non_max_suppression(&boxes, NMS_IOU_THRESH)
            .into_iter()
            .map(|i| candidates[i].to_region())
            .collect())
    }
}

/// Mapping from letterboxed model input back to source pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    scale: f64,
    pad_x: f64,
    pad_y: f64,
}

impl Letterbox {
    fn to_source(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    corners: [f64; 4],
    confidence: f32,
}

impl Candidate {
    fn to_region(&self) -> FaceRegion {
        let [x1, y1, x2, y2] = self.corners;
        FaceRegion::new(
            x1.round() as i32,
            y1.round() as i32,
            (x2 - x1).round() as i32,
            (y2 - y1).round() as i32,
            self.confidence,
        )
    }
}

/// Nearest-neighbor resize into a gray-padded `target × target` NCHW tensor
/// normalized to `[0, 1]`.
fn letterbox(frame: &Frame, target: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let src_w = frame.width() as usize;
    let src_h = frame.height() as usize;
    let scale = (target as f64 / src_w as f64).min(target as f64 / src_h as f64);
    let new_w = ((src_w as f64 * scale).round() as usize).min(target as usize);
    let new_h = ((src_h as f64 * scale).round() as usize).min(target as usize);
    let pad_x = (target as usize - new_w) / 2;
    let pad_y = (target as usize - new_h) / 2;

    let side = target as usize;
    let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, side, side), PAD_VALUE);
    let src = frame.as_ndarray();
    for y in 0..new_h {
        let sy = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w {
            let sx = ((x as f64 / scale) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, pad_y + y, pad_x + x]] = src[[sy, sx, c]] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x: pad_x as f64,
            pad_y: pad_y as f64,
        },
    )
}

/// Reads `[cx, cy, w, h, conf, ...]` rows from a `[1, features, detections]`
/// or `[1, detections, features]` output, keeping rows at or above
/// `confidence`.
fn decode_predictions(
    data: &[f32],
    shape: &[usize],
    confidence: f32,
    geometry: &Letterbox,
) -> Result<Vec<Candidate>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    // Features are always the shorter axis.
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 {
        return Ok(Vec::new());
    }
    let value = |det: usize, feat: usize| -> f32 {
        if transposed {
            data[feat * num_dets + det]
        } else {
            data[det * num_feats + feat]
        }
    };

    let mut out = Vec::new();
    for det in 0..num_dets {
        let conf = value(det, 4);
        if conf < confidence {
            continue;
        }
        let (cx, cy) = (value(det, 0) as f64, value(det, 1) as f64);
        let (w, h) = (value(det, 2) as f64, value(det, 3) as f64);
        let (x1, y1) = geometry.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = geometry.to_source(cx + w / 2.0, cy + h / 2.0);
        out.push(Candidate {
            corners: [x1, y1, x2, y2],
            confidence: conf,
        });
    }
    Ok(out)
}
