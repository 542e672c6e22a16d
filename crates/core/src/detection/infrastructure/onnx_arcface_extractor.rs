//! ArcFace embedding extractor using ONNX Runtime.
//!
//! Crops are resized to the model's 112×112 input, normalized to `[-1, 1]`,
//! and the output vector is L2-normalized so cosine distance reduces to
//! `1 − dot`.

use std::path::Path;

use crate::detection::domain::embedding_extractor::EmbeddingExtractor;
use crate::identity::domain::embedding::{l2_normalize, EmbeddingVector};
use crate::shared::frame::Frame;

use super::onnx_session::open_session;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxArcFaceExtractor {
    session: ort::session::Session,
}

impl OnnxArcFaceExtractor {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            session: open_session(model_path)?,
        })
    }
}

impl EmbeddingExtractor for OnnxArcFaceExtractor {
    fn extract(&mut self, crop: &Frame) -> Result<EmbeddingVector, Box<dyn std::error::Error>> {
        if !crop.is_decodable() || crop.channels() != 3 {
            return Err(format!(
                "crop is not an RGB image ({}x{}x{})",
                crop.width(),
                crop.height(),
                crop.channels()
            )
            .into());
        }
        let input = ort::value::Tensor::from_array(preprocess(crop))?;
        let outputs = self.session.run(ort::inputs![input])?;
        if outputs.len() == 0 {
            return Err("ArcFace model produced no outputs".into());
        }
        let array = outputs[0].try_extract_array::<f32>()?;
        let mut values = array
            .as_slice()
            .ok_or("ArcFace output is not contiguous")?
            .to_vec();
        l2_normalize(&mut values);
        Ok(EmbeddingVector::new(values))
    }
}

/// Pixel-center sampling into a normalized `[1, 3, 112, 112]` tensor.
fn preprocess(crop: &Frame) -> ndarray::Array4<f32> {
    let src = crop.as_ndarray();
    let src_w = crop.width() as usize;
    let src_h = crop.height() as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    for y in 0..INPUT_SIZE {
        let sy = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let sx = (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (src[[sy, sx, c]] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn crop(value: u8, w: u32, h: u32) -> Frame {
        Frame::new(vec![value; (w * h * 3) as usize], w, h, 3, 0)
    }

    #[test]
    fn test_preprocess_shape() {
        assert_eq!(preprocess(&crop(128, 50, 30)).shape(), &[1, 3, 112, 112]);
    }

    #[rstest]
    #[case::black(0, -1.0)]
    #[case::mid(127, (127.0 - 127.5) / 127.5)]
    #[case::white(255, 1.0)]
    fn test_preprocess_normalization(#[case] value: u8, #[case] expected: f32) {
        let tensor = preprocess(&crop(value, 10, 10));
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 0.01);
        assert!((tensor[[0, 2, 111, 111]] - expected).abs() < 0.01);
    }

    #[test]
    fn test_preprocess_keeps_channel_order() {
        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend_from_slice(&[255, 0, 128]);
        }
        let tensor = preprocess(&Frame::new(data, 2, 2, 3, 0));
        assert!((tensor[[0, 0, 5, 5]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 1, 5, 5]] + 1.0).abs() < 0.01);
    }
}
