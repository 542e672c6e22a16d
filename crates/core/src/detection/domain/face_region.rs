use crate::shared::bounding_box::BoundingBox;

/// A detected face in pixel coordinates of the frame it came from.
///
/// Origin is top-left; `(x, y)` may lie outside the frame when a detector
/// reports a face cut by the border.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
}

impl FaceRegion {
    pub fn new(x: i32, y: i32, width: i32, height: i32, confidence: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
        }
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    /// Normalized bounds relative to a frame of the given size.
    pub fn to_bounding_box(&self, frame_width: u32, frame_height: u32) -> BoundingBox {
        BoundingBox::from_pixel_rect(
            self.x,
            self.y,
            self.width,
            self.height,
            frame_width,
            frame_height,
        )
    }
}
