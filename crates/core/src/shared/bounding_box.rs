use serde::Serialize;

/// Face rectangle normalized to `[0, 1]` of the source dimensions.
///
/// Origin is the top-left corner with `y` growing downward, the same
/// convention as [`Frame`](crate::shared::frame::Frame) rows. Every stage of
/// the pipeline (detection, cropping, reporting) uses this convention; adapters
/// whose native rectangles are bottom-left based convert on the way in with
/// [`BoundingBox::from_bottom_left`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Normalizes a pixel rectangle, clamping it to the frame first.
    pub fn from_pixel_rect(
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        frame_width: u32,
        frame_height: u32,
    ) -> Self {
        if frame_width == 0 || frame_height == 0 {
            return Self::default();
        }
        let fw = frame_width as i32;
        let fh = frame_height as i32;
        let x1 = x.clamp(0, fw);
        let y1 = y.clamp(0, fh);
        let x2 = (x + width).clamp(x1, fw);
        let y2 = (y + height).clamp(y1, fh);
        Self {
            x: x1 as f32 / fw as f32,
            y: y1 as f32 / fh as f32,
            width: (x2 - x1) as f32 / fw as f32,
            height: (y2 - y1) as f32 / fh as f32,
        }
    }

    /// Converts a normalized rectangle whose origin is bottom-left.
    pub fn from_bottom_left(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y: 1.0 - (y + height),
            width,
            height,
        }
    }

    /// Pixel rectangle `(x, y, width, height)` in a frame of the given size.
    pub fn to_pixel_rect(&self, frame_width: u32, frame_height: u32) -> (i32, i32, i32, i32) {
        let fw = frame_width as f32;
        let fh = frame_height as f32;
        (
            (self.x * fw).round() as i32,
            (self.y * fh).round() as i32,
            (self.width * fw).round() as i32,
            (self.height * fh).round() as i32,
        )
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        }
    }
}
