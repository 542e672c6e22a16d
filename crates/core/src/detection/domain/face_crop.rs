use crate::detection::domain::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// Square crop centered on the region, sized by its larger side and clamped
/// to frame bounds.
///
/// The crop keeps the source frame's index so thumbnails can be traced back
/// to the frame they came from.
pub fn square_crop(frame: &Frame, region: &FaceRegion) -> Frame {
    let cx = region.x + region.width / 2;
    let cy = region.y + region.height / 2;
    let half = region.width.max(region.height) / 2;
    frame.crop(cx - half, cy - half, half * 2, half * 2)
}
