/// Evenly spaced indices for examining at most `max_images` of `frame_count`
/// frames.
///
/// Returns `k = min(max_images, frame_count)` strictly increasing indices
/// `i * frame_count / k`, starting at 0. A `max_images` of 0 is treated as 1.
pub fn stride_indices(frame_count: usize, max_images: usize) -> Vec<usize> {
    if frame_count == 0 {
        return Vec::new();
    }
    let k = max_images.max(1).min(frame_count);
    (0..k).map(|i| i * frame_count / k).collect()
}
