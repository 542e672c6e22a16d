use std::path::PathBuf;

use crate::shared::frame::Frame;

/// A media item handed to the detection pipeline.
///
/// Bursts arrive already decoded; GIFs are decoded to their constituent
/// frames when the run starts; video frames are decoded on demand by
/// timestamp and never materialized as a whole.
#[derive(Clone, Debug)]
pub enum MediaSource {
    StillImage(Frame),
    VideoFile(PathBuf),
    LivePhotoBurst(Vec<Frame>),
    AnimatedGif(PathBuf),
}

impl MediaSource {
    pub fn kind(&self) -> &'static str {
        match self {
            MediaSource::StillImage(_) => "image",
            MediaSource::VideoFile(_) => "video",
            MediaSource::LivePhotoBurst(_) => "burst",
            MediaSource::AnimatedGif(_) => "gif",
        }
    }
}
