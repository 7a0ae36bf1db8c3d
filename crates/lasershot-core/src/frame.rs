//! Camera frames as delivered by the capture subsystem.

use chrono::{DateTime, Utc};

use crate::{RgbImage, RgbImageView};

/// One captured frame. `index` increases monotonically within a capture run.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RgbImage,
    pub index: u64,
    pub timestamp: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            image,
            index,
            timestamp,
        }
    }

    pub fn view(&self) -> RgbImageView<'_> {
        self.image.view()
    }
}

/// Source of successive frames (camera, video file, test fixture).
pub trait FrameSource {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<Frame>;
}

impl<I> FrameSource for I
where
    I: Iterator<Item = Frame>,
{
    fn next_frame(&mut self) -> Option<Frame> {
        self.next()
    }
}
