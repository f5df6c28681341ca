mod ros_topic;
#[cfg(feature = "webcam")]
mod v4l_capture;

pub use ros_topic::TopicSource;
#[cfg(feature = "webcam")]
pub use v4l_capture::WebcamCapture;

use crate::bridge::Image;
use anyhow::Result;
use std::time::Duration;

/// Trait for inbound image streams
pub trait FrameSource {
    /// Wait up to `timeout` for the next image message
    ///
    /// Returns `Ok(None)` when nothing arrived in time, so the caller can
    /// check for shutdown between frames.
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Image>>;
}
