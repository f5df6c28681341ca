#[cfg(feature = "loopback")]
mod loopback;
mod ros_topic;
#[cfg(any(test, feature = "loopback"))]
mod yuyv;

#[cfg(feature = "loopback")]
pub use loopback::V4L2Output;
pub use ros_topic::TopicSink;

use crate::bridge::Image;
use anyhow::Result;

/// Trait for output destinations
pub trait OutputSink {
    /// Publish one annotated frame
    fn write_frame(&mut self, frame: &Image) -> Result<()>;
}
