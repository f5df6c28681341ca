use super::OutputSink;
use crate::bridge::Image;
use anyhow::{anyhow, Result};
use ros2_client::Publisher;

/// Annotated frames published on a ROS 2 topic
pub struct TopicSink {
    publisher: Publisher<Image>,
}

impl TopicSink {
    pub fn new(publisher: Publisher<Image>) -> Self {
        Self { publisher }
    }
}

impl OutputSink for TopicSink {
    fn write_frame(&mut self, frame: &Image) -> Result<()> {
        self.publisher
            .publish(frame.clone())
            .map_err(|e| anyhow!("Failed to publish image: {:?}", e))
    }
}
