use super::FrameSource;
use crate::bridge::Image;
use anyhow::Result;
use ros2_client::Subscription;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Image messages taken from a ROS 2 topic subscription
pub struct TopicSource {
    subscription: Subscription<Image>,
}

impl TopicSource {
    pub fn new(subscription: Subscription<Image>) -> Self {
        Self { subscription }
    }
}

impl FrameSource for TopicSource {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Image>> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.subscription.take() {
                Ok(Some((msg, _info))) => return Ok(Some(msg)),
                Ok(None) => {}
                // A sample that fails to deserialize is dropped like any
                // other bad frame.
                Err(e) => {
                    tracing::warn!("Failed to take image message: {:?}", e);
                    return Ok(None);
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}
