//! ROS 2 node and topic endpoints over DDS.

use anyhow::{anyhow, Result};
use ros2_client::{Context, MessageTypeName, Name, Node, NodeName, NodeOptions, Publisher, Subscription};
use rustdds::{policy, QosPolicies, QosPolicyBuilder};

use crate::bridge::Image;

/// Camera streams: drop stale frames rather than block the sender.
fn sensor_qos() -> QosPolicies {
    QosPolicyBuilder::new()
        .durability(policy::Durability::Volatile)
        .reliability(policy::Reliability::BestEffort)
        .history(policy::History::KeepLast { depth: 1 })
        .build()
}

/// Annotated output: reliable so default-QoS subscribers (rviz, bag) match.
fn output_qos() -> QosPolicies {
    QosPolicyBuilder::new()
        .durability(policy::Durability::Volatile)
        .reliability(policy::Reliability::Reliable {
            max_blocking_time: rustdds::Duration::from_millis(100),
        })
        .history(policy::History::KeepLast { depth: 1 })
        .build()
}

/// Node name, with the process id appended when `anonymous` is set.
pub fn node_name(base: &str, anonymous: bool) -> String {
    if anonymous {
        format!("{}_{}", base, std::process::id())
    } else {
        base.to_string()
    }
}

/// Make a topic name absolute (`seg_img` -> `/seg_img`).
pub fn absolute_topic(topic: &str) -> String {
    if topic.starts_with('/') {
        topic.to_string()
    } else {
        format!("/{}", topic)
    }
}

pub struct RosNode {
    // keeps the DDS participant alive for the endpoints
    _context: Context,
    node: Node,
}

impl RosNode {
    pub fn new(name: &str) -> Result<Self> {
        tracing::info!("Registering ROS 2 node '{}'", name);

        let context = Context::new().map_err(|e| anyhow!("Failed to create ROS 2 context: {:?}", e))?;
        let node_name =
            NodeName::new("/", name).map_err(|e| anyhow!("Invalid node name '{}': {:?}", name, e))?;
        let node = context
            .new_node(node_name, NodeOptions::new())
            .map_err(|e| anyhow!("Failed to create ROS 2 node: {:?}", e))?;

        tracing::info!(
            "ROS_DOMAIN_ID: {}",
            std::env::var("ROS_DOMAIN_ID").unwrap_or_else(|_| "0".to_string())
        );

        Ok(Self {
            _context: context,
            node,
        })
    }

    pub fn subscribe(&mut self, topic: &str) -> Result<Subscription<Image>> {
        let topic = absolute_topic(topic);
        let qos = sensor_qos();
        let name = Name::parse(&topic).map_err(|e| anyhow!("Invalid topic '{}': {:?}", topic, e))?;
        let dds_topic = self
            .node
            .create_topic(&name, image_type(), &qos)
            .map_err(|e| anyhow!("Failed to create topic {}: {:?}", topic, e))?;
        let subscription = self
            .node
            .create_subscription::<Image>(&dds_topic, Some(qos))
            .map_err(|e| anyhow!("Failed to subscribe to {}: {:?}", topic, e))?;

        tracing::info!("Subscribed to {}", topic);
        Ok(subscription)
    }

    pub fn advertise(&mut self, topic: &str) -> Result<Publisher<Image>> {
        let topic = absolute_topic(topic);
        let qos = output_qos();
        let name = Name::parse(&topic).map_err(|e| anyhow!("Invalid topic '{}': {:?}", topic, e))?;
        let dds_topic = self
            .node
            .create_topic(&name, image_type(), &qos)
            .map_err(|e| anyhow!("Failed to create topic {}: {:?}", topic, e))?;
        let publisher = self
            .node
            .create_publisher::<Image>(&dds_topic, Some(qos))
            .map_err(|e| anyhow!("Failed to advertise {}: {:?}", topic, e))?;

        tracing::info!("Publishing on {}", topic);
        Ok(publisher)
    }
}

fn image_type() -> MessageTypeName {
    MessageTypeName::new(Image::PACKAGE, Image::TYPE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        assert_eq!(absolute_topic("seg_img"), "/seg_img");
        assert_eq!(
            absolute_topic("/pointgrey_cam/image_rect_color"),
            "/pointgrey_cam/image_rect_color"
        );
    }

    #[test]
    fn test_anonymous_node_name() {
        assert_eq!(node_name("seg_inference_engine", false), "seg_inference_engine");
        let anon = node_name("seg_inference_engine", true);
        assert!(anon.starts_with("seg_inference_engine_"));
        assert!(anon.len() > "seg_inference_engine_".len());
    }
}
