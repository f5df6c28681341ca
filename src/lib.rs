//! Semantic segmentation overlay node for ROS 2 image streams.

pub mod bridge;
pub mod capture;
pub mod config;
pub mod node;
pub mod output;
pub mod ros;
pub mod segmentation;

pub use node::{run_node, FrameError, OverlayOptions, SegmentationNode};
