use serde::{Deserialize, Serialize};

/// `builtin_interfaces/msg/Time`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    pub sec: i32,
    pub nanosec: u32,
}

/// `std_msgs/msg/Header`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

/// `sensor_msgs/msg/Image`
///
/// Field order matches the ROS definition so the CDR layout lines up with
/// other nodes on the graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: u8,
    /// Full row length in bytes
    pub step: u32,
    pub data: Vec<u8>,
}

impl ros2_client::Message for Image {}

impl Image {
    pub const PACKAGE: &'static str = "sensor_msgs";
    pub const TYPE_NAME: &'static str = "Image";
}
