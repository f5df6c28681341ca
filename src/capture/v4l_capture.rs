use super::FrameSource;
use crate::bridge::{self, Header, Image, Time};
use anyhow::{Context, Result};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Local webcam standing in for the camera topic
pub struct WebcamCapture {
    camera: Camera,
    frame_id: String,
}

impl WebcamCapture {
    pub fn new(device_index: u32) -> Result<Self> {
        tracing::info!("Initializing webcam {}", device_index);

        let index = CameraIndex::Index(device_index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = Camera::new(index, requested).context("Failed to open camera")?;

        camera
            .open_stream()
            .context("Failed to open camera stream")?;

        let resolution = camera.resolution();
        tracing::info!(
            "Webcam initialized at {}x{}",
            resolution.width(),
            resolution.height()
        );

        Ok(Self {
            camera,
            frame_id: format!("webcam{}", device_index),
        })
    }
}

impl FrameSource for WebcamCapture {
    // Capture blocks until the camera delivers, so the timeout is not used.
    fn next_frame(&mut self, _timeout: Duration) -> Result<Option<Image>> {
        let frame = self.camera.frame().context("Failed to capture frame")?;

        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let header = Header {
            stamp: Time {
                sec: now.as_secs() as i32,
                nanosec: now.subsec_nanos(),
            },
            frame_id: self.frame_id.clone(),
        };

        let (width, height) = decoded.dimensions();
        Ok(Some(bridge::rgb8_imgmsg(width, height, decoded.into_raw(), header)))
    }
}
