use super::yuyv::rgb_to_yuyv;
use super::OutputSink;
use crate::bridge::{self, Image};
use crate::segmentation::Preprocessor;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

/// v4l2loopback device standing in for the output topic
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // Announce the frame format before writing raw frames
        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let format = Output::set_format(&device, &Format::new(width, height, FourCC::new(b"YUYV")))
            .context("Failed to set YUYV output format")?;
        tracing::debug!("v4l2loopback format: {}", format);

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
        })
    }
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &Image) -> Result<()> {
        let bgr = bridge::imgmsg_to_bgr(frame).context("Failed to decode output frame")?;
        let mut rgb = Preprocessor::fit(bgr, self.width, self.height);
        bridge::swap_channels(&mut rgb);

        let yuyv_data = rgb_to_yuyv(rgb.as_raw(), self.width, self.height);

        // Write directly to the device file
        self.file
            .write_all(&yuyv_data)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }
}
