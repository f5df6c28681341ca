use anyhow::Result;

use crate::bridge::BgrImage;

/// Per-pixel class indices, row-major, at the model's resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelMap {
    width: u32,
    height: u32,
    classes: Vec<usize>,
}

impl LabelMap {
    /// Returns `None` if `classes` does not hold exactly `width * height` entries.
    pub fn new(width: u32, height: u32, classes: Vec<usize>) -> Option<Self> {
        if classes.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            classes,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.classes
    }
}

/// Memory layout of the model's input and output tensors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TensorLayout {
    /// `[batch, height, width, channels]`
    #[default]
    Nhwc,
    /// `[batch, channels, height, width]`
    Nchw,
}

impl TensorLayout {
    /// Pick (height, width, channels) out of a rank-4 shape.
    pub fn split(self, shape: &[i64]) -> Option<(i64, i64, i64)> {
        if shape.len() != 4 {
            return None;
        }
        Some(match self {
            Self::Nhwc => (shape[1], shape[2], shape[3]),
            Self::Nchw => (shape[2], shape[3], shape[1]),
        })
    }
}

/// Trait for segmentation models
/// Allows the node to run against any backend that yields a class map
pub trait SegmentationModel {
    /// Run one forward pass and return the arg-max class per pixel
    ///
    /// # Arguments
    /// * `frame` - BGR frame, already resized to `input_size()`
    ///
    /// # Returns
    /// * Label map with the model's output resolution
    fn segment(&mut self, frame: &BgrImage) -> Result<LabelMap>;

    /// Get the model's expected input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);

    /// Number of output classes, if the model declares it statically
    fn num_classes(&self) -> Option<usize> {
        None
    }
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for Box<M> {
    fn segment(&mut self, frame: &BgrImage) -> Result<LabelMap> {
        (**self).segment(frame)
    }

    fn input_size(&self) -> (u32, u32) {
        (**self).input_size()
    }

    fn num_classes(&self) -> Option<usize> {
        (**self).num_classes()
    }
}
