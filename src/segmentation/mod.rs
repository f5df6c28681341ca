mod composite;
mod labels;
mod onnx;
mod preprocess;
pub mod types;

pub use composite::{blend_in_place, composite};
pub use labels::{LabelError, LabelSource, LabelTable};
pub use onnx::{OnnxOptions, OnnxSegmenter};
pub use preprocess::Preprocessor;
pub use types::{LabelMap, SegmentationModel, TensorLayout};

use anyhow::Result;
use std::path::Path;

/// Create the default segmentation model (ONNX Runtime)
pub fn create_default_model<P: AsRef<Path>>(
    model_path: P,
    options: &OnnxOptions,
) -> Result<Box<dyn SegmentationModel>> {
    let model = OnnxSegmenter::new(model_path, options)?;
    Ok(Box::new(model))
}
