use super::preprocess::Preprocessor;
use super::types::{LabelMap, SegmentationModel, TensorLayout};
use crate::bridge::BgrImage;
use anyhow::{anyhow, bail, Context, Result};
use ort::execution_providers::{ArenaExtendStrategy, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use std::path::Path;

/// Settings for building the inference session
#[derive(Clone, Debug)]
pub struct OnnxOptions {
    pub layout: TensorLayout,
    /// Multiplier applied to raw 0-255 pixel values
    pub input_scale: f32,
    /// Used when the model declares dynamic spatial dimensions
    pub fallback_size: (u32, u32),
    pub intra_threads: usize,
    pub use_cuda: bool,
}

impl Default for OnnxOptions {
    fn default() -> Self {
        Self {
            layout: TensorLayout::Nhwc,
            input_scale: 1.0,
            fallback_size: (480, 320),
            intra_threads: 4,
            use_cuda: true,
        }
    }
}

/// Semantic segmentation network served by ONNX Runtime
///
/// The session is built once and owned here; every forward pass goes through
/// this instance, so weights can never be swapped underneath a caller.
pub struct OnnxSegmenter {
    session: Session,
    preprocessor: Preprocessor,
    layout: TensorLayout,
    width: u32,
    height: u32,
    num_classes: Option<usize>,
}

impl OnnxSegmenter {
    /// Load an ONNX segmentation model
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX file (graph and weights)
    /// * `options` - Layout, scaling and execution provider settings
    ///
    /// CUDA memory is grown on demand (`SameAsRequested`) rather than
    /// reserving a large arena, so the node can share a GPU with other
    /// processes. Falls back to CPU when CUDA is unavailable.
    pub fn new<P: AsRef<Path>>(model_path: P, options: &OnnxOptions) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading segmentation model from {}", path.display());

        if !path.is_file() {
            bail!("Model file {} does not exist", path.display());
        }

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(options.intra_threads)?;

        if options.use_cuda {
            builder = builder.with_execution_providers([CUDAExecutionProvider::default()
                .with_arena_extend_strategy(ArenaExtendStrategy::SameAsRequested)
                .build()])?;
        }

        let session = builder
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| anyhow!("Model has no inputs"))?;
        let input_shape = declared_shape(&input.input_type)
            .ok_or_else(|| anyhow!("Model input '{}' is not a tensor", input.name))?;
        let (width, height) =
            declared_input_size(&input_shape, options.layout, options.fallback_size)
                .with_context(|| format!("Model input '{}' does not fit the layout", input.name))?;
        tracing::info!("Model input '{}': {}x{} ({:?})", input.name, width, height, options.layout);

        let num_classes = session
            .outputs
            .first()
            .and_then(|output| declared_shape(&output.output_type))
            .and_then(|shape| declared_classes(&shape, options.layout));
        match num_classes {
            Some(c) => tracing::info!("Model declares {} output classes", c),
            None => tracing::debug!("Model output class count is dynamic"),
        }

        let preprocessor = Preprocessor::new(width, height, options.layout, options.input_scale);

        Ok(Self {
            session,
            preprocessor,
            layout: options.layout,
            width,
            height,
            num_classes,
        })
    }
}

fn declared_shape(value_type: &ValueType) -> Option<Vec<i64>> {
    match value_type {
        ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect()),
        _ => None,
    }
}

fn static_dim(dim: i64) -> Option<u32> {
    u32::try_from(dim).ok().filter(|&d| d > 0)
}

/// (width, height) the model expects, from its declared rank-4 input shape
///
/// Dynamic spatial dims fall back to `fallback`. A static channel count
/// other than 3 means the layout does not match the model.
fn declared_input_size(
    shape: &[i64],
    layout: TensorLayout,
    fallback: (u32, u32),
) -> Result<(u32, u32)> {
    let Some((height, width, channels)) = layout.split(shape) else {
        bail!("expected a rank-4 input, got shape {:?}", shape);
    };
    if let Some(channels) = static_dim(channels) {
        if channels != 3 {
            bail!(
                "input shape {:?} has {} channels under {:?} layout, expected 3",
                shape,
                channels,
                layout
            );
        }
    }

    match (static_dim(width), static_dim(height)) {
        (Some(width), Some(height)) => Ok((width, height)),
        _ => {
            tracing::debug!("Input shape {:?} is dynamic, using {:?}", shape, fallback);
            Ok(fallback)
        }
    }
}

/// Class count from the declared output shape, when static
fn declared_classes(shape: &[i64], layout: TensorLayout) -> Option<usize> {
    let (_, _, classes) = layout.split(shape)?;
    static_dim(classes).map(|c| c as usize)
}

impl SegmentationModel for OnnxSegmenter {
    fn segment(&mut self, frame: &BgrImage) -> Result<LabelMap> {
        let _span = tracing::debug_span!("onnx_segment").entered();

        let (shape, data) = self.preprocessor.preprocess(frame);
        let input = Tensor::from_array((shape, data)).context("Failed to build input tensor")?;

        // Run inference
        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![input])
            .context("Failed to run inference")?;
        drop(_infer_span);

        let (out_shape, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to read class scores")?;
        let out_shape: Vec<i64> = out_shape.iter().copied().collect();

        let map = self.preprocessor.postprocess_scores(&out_shape, scores)?;
        tracing::trace!("Class map {:?} from {:?} output", map.dimensions(), self.layout);
        Ok(map)
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn num_classes(&self) -> Option<usize> {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FALLBACK: (u32, u32) = (480, 320);

    #[test]
    fn test_static_input_size() {
        let size = declared_input_size(&[1, 320, 480, 3], TensorLayout::Nhwc, (64, 64));
        let size = size.unwrap();
        assert_eq!(size, (480, 320));

        let size = declared_input_size(&[1, 3, 256, 512], TensorLayout::Nchw, FALLBACK).unwrap();
        assert_eq!(size, (512, 256));
    }

    #[test]
    fn test_dynamic_input_uses_fallback() {
        let size = declared_input_size(&[-1, -1, -1, 3], TensorLayout::Nhwc, FALLBACK).unwrap();
        assert_eq!(size, FALLBACK);

        // dynamic channels are trusted
        let size = declared_input_size(&[1, -1, 240, 360], TensorLayout::Nchw, FALLBACK).unwrap();
        assert_eq!(size, (360, 240));
    }

    #[test]
    fn test_layout_mismatch_is_rejected() {
        // NHWC model run with --layout nchw
        assert!(declared_input_size(&[1, 320, 480, 3], TensorLayout::Nchw, FALLBACK).is_err());
        // NCHW export run with the default layout
        assert!(declared_input_size(&[1, 3, 320, 480], TensorLayout::Nhwc, FALLBACK).is_err());
        assert!(declared_input_size(&[1, 320, 480], TensorLayout::Nhwc, FALLBACK).is_err());
    }

    #[test]
    fn test_declared_classes() {
        assert_eq!(declared_classes(&[1, 320, 480, 12], TensorLayout::Nhwc), Some(12));
        assert_eq!(declared_classes(&[1, 12, 320, 480], TensorLayout::Nchw), Some(12));
        assert_eq!(declared_classes(&[1, 320, 480, -1], TensorLayout::Nhwc), None);
        assert_eq!(declared_classes(&[1, 12], TensorLayout::Nhwc), None);
    }
}
