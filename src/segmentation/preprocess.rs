use std::borrow::Cow;

use anyhow::{bail, Result};
use image::imageops::{self, FilterType};
use ndarray::{ArrayView3, Axis};

use super::types::{LabelMap, TensorLayout};
use crate::bridge::BgrImage;

/// Converts frames to model input tensors and score volumes back to class maps
#[derive(Clone, Debug)]
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
    layout: TensorLayout,
    scale: f32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32, layout: TensorLayout, scale: f32) -> Self {
        Self {
            target_width,
            target_height,
            layout,
            scale,
        }
    }

    /// Resize with bilinear filtering. Borrows the input when already sized.
    pub fn resize(image: &BgrImage, width: u32, height: u32) -> Cow<'_, BgrImage> {
        if image.dimensions() == (width, height) {
            Cow::Borrowed(image)
        } else {
            Cow::Owned(imageops::resize(image, width, height, FilterType::Triangle))
        }
    }

    /// Owned variant of [`Preprocessor::resize`]: a sized frame is passed through
    pub fn fit(image: BgrImage, width: u32, height: u32) -> BgrImage {
        if image.dimensions() == (width, height) {
            image
        } else {
            imageops::resize(&image, width, height, FilterType::Triangle)
        }
    }

    /// Build a single-element batch from a BGR frame
    ///
    /// Pixel values keep their BGR order and are multiplied by `scale`.
    ///
    /// Returns: tensor shape and flat data in the configured layout
    pub fn preprocess(&self, image: &BgrImage) -> ([usize; 4], Vec<f32>) {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = Self::resize(image, self.target_width, self.target_height);
        let (width, height) = resized.dimensions();
        let (w, h) = (width as usize, height as usize);

        match self.layout {
            TensorLayout::Nhwc => {
                let data = resized
                    .as_raw()
                    .iter()
                    .map(|&v| v as f32 * self.scale)
                    .collect();
                ([1, h, w, 3], data)
            }
            TensorLayout::Nchw => {
                let mut data = vec![0.0f32; 3 * h * w];
                for (x, y, pixel) in resized.enumerate_pixels() {
                    let offset = y as usize * w + x as usize;
                    for c in 0..3 {
                        data[c * h * w + offset] = pixel[c] as f32 * self.scale;
                    }
                }
                ([1, 3, h, w], data)
            }
        }
    }

    /// Reduce a `[1, ..]` class-score volume to the arg-max class per pixel
    ///
    /// Ties resolve to the lowest class index.
    pub fn postprocess_scores(&self, shape: &[i64], scores: &[f32]) -> Result<LabelMap> {
        let _span = tracing::debug_span!("postprocess").entered();

        if shape.first() != Some(&1) {
            bail!("expected a single-element batch, got output shape {:?}", shape);
        }
        let Some((height, width, classes)) = self.layout.split(shape) else {
            bail!("expected a rank-4 output, got shape {:?}", shape);
        };
        if height <= 0 || width <= 0 || classes <= 0 {
            bail!("output shape {:?} has an empty dimension", shape);
        }
        let (height, width, classes) = (height as usize, width as usize, classes as usize);

        let (volume, class_axis) = match self.layout {
            TensorLayout::Nhwc => (ArrayView3::from_shape((height, width, classes), scores)?, Axis(2)),
            TensorLayout::Nchw => (ArrayView3::from_shape((classes, height, width), scores)?, Axis(0)),
        };

        let argmax = volume.map_axis(class_axis, |lane| {
            let mut best = 0;
            let mut best_score = f32::NEG_INFINITY;
            for (class, &score) in lane.iter().enumerate() {
                if score > best_score {
                    best = class;
                    best_score = score;
                }
            }
            best
        });

        let classes: Vec<usize> = argmax.iter().copied().collect();
        match LabelMap::new(width as u32, height as u32, classes) {
            Some(map) => Ok(map),
            None => bail!("class map does not match {}x{}", width, height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> BgrImage {
        // 2x1: (B,G,R) = (1,2,3), (4,5,6)
        BgrImage::from_raw(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap()
    }

    #[test]
    fn test_nhwc_tensor_keeps_raw_bgr() {
        let pre = Preprocessor::new(2, 1, TensorLayout::Nhwc, 1.0);
        let (shape, data) = pre.preprocess(&frame());
        assert_eq!(shape, [1, 1, 2, 3]);
        assert_eq!(data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_nchw_tensor_is_planar_and_scaled() {
        let pre = Preprocessor::new(2, 1, TensorLayout::Nchw, 0.5);
        let (shape, data) = pre.preprocess(&frame());
        assert_eq!(shape, [1, 3, 1, 2]);
        assert_eq!(data, vec![0.5, 2.0, 1.0, 2.5, 1.5, 3.0]);
    }

    #[test]
    fn test_preprocess_resizes_to_target() {
        let pre = Preprocessor::new(4, 3, TensorLayout::Nhwc, 1.0);
        let (shape, data) = pre.preprocess(&frame());
        assert_eq!(shape, [1, 3, 4, 3]);
        assert_eq!(data.len(), 36);
    }

    #[test]
    fn test_sized_frame_is_not_copied() {
        let image = frame();
        assert!(matches!(Preprocessor::resize(&image, 2, 1), Cow::Borrowed(_)));
        assert!(matches!(Preprocessor::resize(&image, 4, 2), Cow::Owned(_)));

        let ptr = image.as_raw().as_ptr();
        let fitted = Preprocessor::fit(image, 2, 1);
        assert_eq!(fitted.as_raw().as_ptr(), ptr);
        assert_eq!(Preprocessor::fit(fitted, 4, 2).dimensions(), (4, 2));
    }

    #[test]
    fn test_argmax_nhwc() {
        let pre = Preprocessor::new(2, 1, TensorLayout::Nhwc, 1.0);
        // two pixels, three classes
        let scores = [0.1, 0.7, 0.2, 0.9, 0.05, 0.05];
        let map = pre.postprocess_scores(&[1, 1, 2, 3], &scores).unwrap();
        assert_eq!(map.as_slice(), &[1, 0]);
    }

    #[test]
    fn test_argmax_nchw() {
        let pre = Preprocessor::new(2, 1, TensorLayout::Nchw, 1.0);
        // class planes: c0 = [0.1, 0.9], c1 = [0.7, 0.05], c2 = [0.2, 0.05]
        let scores = [0.1, 0.9, 0.7, 0.05, 0.2, 0.05];
        let map = pre.postprocess_scores(&[1, 3, 1, 2], &scores).unwrap();
        assert_eq!(map.as_slice(), &[1, 0]);
    }

    #[test]
    fn test_argmax_ties_pick_first() {
        let pre = Preprocessor::new(1, 1, TensorLayout::Nhwc, 1.0);
        let map = pre.postprocess_scores(&[1, 1, 1, 3], &[0.2, 0.4, 0.4]).unwrap();
        assert_eq!(map.as_slice(), &[1]);
    }

    #[test]
    fn test_postprocess_rejects_bad_shapes() {
        let pre = Preprocessor::new(1, 1, TensorLayout::Nhwc, 1.0);
        assert!(pre.postprocess_scores(&[2, 1, 1, 1], &[0.0, 0.0]).is_err());
        assert!(pre.postprocess_scores(&[1, 1, 3], &[0.0; 3]).is_err());
        assert!(pre.postprocess_scores(&[1, 1, 1, 3], &[0.0; 2]).is_err());
    }
}
