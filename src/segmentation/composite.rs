use super::preprocess::Preprocessor;
use crate::bridge::BgrImage;

/// Blend `overlay` into `base` in place:
/// `base = round(alpha * overlay + (1 - alpha) * base)` per channel.
///
/// Halfway values round to even. Both images must have the same size.
pub fn blend_in_place(base: &mut BgrImage, overlay: &BgrImage, alpha: f32) {
    debug_assert_eq!(base.dimensions(), overlay.dimensions());

    let beta = 1.0 - alpha;
    for (dst, &src) in base.iter_mut().zip(overlay.iter()) {
        let value = alpha * src as f32 + beta * *dst as f32;
        *dst = value.round_ties_even().clamp(0.0, 255.0) as u8;
    }
}

/// Resize the mask and the frame to `size` and lay the mask over the frame.
///
/// The blend goes into the frame's buffer, which is returned.
pub fn composite(frame: BgrImage, mask: &BgrImage, size: (u32, u32), alpha: f32) -> BgrImage {
    let _span = tracing::debug_span!("composite").entered();

    let (width, height) = size;
    let overlay = Preprocessor::resize(mask, width, height);
    let mut output = Preprocessor::fit(frame, width, height);

    blend_in_place(&mut output, &overlay, alpha);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_blend_rounds_to_even() {
        let mut base = BgrImage::from_raw(2, 1, vec![0, 10, 255, 1, 2, 3]).unwrap();
        let overlay = BgrImage::from_raw(2, 1, vec![255, 11, 0, 2, 2, 6]).unwrap();
        blend_in_place(&mut base, &overlay, 0.5);
        // 127.5 -> 128, 10.5 -> 10, 127.5 -> 128, 1.5 -> 2, 2, 4.5 -> 4
        assert_eq!(base.as_raw(), &vec![128, 10, 128, 2, 2, 4]);
    }

    #[test]
    fn test_full_alpha_replaces_frame() {
        let mut base = BgrImage::from_pixel(3, 3, image::Rgb([1, 2, 3]));
        let overlay = BgrImage::from_pixel(3, 3, image::Rgb([9, 8, 7]));
        blend_in_place(&mut base, &overlay, 1.0);
        assert_eq!(base, overlay);
    }

    #[test]
    fn test_composite_output_size() {
        let frame = BgrImage::from_pixel(64, 48, image::Rgb([100, 100, 100]));
        let mask = BgrImage::from_pixel(16, 12, image::Rgb([0, 0, 200]));
        let out = composite(frame, &mask, (480, 320), 0.5);
        assert_eq!(out.dimensions(), (480, 320));
        assert_eq!(out.get_pixel(240, 160).0, [50, 50, 150]);
    }

    #[test]
    fn test_composite_reuses_sized_frame() {
        let frame = BgrImage::from_pixel(48, 32, image::Rgb([100, 100, 100]));
        let ptr = frame.as_raw().as_ptr();
        let mask = BgrImage::from_pixel(48, 32, image::Rgb([0, 0, 200]));

        let out = composite(frame, &mask, (48, 32), 0.5);
        assert_eq!(out.as_raw().as_ptr(), ptr);
        assert_eq!(out.get_pixel(0, 0).0, [50, 50, 150]);
    }
}
