//! Packed YUV 4:2:2 conversion for v4l2loopback.

/// Convert packed RGB bytes to YUYV (Y0 U Y1 V per pixel pair)
///
/// An odd last column is paired with itself.
pub fn rgb_to_yuyv(rgb: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (width, height) = (width as usize, height as usize);
    let mut yuyv = Vec::with_capacity(width.div_ceil(2) * 4 * height);

    for row in rgb.chunks_exact(width * 3).take(height) {
        for x in (0..width).step_by(2) {
            let p1 = &row[x * 3..x * 3 + 3];
            let p2 = if x + 1 < width {
                &row[(x + 1) * 3..(x + 1) * 3 + 3]
            } else {
                p1
            };

            let (y1, u1, v1) = rgb_to_yuv(p1[0], p1[1], p1[2]);
            let (y2, u2, v2) = rgb_to_yuv(p2[0], p2[1], p2[2]);

            // Average U and V for the pair of pixels
            let u = ((u1 as u16 + u2 as u16) / 2) as u8;
            let v = ((v1 as u16 + v2 as u16) / 2) as u8;

            yuyv.extend_from_slice(&[y1, u, y2, v]);
        }
    }

    yuyv
}

/// BT.601 RGB to YUV
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}
