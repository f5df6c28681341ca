//! Conversion between `sensor_msgs/Image` messages and pixel buffers.

pub mod msg;

pub use msg::{Header, Image, Time};

use image::{ImageBuffer, Rgb};
use thiserror::Error;

/// Three channel 8-bit image whose channels are stored B, G, R.
///
/// `image` has no BGR pixel type, so this reuses `Rgb<u8>` storage. Resizing
/// and blending are channel-agnostic; only the bridge and colorizer care
/// about the order.
pub type BgrImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unsupported image encoding '{0}'")]
    UnsupportedEncoding(String),

    #[error("image has zero size ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("step {step} is smaller than a row of {row_bytes} bytes")]
    InvalidStep { step: u32, row_bytes: usize },

    #[error("image data holds {actual} bytes, expected at least {expected}")]
    TruncatedData { expected: usize, actual: usize },
}

/// Pixel encodings the bridge can decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Bgr8,
    Rgb8,
    Bgra8,
    Rgba8,
    Mono8,
    Bgr16,
    Rgb16,
    Mono16,
    /// Packed 4:2:2, `U Y0 V Y1` per pixel pair
    Uyvy,
    /// Packed 4:2:2, `Y0 U Y1 V` per pixel pair
    Yuyv,
}

impl Encoding {
    pub fn parse(name: &str) -> Result<Self, BridgeError> {
        match name {
            "bgr8" => Ok(Self::Bgr8),
            "rgb8" => Ok(Self::Rgb8),
            "bgra8" => Ok(Self::Bgra8),
            "rgba8" => Ok(Self::Rgba8),
            "mono8" | "8UC1" => Ok(Self::Mono8),
            "bgr16" => Ok(Self::Bgr16),
            "rgb16" => Ok(Self::Rgb16),
            "mono16" => Ok(Self::Mono16),
            "yuv422" | "uyvy" => Ok(Self::Uyvy),
            "yuv422_yuy2" | "yuyv" => Ok(Self::Yuyv),
            other => Err(BridgeError::UnsupportedEncoding(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bgr8 => "bgr8",
            Self::Rgb8 => "rgb8",
            Self::Bgra8 => "bgra8",
            Self::Rgba8 => "rgba8",
            Self::Mono8 => "mono8",
            Self::Bgr16 => "bgr16",
            Self::Rgb16 => "rgb16",
            Self::Mono16 => "mono16",
            Self::Uyvy => "yuv422",
            Self::Yuyv => "yuv422_yuy2",
        }
    }

    /// Bytes holding one row of `width` pixels. 4:2:2 rows are padded to whole pairs.
    pub fn row_bytes(self, width: u32) -> usize {
        let width = width as usize;
        match self {
            Self::Bgr8 | Self::Rgb8 => width * 3,
            Self::Bgra8 | Self::Rgba8 => width * 4,
            Self::Mono8 => width,
            Self::Bgr16 | Self::Rgb16 => width * 6,
            Self::Mono16 => width * 2,
            Self::Uyvy | Self::Yuyv => width.div_ceil(2) * 4,
        }
    }

    /// Append one row as B, G, R triples. 16-bit samples keep their high byte.
    fn decode_row(self, row: &[u8], width: usize, big_endian: bool, out: &mut Vec<u8>) {
        match self {
            Self::Bgr8 | Self::Bgra8 | Self::Rgb8 | Self::Rgba8 | Self::Mono8 => {
                let channels = self.row_bytes(1);
                for px in row[..width * channels].chunks_exact(channels) {
                    out.extend_from_slice(&self.order(px));
                }
            }
            Self::Bgr16 | Self::Rgb16 | Self::Mono16 => {
                let channels = self.row_bytes(1) / 2;
                let high = if big_endian { 0 } else { 1 };
                let narrow: Vec<u8> = row[..width * channels * 2]
                    .chunks_exact(2)
                    .map(|sample| sample[high])
                    .collect();
                for px in narrow.chunks_exact(channels) {
                    out.extend_from_slice(&self.order(px));
                }
            }
            Self::Uyvy | Self::Yuyv => {
                for x in 0..width {
                    let pair = &row[x / 2 * 4..x / 2 * 4 + 4];
                    let (y, u, v) = match self {
                        Self::Uyvy => (pair[1 + 2 * (x % 2)], pair[0], pair[2]),
                        _ => (pair[2 * (x % 2)], pair[1], pair[3]),
                    };
                    out.extend_from_slice(&yuv_to_bgr(y, u, v));
                }
            }
        }
    }

    /// Map one 8-bit pixel to B, G, R.
    fn order(self, px: &[u8]) -> [u8; 3] {
        match self {
            Self::Rgb8 | Self::Rgba8 | Self::Rgb16 => [px[2], px[1], px[0]],
            Self::Mono8 | Self::Mono16 => [px[0], px[0], px[0]],
            _ => [px[0], px[1], px[2]],
        }
    }
}

/// BT.601 video-range YUV to BGR
fn yuv_to_bgr(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = 1.164 * (y as f32 - 16.0);
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let clamp = |value: f32| value.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 2.018 * u),
        clamp(y - 0.391 * u - 0.813 * v),
        clamp(y + 1.596 * v),
    ]
}

/// Decode an image message into a BGR buffer.
///
/// Row padding is skipped using `step`. Bytes past the last row are ignored.
pub fn imgmsg_to_bgr(msg: &Image) -> Result<BgrImage, BridgeError> {
    let encoding = Encoding::parse(&msg.encoding)?;

    if msg.width == 0 || msg.height == 0 {
        return Err(BridgeError::EmptyImage {
            width: msg.width,
            height: msg.height,
        });
    }

    let row_bytes = encoding.row_bytes(msg.width);
    let step = msg.step as usize;
    if step < row_bytes {
        return Err(BridgeError::InvalidStep {
            step: msg.step,
            row_bytes,
        });
    }

    let expected = step * (msg.height as usize - 1) + row_bytes;
    if msg.data.len() < expected {
        return Err(BridgeError::TruncatedData {
            expected,
            actual: msg.data.len(),
        });
    }

    if encoding == Encoding::Bgr8 && step == row_bytes {
        let data = msg.data[..expected].to_vec();
        return BgrImage::from_raw(msg.width, msg.height, data).ok_or(
            BridgeError::TruncatedData {
                expected,
                actual: msg.data.len(),
            },
        );
    }

    let big_endian = msg.is_bigendian != 0;
    let mut out = Vec::with_capacity(msg.width as usize * msg.height as usize * 3);
    for row in msg.data.chunks(step).take(msg.height as usize) {
        encoding.decode_row(row, msg.width as usize, big_endian, &mut out);
    }

    BgrImage::from_raw(msg.width, msg.height, out).ok_or(BridgeError::TruncatedData {
        expected,
        actual: msg.data.len(),
    })
}

/// Encode a BGR buffer as a tightly packed `bgr8` message.
pub fn bgr_to_imgmsg(image: &BgrImage, header: Header) -> Result<Image, BridgeError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(BridgeError::EmptyImage { width, height });
    }

    Ok(Image {
        header,
        height,
        width,
        encoding: Encoding::Bgr8.as_str().to_string(),
        is_bigendian: 0,
        step: width * 3,
        data: image.as_raw().clone(),
    })
}

/// Wrap packed RGB bytes, e.g. straight from a webcam, as an `rgb8` message.
pub fn rgb8_imgmsg(width: u32, height: u32, data: Vec<u8>, header: Header) -> Image {
    Image {
        header,
        height,
        width,
        encoding: Encoding::Rgb8.as_str().to_string(),
        is_bigendian: 0,
        step: width * 3,
        data,
    }
}

/// Reverse the channel order of every pixel (BGR <-> RGB).
pub fn swap_channels(image: &mut ImageBuffer<Rgb<u8>, Vec<u8>>) {
    for px in image.pixels_mut() {
        px.0.swap(0, 2);
    }
}
