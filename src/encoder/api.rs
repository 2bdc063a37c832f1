//! Lossless encoding of images into VP8L bitstreams.
//!
//! # API
//!
//! ```rust
//! use zenvp8l::{EncodeRequest, LosslessConfig, PixelLayout};
//!
//! let config = LosslessConfig::new().with_quality(85.0).with_method(4);
//!
//! let rgba_data = vec![255u8; 4 * 4 * 4]; // 4x4 RGBA image
//! let vp8l = EncodeRequest::new(&config, &rgba_data, PixelLayout::Rgba8, 4, 4)
//!     .encode()?;
//! assert_eq!(vp8l[0], 0x2f);
//! # Ok::<(), zenvp8l::EncodeError>(())
//! ```
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use thiserror::Error;

use super::config::LosslessConfig;
use super::vp8l::{encode_vp8l, VP8L_MAX_DIMENSION};

/// Error that can occur during encoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// An IO error occurred.
    #[cfg(feature = "std")]
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The image dimensions are not allowed by the VP8L format.
    #[error("Invalid dimensions")]
    InvalidDimensions,

    /// The input buffer does not match the image dimensions.
    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(String),

    /// The image exceeds the configured [`Limits`](crate::Limits).
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// A palette of this many colors cannot be stored in the bitstream.
    #[error("Palette of {0} colors cannot be encoded")]
    PaletteOverflow(usize),

    /// Encoding was cancelled via a [`enough::Stop`].
    #[error("Encoding cancelled: {0}")]
    Cancelled(enough::StopReason),
}

/// Result type alias using `At<EncodeError>` for automatic location tracking.
///
/// Errors wrapped in `At<>` automatically capture file and line information,
/// making debugging easier in production environments.
pub type EncodeResult<T> = core::result::Result<T, whereat::At<EncodeError>>;

impl From<enough::StopReason> for EncodeError {
    fn from(reason: enough::StopReason) -> Self {
        Self::Cancelled(reason)
    }
}

/// Memory layout of the input pixels.
///
/// VP8L always stores ARGB; layouts without alpha are encoded as opaque.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    /// Opaque image with a single luminance byte per pixel.
    L8,
    /// Image with a luminance and alpha byte per pixel.
    La8,
    /// Opaque image with a red, green, and blue byte per pixel.
    Rgb8,
    /// Image with a red, green, blue, and alpha byte per pixel.
    Rgba8,
    /// Opaque image with a blue, green, and red byte per pixel.
    Bgr8,
    /// Image with a blue, green, red, and alpha byte per pixel.
    Bgra8,
}

impl PixelLayout {
    pub(crate) fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::L8 => 1,
            PixelLayout::La8 => 2,
            PixelLayout::Rgb8 | PixelLayout::Bgr8 => 3,
            PixelLayout::Rgba8 | PixelLayout::Bgra8 => 4,
        }
    }

    /// Pack one pixel's bytes as `0xAARRGGBB`.
    fn to_argb(self, p: &[u8]) -> u32 {
        let argb = |a: u8, r: u8, g: u8, b: u8| u32::from_be_bytes([a, r, g, b]);
        match self {
            PixelLayout::L8 => argb(0xff, p[0], p[0], p[0]),
            PixelLayout::La8 => argb(p[1], p[0], p[0], p[0]),
            PixelLayout::Rgb8 => argb(0xff, p[0], p[1], p[2]),
            PixelLayout::Rgba8 => argb(p[3], p[0], p[1], p[2]),
            PixelLayout::Bgr8 => argb(0xff, p[2], p[1], p[0]),
            PixelLayout::Bgra8 => argb(p[3], p[2], p[1], p[0]),
        }
    }
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelLayout::L8 => f.write_str("L8"),
            PixelLayout::La8 => f.write_str("LA8"),
            PixelLayout::Rgb8 => f.write_str("RGB8"),
            PixelLayout::Rgba8 => f.write_str("RGBA8"),
            PixelLayout::Bgr8 => f.write_str("BGR8"),
            PixelLayout::Bgra8 => f.write_str("BGRA8"),
        }
    }
}

/// Transforms present in an encoded bitstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformSet {
    /// Color indexing (palette).
    pub palette: bool,
    /// Subtract green from red and blue.
    pub subtract_green: bool,
    /// Spatial prediction.
    pub predictor: bool,
    /// Cross-color decorrelation.
    pub cross_color: bool,
}

/// Statistics from an encoding operation.
#[derive(Debug, Clone, Default)]
pub struct EncodeStats {
    /// Total coded output size in bytes.
    pub coded_size: u32,
    /// Transforms applied by the winning configuration.
    pub transforms: TransformSet,
    /// Palette size (0 if no palette).
    pub palette_size: u16,
    /// Color cache bits (0 = disabled).
    pub cache_bits: u8,
    /// Histogram bits used for meta-Huffman coding (0 = single histogram).
    pub histogram_bits: u8,
    /// Transform bits for predictor/cross-color block size (0 = neither used).
    pub transform_bits: u8,
    /// Number of prefix code groups in the main image.
    pub num_histograms: u32,
    /// Number of transform combinations that were fully encoded.
    pub configs_tried: u32,
}

/// Encoding request with builder pattern.
///
/// # Example
///
/// ```rust
/// use zenvp8l::{EncodeRequest, LosslessConfig, PixelLayout};
///
/// let config = LosslessConfig::new().with_quality(90.0);
/// let rgb = vec![0u8; 64 * 48 * 3];
/// let (vp8l, stats) = EncodeRequest::new(&config, &rgb, PixelLayout::Rgb8, 64, 48)
///     .encode_with_stats()?;
/// assert_eq!(stats.coded_size as usize, vp8l.len());
/// # Ok::<(), zenvp8l::EncodeError>(())
/// ```
pub struct EncodeRequest<'a> {
    config: &'a LosslessConfig,
    pixels: &'a [u8],
    layout: PixelLayout,
    width: u32,
    height: u32,
    stride_pixels: Option<usize>,
    stop: &'a dyn enough::Stop,
}

impl<'a> EncodeRequest<'a> {
    /// Create an encoding request.
    #[must_use]
    pub fn new(
        config: &'a LosslessConfig,
        pixels: &'a [u8],
        layout: PixelLayout,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            config,
            pixels,
            layout,
            width,
            height,
            stride_pixels: None,
            stop: &enough::Unstoppable,
        }
    }

    /// Set a cooperative cancellation token.
    #[must_use]
    pub fn with_stop(mut self, stop: &'a dyn enough::Stop) -> Self {
        self.stop = stop;
        self
    }

    /// Set row stride in pixels. Must be >= `width`.
    #[must_use]
    pub fn with_stride(mut self, stride_pixels: usize) -> Self {
        self.stride_pixels = Some(stride_pixels);
        self
    }

    /// Encode to VP8L bytes.
    pub fn encode(self) -> Result<Vec<u8>, EncodeError> {
        let (output, _stats) = self.encode_inner()?;
        Ok(output)
    }

    /// Encode to VP8L bytes, appending to an existing Vec.
    pub fn encode_into(self, output: &mut Vec<u8>) -> Result<(), EncodeError> {
        let encoded = self.encode()?;
        output.extend_from_slice(&encoded);
        Ok(())
    }

    /// Encode to VP8L bytes and return encoding statistics.
    pub fn encode_with_stats(self) -> Result<(Vec<u8>, EncodeStats), EncodeError> {
        self.encode_inner()
    }

    /// Encode to VP8L, writing to an [`io::Write`](std::io::Write) implementor.
    #[cfg(feature = "std")]
    pub fn encode_to<W: std::io::Write>(self, mut writer: W) -> Result<(), EncodeError> {
        let encoded = self.encode()?;
        writer.write_all(&encoded)?;
        Ok(())
    }

    fn encode_inner(self) -> Result<(Vec<u8>, EncodeStats), EncodeError> {
        validate_dimensions(self.config, self.width, self.height)?;

        let bpp = self.layout.bytes_per_pixel();
        let width = self.width as usize;
        let height = self.height as usize;
        let stride_px = self.stride_pixels.unwrap_or(width);
        if stride_px < width {
            return Err(EncodeError::InvalidBufferSize(format!(
                "stride_pixels {} < width {}",
                stride_px, self.width
            )));
        }
        let stride_bytes = stride_px * bpp;
        let expected = stride_bytes * (height - 1) + width * bpp;
        if self.pixels.len() < expected {
            return Err(EncodeError::InvalidBufferSize(format!(
                "buffer too small: got {}, expected {}",
                self.pixels.len(),
                expected
            )));
        }

        let mut argb = Vec::new();
        argb.try_reserve_exact(width * height)
            .map_err(|e| EncodeError::LimitExceeded(format!("{}", e)))?;
        for row in self.pixels.chunks(stride_bytes).take(height) {
            argb.extend(row[..width * bpp].chunks_exact(bpp).map(|p| self.layout.to_argb(p)));
        }

        encode_vp8l(&argb, width, height, &self.config.to_params(), self.stop)
    }
}

/// Encode packed `0xAARRGGBB` pixels.
///
/// ```rust
/// use zenvp8l::{encode_argb, LosslessConfig};
///
/// let argb = vec![0xff20_40c0u32; 16 * 16];
/// let vp8l = encode_argb(&LosslessConfig::new(), &argb, 16, 16)?;
/// assert_eq!(vp8l[0], 0x2f);
/// # Ok::<(), zenvp8l::EncodeError>(())
/// ```
pub fn encode_argb(config: &LosslessConfig, argb: &[u32], width: u32, height: u32) -> Result<Vec<u8>, EncodeError> {
    validate_dimensions(config, width, height)?;
    let (output, _stats) = encode_vp8l(
        argb,
        width as usize,
        height as usize,
        &config.to_params(),
        &enough::Unstoppable,
    )?;
    Ok(output)
}

fn validate_dimensions(config: &LosslessConfig, width: u32, height: u32) -> Result<(), EncodeError> {
    if width == 0 || height == 0 || width > VP8L_MAX_DIMENSION || height > VP8L_MAX_DIMENSION {
        return Err(EncodeError::InvalidDimensions);
    }
    config.limits.check_dimensions(width, height)
}
