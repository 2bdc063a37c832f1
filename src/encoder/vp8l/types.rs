//! Core data structures and format constants for VP8L encoding.

use alloc::vec::Vec;

/// Hash chain bucket bits (matching libwebp).
pub const HASH_BITS: u32 = 18;
pub const HASH_SIZE: usize = 1 << HASH_BITS;
pub const MAX_LENGTH_BITS: u32 = 12;
pub const WINDOW_SIZE_BITS: u32 = 20;
/// Maximum copy length (4095).
pub const MAX_LENGTH: usize = (1 << MAX_LENGTH_BITS) - 1;
/// Maximum window size (1M - 120 for 2D codes).
pub const WINDOW_SIZE: usize = (1 << WINDOW_SIZE_BITS) - 120;
/// Minimum run length RLE turns into a copy.
pub const MIN_LENGTH: usize = 4;

pub const NUM_LITERAL_CODES: usize = 256;
pub const NUM_LENGTH_CODES: usize = 24;
pub const NUM_DISTANCE_CODES: usize = 40;
/// Number of 2D neighbourhood distances with short plane codes.
pub const NUM_PLANE_CODES: u32 = 120;

/// Largest color cache the bitstream can signal.
pub const MAX_COLOR_CACHE_BITS: u8 = 10;
/// Largest palette the color-indexing transform can hold.
pub const MAX_PALETTE_SIZE: usize = 256;

/// Histogram-image tile bits range and budget.
pub const MIN_HUFFMAN_BITS: u8 = 2;
pub const MAX_HUFFMAN_BITS: u8 = 9;
pub const MAX_HUFFMAN_IMAGE_SIZE: u32 = 2600;

/// Predictor / cross-color tile bits range.
pub const MIN_TRANSFORM_BITS: u8 = 2;
pub const MAX_TRANSFORM_BITS: u8 = 6;

/// Bitstream framing.
pub const VP8L_SIGNATURE: u8 = 0x2f;
pub const VP8L_IMAGE_SIZE_BITS: u8 = 14;
pub const VP8L_VERSION_BITS: u8 = 3;
pub const VP8L_MAX_DIMENSION: u32 = 1 << VP8L_IMAGE_SIZE_BITS;

/// Encoder effort knobs resolved from the public configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vp8lQuality {
    /// Quality level 0-100.
    pub quality: u8,
    /// Method 0-6 (speed/quality tradeoff).
    pub method: u8,
}

impl Default for Vp8lQuality {
    fn default() -> Self {
        Self {
            quality: 75,
            method: 4,
        }
    }
}

impl Vp8lQuality {
    /// Hash chain iterations per position, in `[8, 86]`.
    pub fn max_iters(&self) -> usize {
        8 + (self.quality as usize * self.quality as usize) / 128
    }

    /// Maximum backward distance the hash chain may consider.
    pub fn window_size(&self, width: usize) -> usize {
        let max = if self.quality > 75 {
            WINDOW_SIZE
        } else if self.quality > 50 {
            width << 8
        } else if self.quality > 25 {
            width << 6
        } else {
            width << 4
        };
        max.min(WINDOW_SIZE)
    }
}

/// A pixel or copy operation in the backward reference stream.
///
/// Copy distances are raw pixel distances. They are mapped to plane codes
/// only when histogrammed or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixOrCopy {
    /// Literal ARGB pixel value.
    Literal(u32),
    /// Color cache index.
    CacheIdx(u16),
    /// Backward reference copy.
    Copy {
        /// Copy length (1-4095).
        len: u16,
        /// Distance in pixels (>= 1).
        dist: u32,
    },
}

impl PixOrCopy {
    #[inline]
    pub fn literal(argb: u32) -> Self {
        Self::Literal(argb)
    }

    #[inline]
    pub fn cache_idx(idx: u32) -> Self {
        Self::CacheIdx(idx as u16)
    }

    #[inline]
    pub fn copy(len: usize, dist: usize) -> Self {
        debug_assert!((1..=MAX_LENGTH).contains(&len));
        debug_assert!(dist >= 1);
        Self::Copy {
            len: len as u16,
            dist: dist as u32,
        }
    }

    /// Number of pixels this token emits when decoded.
    #[inline]
    pub fn pixel_len(&self) -> usize {
        match self {
            Self::Copy { len, .. } => *len as usize,
            _ => 1,
        }
    }
}

/// An ordered token stream.
#[derive(Debug, Clone, Default)]
pub struct BackwardRefs {
    pub tokens: Vec<PixOrCopy>,
}

impl BackwardRefs {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(cap),
        }
    }

    #[inline]
    pub fn push(&mut self, token: PixOrCopy) {
        self.tokens.push(token);
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, PixOrCopy> {
        self.tokens.iter()
    }
}

#[inline]
pub const fn argb_alpha(argb: u32) -> u8 {
    (argb >> 24) as u8
}

#[inline]
pub const fn argb_red(argb: u32) -> u8 {
    (argb >> 16) as u8
}

#[inline]
pub const fn argb_green(argb: u32) -> u8 {
    (argb >> 8) as u8
}

#[inline]
pub const fn argb_blue(argb: u32) -> u8 {
    argb as u8
}

#[cfg(test)]
#[inline]
pub const fn make_argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    ((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | (b as u32)
}

/// Number of tiles of `1 << bits` pixels covering `size`.
#[inline]
pub const fn subsample_size(size: u32, bits: u8) -> u32 {
    (size + (1 << bits) - 1) >> bits
}

/// Per-channel wrapping subtraction of two ARGB values.
#[inline]
pub const fn sub_pixels(a: u32, b: u32) -> u32 {
    let alpha_green = 0x00ff_00ff_u32
        .wrapping_add(a & 0xff00_ff00)
        .wrapping_sub(b & 0xff00_ff00);
    let red_blue = 0xff00_ff00_u32
        .wrapping_add(a & 0x00ff_00ff)
        .wrapping_sub(b & 0x00ff_00ff);
    (alpha_green & 0xff00_ff00) | (red_blue & 0x00ff_00ff)
}

/// Per-channel wrapping addition of two ARGB values.
#[cfg(test)]
#[inline]
pub const fn add_pixels(a: u32, b: u32) -> u32 {
    let alpha_green = (a & 0xff00_ff00).wrapping_add(b & 0xff00_ff00);
    let red_blue = (a & 0x00ff_00ff).wrapping_add(b & 0x00ff_00ff);
    (alpha_green & 0xff00_ff00) | (red_blue & 0x00ff_00ff)
}
