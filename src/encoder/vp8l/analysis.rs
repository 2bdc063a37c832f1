//! Image analysis that guesses the best transform combination and picks
//! tile sizes before any real encoding is attempted.

use alloc::vec;

use super::entropy::{bits_entropy, log2};
use super::types::{
    subsample_size, sub_pixels, MAX_HUFFMAN_BITS, MAX_HUFFMAN_IMAGE_SIZE, MAX_TRANSFORM_BITS, MIN_HUFFMAN_BITS,
    MIN_TRANSFORM_BITS,
};

/// Transform combination a crunch configuration applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyMode {
    /// No transforms.
    Direct,
    /// Predictor only.
    Spatial,
    /// Subtract-green only.
    SubGreen,
    /// Subtract-green then predictor.
    SpatialSubGreen,
    /// Color indexing only.
    Palette,
    /// Color indexing then predictor on the index image.
    PaletteAndSpatial,
}

impl EntropyMode {
    pub const ALL: [EntropyMode; 6] = [
        EntropyMode::Direct,
        EntropyMode::Spatial,
        EntropyMode::SubGreen,
        EntropyMode::SpatialSubGreen,
        EntropyMode::Palette,
        EntropyMode::PaletteAndSpatial,
    ];

    pub fn uses_palette(self) -> bool {
        matches!(self, Self::Palette | Self::PaletteAndSpatial)
    }

    pub fn uses_subtract_green(self) -> bool {
        matches!(self, Self::SubGreen | Self::SpatialSubGreen)
    }

    pub fn uses_predictor(self) -> bool {
        matches!(self, Self::Spatial | Self::SpatialSubGreen | Self::PaletteAndSpatial)
    }
}

/// Outcome of [`analyze_entropy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Analysis {
    pub mode: EntropyMode,
    /// Red and blue carry only zeros under `mode`, so cross-color has
    /// nothing to decorrelate.
    pub red_and_blue_always_zero: bool,
}

// Histogram slots.
const ALPHA: usize = 0;
const RED: usize = 1;
const GREEN: usize = 2;
const BLUE: usize = 3;
const ALPHA_PRED: usize = 4;
const RED_PRED: usize = 5;
const GREEN_PRED: usize = 6;
const BLUE_PRED: usize = 7;
const RED_SUB_GREEN: usize = 8;
const BLUE_SUB_GREEN: usize = 9;
const RED_PRED_SUB_GREEN: usize = 10;
const BLUE_PRED_SUB_GREEN: usize = 11;
const PALETTE: usize = 12;
const NUM_HISTOS: usize = 13;

#[inline]
fn palette_hash(pix: u32) -> u32 {
    pix.wrapping_add(pix >> 19).wrapping_mul(0x39c5_fba7) >> 24
}

/// Estimate the coded size of each transform combination from per-channel
/// histograms of pixels and their left differences, and return the cheapest.
///
/// Pixels equal to their left neighbour or to the pixel above are skipped,
/// since backward references absorb them whatever the transform.
pub fn analyze_entropy(
    argb: &[u32],
    width: usize,
    height: usize,
    palette_size: Option<usize>,
    transform_bits: u8,
) -> Analysis {
    if let Some(size) = palette_size {
        if size <= 16 {
            return Analysis {
                mode: EntropyMode::Palette,
                red_and_blue_always_zero: true,
            };
        }
    }

    let mut histo = vec![[0u32; 256]; NUM_HISTOS];
    let mut add = |slot: usize, value: u32| histo[slot][(value & 0xff) as usize] += 1;
    let mut pix_prev = argb.first().copied().unwrap_or(0);
    for y in 0..height {
        for x in 0..width {
            let pix = argb[y * width + x];
            let diff = sub_pixels(pix, pix_prev);
            pix_prev = pix;
            if diff == 0 || (y > 0 && pix == argb[(y - 1) * width + x]) {
                continue;
            }
            add(ALPHA, pix >> 24);
            add(RED, pix >> 16);
            add(GREEN, pix >> 8);
            add(BLUE, pix);
            add(ALPHA_PRED, diff >> 24);
            add(RED_PRED, diff >> 16);
            add(GREEN_PRED, diff >> 8);
            add(BLUE_PRED, diff);
            add(RED_SUB_GREEN, (pix >> 16).wrapping_sub(pix >> 8));
            add(BLUE_SUB_GREEN, pix.wrapping_sub(pix >> 8));
            add(RED_PRED_SUB_GREEN, (diff >> 16).wrapping_sub(diff >> 8));
            add(BLUE_PRED_SUB_GREEN, diff.wrapping_sub(diff >> 8));
            add(PALETTE, palette_hash(pix));
        }
    }

    // Zero residuals are mostly filtered out above, yet at least one is
    // almost certainly present.
    for slot in [RED_PRED_SUB_GREEN, BLUE_PRED_SUB_GREEN, RED_PRED, GREEN_PRED, BLUE_PRED, ALPHA_PRED] {
        histo[slot][0] += 1;
    }

    let mut bits = [0.0f64; NUM_HISTOS];
    for (b, h) in bits.iter_mut().zip(histo.iter()) {
        *b = bits_entropy(h);
    }

    let tiles = f64::from(subsample_size(width as u32, transform_bits) * subsample_size(height as u32, transform_bits));
    let candidates = [
        (EntropyMode::Direct, bits[ALPHA] + bits[RED] + bits[GREEN] + bits[BLUE]),
        (
            EntropyMode::Spatial,
            bits[ALPHA_PRED] + bits[RED_PRED] + bits[GREEN_PRED] + bits[BLUE_PRED] + tiles * log2(14),
        ),
        (
            EntropyMode::SubGreen,
            bits[ALPHA] + bits[RED_SUB_GREEN] + bits[GREEN] + bits[BLUE_SUB_GREEN],
        ),
        (
            EntropyMode::SpatialSubGreen,
            bits[ALPHA_PRED] + bits[RED_PRED_SUB_GREEN] + bits[GREEN_PRED] + bits[BLUE_PRED_SUB_GREEN] + tiles * log2(24),
        ),
        (
            EntropyMode::Palette,
            bits[PALETTE] + palette_size.unwrap_or(0) as f64 * 8.0,
        ),
    ];
    let considered = if palette_size.is_some() { 5 } else { 4 };

    let (mut mode, mut best) = candidates[0];
    for &(m, cost) in &candidates[1..considered] {
        if cost < best {
            best = cost;
            mode = m;
        }
    }

    let (red, blue) = match mode {
        EntropyMode::Spatial => (RED_PRED, BLUE_PRED),
        EntropyMode::SubGreen => (RED_SUB_GREEN, BLUE_SUB_GREEN),
        EntropyMode::SpatialSubGreen => (RED_PRED_SUB_GREEN, BLUE_PRED_SUB_GREEN),
        _ => (RED, BLUE),
    };
    let red_and_blue_always_zero = histo[red][1..].iter().zip(&histo[blue][1..]).all(|(&r, &b)| r | b == 0);

    Analysis {
        mode,
        red_and_blue_always_zero,
    }
}

/// Histogram-image tile bits: coarser for faster methods and palettes,
/// growing until the tile grid fits the histogram-image budget.
pub fn histo_bits(method: u8, use_palette: bool, width: u32, height: u32) -> u8 {
    let mut bits = i32::from(if use_palette { 9u8 } else { 7 }) - i32::from(method);
    while bits < i32::from(MAX_HUFFMAN_BITS) {
        let b = bits.max(0) as u8;
        if subsample_size(width, b) * subsample_size(height, b) <= MAX_HUFFMAN_IMAGE_SIZE {
            break;
        }
        bits += 1;
    }
    bits.clamp(i32::from(MIN_HUFFMAN_BITS), i32::from(MAX_HUFFMAN_BITS)) as u8
}

/// Predictor and cross-color tile bits, never larger than the histogram
/// tiles.
pub fn transform_bits(method: u8, histo_bits: u8) -> u8 {
    let max_bits = match method {
        0..=3 => MAX_TRANSFORM_BITS,
        4 => 5,
        _ => 4,
    };
    histo_bits.min(max_bits).max(MIN_TRANSFORM_BITS)
}
