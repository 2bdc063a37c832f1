//! Decorrelating image transforms: subtract-green, spatial prediction and
//! cross-color.
//!
//! Each transform rewrites the pixel buffer in place and, where the
//! bitstream needs one, returns the sub-image describing the per-tile
//! parameters.

use alloc::vec;
use alloc::vec::Vec;

use super::entropy::combined_shannon_entropy;
use super::types::{argb_green, subsample_size, sub_pixels};

/// Transform type identifier as written in the bitstream (2 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransformType {
    Predictor = 0,
    CrossColor = 1,
    SubtractGreen = 2,
    ColorIndexing = 3,
}

/// The 14 spatial predictors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PredictorMode {
    Black = 0,
    Left = 1,
    Top = 2,
    TopRight = 3,
    TopLeft = 4,
    AvgAvgLtrT = 5,
    AvgLTl = 6,
    AvgLT = 7,
    AvgTlT = 8,
    AvgTTr = 9,
    AvgAvgLTlAvgTTr = 10,
    Select = 11,
    ClampAddSubtractFull = 12,
    ClampAddSubtractHalf = 13,
}

impl PredictorMode {
    pub const COUNT: usize = 14;

    pub const ALL: [PredictorMode; Self::COUNT] = [
        PredictorMode::Black,
        PredictorMode::Left,
        PredictorMode::Top,
        PredictorMode::TopRight,
        PredictorMode::TopLeft,
        PredictorMode::AvgAvgLtrT,
        PredictorMode::AvgLTl,
        PredictorMode::AvgLT,
        PredictorMode::AvgTlT,
        PredictorMode::AvgTTr,
        PredictorMode::AvgAvgLTlAvgTTr,
        PredictorMode::Select,
        PredictorMode::ClampAddSubtractFull,
        PredictorMode::ClampAddSubtractHalf,
    ];

    /// Mode for a value read back from a predictor sub-image.
    /// Out-of-range values fall back to the last mode.
    pub fn from_u8(val: u8) -> Self {
        Self::ALL[(val as usize).min(Self::COUNT - 1)]
    }

    /// Sub-image pixel carrying this mode in its green channel.
    #[inline]
    pub const fn to_argb(self) -> u32 {
        0xff00_0000 | ((self as u32) << 8)
    }
}

/// Bonus subtracted from a predictor's cost when it matches a neighbouring
/// tile's choice.
const SPATIAL_PREDICTOR_BIAS: f64 = 15.0;
/// Bonus for matching a neighbour or zero in the cross-color search.
const CROSS_COLOR_BIAS: f64 = 3.0;
const GREEN_RED_TO_BLUE_MAX_ITERS: usize = 7;
const DELTA_LUT: [i32; GREEN_RED_TO_BLUE_MAX_ITERS] = [16, 16, 8, 4, 2, 2, 2];
/// (green_to_blue, red_to_blue) search directions.
const BLUE_AXES: [(i32, i32); 8] = [
    (0, -1),
    (0, 1),
    (-1, 0),
    (1, 0),
    (-1, -1),
    (-1, 1),
    (1, -1),
    (1, 1),
];

type ChannelHistos = [[u32; 256]; 4];

/// Replace red with red - green and blue with blue - green, modulo 256.
pub fn apply_subtract_green(argb: &mut [u32]) {
    for pixel in argb.iter_mut() {
        let green = (*pixel >> 8) & 0xff;
        let red_blue = (*pixel & 0x00ff_00ff)
            .wrapping_add(0x0100_0100)
            .wrapping_sub((green << 16) | green);
        *pixel = (*pixel & 0xff00_ff00) | (red_blue & 0x00ff_00ff);
    }
}

#[inline]
fn average2(a: u32, b: u32) -> u32 {
    (((a ^ b) & 0xfefe_fefe) >> 1) + (a & b)
}

#[inline]
fn channel(argb: u32, shift: u32) -> i32 {
    ((argb >> shift) & 0xff) as i32
}

fn select(top: u32, left: u32, top_left: u32) -> u32 {
    let mut left_dist = 0;
    let mut top_dist = 0;
    for shift in [24, 16, 8, 0] {
        let tl = channel(top_left, shift);
        left_dist += (channel(left, shift) - tl).abs();
        top_dist += (channel(top, shift) - tl).abs();
    }
    if left_dist <= top_dist { top } else { left }
}

fn clamp_add_subtract_full(left: u32, top: u32, top_left: u32) -> u32 {
    [24, 16, 8, 0].into_iter().fold(0, |acc, shift| {
        let v = channel(left, shift) + channel(top, shift) - channel(top_left, shift);
        acc | ((v.clamp(0, 255) as u32) << shift)
    })
}

fn clamp_add_subtract_half(left: u32, top: u32, top_left: u32) -> u32 {
    let avg = average2(left, top);
    [24, 16, 8, 0].into_iter().fold(0, |acc, shift| {
        let a = channel(avg, shift);
        let v = a + (a - channel(top_left, shift)) / 2;
        acc | ((v.clamp(0, 255) as u32) << shift)
    })
}

/// Prediction for pixel `(x, y)` from its already-decoded neighbours.
///
/// The first pixel predicts opaque black, the rest of row 0 predicts left,
/// column 0 predicts top. At the right edge the top-right neighbour is the
/// first pixel of the current row.
pub(crate) fn predict_at(argb: &[u32], width: usize, x: usize, y: usize, mode: PredictorMode) -> u32 {
    let idx = y * width + x;
    if y == 0 {
        return if x == 0 { 0xff00_0000 } else { argb[idx - 1] };
    }
    if x == 0 {
        return argb[idx - width];
    }
    let left = argb[idx - 1];
    let top = argb[idx - width];
    let top_left = argb[idx - width - 1];
    let top_right = argb[idx - width + 1];
    match mode {
        PredictorMode::Black => 0xff00_0000,
        PredictorMode::Left => left,
        PredictorMode::Top => top,
        PredictorMode::TopRight => top_right,
        PredictorMode::TopLeft => top_left,
        PredictorMode::AvgAvgLtrT => average2(average2(left, top_right), top),
        PredictorMode::AvgLTl => average2(left, top_left),
        PredictorMode::AvgLT => average2(left, top),
        PredictorMode::AvgTlT => average2(top_left, top),
        PredictorMode::AvgTTr => average2(top, top_right),
        PredictorMode::AvgAvgLTlAvgTTr => average2(average2(left, top_left), average2(top, top_right)),
        PredictorMode::Select => select(top, left, top_left),
        PredictorMode::ClampAddSubtractFull => clamp_add_subtract_full(left, top, top_left),
        PredictorMode::ClampAddSubtractHalf => clamp_add_subtract_half(left, top, top_left),
    }
}

/// Cost favouring residuals near zero. `counts[0]` is weighted by `weight0`,
/// bins at distance `i` from zero by `exp_val * 0.6^(i-1)`.
fn prediction_cost_spatial(counts: &[u32; 256], weight0: f64, mut exp_val: f64) -> f64 {
    let mut bits = weight0 * f64::from(counts[0]);
    for i in 1..16 {
        bits += exp_val * f64::from(counts[i] + counts[256 - i]);
        exp_val *= 0.6;
    }
    -0.1 * bits
}

fn accumulate_channels(histos: &mut ChannelHistos, argb: u32) {
    histos[0][(argb >> 24) as usize] += 1;
    histos[1][((argb >> 16) & 0xff) as usize] += 1;
    histos[2][((argb >> 8) & 0xff) as usize] += 1;
    histos[3][(argb & 0xff) as usize] += 1;
}

struct Tile {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl Tile {
    fn new(tx: usize, ty: usize, bits: u8, width: usize, height: usize) -> Self {
        let size = 1usize << bits;
        let x0 = tx * size;
        let y0 = ty * size;
        Self {
            x0,
            y0,
            x1: (x0 + size).min(width),
            y1: (y0 + size).min(height),
        }
    }

    fn rows(&self, width: usize) -> impl Iterator<Item = core::ops::Range<usize>> + '_ {
        (self.y0..self.y1).map(move |y| y * width + self.x0..y * width + self.x1)
    }
}

fn best_predictor_for_tile(
    argb: &[u32],
    width: usize,
    tile: &Tile,
    left_mode: Option<u8>,
    above_mode: Option<u8>,
    accumulated: &mut ChannelHistos,
) -> PredictorMode {
    let mut best_mode = PredictorMode::Black;
    let mut best_cost = f64::MAX;
    let mut best_histos = [[0u32; 256]; 4];
    let mut histos = [[0u32; 256]; 4];

    for mode in PredictorMode::ALL {
        for row in histos.iter_mut() {
            row.fill(0);
        }
        for y in tile.y0..tile.y1 {
            for x in tile.x0..tile.x1 {
                let residual = sub_pixels(argb[y * width + x], predict_at(argb, width, x, y, mode));
                accumulate_channels(&mut histos, residual);
            }
        }

        let mut cost: f64 = histos
            .iter()
            .zip(accumulated.iter())
            .map(|(tile_histo, acc)| {
                prediction_cost_spatial(tile_histo, 1.0, 0.94) + combined_shannon_entropy(tile_histo, acc)
            })
            .sum();
        if left_mode == Some(mode as u8) {
            cost -= SPATIAL_PREDICTOR_BIAS;
        }
        if above_mode == Some(mode as u8) {
            cost -= SPATIAL_PREDICTOR_BIAS;
        }
        if cost < best_cost {
            best_cost = cost;
            best_mode = mode;
            core::mem::swap(&mut best_histos, &mut histos);
        }
    }

    for (acc, best) in accumulated.iter_mut().zip(best_histos.iter()) {
        for (a, &b) in acc.iter_mut().zip(best.iter()) {
            *a += b;
        }
    }
    best_mode
}

/// Choose a predictor per `1 << bits` tile and replace every pixel with its
/// residual against that prediction.
///
/// Returns the predictor sub-image, one pixel per tile with the mode in the
/// green channel. With `low_effort` every tile uses [`PredictorMode::Select`].
pub fn apply_predictor_transform(
    argb: &mut [u32],
    width: usize,
    height: usize,
    bits: u8,
    low_effort: bool,
) -> Vec<u32> {
    let tiles_x = subsample_size(width as u32, bits) as usize;
    let tiles_y = subsample_size(height as u32, bits) as usize;
    let mut modes = vec![PredictorMode::Select.to_argb(); tiles_x * tiles_y];

    if !low_effort {
        let mut accumulated = [[0u32; 256]; 4];
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let left_mode = (tx > 0).then(|| argb_green(modes[ty * tiles_x + tx - 1]));
                let above_mode = (ty > 0).then(|| argb_green(modes[(ty - 1) * tiles_x + tx]));
                let tile = Tile::new(tx, ty, bits, width, height);
                let mode = best_predictor_for_tile(argb, width, &tile, left_mode, above_mode, &mut accumulated);
                modes[ty * tiles_x + tx] = mode.to_argb();
            }
        }
    }

    // Every neighbour precedes its pixel in raster order, so walking backwards
    // keeps the neighbours original.
    for y in (0..height).rev() {
        for x in (0..width).rev() {
            let mode = PredictorMode::from_u8(argb_green(modes[(y >> bits) * tiles_x + (x >> bits)]));
            let idx = y * width + x;
            argb[idx] = sub_pixels(argb[idx], predict_at(argb, width, x, y, mode));
        }
    }
    modes
}

/// Cross-color multipliers in 3.5 fixed point, stored as raw bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Multipliers {
    pub green_to_red: u8,
    pub green_to_blue: u8,
    pub red_to_blue: u8,
}

impl Multipliers {
    pub const fn from_code(code: u32) -> Self {
        Self {
            green_to_red: code as u8,
            green_to_blue: (code >> 8) as u8,
            red_to_blue: (code >> 16) as u8,
        }
    }

    pub const fn to_code(self) -> u32 {
        0xff00_0000 | ((self.red_to_blue as u32) << 16) | ((self.green_to_blue as u32) << 8) | self.green_to_red as u32
    }

    /// Forward transform of one pixel. Alpha and green pass through.
    pub fn transform(self, argb: u32) -> u32 {
        let new_red = transform_red(self.green_to_red as i8, argb);
        let new_blue = transform_blue(self.green_to_blue as i8, self.red_to_blue as i8, argb);
        (argb & 0xff00_ff00) | (u32::from(new_red) << 16) | u32::from(new_blue)
    }
}

#[inline]
fn color_transform_delta(pred: i8, color: i8) -> i32 {
    (i32::from(pred) * i32::from(color)) >> 5
}

#[inline]
fn transform_red(green_to_red: i8, argb: u32) -> u8 {
    let green = (argb >> 8) as u8 as i8;
    let red = ((argb >> 16) & 0xff) as i32;
    (red - color_transform_delta(green_to_red, green)) as u8
}

#[inline]
fn transform_blue(green_to_blue: i8, red_to_blue: i8, argb: u32) -> u8 {
    let green = (argb >> 8) as u8 as i8;
    let red = (argb >> 16) as u8 as i8;
    let blue = (argb & 0xff) as i32;
    (blue - color_transform_delta(green_to_blue, green) - color_transform_delta(red_to_blue, red)) as u8
}

fn cross_color_cost(histo: &[u32; 256], accumulated: &[u32; 256]) -> f64 {
    combined_shannon_entropy(histo, accumulated) + prediction_cost_spatial(histo, 3.0, 2.4)
}

struct TileSearch<'a> {
    argb: &'a [u32],
    width: usize,
    tile: &'a Tile,
    prev_x: Multipliers,
    prev_y: Multipliers,
}

impl TileSearch<'_> {
    fn histogram(&self, map: impl Fn(u32) -> u8) -> [u32; 256] {
        let mut histo = [0u32; 256];
        for row in self.tile.rows(self.width) {
            for &pix in &self.argb[row] {
                histo[map(pix) as usize] += 1;
            }
        }
        histo
    }

    fn bias(value: i32, prev_x: u8, prev_y: u8) -> f64 {
        let mut bias = 0.0;
        if value as u8 == prev_x {
            bias += CROSS_COLOR_BIAS;
        }
        if value as u8 == prev_y {
            bias += CROSS_COLOR_BIAS;
        }
        if value == 0 {
            bias += CROSS_COLOR_BIAS;
        }
        bias
    }

    fn red_cost(&self, green_to_red: i32, accumulated: &[u32; 256]) -> f64 {
        let histo = self.histogram(|pix| transform_red(green_to_red as i8, pix));
        cross_color_cost(&histo, accumulated)
            - Self::bias(green_to_red, self.prev_x.green_to_red, self.prev_y.green_to_red)
    }

    fn blue_cost(&self, green_to_blue: i32, red_to_blue: i32, accumulated: &[u32; 256]) -> f64 {
        let histo = self.histogram(|pix| transform_blue(green_to_blue as i8, red_to_blue as i8, pix));
        cross_color_cost(&histo, accumulated)
            - Self::bias(green_to_blue, self.prev_x.green_to_blue, self.prev_y.green_to_blue)
            - Self::bias(red_to_blue, self.prev_x.red_to_blue, self.prev_y.red_to_blue)
    }

    fn best_green_to_red(&self, quality: u8, accumulated: &[u32; 256]) -> u8 {
        let max_iters = 4 + (7 * usize::from(quality)) / 256;
        let mut best = 0i32;
        let mut best_cost = self.red_cost(best, accumulated);
        for iter in 0..max_iters {
            let delta = 32 >> iter;
            for candidate in [best - delta, best + delta] {
                let cost = self.red_cost(candidate, accumulated);
                if cost < best_cost {
                    best_cost = cost;
                    best = candidate;
                }
            }
        }
        best as u8
    }

    fn best_green_red_to_blue(&self, quality: u8, accumulated: &[u32; 256]) -> (u8, u8) {
        let iters = if quality < 25 {
            1
        } else if quality > 50 {
            GREEN_RED_TO_BLUE_MAX_ITERS
        } else {
            4
        };
        let (mut best_g, mut best_r) = (0i32, 0i32);
        let mut best_cost = self.blue_cost(0, 0, accumulated);
        for (iter, &delta) in DELTA_LUT.iter().enumerate().take(iters) {
            for &(dg, dr) in BLUE_AXES.iter() {
                let g = best_g + dg * delta;
                let r = best_r + dr * delta;
                let cost = self.blue_cost(g, r, accumulated);
                if cost < best_cost {
                    best_cost = cost;
                    best_g = g;
                    best_r = r;
                }
                if quality < 25 && iter == 4 {
                    break;
                }
            }
            if delta == 2 && best_g == 0 && best_r == 0 {
                break;
            }
        }
        (best_g as u8, best_r as u8)
    }
}

/// Choose cross-color multipliers per `1 << bits` tile and decorrelate red
/// and blue from green in place.
///
/// Returns the multiplier sub-image with one color code per tile.
pub fn apply_cross_color_transform(
    argb: &mut [u32],
    width: usize,
    height: usize,
    bits: u8,
    quality: u8,
) -> Vec<u32> {
    let tiles_x = subsample_size(width as u32, bits) as usize;
    let tiles_y = subsample_size(height as u32, bits) as usize;
    let mut codes = vec![0u32; tiles_x * tiles_y];
    let mut accumulated_red = [0u32; 256];
    let mut accumulated_blue = [0u32; 256];
    let mut prev_x = Multipliers::default();
    let mut prev_y = Multipliers::default();

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let offset = ty * tiles_x + tx;
            if ty > 0 {
                prev_y = Multipliers::from_code(codes[offset - tiles_x]);
            }
            let tile = Tile::new(tx, ty, bits, width, height);
            let search = TileSearch {
                argb,
                width,
                tile: &tile,
                prev_x,
                prev_y,
            };
            let green_to_red = search.best_green_to_red(quality, &accumulated_red);
            let (green_to_blue, red_to_blue) = search.best_green_red_to_blue(quality, &accumulated_blue);
            prev_x = Multipliers {
                green_to_red,
                green_to_blue,
                red_to_blue,
            };
            codes[offset] = prev_x.to_code();

            for row in tile.rows(width) {
                for pix in &mut argb[row] {
                    *pix = prev_x.transform(*pix);
                }
            }

            // Runs and row repeats are left to backward references.
            for y in tile.y0..tile.y1 {
                for ix in y * width + tile.x0..y * width + tile.x1 {
                    let pix = argb[ix];
                    if ix >= 2 && pix == argb[ix - 2] && pix == argb[ix - 1] {
                        continue;
                    }
                    if ix >= width + 2
                        && argb[ix - 2] == argb[ix - width - 2]
                        && argb[ix - 1] == argb[ix - width - 1]
                        && pix == argb[ix - width]
                    {
                        continue;
                    }
                    accumulated_red[((pix >> 16) & 0xff) as usize] += 1;
                    accumulated_blue[(pix & 0xff) as usize] += 1;
                }
            }
        }
    }
    codes
}
