//! Histogram building and cost estimation for VP8L encoding.
//!
//! Histograms track symbol frequencies for one Huffman code group (five
//! alphabets) together with cached cost estimates used by clustering.

use alloc::vec;
use alloc::vec::Vec;

use super::backward_refs::distance_to_plane_code;
use super::entropy::{
    combined_entropy_unrefined, entropy_unrefined, final_huffman_cost,
    BitEntropy, Streaks,
};
use super::types::{
    argb_alpha, argb_blue, argb_green, argb_red, BackwardRefs, PixOrCopy, NUM_DISTANCE_CODES,
    NUM_LENGTH_CODES, NUM_LITERAL_CODES,
};

/// Marker for "more than one symbol" in [`Histogram::trivial_symbol`].
pub const NON_TRIVIAL_SYM: u32 = 0xffff_ffff;

/// VP8L histogram for a single Huffman code group.
#[derive(Debug, Clone)]
pub struct Histogram {
    /// Green channel + length codes + cache codes (256 + 24 + cache_size).
    pub literal: Vec<u32>,
    pub red: [u32; 256],
    pub blue: [u32; 256],
    pub alpha: [u32; 256],
    /// Distance prefix codes.
    pub distance: [u32; NUM_DISTANCE_CODES],
    pub cache_bits: u8,
    /// `a << 24 | r << 16 | b` when alpha, red and blue each use one symbol.
    pub trivial_symbol: u32,
    /// Estimated total cost in bits (cached).
    pub bit_cost: f64,
    pub literal_cost: f64,
    pub red_cost: f64,
    pub blue_cost: f64,
    /// Whether each of the five alphabets has any non-zero count.
    pub is_used: [bool; 5],
}

impl Histogram {
    pub fn new(cache_bits: u8) -> Self {
        Self {
            literal: vec![0; literal_alphabet_size(cache_bits)],
            red: [0; 256],
            blue: [0; 256],
            alpha: [0; 256],
            distance: [0; NUM_DISTANCE_CODES],
            cache_bits,
            trivial_symbol: NON_TRIVIAL_SYM,
            bit_cost: 0.0,
            literal_cost: 0.0,
            red_cost: 0.0,
            blue_cost: 0.0,
            is_used: [false; 5],
        }
    }

    /// Build a histogram from a whole token stream of an image `xsize` wide.
    pub fn from_refs(refs: &BackwardRefs, cache_bits: u8, xsize: usize) -> Self {
        let mut h = Self::new(cache_bits);
        for token in refs.iter() {
            h.add_token(token, xsize);
        }
        h
    }

    /// Count one token, mapping copy distances to plane codes.
    #[inline]
    pub fn add_token(&mut self, token: &PixOrCopy, xsize: usize) {
        match *token {
            PixOrCopy::Literal(argb) => self.add_literal(argb),
            PixOrCopy::CacheIdx(idx) => self.add_cache_idx(u32::from(idx)),
            PixOrCopy::Copy { len, dist } => {
                self.add_length(usize::from(len));
                let plane = distance_to_plane_code(xsize, dist as usize);
                let (dist_code, _, _) = prefix_encode(plane);
                self.distance[dist_code as usize] += 1;
            }
        }
    }

    #[inline]
    pub fn add_literal(&mut self, argb: u32) {
        self.alpha[argb_alpha(argb) as usize] += 1;
        self.red[argb_red(argb) as usize] += 1;
        self.literal[argb_green(argb) as usize] += 1;
        self.blue[argb_blue(argb) as usize] += 1;
    }

    #[inline]
    pub fn add_cache_idx(&mut self, key: u32) {
        let code = NUM_LITERAL_CODES + NUM_LENGTH_CODES + key as usize;
        debug_assert!(code < self.literal.len());
        self.literal[code] += 1;
    }

    /// Count only the length prefix of a copy.
    #[inline]
    pub fn add_length(&mut self, len: usize) {
        let (len_code, _, _) = prefix_encode(len as u32);
        self.literal[NUM_LITERAL_CODES + len_code as usize] += 1;
    }

    #[inline]
    pub fn num_codes(&self) -> usize {
        literal_alphabet_size(self.cache_bits)
    }

    /// Estimated bits to code this histogram, tables included.
    pub fn estimate_bits(&self) -> f64 {
        population_cost(&self.literal).cost
            + population_cost(&self.red).cost
            + population_cost(&self.blue).cost
            + population_cost(&self.alpha).cost
            + population_cost(&self.distance).cost
            + extra_cost(&self.literal[NUM_LITERAL_CODES..], NUM_LENGTH_CODES)
            + extra_cost(&self.distance, NUM_DISTANCE_CODES)
    }

    /// Refresh the cached costs, the used flags and the trivial symbol.
    pub fn update_cost(&mut self) {
        let alpha = population_cost(&self.alpha);
        let distance = population_cost(&self.distance);
        let literal = population_cost(&self.literal);
        let red = population_cost(&self.red);
        let blue = population_cost(&self.blue);

        self.is_used = [
            literal.is_used,
            red.is_used,
            blue.is_used,
            alpha.is_used,
            distance.is_used,
        ];
        self.literal_cost =
            literal.cost + extra_cost(&self.literal[NUM_LITERAL_CODES..], NUM_LENGTH_CODES);
        self.red_cost = red.cost;
        self.blue_cost = blue.cost;
        self.bit_cost = self.literal_cost
            + self.red_cost
            + self.blue_cost
            + alpha.cost
            + distance.cost
            + extra_cost(&self.distance, NUM_DISTANCE_CODES);

        self.trivial_symbol = if alpha.trivial_symbol == NON_TRIVIAL_SYM
            || red.trivial_symbol == NON_TRIVIAL_SYM
            || blue.trivial_symbol == NON_TRIVIAL_SYM
        {
            NON_TRIVIAL_SYM
        } else {
            (alpha.trivial_symbol << 24) | (red.trivial_symbol << 16) | blue.trivial_symbol
        };
    }

    pub fn is_empty(&self) -> bool {
        self.is_used.iter().all(|&u| !u)
    }

    /// Merge `other` into `self`. Cached costs are left for the caller.
    pub fn add(&mut self, other: &Histogram) {
        debug_assert_eq!(self.cache_bits, other.cache_bits);
        add_vector(&mut self.literal, &other.literal);
        add_vector(&mut self.red, &other.red);
        add_vector(&mut self.blue, &other.blue);
        add_vector(&mut self.alpha, &other.alpha);
        add_vector(&mut self.distance, &other.distance);
        for (a, b) in self.is_used.iter_mut().zip(other.is_used) {
            *a |= b;
        }
        if self.trivial_symbol != other.trivial_symbol {
            self.trivial_symbol = NON_TRIVIAL_SYM;
        }
    }

    /// Cost of the merged histogram `self + b`, starting from `cost_initial`.
    ///
    /// Returns `None` as soon as the running cost exceeds `cost_threshold`.
    pub fn combined_cost(&self, b: &Histogram, cost_initial: f64, cost_threshold: f64) -> Option<f64> {
        let num_codes = self.num_codes();
        let mut cost = cost_initial;

        cost += combined_population_cost(
            &self.literal[..num_codes],
            &b.literal[..num_codes],
            self.is_used[0],
            b.is_used[0],
            false,
        );
        cost += extra_cost_combined(
            &self.literal[NUM_LITERAL_CODES..],
            &b.literal[NUM_LITERAL_CODES..],
            NUM_LENGTH_CODES,
        );
        if cost > cost_threshold {
            return None;
        }

        let trivial_at_end = self.trivial_symbol != NON_TRIVIAL_SYM
            && self.trivial_symbol == b.trivial_symbol
            && [24u32, 16, 0]
                .into_iter()
                .map(|shift| (self.trivial_symbol >> shift) & 0xff)
                .all(|c| c == 0 || c == 0xff);

        let channels: [(&[u32], &[u32], usize); 3] =
            [(&self.red, &b.red, 1), (&self.blue, &b.blue, 2), (&self.alpha, &b.alpha, 3)];
        for (x, y, used) in channels {
            cost += combined_population_cost(
                x,
                y,
                self.is_used[used],
                b.is_used[used],
                trivial_at_end,
            );
            if cost > cost_threshold {
                return None;
            }
        }

        cost += combined_population_cost(
            &self.distance,
            &b.distance,
            self.is_used[4],
            b.is_used[4],
            false,
        );
        if cost > cost_threshold {
            return None;
        }
        cost += extra_cost_combined(&self.distance, &b.distance, NUM_DISTANCE_CODES);
        if cost > cost_threshold {
            return None;
        }
        Some(cost)
    }

    /// Evaluate merging `b` into `self`.
    ///
    /// Returns the cost difference `cost(a + b) - cost(a) - cost(b)` and the
    /// merged histogram if that difference does not exceed `threshold`.
    pub fn add_eval(&self, b: &Histogram, threshold: f64) -> Option<(f64, Histogram)> {
        let sum_cost = self.bit_cost + b.bit_cost;
        let cost = self.combined_cost(b, 0.0, threshold + sum_cost)?;
        let mut merged = self.clone();
        merged.add(b);
        merged.bit_cost = cost;
        Some((cost - sum_cost, merged))
    }

    /// Extra cost of folding `b` into `self`: `cost(a + b) - cost(a)`.
    pub fn add_thresh(&self, b: &Histogram, threshold: f64) -> Option<f64> {
        self.combined_cost(b, -self.bit_cost, threshold)
    }
}

/// Literal alphabet size including cache codes.
#[inline]
pub fn literal_alphabet_size(cache_bits: u8) -> usize {
    NUM_LITERAL_CODES + NUM_LENGTH_CODES + if cache_bits > 0 { 1 << cache_bits } else { 0 }
}

/// Split a length or plane code into `(prefix code, extra bit count, extra bits)`.
#[inline]
pub fn prefix_encode(value: u32) -> (u32, u32, u32) {
    debug_assert!(value >= 1);
    if value <= 4 {
        return (value - 1, 0, 0);
    }
    let d = value - 1;
    let highest_bit = 31 - d.leading_zeros();
    let second_highest_bit = (d >> (highest_bit - 1)) & 1;
    let n_extra = highest_bit - 1;
    let extra = d & ((1 << n_extra) - 1);
    (2 * highest_bit + second_highest_bit, n_extra, extra)
}

/// Number of extra bits carried by prefix code `code`.
#[cfg(test)]
pub fn prefix_extra_bits(code: u32) -> u32 {
    if code < 4 {
        0
    } else {
        (code >> 1) - 1
    }
}

#[derive(Debug, Clone, Copy)]
struct PopulationCost {
    cost: f64,
    trivial_symbol: u32,
    is_used: bool,
}

fn population_cost(population: &[u32]) -> PopulationCost {
    let (entropy, stats) = entropy_unrefined(population);
    PopulationCost {
        cost: entropy.refine() + final_huffman_cost(&stats),
        trivial_symbol: if entropy.nonzeros == 1 {
            entropy.nonzero_code
        } else {
            NON_TRIVIAL_SYM
        },
        is_used: stats.streaks[1][0] != 0 || stats.streaks[1][1] != 0,
    }
}

fn combined_population_cost(
    x: &[u32],
    y: &[u32],
    x_used: bool,
    y_used: bool,
    trivial_at_end: bool,
) -> f64 {
    let length = x.len() as u32;
    if trivial_at_end {
        // A single non-zero value at index 0 or length-1; its entropy is
        // zero, only the table cost remains.
        let mut stats = Streaks::default();
        stats.streaks[1][0] = 1;
        stats.counts[0] = 1;
        stats.streaks[0][1] = length - 1;
        return final_huffman_cost(&stats);
    }
    let (entropy, stats) = match (x_used, y_used) {
        (true, true) => combined_entropy_unrefined(x, y),
        (true, false) => entropy_unrefined(x),
        (false, true) => entropy_unrefined(y),
        (false, false) => {
            let mut stats = Streaks::default();
            stats.counts[0] = 1;
            stats.streaks[0][usize::from(length > 3)] = length;
            (BitEntropy::default(), stats)
        }
    };
    entropy.refine() + final_huffman_cost(&stats)
}

/// Cost of the raw extra bits of a prefix-coded population.
fn extra_cost(population: &[u32], length: usize) -> f64 {
    (2..length - 2)
        .map(|i| ((i >> 1) as f64) * f64::from(population[i + 2]))
        .sum()
}

fn extra_cost_combined(x: &[u32], y: &[u32], length: usize) -> f64 {
    (2..length - 2)
        .map(|i| ((i >> 1) as f64) * f64::from(x[i + 2] + y[i + 2]))
        .sum()
}

#[inline]
fn add_vector(dst: &mut [u32], src: &[u32]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram_of(pixels: &[u32]) -> Histogram {
        let mut refs = BackwardRefs::default();
        for &p in pixels {
            refs.push(PixOrCopy::literal(p));
        }
        let mut h = Histogram::from_refs(&refs, 0, 16);
        h.update_cost();
        h
    }

    #[test]
    fn prefix_codes() {
        assert_eq!(prefix_encode(1), (0, 0, 0));
        assert_eq!(prefix_encode(4), (3, 0, 0));
        assert_eq!(prefix_encode(5), (4, 1, 0));
        assert_eq!(prefix_encode(6), (4, 1, 1));
        assert_eq!(prefix_encode(7), (5, 1, 0));
        assert_eq!(prefix_encode(4095).0, 23);
        for v in 1..=4095u32 {
            let (code, n_extra, extra) = prefix_encode(v);
            assert!(code < NUM_LENGTH_CODES as u32);
            assert_eq!(prefix_extra_bits(code), n_extra);
            assert!(extra < (1 << n_extra).max(1));
        }
        assert_eq!(prefix_encode(1 << 20).0, 39);
    }

    #[test]
    fn literal_channels_land_in_their_tables() {
        let h = histogram_of(&[0xFF11_2233]);
        assert_eq!(h.literal[0x22], 1);
        assert_eq!(h.red[0x11], 1);
        assert_eq!(h.blue[0x33], 1);
        assert_eq!(h.alpha[0xFF], 1);
        assert_eq!(h.trivial_symbol, 0xFF11_0033);
        assert_eq!(h.is_used, [true, true, true, true, false]);
    }

    #[test]
    fn copy_counts_length_and_plane_code() {
        let mut h = Histogram::new(0);
        // One row up in a 16-wide image has plane code 1.
        h.add_token(&PixOrCopy::copy(10, 16), 16);
        assert_eq!(h.distance[0], 1);
        let (len_code, _, _) = prefix_encode(10);
        assert_eq!(h.literal[NUM_LITERAL_CODES + len_code as usize], 1);
    }

    #[test]
    fn alphabet_sizes() {
        assert_eq!(literal_alphabet_size(0), 280);
        assert_eq!(literal_alphabet_size(1), 282);
        assert_eq!(literal_alphabet_size(10), 1304);
    }

    #[test]
    fn update_cost_matches_estimate() {
        let h = histogram_of(&[1, 2, 3, 0xff00_ff00, 7, 7, 7, 9]);
        assert!((h.bit_cost - h.estimate_bits()).abs() < 1e-9);
    }

    #[test]
    fn add_eval_reports_merged_cost() {
        let a = histogram_of(&[0xff00_0000, 0xff01_0203, 0xff10_2030, 0xff00_0000]);
        let b = histogram_of(&[0xff00_0001, 0xff01_0203, 0xff00_0004]);
        let (diff, merged) = a.add_eval(&b, f64::MAX / 4.0).unwrap();
        assert!((merged.bit_cost - merged.estimate_bits()).abs() < 1e-6);
        assert!((diff - (merged.bit_cost - a.bit_cost - b.bit_cost)).abs() < 1e-9);
    }

    #[test]
    fn trivial_shortcut_matches_full_cost() {
        // Palette-like pixels: alpha 0xff, red 0, blue 0, varying green.
        let a = histogram_of(&[0xff00_0100, 0xff00_0200, 0xff00_0300]);
        let b = histogram_of(&[0xff00_0400, 0xff00_0100]);
        assert_eq!(a.trivial_symbol, 0xff00_0000);
        let (_, merged) = a.add_eval(&b, f64::MAX / 4.0).unwrap();
        assert!((merged.bit_cost - merged.estimate_bits()).abs() < 1e-6);
        assert_eq!(merged.trivial_symbol, 0xff00_0000);
    }

    #[test]
    fn threshold_aborts_evaluation() {
        let a = histogram_of(&[1, 2, 3, 4, 5]);
        let b = histogram_of(&[6, 7, 8, 9, 10]);
        assert!(a.add_eval(&b, -1e9).is_none());
        assert!(a.add_thresh(&b, -1e9).is_none());
        assert!(a.add_thresh(&b, f64::MAX).is_some());
    }
}
