//! Color-indexing transform: palette construction, ordering and mapping.

use alloc::collections::BTreeSet;
use alloc::vec;
use alloc::vec::Vec;

use super::types::{subsample_size, sub_pixels, MAX_PALETTE_SIZE};

/// Palettes below this size map pixels by a linear scan.
const APPLY_PALETTE_GREEDY_MAX: usize = 4;
const PALETTE_INV_SIZE_BITS: u32 = 11;
const PALETTE_INV_SIZE: usize = 1 << PALETTE_INV_SIZE_BITS;

/// Palette of at most 256 distinct colors, in encoding order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorIndexTransform {
    pub palette: Vec<u32>,
}

impl ColorIndexTransform {
    /// Collect the distinct colors of `argb`, or `None` once more than 256
    /// are seen.
    ///
    /// Colors are sorted ascending, then reordered greedily when the sorted
    /// deltas change sign within a channel.
    pub fn try_build(argb: &[u32]) -> Option<Self> {
        let mut seen = BTreeSet::new();
        for &pixel in argb {
            if seen.insert(pixel) && seen.len() > MAX_PALETTE_SIZE {
                return None;
            }
        }
        let mut palette: Vec<u32> = seen.into_iter().collect();
        if has_non_monotonous_deltas(&palette) {
            greedy_minimize_deltas(&mut palette);
        }
        Some(Self { palette })
    }

    pub fn len(&self) -> usize {
        self.palette.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.palette.is_empty()
    }

    /// log2 of the number of indices packed into one pixel.
    pub fn xbits(&self) -> u8 {
        match self.palette.len() {
            0..=2 => 3,
            3..=4 => 2,
            5..=16 => 1,
            _ => 0,
        }
    }

    /// Palette as stored in the bitstream: each entry minus its predecessor.
    pub fn delta_coded(&self) -> Vec<u32> {
        let mut prev = 0;
        self.palette
            .iter()
            .map(|&c| {
                let d = sub_pixels(c, prev);
                prev = c;
                d
            })
            .collect()
    }

    /// Replace every pixel by its palette index and bundle indices.
    ///
    /// Returns the packed image and its width.
    pub fn apply(&self, argb: &[u32], width: usize, height: usize) -> (Vec<u32>, usize) {
        let xbits = self.xbits();
        let packed_width = subsample_size(width as u32, xbits) as usize;
        let mut out = vec![0u32; packed_width * height];
        let mut indices = vec![0u8; width];
        let mut lookup = IndexLookup::new(&self.palette);

        for (src, dst) in argb.chunks_exact(width).zip(out.chunks_exact_mut(packed_width)) {
            for (idx, &pixel) in indices.iter_mut().zip(src) {
                *idx = lookup.index_of(pixel);
            }
            bundle_color_map(&indices, xbits, dst);
        }
        (out, packed_width)
    }
}

/// Pack `1 << xbits` indices per output pixel into the green channel.
pub fn bundle_color_map(indices: &[u8], xbits: u8, dst: &mut [u32]) {
    if xbits == 0 {
        for (d, &idx) in dst.iter_mut().zip(indices) {
            *d = 0xff00_0000 | (u32::from(idx) << 8);
        }
        return;
    }
    let bit_depth = 1u32 << (3 - xbits);
    let mask = (1usize << xbits) - 1;
    let mut code = 0xff00_0000;
    for (x, &idx) in indices.iter().enumerate() {
        let xsub = x & mask;
        if xsub == 0 {
            code = 0xff00_0000;
        }
        code |= u32::from(idx) << (8 + bit_depth * xsub as u32);
        dst[x >> xbits] = code;
    }
}

/// True when some RGB channel steps both up and down between adjacent
/// entries (the first entry is measured against black).
fn has_non_monotonous_deltas(palette: &[u32]) -> bool {
    let mut sign_found = 0u8;
    let mut prev = 0;
    for &color in palette {
        let diff = sub_pixels(color, prev);
        for (shift, flag) in [(16, 1u8), (8, 8), (0, 64)] {
            let d = (diff >> shift) as u8;
            if d != 0 {
                sign_found |= if d < 0x80 { flag } else { flag << 1 };
            }
        }
        prev = color;
    }
    (sign_found & (sign_found << 1)) != 0
}

fn component_distance(v: u32) -> u32 {
    if v <= 128 { v } else { 256 - v }
}

/// RGB deltas weigh nine times as much as alpha.
fn palette_color_distance(a: u32, b: u32) -> u32 {
    let diff = sub_pixels(a, b);
    let rgb = component_distance(diff & 0xff)
        + component_distance((diff >> 8) & 0xff)
        + component_distance((diff >> 16) & 0xff);
    9 * rgb + component_distance(diff >> 24)
}

/// Order the palette so each color is the closest remaining one to its
/// predecessor, starting from transparent black.
fn greedy_minimize_deltas(palette: &mut [u32]) {
    let mut predict = 0u32;
    for i in 0..palette.len() {
        let mut best = i;
        let mut best_score = u32::MAX;
        for (k, &c) in palette.iter().enumerate().skip(i) {
            let score = palette_color_distance(c, predict);
            if score < best_score {
                best_score = score;
                best = k;
            }
        }
        palette.swap(i, best);
        predict = palette[i];
    }
}

#[inline]
fn hash0(color: u32) -> usize {
    ((color >> 8) & 0xff) as usize
}

#[inline]
fn hash1(color: u32) -> usize {
    ((color & 0x00ff_ffff).wrapping_mul(4_222_244_071) >> (32 - PALETTE_INV_SIZE_BITS)) as usize
}

#[inline]
fn hash2(color: u32) -> usize {
    ((color & 0x00ff_ffff).wrapping_mul(0x7fff_ffff) >> (32 - PALETTE_INV_SIZE_BITS)) as usize
}

const HASHES: [fn(u32) -> usize; 3] = [hash0, hash1, hash2];

enum IndexLookup<'a> {
    /// Linear scan with a one-entry memo of the last pixel.
    Greedy {
        palette: &'a [u32],
        prev_pix: u32,
        prev_idx: u8,
    },
    /// Collision-free hash of every palette color.
    Hashed {
        hash: fn(u32) -> usize,
        table: Vec<u8>,
    },
    /// Binary search over the sorted palette.
    Sorted { sorted: Vec<u32>, idx_map: Vec<u8> },
}

impl<'a> IndexLookup<'a> {
    fn new(palette: &'a [u32]) -> Self {
        if palette.len() < APPLY_PALETTE_GREEDY_MAX {
            return Self::Greedy {
                palette,
                prev_pix: palette.first().copied().unwrap_or(0),
                prev_idx: 0,
            };
        }
        let mut slots = vec![u16::MAX; PALETTE_INV_SIZE];
        'hashes: for hash in HASHES {
            slots.fill(u16::MAX);
            for (j, &c) in palette.iter().enumerate() {
                let slot = &mut slots[hash(c)];
                if *slot != u16::MAX {
                    continue 'hashes;
                }
                *slot = j as u16;
            }
            let table = slots.iter().map(|&s| s as u8).collect();
            return Self::Hashed { hash, table };
        }

        let mut order: Vec<usize> = (0..palette.len()).collect();
        order.sort_unstable_by_key(|&i| palette[i]);
        Self::Sorted {
            sorted: order.iter().map(|&i| palette[i]).collect(),
            idx_map: order.iter().map(|&i| i as u8).collect(),
        }
    }

    fn index_of(&mut self, pixel: u32) -> u8 {
        match self {
            Self::Greedy {
                palette,
                prev_pix,
                prev_idx,
            } => {
                if pixel != *prev_pix {
                    *prev_idx = match palette.iter().position(|&c| c == pixel) {
                        Some(i) => i as u8,
                        None => unreachable!("pixel {pixel:#010x} missing from palette"),
                    };
                    *prev_pix = pixel;
                }
                *prev_idx
            }
            Self::Hashed { hash, table } => table[hash(pixel)],
            Self::Sorted { sorted, idx_map } => match sorted.binary_search(&pixel) {
                Ok(pos) => idx_map[pos],
                Err(_) => unreachable!("pixel {pixel:#010x} missing from palette"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::vp8l::types::{add_pixels, make_argb};

    fn unbundle(packed: &[u32], xbits: u8, width: usize) -> Vec<u8> {
        let bit_depth = 8 >> xbits;
        let mask = (1u32 << bit_depth) - 1;
        (0..width)
            .map(|x| {
                let code = packed[x >> xbits] >> 8;
                ((code >> (bit_depth * (x as u32 & ((1 << xbits) - 1)))) & mask) as u8
            })
            .collect()
    }

    #[test]
    fn too_many_colors_rejected() {
        let pixels: Vec<u32> = (0..257).map(|i| make_argb(255, (i % 256) as u8, (i / 256) as u8, 0)).collect();
        assert!(ColorIndexTransform::try_build(&pixels).is_none());
        assert_eq!(ColorIndexTransform::try_build(&pixels[..256]).map(|p| p.len()), Some(256));
    }

    #[test]
    fn palette_entries_are_distinct() {
        let pixels: Vec<u32> = (0..1000u32).map(|i| make_argb(255, (i * 7 % 50) as u8, (i % 3) as u8, 9)).collect();
        let t = ColorIndexTransform::try_build(&pixels).expect("palette");
        let set: BTreeSet<u32> = t.palette.iter().copied().collect();
        assert_eq!(set.len(), t.len());
        assert!(t.len() <= MAX_PALETTE_SIZE);
    }

    #[test]
    fn monotonous_palette_stays_sorted() {
        let pixels = [0xff10_2030u32, 0xff00_1020, 0xff20_3040];
        let t = ColorIndexTransform::try_build(&pixels).expect("palette");
        assert_eq!(t.palette, [0xff00_1020, 0xff10_2030, 0xff20_3040]);
    }

    #[test]
    fn sign_detection() {
        assert!(!has_non_monotonous_deltas(&[0x0000_0101, 0x0001_0202]));
        // Blue steps +1, +1, then -3.
        assert!(has_non_monotonous_deltas(&[0x0000_0001, 0x0000_0002, 0x0000_00ff]));
    }

    #[test]
    fn sign_detection_uses_adjacent_deltas() {
        // Raw bytes 0x7f and 0xfe sit on both sides of 0x80, but each step is +0x7f.
        assert!(!has_non_monotonous_deltas(&[0x0000_007f, 0x0000_00fe]));
        // Raw bytes are both at or above 0x80, but the steps are 0x80 (down) then +1.
        assert!(has_non_monotonous_deltas(&[0x0000_0080, 0x0000_0081]));
        // Alpha is ignored.
        assert!(!has_non_monotonous_deltas(&[0x1000_0001, 0xf000_0002]));
    }

    #[test]
    fn greedy_minimization_is_a_fixed_point() {
        let mut palette: Vec<u32> = (0..40u32)
            .map(|i| make_argb(255, (i * 97) as u8, (i * 31 + 200) as u8, (i * 13) as u8))
            .collect();
        palette.sort_unstable();
        greedy_minimize_deltas(&mut palette);
        let once = palette.clone();
        greedy_minimize_deltas(&mut palette);
        assert_eq!(palette, once);
    }

    #[test]
    fn greedy_picks_nearest_neighbour() {
        let mut palette = vec![0x0000_0080, 0x0000_0001, 0x0000_0003];
        greedy_minimize_deltas(&mut palette);
        assert_eq!(palette, [0x0000_0001, 0x0000_0003, 0x0000_0080]);
    }

    #[test]
    fn delta_coding_reconstructs() {
        let t = ColorIndexTransform {
            palette: vec![0xff00_0010, 0xff80_0000, 0x0000_00ff],
        };
        let mut prev = 0;
        let restored: Vec<u32> = t
            .delta_coded()
            .iter()
            .map(|&d| {
                prev = add_pixels(prev, d);
                prev
            })
            .collect();
        assert_eq!(restored, t.palette);
    }

    #[test]
    fn bundling_widths() {
        for (n, xbits) in [(2, 3), (3, 2), (4, 2), (16, 1), (17, 0), (256, 0)] {
            let t = ColorIndexTransform {
                palette: (0..n as u32).collect(),
            };
            assert_eq!(t.xbits(), xbits, "size {n}");
        }
    }

    #[test]
    fn apply_packs_and_maps_every_pixel() {
        let (w, h) = (13, 5);
        for n in [2usize, 3, 4, 7, 16, 40, 256] {
            let colors: Vec<u32> = (0..n as u32).map(|i| make_argb(255, i as u8, (i * 3) as u8, 0x40)).collect();
            let pixels: Vec<u32> = (0..w * h).map(|i| colors[(i * 7 + i / w) % n]).collect();
            let t = ColorIndexTransform::try_build(&pixels).expect("palette");
            let (packed, pw) = t.apply(&pixels, w, h);
            assert_eq!(pw, subsample_size(w as u32, t.xbits()) as usize);
            for y in 0..h {
                let idx = unbundle(&packed[y * pw..(y + 1) * pw], t.xbits(), w);
                for x in 0..w {
                    assert_eq!(t.palette[idx[x] as usize], pixels[y * w + x], "size {n} at ({x},{y})");
                }
            }
            assert!(packed.iter().all(|&p| p >> 24 == 0xff && p & 0x00ff_00ff == 0));
        }
    }

    #[test]
    fn greedy_and_hashed_paths_agree_at_the_boundary() {
        let palette4 = vec![0xff00_0000u32, 0xff10_2030, 0xff40_5060, 0xffff_ffff];
        let pixels: Vec<u32> = (0..64).map(|i| palette4[(i * 5 / 3) % 3]).collect();

        let three = ColorIndexTransform {
            palette: palette4[..3].to_vec(),
        };
        let four = ColorIndexTransform {
            palette: palette4.clone(),
        };
        let mut greedy = IndexLookup::new(&three.palette);
        let mut hashed = IndexLookup::new(&four.palette);
        assert!(matches!(greedy, IndexLookup::Greedy { .. }));
        assert!(matches!(hashed, IndexLookup::Hashed { .. }));
        for &p in &pixels {
            assert_eq!(greedy.index_of(p), hashed.index_of(p));
        }
    }

    #[test]
    fn colliding_palette_falls_back_to_binary_search() {
        // Same green everywhere defeats hash0; the remaining hashes only see
        // the low 24 bits, so alpha-only differences collide in all three.
        let palette: Vec<u32> = (0..8u32).map(|a| (a << 24) | 0x0012_3456).collect();
        let mut lookup = IndexLookup::new(&palette);
        assert!(matches!(lookup, IndexLookup::Sorted { .. }));
        for (i, &c) in palette.iter().enumerate() {
            assert_eq!(lookup.index_of(c) as usize, i);
        }
    }
}
