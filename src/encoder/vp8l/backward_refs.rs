//! Backward reference construction.
//!
//! Turns pixels into a stream of literals, cache indices and LZ77 copies.
//! Several strategies are tried and the cheapest stream (by estimated
//! histogram cost) is kept, optionally refined by the cost-driven
//! [`trace_backwards`](super::cost_model::trace_backwards) pass.

use alloc::vec::Vec;

use super::color_cache::{hash_pix, ColorCache};
use super::cost_model::trace_backwards;
use super::hash_chain::{find_match_length, max_find_copy_length, HashChain};
use super::histogram::Histogram;
use super::types::{BackwardRefs, PixOrCopy, Vp8lQuality, MAX_LENGTH, MIN_LENGTH, NUM_PLANE_CODES};

/// Number of spiral offsets the box search looks at.
const WINDOW_OFFSETS_SIZE_MAX: usize = 32;

/// Reverse lookup: `yoffset * 16 + 8 - xoffset` to distance code minus one.
#[rustfmt::skip]
const PLANE_TO_CODE_LUT: [u8; 128] = [
    96,  73,  55,  39,  23, 13, 5,  1,  255, 255, 255, 255, 255, 255, 255, 255,
    101, 78,  58,  42,  26, 16, 8,  2,  0,   3,   9,   17,  27,  43,  59,  79,
    102, 86,  62,  46,  32, 20, 10, 6,  4,   7,   11,  21,  33,  47,  63,  87,
    105, 90,  70,  52,  37, 28, 18, 14, 12,  15,  19,  29,  38,  53,  71,  91,
    110, 99,  82,  66,  48, 35, 30, 24, 22,  25,  31,  36,  49,  67,  83,  100,
    115, 108, 94,  76,  64, 50, 44, 40, 34,  41,  45,  51,  65,  77,  95,  109,
    118, 113, 103, 92,  80, 68, 60, 56, 54,  57,  61,  69,  81,  93,  104, 114,
    119, 116, 111, 106, 97, 88, 84, 74, 72,  75,  85,  89,  98,  107, 112, 117
];

/// Map a linear pixel distance to its VP8L distance code.
///
/// Small 2D displacements get codes 1..=120 in spiral order; everything
/// else is `dist + 120`.
pub fn distance_to_plane_code(xsize: usize, dist: usize) -> u32 {
    let yoffset = dist / xsize;
    let xoffset = dist - yoffset * xsize;
    if xoffset <= 8 && yoffset < 8 {
        u32::from(PLANE_TO_CODE_LUT[yoffset * 16 + 8 - xoffset]) + 1
    } else if xoffset + 8 > xsize && yoffset < 7 {
        u32::from(PLANE_TO_CODE_LUT[(yoffset + 1) * 16 + 8 + (xsize - xoffset)]) + 1
    } else {
        dist as u32 + NUM_PLANE_CODES
    }
}

/// LZ77 parsing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lz77Kind {
    /// Hash-chain matches with max-reach lookahead.
    Standard,
    /// Runs of the previous pixel or the row above only.
    Rle,
    /// Matches restricted to a small spiral window of 2D offsets.
    Box,
}

/// Reusable buffers for reference construction.
#[derive(Debug, Default)]
pub struct RefsScratch {
    pub hash_chain: HashChain,
    box_chain: HashChain,
    counts: Vec<u16>,
}

/// Chosen token stream and the color cache size it was built for.
#[derive(Debug)]
pub struct ChosenRefs {
    pub refs: BackwardRefs,
    pub cache_bits: u8,
    pub kind: Lz77Kind,
}

/// Try every strategy in `kinds`, pick the cheapest, and refine it.
///
/// `scratch.hash_chain` must already be filled for `argb`. `cache_bits_max`
/// bounds the color cache; the actual size is chosen by cost.
pub fn get_backward_references(
    argb: &[u32],
    xsize: usize,
    quality: Vp8lQuality,
    kinds: &[Lz77Kind],
    cache_bits_max: u8,
    scratch: &mut RefsScratch,
) -> ChosenRefs {
    let mut best: Option<(ChosenRefs, f64)> = None;

    for &kind in kinds {
        let mut refs = BackwardRefs::with_capacity(argb.len());
        match kind {
            Lz77Kind::Rle => lz77_rle(argb, xsize, &mut refs),
            Lz77Kind::Standard => lz77_standard(argb, &scratch.hash_chain, &mut refs),
            Lz77Kind::Box => {
                fill_box_chain(argb, xsize, &scratch.hash_chain, &mut scratch.counts, &mut scratch.box_chain);
                lz77_standard(argb, &scratch.box_chain, &mut refs);
            }
        }

        let cache_bits = best_cache_size(argb, quality.quality, &refs, cache_bits_max);
        if cache_bits > 0 {
            with_local_cache(argb, cache_bits, &mut refs);
        }

        let cost = Histogram::from_refs(&refs, cache_bits, xsize).estimate_bits();
        log::trace!("lz77 {kind:?}: cache_bits={cache_bits} cost={cost:.0}");
        if best.as_ref().map_or(true, |(_, best_cost)| cost < *best_cost) {
            best = Some((ChosenRefs { refs, cache_bits, kind }, cost));
        }
    }

    let Some((mut chosen, best_cost)) = best else {
        return ChosenRefs {
            refs: literals_only(argb),
            cache_bits: 0,
            kind: Lz77Kind::Standard,
        };
    };

    // Cost-driven refinement is only worth it for the hash-chain strategies.
    if quality.quality >= 25 && chosen.kind != Lz77Kind::Rle && !argb.is_empty() {
        let chain = match chosen.kind {
            Lz77Kind::Box => &scratch.box_chain,
            _ => &scratch.hash_chain,
        };
        let traced = trace_backwards(argb, xsize, chosen.cache_bits, chain, &chosen.refs);
        let traced_cost = Histogram::from_refs(&traced, chosen.cache_bits, xsize).estimate_bits();
        if traced_cost < best_cost {
            log::trace!("trace-back: {best_cost:.0} -> {traced_cost:.0}");
            chosen.refs = traced;
        }
    }
    chosen
}

fn literals_only(argb: &[u32]) -> BackwardRefs {
    BackwardRefs {
        tokens: argb.iter().map(|&p| PixOrCopy::literal(p)).collect(),
    }
}

/// Greedy LZ77 over the matches recorded in `chain`.
///
/// At every match the split `[i, j) + [j, j + len_j)` that reaches furthest
/// is preferred over blindly taking the whole match at `i`.
pub fn lz77_standard(argb: &[u32], chain: &HashChain, refs: &mut BackwardRefs) {
    refs.clear();
    let pix_count = argb.len();
    let mut i = 0;
    while i < pix_count {
        let (offset, mut len) = chain.find_copy(i);
        if len >= MIN_LENGTH {
            let j_max = (i + len).min(pix_count - 1);
            let mut max_reach = 0;
            for j in i + 1..=j_max {
                let len_j = chain.length(j);
                let reach = j + if len_j >= MIN_LENGTH { len_j } else { 1 };
                if reach > max_reach {
                    len = j - i;
                    max_reach = reach;
                    if max_reach >= pix_count {
                        break;
                    }
                }
            }
        } else {
            len = 1;
        }

        if len == 1 {
            refs.push(PixOrCopy::literal(argb[i]));
        } else {
            refs.push(PixOrCopy::copy(len, offset));
        }
        i += len;
    }
}

/// Run-length parsing against the previous pixel and the row above.
pub fn lz77_rle(argb: &[u32], xsize: usize, refs: &mut BackwardRefs) {
    refs.clear();
    let pix_count = argb.len();
    if pix_count == 0 {
        return;
    }
    refs.push(PixOrCopy::literal(argb[0]));
    let mut i = 1;
    while i < pix_count {
        let max_len = max_find_copy_length(pix_count - i);
        let rle_len = find_match_length(&argb[i..], &argb[i - 1..], 0, max_len);
        let prev_row_len = if i < xsize {
            0
        } else {
            find_match_length(&argb[i..], &argb[i - xsize..], 0, max_len)
        };
        if rle_len >= prev_row_len && rle_len >= MIN_LENGTH {
            refs.push(PixOrCopy::copy(rle_len, 1));
            i += rle_len;
        } else if prev_row_len >= MIN_LENGTH {
            refs.push(PixOrCopy::copy(prev_row_len, xsize));
            i += prev_row_len;
        } else {
            refs.push(PixOrCopy::literal(argb[i]));
            i += 1;
        }
    }
}

/// Spiral offsets (in plane-code order) usable in an image `xsize` wide.
fn window_offsets(xsize: usize) -> Vec<usize> {
    let mut offsets = [0usize; WINDOW_OFFSETS_SIZE_MAX];
    for y in 0..=6isize {
        for x in -6..=6isize {
            let offset = y * xsize as isize + x;
            if offset <= 0 {
                continue;
            }
            let plane_code = distance_to_plane_code(xsize, offset as usize) as usize - 1;
            if plane_code < WINDOW_OFFSETS_SIZE_MAX {
                offsets[plane_code] = offset as usize;
            }
        }
    }
    // Narrow images do not reach every code.
    offsets.into_iter().filter(|&o| o != 0).collect()
}

/// Fill `out` with matches restricted to the spiral window.
///
/// Runs of equal pixels are compared run by run through `counts`, so the
/// search cost is bounded by the number of color changes.
fn fill_box_chain(argb: &[u32], xsize: usize, best: &HashChain, counts: &mut Vec<u16>, out: &mut HashChain) {
    let pix_count = argb.len();
    out.clear_to(pix_count);
    if pix_count < 2 {
        return;
    }

    // counts[i]: how many times argb[i] repeats from i, capped at MAX_LENGTH.
    counts.clear();
    counts.resize(pix_count, 1);
    for i in (0..pix_count - 1).rev() {
        if argb[i] == argb[i + 1] {
            let next = counts[i + 1];
            counts[i] = if usize::from(next) == MAX_LENGTH { next } else { next + 1 };
        }
    }

    let offsets = window_offsets(xsize);
    // Offsets reaching pixels that P-1 cannot reach with any window offset.
    let offsets_new: Vec<usize> = offsets
        .iter()
        .copied()
        .filter(|&o| !offsets.iter().any(|&p| o == p + 1))
        .collect();

    let mut best_offset_prev = 0usize;
    let mut best_length_prev = 0usize;
    for i in 1..pix_count {
        let mut best_length = best.length(i);
        let mut best_offset = 0;
        let mut do_compute = true;
        if best_length >= MAX_LENGTH {
            // A maximal match inside the window cannot be improved.
            best_offset = best.offset(i);
            do_compute = !offsets.contains(&best_offset);
        }

        if do_compute {
            let use_prev = best_length_prev > 1 && best_length_prev < MAX_LENGTH;
            let candidates = if use_prev { &offsets_new } else { &offsets };
            best_length = if use_prev { best_length_prev - 1 } else { 0 };
            best_offset = if use_prev { best_offset_prev } else { 0 };

            for &candidate in candidates {
                if candidate > i || argb[i - candidate] != argb[i] {
                    continue;
                }
                let mut j_offset = i - candidate;
                let mut j = i;
                let mut curr_length = 0usize;
                loop {
                    let run_offset = usize::from(counts[j_offset]);
                    let run = usize::from(counts[j]);
                    if run_offset != run {
                        curr_length += run_offset.min(run);
                        break;
                    }
                    curr_length += run;
                    j_offset += run;
                    j += run;
                    if curr_length > MAX_LENGTH || j >= pix_count || argb[j_offset] != argb[j] {
                        break;
                    }
                }
                if best_length < curr_length {
                    best_offset = candidate;
                    if curr_length >= MAX_LENGTH {
                        best_length = MAX_LENGTH;
                        break;
                    }
                    best_length = curr_length;
                }
            }
        }

        if best_length <= MIN_LENGTH {
            best_offset_prev = 0;
            best_length_prev = 0;
        } else {
            out.set_copy(i, best_offset, best_length);
            best_offset_prev = best_offset;
            best_length_prev = best_length;
        }
    }
}

/// Replace literals by cache indices where a cache of `cache_bits` hits.
///
/// `refs` must have been built without a cache.
pub fn with_local_cache(argb: &[u32], cache_bits: u8, refs: &mut BackwardRefs) {
    let mut cache = ColorCache::new(cache_bits);
    let mut pos = 0usize;
    for token in refs.tokens.iter_mut() {
        match *token {
            PixOrCopy::Literal(argb_literal) => {
                if let Some(key) = cache.contains(argb_literal) {
                    *token = PixOrCopy::cache_idx(key);
                } else {
                    cache.insert(argb_literal);
                }
                pos += 1;
            }
            PixOrCopy::CacheIdx(_) => pos += 1,
            PixOrCopy::Copy { len, .. } => {
                let len = usize::from(len);
                for &p in &argb[pos..pos + len] {
                    cache.insert(p);
                }
                pos += len;
            }
        }
    }
}

/// Cache size in `0..=cache_bits_max` whose token histogram is cheapest.
///
/// Every size is simulated in one pass: the key for `n` bits is the key for
/// the largest size shifted right.
fn best_cache_size(argb: &[u32], quality: u8, refs: &BackwardRefs, cache_bits_max: u8) -> u8 {
    let cache_bits_max = if quality <= 25 { 0 } else { cache_bits_max };
    if cache_bits_max == 0 {
        return 0;
    }

    let max = usize::from(cache_bits_max);
    let mut histos: Vec<Histogram> = (0..=cache_bits_max).map(Histogram::new).collect();
    // caches[i] simulates a cache of i + 1 bits.
    let mut caches: Vec<ColorCache> = (1..=cache_bits_max).map(ColorCache::new).collect();
    let hash_shift = 32 - u32::from(cache_bits_max);

    let mut pos = 0usize;
    for token in refs.iter() {
        match *token {
            PixOrCopy::Copy { len, .. } => {
                // Distances cost the same whatever the cache size; only the
                // length prefix lives in the literal alphabet.
                let len = usize::from(len);
                for h in histos.iter_mut() {
                    h.add_length(len);
                }
                let mut prev = argb[pos] ^ 0xffff_ffff;
                for &pix in &argb[pos..pos + len] {
                    if pix != prev {
                        let mut key = hash_pix(pix, hash_shift);
                        for cache in caches.iter_mut().rev() {
                            cache.set(key, pix);
                            key >>= 1;
                        }
                        prev = pix;
                    }
                }
                pos += len;
            }
            _ => {
                let pix = argb[pos];
                pos += 1;
                histos[0].add_literal(pix);
                let mut key = hash_pix(pix, hash_shift);
                for bits in (1..=max).rev() {
                    let cache = &mut caches[bits - 1];
                    if cache.lookup(key) == pix {
                        histos[bits].add_cache_idx(key);
                    } else {
                        cache.set(key, pix);
                        histos[bits].add_literal(pix);
                    }
                    key >>= 1;
                }
            }
        }
    }

    let mut best_bits = 0u8;
    let mut entropy_min = f64::MAX;
    for (bits, histo) in histos.iter().enumerate() {
        let entropy = histo.estimate_bits();
        if bits == 0 || entropy < entropy_min {
            entropy_min = entropy;
            best_bits = bits as u8;
        }
    }
    best_bits
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::vec;

    /// Decode a token stream back to pixels, replaying the color cache.
    pub(crate) fn replay(refs: &BackwardRefs, cache_bits: u8) -> Vec<u32> {
        let mut out: Vec<u32> = Vec::new();
        let mut cache = (cache_bits > 0).then(|| ColorCache::new(cache_bits));
        for token in refs.iter() {
            let start = out.len();
            match *token {
                PixOrCopy::Literal(p) => out.push(p),
                PixOrCopy::CacheIdx(key) => {
                    let cache = cache.as_ref().expect("cache index without a cache");
                    out.push(cache.lookup(u32::from(key)));
                }
                PixOrCopy::Copy { len, dist } => {
                    let dist = dist as usize;
                    assert!(dist >= 1 && dist <= out.len(), "distance {dist} at {}", out.len());
                    for _ in 0..len {
                        out.push(out[out.len() - dist]);
                    }
                }
            }
            if let Some(cache) = cache.as_mut() {
                for &p in &out[start..] {
                    cache.insert(p);
                }
            }
        }
        out
    }

    fn quality(q: u8) -> Vp8lQuality {
        Vp8lQuality { quality: q, method: 4 }
    }

    /// Distance code lookup table for 2D neighborhood.
    /// Maps (xoffset, yoffset) pairs to distance codes 1-120.
    #[rustfmt::skip]
    const DISTANCE_MAP: [(i8, i8); 120] = [
        (0, 1),  (1, 0),  (1, 1),  (-1, 1), (0, 2),  (2, 0),  (1, 2),  (-1, 2),
        (2, 1),  (-2, 1), (2, 2),  (-2, 2), (0, 3),  (3, 0),  (1, 3),  (-1, 3),
        (3, 1),  (-3, 1), (2, 3),  (-2, 3), (3, 2),  (-3, 2), (0, 4),  (4, 0),
        (1, 4),  (-1, 4), (4, 1),  (-4, 1), (3, 3),  (-3, 3), (2, 4),  (-2, 4),
        (4, 2),  (-4, 2), (0, 5),  (3, 4),  (-3, 4), (4, 3),  (-4, 3), (5, 0),
        (1, 5),  (-1, 5), (5, 1),  (-5, 1), (2, 5),  (-2, 5), (5, 2),  (-5, 2),
        (4, 4),  (-4, 4), (3, 5),  (-3, 5), (5, 3),  (-5, 3), (0, 6),  (6, 0),
        (1, 6),  (-1, 6), (6, 1),  (-6, 1), (2, 6),  (-2, 6), (6, 2),  (-6, 2),
        (4, 5),  (-4, 5), (5, 4),  (-5, 4), (3, 6),  (-3, 6), (6, 3),  (-6, 3),
        (0, 7),  (7, 0),  (1, 7),  (-1, 7), (5, 5),  (-5, 5), (7, 1),  (-7, 1),
        (4, 6),  (-4, 6), (6, 4),  (-6, 4), (2, 7),  (-2, 7), (7, 2),  (-7, 2),
        (3, 7),  (-3, 7), (7, 3),  (-7, 3), (5, 6),  (-5, 6), (6, 5),  (-6, 5),
        (8, 0),  (4, 7),  (-4, 7), (7, 4),  (-7, 4), (8, 1),  (8, 2),  (6, 6),
        (-6, 6), (8, 3),  (5, 7),  (-5, 7), (7, 5),  (-7, 5), (8, 4),  (6, 7),
        (-6, 7), (7, 6),  (-7, 6), (8, 5),  (7, 7),  (-7, 7), (8, 6),  (8, 7)
    ];

    /// Inverse of [`distance_to_plane_code`], clamped to a distance of at least 1.
    fn plane_code_to_distance(xsize: usize, code: u32) -> usize {
        if code > NUM_PLANE_CODES {
            (code - NUM_PLANE_CODES) as usize
        } else {
            let (xoff, yoff) = DISTANCE_MAP[(code - 1) as usize];
            let dist = i64::from(xoff) + i64::from(yoff) * xsize as i64;
            dist.max(1) as usize
        }
    }


    fn noisy_image(width: usize, height: usize, colors: u32) -> Vec<u32> {
        let mut state = 7u32;
        (0..width * height)
            .map(|i| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                // Blocky content with a little noise.
                if (state >> 16) % 7 == 0 {
                    0xff00_0000 | ((state >> 8) % colors)
                } else {
                    0xff00_0000 | (((i % width) / 5 + (i / width) / 3) as u32 % colors) * 0x0001_0203
                }
            })
            .collect()
    }

    #[test]
    fn plane_code_lut_inverts_spiral() {
        let xsize = 64;
        for code in 1..=NUM_PLANE_CODES {
            let dist = plane_code_to_distance(xsize, code);
            assert_eq!(distance_to_plane_code(xsize, dist), code, "code {code}");
        }
    }

    #[test]
    fn plane_codes_for_neighbours() {
        assert_eq!(distance_to_plane_code(8, 8), 1);
        assert_eq!(distance_to_plane_code(8, 8), u32::from(PLANE_TO_CODE_LUT[24]) + 1);
        assert_eq!(distance_to_plane_code(100, 1), 2);
        assert_eq!(distance_to_plane_code(100, 100), 1);
        // Up one row and one to the right.
        assert_eq!(distance_to_plane_code(100, 99), 4);
        assert_eq!(distance_to_plane_code(100, 5000), 5120);
    }

    #[test]
    fn plane_codes_in_narrow_images() {
        for xsize in 1..10 {
            for dist in 1..200 {
                let code = distance_to_plane_code(xsize, dist);
                assert!(code >= 1);
                assert_eq!(plane_code_to_distance(xsize, code), dist, "xsize {xsize} dist {dist}");
                if code > NUM_PLANE_CODES {
                    assert_eq!(code as usize, dist + 120);
                }
            }
        }
    }

    #[test]
    fn rle_on_uniform_block() {
        let pixels = vec![0xff33_6699u32; 16];
        let mut refs = BackwardRefs::default();
        lz77_rle(&pixels, 4, &mut refs);
        assert_eq!(refs.tokens, [PixOrCopy::literal(0xff33_6699), PixOrCopy::copy(15, 1)]);
    }

    #[test]
    fn rle_prefers_row_above() {
        let row = [1u32, 2, 3, 4, 5, 6, 7, 8];
        let pixels: Vec<u32> = row.iter().chain(row.iter()).copied().collect();
        let mut refs = BackwardRefs::default();
        lz77_rle(&pixels, 8, &mut refs);
        assert_eq!(refs.len(), 9);
        assert_eq!(refs.tokens[8], PixOrCopy::copy(8, 8));
    }

    #[test]
    fn every_strategy_reconstructs_the_image() {
        let (width, height) = (37, 23);
        let pixels = noisy_image(width, height, 6);
        let q = quality(80);
        let chain = HashChain::new(&pixels, width, q, false);
        let mut counts = Vec::new();
        let mut box_chain = HashChain::default();
        fill_box_chain(&pixels, width, &chain, &mut counts, &mut box_chain);

        let mut refs = BackwardRefs::default();
        for strategy in 0..3 {
            match strategy {
                0 => lz77_standard(&pixels, &chain, &mut refs),
                1 => lz77_rle(&pixels, width, &mut refs),
                _ => lz77_standard(&pixels, &box_chain, &mut refs),
            }
            assert_eq!(replay(&refs, 0), pixels, "strategy {strategy}");
            for bits in [1u8, 4, 10] {
                let mut cached = refs.clone();
                with_local_cache(&pixels, bits, &mut cached);
                assert_eq!(replay(&cached, bits), pixels);
            }
        }
    }

    #[test]
    fn token_bounds() {
        let (width, height) = (50, 40);
        let pixels = noisy_image(width, height, 3);
        let mut scratch = RefsScratch::default();
        scratch.hash_chain.fill(&pixels, width, quality(90), false);
        let kinds = [Lz77Kind::Standard, Lz77Kind::Rle, Lz77Kind::Box];
        let chosen = get_backward_references(&pixels, width, quality(90), &kinds, 10, &mut scratch);
        let mut pos = 0usize;
        for token in chosen.refs.iter() {
            if let PixOrCopy::Copy { len, dist } = *token {
                assert!((1..=MAX_LENGTH).contains(&usize::from(len)));
                assert!(dist >= 1 && dist as usize <= pos);
            }
            pos += token.pixel_len();
        }
        assert_eq!(pos, pixels.len());
        assert_eq!(replay(&chosen.refs, chosen.cache_bits), pixels);
    }

    #[test]
    fn low_quality_disables_cache() {
        let pixels = noisy_image(20, 20, 8);
        let mut refs = BackwardRefs::default();
        lz77_rle(&pixels, 20, &mut refs);
        assert_eq!(best_cache_size(&pixels, 20, &refs, 10), 0);
        assert!(best_cache_size(&pixels, 90, &refs, 10) <= 10);
    }

    #[test]
    fn degenerate_sizes() {
        let mut scratch = RefsScratch::default();
        let one = [0xff00_00ffu32];
        scratch.hash_chain.fill(&one, 1, quality(75), false);
        let chosen = get_backward_references(&one, 1, quality(75), &[Lz77Kind::Standard, Lz77Kind::Box], 0, &mut scratch);
        assert_eq!(chosen.refs.tokens, [PixOrCopy::literal(0xff00_00ff)]);

        let mut refs = BackwardRefs::default();
        lz77_rle(&[], 1, &mut refs);
        assert!(refs.is_empty());
    }

    #[test]
    fn window_offsets_are_positive_and_unique() {
        let offsets = window_offsets(16);
        assert_eq!(offsets.len(), WINDOW_OFFSETS_SIZE_MAX);
        assert_eq!(offsets[0], 16);
        assert_eq!(offsets[1], 1);
        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), offsets.len());
        // A 2-pixel-wide image has far fewer reachable neighbours.
        assert!(window_offsets(2).len() < WINDOW_OFFSETS_SIZE_MAX);
    }
}
