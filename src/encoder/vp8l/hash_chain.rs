//! Hash chain for LZ77 backward reference finding.
//!
//! Uses libwebp's hash function and chain structure for finding matches.
//! After filling, every position holds its best `(offset, length)` match.

use alloc::vec;
use alloc::vec::Vec;

use super::types::{Vp8lQuality, HASH_BITS, HASH_SIZE, MAX_LENGTH, MAX_LENGTH_BITS};

/// Hash multipliers for two-pixel hashing (from libwebp).
const HASH_MULT_HI: u32 = 0xc6a4_a793;
const HASH_MULT_LO: u32 = 0x5bd1_e996;

/// Hash two adjacent pixels (or a color and its run length) to a bucket.
#[inline]
fn hash_pix_pair(p0: u32, p1: u32) -> usize {
    let key = p1
        .wrapping_mul(HASH_MULT_HI)
        .wrapping_add(p0.wrapping_mul(HASH_MULT_LO));
    (key >> (32 - HASH_BITS)) as usize
}

#[derive(Debug, Default)]
pub struct HashChain {
    /// For each pixel: (offset << MAX_LENGTH_BITS) | length
    offset_length: Vec<u32>,
}

impl HashChain {
    /// Build the chain and resolve the best match at every position.
    #[cfg(test)]
    pub fn new(argb: &[u32], xsize: usize, quality: Vp8lQuality, low_effort: bool) -> Self {
        let mut chain = Self::default();
        chain.fill(argb, xsize, quality, low_effort);
        chain
    }

    /// Rebuild in place, reusing the allocation.
    pub fn fill(&mut self, argb: &[u32], xsize: usize, quality: Vp8lQuality, low_effort: bool) {
        let size = argb.len();
        self.clear_to(size);
        if size <= 2 {
            return;
        }

        let chain = link_by_hash(argb);
        let iter_max = quality.max_iters();
        let window_size = quality.window_size(xsize);
        let offset_length = &mut self.offset_length;

        // The last pixel cannot start a match, the first has nothing before it.
        let mut base_pos = size - 2;
        while base_pos > 0 {
            let max_len = max_find_copy_length(size - 1 - base_pos);
            let start = &argb[base_pos..];
            let mut iter = iter_max as isize;
            let mut best_len = 0usize;
            let mut best_dist = 0usize;
            let min_pos = base_pos.saturating_sub(window_size) as i32;
            let length_max = max_len.min(256);
            let mut pos = chain[base_pos];

            if !low_effort {
                // Rows and columns are strongly correlated: seed with the
                // pixel above and the pixel to the left.
                if base_pos >= xsize {
                    let curr = find_match_length(&argb[base_pos - xsize..], start, best_len, max_len);
                    if curr > best_len {
                        best_len = curr;
                        best_dist = xsize;
                    }
                    iter -= 1;
                }
                let curr = find_match_length(&argb[base_pos - 1..], start, best_len, max_len);
                if curr > best_len {
                    best_len = curr;
                    best_dist = 1;
                }
                iter -= 1;
                if best_len == MAX_LENGTH {
                    pos = min_pos - 1;
                }
            }

            let mut best_argb = start[best_len];
            while pos >= min_pos {
                iter -= 1;
                if iter <= 0 {
                    break;
                }
                let p = pos as usize;
                if argb[p + best_len] == best_argb {
                    let curr = vector_mismatch(&argb[p..], start, max_len);
                    if curr > best_len {
                        best_len = curr;
                        best_dist = base_pos - p;
                        best_argb = start[best_len];
                        if best_len >= length_max {
                            break;
                        }
                    }
                }
                pos = chain[p];
            }

            // Extend the match to the left while the two intervals keep
            // matching, without searching again.
            let mut max_base_pos = base_pos;
            loop {
                debug_assert!(best_len <= MAX_LENGTH);
                offset_length[base_pos] = ((best_dist as u32) << MAX_LENGTH_BITS) | best_len as u32;
                base_pos -= 1;
                if best_dist == 0 || base_pos == 0 {
                    break;
                }
                if base_pos < best_dist || argb[base_pos - best_dist] != argb[base_pos] {
                    break;
                }
                // A saturated match might have a closer equivalent; only
                // distance 1 is certain to be the best.
                if best_len == MAX_LENGTH && best_dist != 1 && base_pos + MAX_LENGTH < max_base_pos {
                    break;
                }
                if best_len < MAX_LENGTH {
                    best_len += 1;
                    max_base_pos = base_pos;
                }
            }
        }
    }

    /// Reset to `size` positions without any recorded match.
    pub fn clear_to(&mut self, size: usize) {
        self.offset_length.clear();
        self.offset_length.resize(size, 0);
    }

    /// Record a match found by another search (box window).
    #[inline]
    pub fn set_copy(&mut self, pos: usize, offset: usize, length: usize) {
        debug_assert!(length <= MAX_LENGTH);
        self.offset_length[pos] = ((offset as u32) << MAX_LENGTH_BITS) | length as u32;
    }

    /// Best match distance at `pos` (0 when there is none).
    #[inline]
    pub fn offset(&self, pos: usize) -> usize {
        (self.offset_length[pos] >> MAX_LENGTH_BITS) as usize
    }

    /// Best match length at `pos`.
    #[inline]
    pub fn length(&self, pos: usize) -> usize {
        (self.offset_length[pos] & ((1 << MAX_LENGTH_BITS) - 1)) as usize
    }

    /// `(offset, length)` of the best match at `pos`.
    #[inline]
    pub fn find_copy(&self, pos: usize) -> (usize, usize) {
        (self.offset(pos), self.length(pos))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.offset_length.len()
    }
}

/// Link every position to the previous one with the same pair hash.
///
/// Runs of one color hash as (color, remaining run length) so that they
/// chain to other runs of the same length instead of to themselves.
fn link_by_hash(argb: &[u32]) -> Vec<i32> {
    let size = argb.len();
    let mut hash_to_first: Vec<i32> = vec![-1; HASH_SIZE];
    let mut chain: Vec<i32> = vec![-1; size];

    let mut pos = 0usize;
    let mut argb_comp = argb[0] == argb[1];
    while pos < size - 2 {
        let argb_comp_next = argb[pos + 1] == argb[pos + 2];
        if argb_comp && argb_comp_next {
            let color = argb[pos];
            let mut len = 1usize;
            while pos + len + 2 < size && argb[pos + len + 2] == color {
                len += 1;
            }
            if len > MAX_LENGTH {
                // These link to their predecessor at distance 1, which the
                // match search always tries; leave them unchained.
                pos += len - MAX_LENGTH;
                len = MAX_LENGTH;
            }
            while len > 0 {
                let hash = hash_pix_pair(color, len as u32);
                chain[pos] = hash_to_first[hash];
                hash_to_first[hash] = pos as i32;
                pos += 1;
                len -= 1;
            }
            argb_comp = false;
        } else {
            let hash = hash_pix_pair(argb[pos], argb[pos + 1]);
            chain[pos] = hash_to_first[hash];
            hash_to_first[hash] = pos as i32;
            pos += 1;
            argb_comp = argb_comp_next;
        }
    }
    // Penultimate pixel.
    chain[pos] = hash_to_first[hash_pix_pair(argb[pos], argb[pos + 1])];
    chain
}

#[inline]
pub fn max_find_copy_length(len: usize) -> usize {
    len.min(MAX_LENGTH)
}

/// Match length of `b` against `a`, or 0 if it cannot beat `best_len`.
#[inline]
pub fn find_match_length(a: &[u32], b: &[u32], best_len: usize, max_len: usize) -> usize {
    if a[best_len] != b[best_len] {
        return 0;
    }
    vector_mismatch(a, b, max_len)
}

/// Index of the first mismatch, capped at `max_len`.
#[inline]
pub fn vector_mismatch(a: &[u32], b: &[u32], max_len: usize) -> usize {
    a.iter()
        .zip(b)
        .take(max_len)
        .position(|(x, y)| x != y)
        .unwrap_or_else(|| max_len.min(a.len()).min(b.len()))
}
