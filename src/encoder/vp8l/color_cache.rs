//! Color cache for VP8L encoding.
//!
//! The color cache stores recently used colors and allows referencing them
//! by index instead of encoding the full ARGB value. Collisions overwrite:
//! a hit is only trusted when the slot holds exactly the looked-up color.

use alloc::vec;
use alloc::vec::Vec;

/// Color cache hash multiplier (must match decoder exactly).
const COLOR_CACHE_MULT: u32 = 0x1e35_a7bd;

/// Slot index of `argb` in a cache addressed by `32 - shift` bits.
#[inline]
pub fn hash_pix(argb: u32, shift: u32) -> u32 {
    COLOR_CACHE_MULT.wrapping_mul(argb) >> shift
}

#[derive(Debug, Clone)]
pub struct ColorCache {
    colors: Vec<u32>,
    hash_shift: u32,
}

impl ColorCache {
    /// `bits` must be in `1..=11`.
    pub fn new(bits: u8) -> Self {
        debug_assert!((1..=11).contains(&bits));
        Self {
            colors: vec![0; 1 << bits],
            hash_shift: 32 - u32::from(bits),
        }
    }

    #[inline]
    pub fn index_of(&self, argb: u32) -> u32 {
        hash_pix(argb, self.hash_shift)
    }

    #[inline]
    pub fn insert(&mut self, argb: u32) {
        let key = self.index_of(argb) as usize;
        self.colors[key] = argb;
    }

    /// Store `argb` in slot `key` directly.
    #[inline]
    pub fn set(&mut self, key: u32, argb: u32) {
        self.colors[key as usize] = argb;
    }

    /// Color stored in slot `key`.
    #[inline]
    pub fn lookup(&self, key: u32) -> u32 {
        self.colors[key as usize]
    }

    /// Slot holding `argb`, if the cache currently contains it.
    #[inline]
    pub fn contains(&self, argb: u32) -> Option<u32> {
        let key = self.index_of(argb);
        (self.colors[key as usize] == argb).then_some(key)
    }
}
