//! VP8L bit writer.
//!
//! Writes bits in LSB-first order as required by VP8L format.

use alloc::vec::Vec;

use super::huffman::HuffmanCode;

/// LSB-first bit accumulator over a growable byte buffer.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    buffer: Vec<u8>,
    /// Pending bits, lowest bit first.
    acc: u64,
    /// Number of pending bits (always < 32 between calls).
    used: u32,
}

impl BitWriter {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(cap),
            acc: 0,
            used: 0,
        }
    }

    /// Append the low `n_bits` of `value`.
    #[inline]
    pub fn put_bits(&mut self, value: u32, n_bits: u32) {
        debug_assert!(n_bits <= 32);
        debug_assert!(n_bits == 32 || (value >> n_bits) == 0);
        if n_bits == 0 {
            return;
        }
        self.acc |= u64::from(value) << self.used;
        self.used += n_bits;
        if self.used >= 32 {
            self.buffer
                .extend_from_slice(&(self.acc as u32).to_le_bytes());
            self.acc >>= 32;
            self.used -= 32;
        }
    }

    #[inline]
    pub fn put_bit(&mut self, bit: bool) {
        self.put_bits(u32::from(bit), 1);
    }

    /// Write the (already bit-reversed) code assigned to `symbol`.
    #[inline]
    pub fn write_huffman_code(&mut self, code: &HuffmanCode, symbol: usize) {
        let (bits, len) = code.code_of(symbol);
        self.put_bits(bits, u32::from(len));
    }

    /// Like [`write_huffman_code`](Self::write_huffman_code), followed by
    /// `n_extra` raw bits.
    #[inline]
    pub fn write_huffman_code_with_extra_bits(
        &mut self,
        code: &HuffmanCode,
        symbol: usize,
        extra: u32,
        n_extra: u32,
    ) {
        self.write_huffman_code(code, symbol);
        self.put_bits(extra, n_extra);
    }

    /// Number of bits written so far.
    pub fn bit_position(&self) -> usize {
        self.buffer.len() * 8 + self.used as usize
    }

    /// Pad the final partial byte with zeros and return the bytes.
    pub fn finish(mut self) -> Vec<u8> {
        while self.used > 0 {
            self.buffer.push(self.acc as u8);
            self.acc >>= 8;
            self.used = self.used.saturating_sub(8);
        }
        self.buffer
    }
}
