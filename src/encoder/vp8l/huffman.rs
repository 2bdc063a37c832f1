//! Huffman code construction and code-header serialization for VP8L.
//!
//! Codes are canonical and length-limited. Code words are stored
//! bit-reversed so they can be emitted LSB-first.

use alloc::collections::BinaryHeap;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::Ordering;

use super::bitwriter::BitWriter;

/// Longest code allowed for the five main alphabets.
pub const MAX_ALLOWED_CODE_LENGTH: u8 = 15;

/// Longest code allowed for the code-length alphabet.
const MAX_CODE_LENGTH_CODE_LENGTH: u8 = 7;

const NUM_CODE_LENGTH_CODES: usize = 19;

/// Order in which code-length code lengths are stored.
const CODE_LENGTH_CODE_ORDER: [usize; NUM_CODE_LENGTH_CODES] = [
    17, 18, 0, 1, 2, 3, 4, 5, 16, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// Code length assumed before the first stored length (for repeat code 16).
const INITIAL_REPEAT_LENGTH: u8 = 8;

/// Canonical Huffman code for one alphabet.
#[derive(Debug, Clone, Default)]
pub struct HuffmanCode {
    lengths: Vec<u8>,
    /// Bit-reversed code words.
    codes: Vec<u16>,
    /// Only one symbol has a code; it is written with zero bits.
    single: bool,
}

impl HuffmanCode {
    /// Build a code of at most `max_len` bits for the given symbol counts.
    pub fn from_histogram(counts: &[u32], max_len: u8) -> Self {
        let mut smoothed = counts.to_vec();
        smooth_counts_for_rle(&mut smoothed);
        Self::from_lengths(code_lengths(&smoothed, max_len))
    }

    /// Assign canonical code words to the given code lengths.
    pub fn from_lengths(lengths: Vec<u8>) -> Self {
        let mut per_length = [0u32; MAX_ALLOWED_CODE_LENGTH as usize + 1];
        for &len in &lengths {
            per_length[usize::from(len)] += 1;
        }
        per_length[0] = 0;

        let mut next_code = [0u32; MAX_ALLOWED_CODE_LENGTH as usize + 1];
        let mut code = 0u32;
        for len in 1..next_code.len() {
            code = (code + per_length[len - 1]) << 1;
            next_code[len] = code;
        }

        let codes = lengths
            .iter()
            .map(|&len| {
                if len == 0 {
                    return 0;
                }
                let word = next_code[usize::from(len)];
                next_code[usize::from(len)] += 1;
                (word as u16).reverse_bits() >> (16 - u32::from(len))
            })
            .collect();
        let single = lengths.iter().filter(|&&l| l != 0).count() == 1;
        Self {
            lengths,
            codes,
            single,
        }
    }

    /// `(bits, bit count)` to write for `symbol`.
    #[inline]
    pub fn code_of(&self, symbol: usize) -> (u32, u8) {
        if self.single {
            (0, 0)
        } else {
            (u32::from(self.codes[symbol]), self.lengths[symbol])
        }
    }

    #[cfg(test)]
    pub fn lengths(&self) -> &[u8] {
        &self.lengths
    }

    /// Write the code header the decoder rebuilds this code from.
    pub fn write_header(&self, w: &mut BitWriter) {
        let mut used = self.lengths.iter().enumerate().filter(|(_, &len)| len != 0).map(|(s, _)| s);
        let first = used.next();
        let second = used.next();
        let third = used.next();

        match (first, second, third) {
            (None, _, _) => {
                // Simple code, one 1-bit symbol: 0.
                w.put_bits(0b0001, 4);
            }
            (Some(s0), s1, None) if s0 < 256 && s1.map_or(true, |s| s < 256) => {
                w.put_bit(true);
                w.put_bit(s1.is_some());
                if s0 <= 1 {
                    w.put_bit(false);
                    w.put_bits(s0 as u32, 1);
                } else {
                    w.put_bit(true);
                    w.put_bits(s0 as u32, 8);
                }
                if let Some(s1) = s1 {
                    w.put_bits(s1 as u32, 8);
                }
            }
            _ => self.write_full_header(w),
        }
    }

    fn write_full_header(&self, w: &mut BitWriter) {
        w.put_bit(false);

        let tokens = compress_lengths(&self.lengths);
        let mut token_counts = [0u32; NUM_CODE_LENGTH_CODES];
        for t in &tokens {
            token_counts[usize::from(t.code)] += 1;
        }
        let length_code = HuffmanCode::from_histogram(&token_counts, MAX_CODE_LENGTH_CODE_LENGTH);

        let mut stored = NUM_CODE_LENGTH_CODES;
        while stored > 4 && length_code.lengths[CODE_LENGTH_CODE_ORDER[stored - 1]] == 0 {
            stored -= 1;
        }
        w.put_bits((stored - 4) as u32, 4);
        for &symbol in &CODE_LENGTH_CODE_ORDER[..stored] {
            w.put_bits(u32::from(length_code.lengths[symbol]), 3);
        }

        // Trailing zero-length tokens can be left out when announcing the
        // token count is cheaper than writing them.
        let mut trimmed = tokens.len();
        let mut trailing_bits = 0u32;
        let (_, zero_bits) = length_code.code_of(0);
        let (_, z17_bits) = length_code.code_of(17);
        let (_, z18_bits) = length_code.code_of(18);
        for t in tokens.iter().rev() {
            trailing_bits += match t.code {
                0 => u32::from(zero_bits),
                17 => u32::from(z17_bits) + 3,
                18 => u32::from(z18_bits) + 7,
                _ => break,
            };
            trimmed -= 1;
        }
        let write_trimmed = trimmed > 1 && trailing_bits > 12;
        w.put_bit(write_trimmed);
        let count = if write_trimmed {
            let value = (trimmed - 2) as u32;
            let nbitpairs = if value == 0 { 1 } else { (31 - value.leading_zeros()) / 2 + 1 };
            w.put_bits(nbitpairs - 1, 3);
            w.put_bits(value, nbitpairs * 2);
            trimmed
        } else {
            tokens.len()
        };

        for t in &tokens[..count] {
            let (bits, len) = length_code.code_of(usize::from(t.code));
            w.put_bits(bits, u32::from(len));
            match t.code {
                16 => w.put_bits(u32::from(t.extra), 2),
                17 => w.put_bits(u32::from(t.extra), 3),
                18 => w.put_bits(u32::from(t.extra), 7),
                _ => {}
            }
        }
    }
}

/// One symbol of the code-length alphabet: a length 0-15, or a repeat
/// code 16/17/18 with its extra bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LengthToken {
    code: u8,
    extra: u8,
}

/// Run-length code a sequence of code lengths.
fn compress_lengths(lengths: &[u8]) -> Vec<LengthToken> {
    let mut tokens = Vec::new();
    let mut prev = INITIAL_REPEAT_LENGTH;
    let mut i = 0;
    while i < lengths.len() {
        let value = lengths[i];
        let run = lengths[i..].iter().take_while(|&&l| l == value).count();
        if value == 0 {
            push_zero_run(run, &mut tokens);
        } else {
            push_value_run(run, value, prev, &mut tokens);
            prev = value;
        }
        i += run;
    }
    tokens
}

fn push_zero_run(mut run: usize, tokens: &mut Vec<LengthToken>) {
    while run > 0 {
        match run {
            1 | 2 => {
                tokens.extend(core::iter::repeat(LengthToken { code: 0, extra: 0 }).take(run));
                return;
            }
            3..=10 => {
                tokens.push(LengthToken {
                    code: 17,
                    extra: (run - 3) as u8,
                });
                return;
            }
            11..=138 => {
                tokens.push(LengthToken {
                    code: 18,
                    extra: (run - 11) as u8,
                });
                return;
            }
            _ => {
                tokens.push(LengthToken { code: 18, extra: 127 });
                run -= 138;
            }
        }
    }
}

fn push_value_run(mut run: usize, value: u8, prev: u8, tokens: &mut Vec<LengthToken>) {
    if value != prev {
        tokens.push(LengthToken { code: value, extra: 0 });
        run -= 1;
    }
    while run > 0 {
        match run {
            1 | 2 => {
                tokens.extend(core::iter::repeat(LengthToken { code: value, extra: 0 }).take(run));
                return;
            }
            3..=6 => {
                tokens.push(LengthToken {
                    code: 16,
                    extra: (run - 3) as u8,
                });
                return;
            }
            _ => {
                tokens.push(LengthToken { code: 16, extra: 3 });
                run -= 6;
            }
        }
    }
}

/// Even out runs of similar counts so the resulting code lengths form
/// longer runs for the repeat codes. Zero counts only become non-zero
/// when absorbed into a smoothed run.
fn smooth_counts_for_rle(counts: &mut [u32]) {
    let Some(last) = counts.iter().rposition(|&c| c != 0) else {
        return;
    };
    let len = last + 1;

    // Runs long enough for a repeat code already are left untouched.
    let mut keep = vec![false; len];
    let mut start = 0;
    while start < len {
        let value = counts[start];
        let run = counts[start..len].iter().take_while(|&&c| c == value).count();
        if (value == 0 && run >= 5) || (value != 0 && run >= 7) {
            keep[start..start + run].fill(true);
        }
        start += run;
    }

    let mut run = 0usize;
    let mut sum = 0u64;
    let mut limit = counts[0];
    for i in 0..=len {
        let boundary = i == len || keep[i] || (i > 0 && keep[i - 1]) || counts[i].abs_diff(limit) >= 4;
        if boundary {
            if run >= 4 || (run >= 3 && sum == 0) {
                let avg = if sum == 0 {
                    0
                } else {
                    ((sum + run as u64 / 2) / run as u64).max(1) as u32
                };
                counts[i - run..i].fill(avg);
            }
            run = 0;
            sum = 0;
            limit = if i + 3 < len {
                ((counts[i..i + 4].iter().map(|&c| u64::from(c)).sum::<u64>() + 2) / 4) as u32
            } else if i < len {
                counts[i]
            } else {
                0
            };
        }
        run += 1;
        if i < len {
            sum += u64::from(counts[i]);
            if run >= 4 {
                limit = ((sum + run as u64 / 2) / run as u64) as u32;
            }
        }
    }
}

/// Pending subtree in the Huffman merge queue.
#[derive(Debug, PartialEq, Eq)]
struct Pending {
    weight: u64,
    /// Symbol for leaves, -1 for merged subtrees.
    value: i32,
    node: usize,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lightest first; among equal weights, highest symbol first and
        // merged subtrees last.
        other
            .weight
            .cmp(&self.weight)
            .then(self.value.cmp(&other.value))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Code lengths of at most `max_len` for `counts`.
///
/// When the optimal tree is too deep, small counts are raised to a floor
/// that doubles until the tree fits.
fn code_lengths(counts: &[u32], max_len: u8) -> Vec<u8> {
    let mut lengths = vec![0u8; counts.len()];
    let leaves: Vec<(usize, u32)> = counts
        .iter()
        .enumerate()
        .filter(|(_, &c)| c != 0)
        .map(|(s, &c)| (s, c))
        .collect();
    match leaves.len() {
        0 => return lengths,
        1 => {
            lengths[leaves[0].0] = 1;
            return lengths;
        }
        _ => {}
    }

    let mut count_min = 1u32;
    while !tree_depths(&leaves, count_min, max_len, &mut lengths) {
        count_min = count_min.saturating_mul(2);
    }
    lengths
}

/// Build a Huffman tree over `leaves` with every weight at least
/// `count_min`. Returns false if some leaf ends up deeper than `max_len`.
fn tree_depths(leaves: &[(usize, u32)], count_min: u32, max_len: u8, lengths: &mut [u8]) -> bool {
    let n = leaves.len();
    // Nodes 0..n are leaves, later ones merged subtrees; a parent is
    // always created after its children.
    let mut parent = vec![usize::MAX; 2 * n - 1];
    let mut queue: BinaryHeap<Pending> = leaves
        .iter()
        .enumerate()
        .map(|(node, &(symbol, count))| Pending {
            weight: u64::from(count.max(count_min)),
            value: symbol as i32,
            node,
        })
        .collect();

    let mut next = n;
    while queue.len() > 1 {
        let (Some(a), Some(b)) = (queue.pop(), queue.pop()) else {
            break;
        };
        parent[a.node] = next;
        parent[b.node] = next;
        queue.push(Pending {
            weight: a.weight + b.weight,
            value: -1,
            node: next,
        });
        next += 1;
    }

    let mut depth = vec![0u8; next];
    for node in (0..next.saturating_sub(1)).rev() {
        depth[node] = depth[parent[node]].saturating_add(1);
    }
    for (node, &(symbol, _)) in leaves.iter().enumerate() {
        if depth[node] > max_len {
            return false;
        }
        lengths[symbol] = depth[node];
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kraft_sum(lengths: &[u8], max_len: u8) -> u32 {
        lengths
            .iter()
            .filter(|&&l| l > 0)
            .map(|&l| 1u32 << (max_len - l))
            .sum()
    }

    /// LSB-first reader for checking written headers.
    struct Reader<'a> {
        data: &'a [u8],
        pos: usize,
    }

    impl Reader<'_> {
        fn bits(&mut self, n: u32) -> u32 {
            let mut v = 0;
            for i in 0..n {
                let byte = self.data[self.pos / 8];
                v |= u32::from((byte >> (self.pos % 8)) & 1) << i;
                self.pos += 1;
            }
            v
        }

        /// Decode one symbol of a canonical code given by `lengths`.
        fn symbol(&mut self, lengths: &[u8]) -> usize {
            let canonical = HuffmanCode::from_lengths(lengths.to_vec());
            if canonical.single {
                return lengths.iter().position(|&l| l != 0).unwrap();
            }
            let (mut code, mut len) = (0u32, 0u8);
            loop {
                code |= self.bits(1) << len;
                len += 1;
                if let Some(s) = (0..lengths.len())
                    .find(|&s| lengths[s] == len && u32::from(canonical.codes[s]) == code)
                {
                    return s;
                }
                assert!(len <= 15, "no code matched");
            }
        }

        /// Parse a full code header back into code lengths.
        fn full_header(&mut self, alphabet: usize) -> Vec<u8> {
            assert_eq!(self.bits(1), 0, "expected a full header");
            let stored = self.bits(4) as usize + 4;
            let mut cl_lengths = [0u8; NUM_CODE_LENGTH_CODES];
            for &s in &CODE_LENGTH_CODE_ORDER[..stored] {
                cl_lengths[s] = self.bits(3) as u8;
            }
            let mut max_tokens = if self.bits(1) == 1 {
                let nbits = 2 + 2 * self.bits(3);
                2 + self.bits(nbits) as usize
            } else {
                usize::MAX
            };
            let mut lengths = vec![0u8; alphabet];
            let mut prev = INITIAL_REPEAT_LENGTH;
            let mut i = 0;
            while i < alphabet && max_tokens > 0 {
                max_tokens -= 1;
                let code = self.symbol(&cl_lengths) as u8;
                match code {
                    0..=15 => {
                        lengths[i] = code;
                        if code != 0 {
                            prev = code;
                        }
                        i += 1;
                    }
                    16 => {
                        let n = 3 + self.bits(2) as usize;
                        lengths[i..i + n].fill(prev);
                        i += n;
                    }
                    17 => i += 3 + self.bits(3) as usize,
                    _ => i += 11 + self.bits(7) as usize,
                }
            }
            lengths
        }
    }

    #[test]
    fn equal_counts_give_equal_lengths() {
        let mut counts = vec![0u32; 256];
        counts[..16].fill(16);
        let code = HuffmanCode::from_histogram(&counts, MAX_ALLOWED_CODE_LENGTH);
        assert!(code.lengths()[..16].iter().all(|&l| l == 4));
        assert!(code.lengths()[16..].iter().all(|&l| l == 0));
    }

    #[test]
    fn single_symbol_costs_nothing() {
        let code = HuffmanCode::from_histogram(&[0, 0, 100, 0, 0], MAX_ALLOWED_CODE_LENGTH);
        assert_eq!(code.lengths(), [0, 0, 1, 0, 0]);
        assert_eq!(code.code_of(2), (0, 0));
    }

    #[test]
    fn two_symbols_get_one_bit_each() {
        let code = HuffmanCode::from_histogram(&[100, 3, 0, 0], MAX_ALLOWED_CODE_LENGTH);
        assert_eq!(code.code_of(0), (0, 1));
        assert_eq!(code.code_of(1), (1, 1));
    }

    #[test]
    fn frequent_symbols_get_short_codes() {
        let code = HuffmanCode::from_histogram(&[1, 10, 100, 1000], MAX_ALLOWED_CODE_LENGTH);
        let l = code.lengths();
        assert!(l[3] <= l[2] && l[2] <= l[1] && l[1] <= l[0]);
        assert_eq!(kraft_sum(l, 15), 1 << 15);
    }

    #[test]
    fn depth_limit_is_respected() {
        // Fibonacci counts produce the deepest possible unconstrained tree.
        let mut counts = vec![1u32, 1];
        while counts.len() < 24 {
            let n = counts.len();
            counts.push(counts[n - 1] + counts[n - 2]);
        }
        let lengths = code_lengths(&counts, 7);
        assert!(lengths.iter().all(|&l| (1..=7).contains(&l)));
        assert_eq!(kraft_sum(&lengths, 7), 1 << 7);

        let unconstrained = code_lengths(&counts, 30);
        assert!(unconstrained.iter().any(|&l| l > 7));
    }

    #[test]
    fn canonical_words_are_bit_reversed() {
        let code = HuffmanCode::from_lengths(vec![2, 2, 3, 3]);
        // Canonical 00, 01, 100, 101 written LSB-first.
        assert_eq!(code.code_of(0), (0b00, 2));
        assert_eq!(code.code_of(1), (0b10, 2));
        assert_eq!(code.code_of(2), (0b001, 3));
        assert_eq!(code.code_of(3), (0b101, 3));
    }

    #[test]
    fn smoothing_flattens_near_equal_runs() {
        let mut counts = [10, 11, 10, 12, 10, 0, 0, 0];
        smooth_counts_for_rle(&mut counts);
        assert_eq!(counts, [11, 11, 11, 11, 11, 0, 0, 0]);

        let mut zeros = [0u32; 8];
        smooth_counts_for_rle(&mut zeros);
        assert_eq!(zeros, [0; 8]);

        // Long exact runs are kept as they are.
        let mut runs = [7, 7, 7, 7, 7, 7, 7, 100, 1];
        smooth_counts_for_rle(&mut runs);
        assert_eq!(&runs[..8], &[7, 7, 7, 7, 7, 7, 7, 100]);
    }

    #[test]
    fn repeat_codes() {
        let zeros = compress_lengths(&[0; 20]);
        assert_eq!(zeros, [LengthToken { code: 18, extra: 9 }]);

        let fives = compress_lengths(&[5; 10]);
        assert_eq!(
            fives,
            [
                LengthToken { code: 5, extra: 0 },
                LengthToken { code: 16, extra: 3 },
                LengthToken { code: 16, extra: 0 },
            ]
        );

        // Eights continue the initial repeat length without a literal.
        let eights = compress_lengths(&[8; 4]);
        assert_eq!(eights, [LengthToken { code: 16, extra: 1 }]);

        let long_zeros = compress_lengths(&[0; 300]);
        assert_eq!(long_zeros.len(), 3);
        assert_eq!(long_zeros[2], LengthToken { code: 18, extra: 13 });
    }

    #[test]
    fn simple_headers() {
        let mut w = BitWriter::default();
        HuffmanCode::from_lengths(vec![0; 280]).write_header(&mut w);
        assert_eq!(w.bit_position(), 4);
        assert_eq!(w.finish(), [0x01]);

        let mut lengths = vec![0u8; 256];
        lengths[200] = 1;
        let mut w = BitWriter::default();
        HuffmanCode::from_lengths(lengths).write_header(&mut w);
        assert_eq!(w.bit_position(), 11);
        assert_eq!(w.finish(), (1u32 | (1 << 2) | (200 << 3)).to_le_bytes()[..2]);

        let mut lengths = vec![0u8; 256];
        lengths[3] = 1;
        lengths[7] = 1;
        let mut w = BitWriter::default();
        HuffmanCode::from_lengths(lengths).write_header(&mut w);
        assert_eq!(w.bit_position(), 19);
    }

    #[test]
    fn full_header_describes_the_code() {
        let mut counts = vec![0u32; 280];
        for (i, c) in counts.iter_mut().enumerate().take(200) {
            *c = ((i * 37) % 23) as u32 + if i % 3 == 0 { 50 } else { 0 };
        }
        counts[270] = 9;
        let code = HuffmanCode::from_histogram(&counts, MAX_ALLOWED_CODE_LENGTH);
        let mut w = BitWriter::default();
        code.write_header(&mut w);
        let bytes = w.finish();
        let mut r = Reader { data: &bytes, pos: 0 };
        assert_eq!(r.full_header(280), code.lengths());
    }

    #[test]
    fn symbol_above_255_forces_full_header() {
        let mut lengths = vec![0u8; 280];
        lengths[260] = 1;
        let code = HuffmanCode::from_lengths(lengths);
        assert_eq!(code.code_of(260), (0, 0));
        let mut w = BitWriter::default();
        code.write_header(&mut w);
        let bytes = w.finish();
        let mut r = Reader { data: &bytes, pos: 0 };
        assert_eq!(r.full_header(280), code.lengths());
    }
}
