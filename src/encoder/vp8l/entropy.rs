//! Entropy estimates for VP8L encoding.
//!
//! Approximates the cost in bits of Huffman-coding a symbol population,
//! including a model of the cost of transmitting the code lengths themselves.
//! Values mirror libwebp's float model so the heuristics built on top of it
//! make the same decisions.

/// `v * log2(v)`, zero for zero.
#[inline]
pub fn slog2(v: u32) -> f64 {
    if v == 0 {
        0.0
    } else {
        let v = f64::from(v);
        v * libm::log2(v)
    }
}

#[inline]
pub fn log2(v: u32) -> f64 {
    if v == 0 {
        0.0
    } else {
        libm::log2(f64::from(v))
    }
}

/// Running Shannon-entropy statistics over a population.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BitEntropy {
    pub entropy: f64,
    pub sum: u32,
    pub nonzeros: u32,
    pub max_val: u32,
    /// Index of the last non-zero run start; the symbol itself when `nonzeros == 1`.
    pub nonzero_code: u32,
}

/// Counts of zero / non-zero runs, split by short (<= 3) and long runs.
///
/// `counts[nz]` counts long runs, `streaks[nz][long]` sums run lengths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Streaks {
    pub counts: [u32; 2],
    pub streaks: [[u32; 2]; 2],
}

impl BitEntropy {
    fn add_run(&mut self, val: u32, start: usize, streak: u32, stats: &mut Streaks) {
        if val != 0 {
            self.sum += val * streak;
            self.nonzeros += streak;
            self.nonzero_code = start as u32;
            self.entropy -= slog2(val) * f64::from(streak);
            self.max_val = self.max_val.max(val);
        }
        let nz = usize::from(val != 0);
        let long = streak > 3;
        stats.counts[nz] += u32::from(long);
        stats.streaks[nz][usize::from(long)] += streak;
    }

    /// Refined estimate: for tiny alphabets the raw entropy underestimates
    /// what a real prefix code costs, so it is blended toward a floor.
    pub fn refine(&self) -> f64 {
        let mix = match self.nonzeros {
            0 | 1 => return 0.0,
            2 => return 0.99 * f64::from(self.sum) + 0.01 * self.entropy,
            3 => 0.95,
            4 => 0.7,
            _ => 0.627,
        };
        let min_limit = 2.0 * f64::from(self.sum) - f64::from(self.max_val);
        let min_limit = mix * min_limit + (1.0 - mix) * self.entropy;
        if self.entropy < min_limit {
            min_limit
        } else {
            self.entropy
        }
    }
}

/// Plain entropy statistics, no streak tracking.
pub fn bits_entropy_unrefined(array: &[u32]) -> BitEntropy {
    let mut e = BitEntropy::default();
    for (i, &v) in array.iter().enumerate() {
        if v != 0 {
            e.sum += v;
            e.nonzero_code = i as u32;
            e.nonzeros += 1;
            e.entropy -= slog2(v);
            e.max_val = e.max_val.max(v);
        }
    }
    e.entropy += slog2(e.sum);
    e
}

/// Refined bit-entropy of a population.
pub fn bits_entropy(array: &[u32]) -> f64 {
    bits_entropy_unrefined(array).refine()
}

/// Entropy and run statistics of a population, walking runs of equal values.
pub fn entropy_unrefined(x: &[u32]) -> (BitEntropy, Streaks) {
    run_statistics(x.len(), |i| x[i])
}

/// Entropy and run statistics of the element-wise sum of two populations.
pub fn combined_entropy_unrefined(x: &[u32], y: &[u32]) -> (BitEntropy, Streaks) {
    debug_assert_eq!(x.len(), y.len());
    run_statistics(x.len(), |i| x[i] + y[i])
}

#[inline]
fn run_statistics(len: usize, value: impl Fn(usize) -> u32) -> (BitEntropy, Streaks) {
    let mut e = BitEntropy::default();
    let mut stats = Streaks::default();
    if len == 0 {
        return (e, stats);
    }
    let mut prev_val = value(0);
    let mut prev_start = 0usize;
    for i in 1..len {
        let v = value(i);
        if v != prev_val {
            e.add_run(prev_val, prev_start, (i - prev_start) as u32, &mut stats);
            prev_val = v;
            prev_start = i;
        }
    }
    e.add_run(prev_val, prev_start, (len - prev_start) as u32, &mut stats);
    e.entropy += slog2(e.sum);
    (e, stats)
}

/// Estimated cost of transmitting the code lengths of a Huffman tree.
pub fn final_huffman_cost(stats: &Streaks) -> f64 {
    // 19 code-length codes at 3 bits each, minus a small bias.
    let mut retval = 57.0 - 9.1;
    retval += f64::from(stats.counts[0]) * 1.5625 + 0.234375 * f64::from(stats.streaks[0][1]);
    retval += f64::from(stats.counts[1]) * 2.578125 + 0.703125 * f64::from(stats.streaks[1][1]);
    retval += 1.796875 * f64::from(stats.streaks[0][0]);
    retval += 3.28125 * f64::from(stats.streaks[1][0]);
    retval
}

/// Entropy of `x` plus entropy of `x + y`, as used to rate a tile against
/// an accumulated image histogram.
pub fn combined_shannon_entropy(x: &[u32; 256], y: &[u32; 256]) -> f64 {
    let mut retval = 0.0;
    let mut sum_x = 0u32;
    let mut sum_xy = 0u32;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        if xi != 0 {
            let xy = xi + yi;
            sum_x += xi;
            retval -= slog2(xi);
            sum_xy += xy;
            retval -= slog2(xy);
        } else if yi != 0 {
            sum_xy += yi;
            retval -= slog2(yi);
        }
    }
    retval + slog2(sum_x) + slog2(sum_xy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_population_is_exact() {
        let counts = [100u32; 4];
        let e = bits_entropy_unrefined(&counts);
        // 400 symbols at 2 bits each.
        assert!((e.entropy - 800.0).abs() < 1e-6);
        assert_eq!(e.nonzeros, 4);
        assert_eq!(e.max_val, 100);
    }

    #[test]
    fn single_symbol_costs_nothing() {
        let mut counts = [0u32; 256];
        counts[42] = 100;
        let e = bits_entropy_unrefined(&counts);
        assert_eq!(e.nonzero_code, 42);
        assert_eq!(e.refine(), 0.0);
    }

    #[test]
    fn two_symbols_cost_about_one_bit_each() {
        let counts = [10u32, 0, 0, 30];
        let cost = bits_entropy(&counts);
        assert!(cost > 0.99 * 40.0 - 1e-9);
    }

    #[test]
    fn refine_never_lowers_entropy() {
        let counts = [1u32, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let e = bits_entropy_unrefined(&counts);
        assert!(e.refine() >= e.entropy);
    }

    #[test]
    fn streaks_match_plain_entropy() {
        let counts = [0u32, 0, 0, 0, 0, 5, 5, 5, 1, 0, 7, 7, 7, 7, 7, 0];
        let (with_runs, stats) = entropy_unrefined(&counts);
        let plain = bits_entropy_unrefined(&counts);
        assert_eq!(with_runs.sum, plain.sum);
        assert_eq!(with_runs.nonzeros, plain.nonzeros);
        assert!((with_runs.entropy - plain.entropy).abs() < 1e-9);
        // zero runs: 5 (long), 1 (short), 1 (short); non-zero runs: 3, 1 (short), 5 (long)
        assert_eq!(stats.counts, [1, 1]);
        assert_eq!(stats.streaks[0], [2, 5]);
        assert_eq!(stats.streaks[1], [4, 5]);
    }

    #[test]
    fn combined_equals_summed() {
        let x = [3u32, 0, 1, 1, 0, 9];
        let y = [0u32, 2, 1, 1, 0, 1];
        let sum: alloc::vec::Vec<u32> = x.iter().zip(&y).map(|(a, b)| a + b).collect();
        assert_eq!(combined_entropy_unrefined(&x, &y), entropy_unrefined(&sum));
    }

    #[test]
    fn huffman_cost_baseline() {
        let stats = Streaks::default();
        assert!((final_huffman_cost(&stats) - 47.9).abs() < 1e-9);
    }

    #[test]
    fn combined_shannon_of_identical_histograms() {
        let mut x = [0u32; 256];
        x[0] = 8;
        x[1] = 8;
        let e = combined_shannon_entropy(&x, &x);
        // 16 symbols at 1 bit plus 32 symbols at 1 bit.
        assert!((e - 48.0).abs() < 1e-9);
    }
}
