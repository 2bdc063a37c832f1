//! Meta-Huffman encoding for spatially-varying codes.
//!
//! The image is cut into `2^histo_bits` tiles, each tile gets a histogram
//! of the tokens starting in it, and similar histograms are merged so that
//! a small set of Huffman code groups covers the whole image. Merging runs
//! in three passes of decreasing speed: entropy bins, randomized pair
//! sampling and an exhaustive greedy pass.

use alloc::vec;
use alloc::vec::Vec;

use super::histogram::{Histogram, NON_TRIVIAL_SYM};
use super::types::{subsample_size, BackwardRefs};

/// Partitions per dominant cost channel.
const NUM_PARTITIONS: usize = 4;
/// Number of entropy bins (literal × red × blue partitions).
const BIN_SIZE: usize = NUM_PARTITIONS * NUM_PARTITIONS * NUM_PARTITIONS;
/// Cluster count the greedy pass aims for at quality 100.
const MAX_HISTO_GREEDY: usize = 100;
/// Capacity of the stochastic pass' priority list.
const PRIORITY_LIST_MAX: usize = 9;
/// Failed merges tolerated per bin before trivial-symbol pairs are forced.
const MAX_COMBINE_FAILURES: u32 = 32;

/// Minimal-standard Lehmer generator (`seed * 48271 mod 2^31 - 1`).
#[derive(Debug, Clone)]
pub struct Lehmer {
    state: u32,
}

impl Lehmer {
    const MODULUS: u64 = 2_147_483_647;

    /// A seed of 0 (mod the modulus) would stick at 0; it is mapped to 1.
    pub fn new(seed: u32) -> Self {
        let state = (u64::from(seed) % Self::MODULUS) as u32;
        Self {
            state: if state == 0 { 1 } else { state },
        }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.state = ((u64::from(self.state) * 48271) % Self::MODULUS) as u32;
        self.state
    }
}

/// Clustered histograms and the tile-to-cluster map.
#[derive(Debug)]
pub struct HistoImage {
    pub histograms: Vec<Histogram>,
    /// Cluster index of every tile, row-major.
    pub symbols: Vec<u16>,
}

/// Build per-tile histograms for `refs` and cluster them.
#[allow(clippy::too_many_arguments)]
pub fn get_histo_image_symbols(
    xsize: usize,
    ysize: usize,
    refs: &BackwardRefs,
    quality: u8,
    histo_bits: u8,
    cache_bits: u8,
    seed: u32,
) -> HistoImage {
    let histo_xsize = subsample_size(xsize as u32, histo_bits) as usize;
    let histo_ysize = subsample_size(ysize as u32, histo_bits) as usize;
    let raw_size = histo_xsize * histo_ysize;

    let orig = build_tile_histograms(xsize, histo_bits, histo_xsize, raw_size, refs, cache_bits);
    let mut histos = orig.clone();
    let num_used = histos.iter().filter(|h| h.is_some()).count();

    if num_used > BIN_SIZE * 2 && quality < 100 {
        let factor = combine_cost_factor(raw_size, quality);
        let bin_map = entropy_bin_map(&histos);
        combine_entropy_bin(&mut histos, &bin_map, factor);
    }

    let x = f32::from(quality) / 100.0;
    let threshold_size = (1.0 + x * x * x * (MAX_HISTO_GREEDY - 1) as f32) as usize;
    let mut rng = Lehmer::new(seed);
    if combine_stochastic(&mut histos, threshold_size, &mut rng) {
        histos.retain(Option::is_some);
        combine_greedy(&mut histos, threshold_size);
    }
    histos.retain(Option::is_some);
    let clusters: Vec<Histogram> = histos.into_iter().flatten().collect();

    let (histograms, mut symbols) = remap(&orig, &clusters, cache_bits);
    let histograms = drop_unused_clusters(histograms, &mut symbols);
    log::trace!("histogram image: {raw_size} tiles -> {} clusters", histograms.len());
    HistoImage { histograms, symbols }
}

/// One histogram per tile with costs filled in. Empty tiles become `None`,
/// except the first, which is always kept.
fn build_tile_histograms(
    xsize: usize,
    histo_bits: u8,
    histo_xsize: usize,
    raw_size: usize,
    refs: &BackwardRefs,
    cache_bits: u8,
) -> Vec<Option<Histogram>> {
    let mut tiles = vec![Histogram::new(cache_bits); raw_size];
    let (mut x, mut y) = (0usize, 0usize);
    for token in refs.iter() {
        let ix = (y >> histo_bits) * histo_xsize + (x >> histo_bits);
        tiles[ix].add_token(token, xsize);
        x += token.pixel_len();
        while x >= xsize {
            x -= xsize;
            y += 1;
        }
    }
    tiles
        .into_iter()
        .enumerate()
        .map(|(i, mut h)| {
            h.update_cost();
            (i == 0 || !h.is_empty()).then_some(h)
        })
        .collect()
}

fn combine_cost_factor(histo_size: usize, quality: u8) -> f64 {
    let mut factor = 0.16;
    if quality < 90 {
        if histo_size > 256 {
            factor /= 2.0;
        }
        if histo_size > 512 {
            factor /= 2.0;
        }
        if histo_size > 1024 {
            factor /= 2.0;
        }
        if quality <= 50 {
            factor /= 2.0;
        }
    }
    factor
}

/// Range of the literal, red and blue costs over all histograms.
#[derive(Debug, Clone, Copy)]
struct DominantCostRange {
    literal: (f64, f64),
    red: (f64, f64),
    blue: (f64, f64),
}

impl DominantCostRange {
    fn new() -> Self {
        let empty = (f64::MAX, 0.0);
        Self {
            literal: empty,
            red: empty,
            blue: empty,
        }
    }

    fn update(&mut self, h: &Histogram) {
        for (range, cost) in [
            (&mut self.literal, h.literal_cost),
            (&mut self.red, h.red_cost),
            (&mut self.blue, h.blue_cost),
        ] {
            range.0 = range.0.min(cost);
            range.1 = range.1.max(cost);
        }
    }

    fn bin_of(&self, h: &Histogram) -> usize {
        let partition = |(min, max): (f64, f64), val: f64| -> usize {
            let range = max - min;
            if range > 0.0 {
                ((NUM_PARTITIONS as f64 - 1e-6) * (val - min) / range) as usize
            } else {
                0
            }
        };
        let mut bin = partition(self.literal, h.literal_cost);
        bin = bin * NUM_PARTITIONS + partition(self.red, h.red_cost);
        bin * NUM_PARTITIONS + partition(self.blue, h.blue_cost)
    }
}

fn entropy_bin_map(histos: &[Option<Histogram>]) -> Vec<usize> {
    let mut range = DominantCostRange::new();
    for h in histos.iter().flatten() {
        range.update(h);
    }
    histos
        .iter()
        .map(|h| h.as_ref().map_or(0, |h| range.bin_of(h)))
        .collect()
}

/// Merge each histogram into the first one of its bin when that saves a
/// `factor` share of its cost.
fn combine_entropy_bin(histos: &mut [Option<Histogram>], bin_map: &[usize], factor: f64) {
    let mut first_in_bin: [Option<usize>; BIN_SIZE] = [None; BIN_SIZE];
    let mut failures = [0u32; BIN_SIZE];

    for idx in 0..histos.len() {
        let bin = bin_map[idx];
        let Some(h) = histos[idx].as_ref() else {
            continue;
        };
        let Some(first) = first_in_bin[bin] else {
            first_in_bin[bin] = Some(idx);
            continue;
        };
        let Some(first_h) = histos[first].as_ref() else {
            continue;
        };

        let threshold = -h.bit_cost * factor;
        let Some((diff, merged)) = first_h.add_eval(h, threshold) else {
            continue;
        };
        if diff >= threshold {
            continue;
        }
        // Merging two histograms that each need a real code into one with a
        // trivial alpha/red/blue loses that cheap case; only do it once the
        // bin keeps failing.
        let try_combine = merged.trivial_symbol != NON_TRIVIAL_SYM
            || (h.trivial_symbol == NON_TRIVIAL_SYM && first_h.trivial_symbol == NON_TRIVIAL_SYM);
        if try_combine || failures[bin] >= MAX_COMBINE_FAILURES {
            histos[first] = Some(merged);
            histos[idx] = None;
        } else {
            failures[bin] += 1;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct HistogramPair {
    idx1: usize,
    idx2: usize,
    cost_diff: f64,
    cost_combo: f64,
}

/// Score merging `idx1` and `idx2`; `None` unless the saving beats `threshold`.
fn evaluate_pair(histos: &[Option<Histogram>], idx1: usize, idx2: usize, threshold: f64) -> Option<HistogramPair> {
    let h1 = histos[idx1].as_ref()?;
    let h2 = histos[idx2].as_ref()?;
    let sum_cost = h1.bit_cost + h2.bit_cost;
    let cost_combo = h1.combined_cost(h2, 0.0, sum_cost + threshold)?;
    let cost_diff = cost_combo - sum_cost;
    (cost_diff < threshold).then_some(HistogramPair {
        idx1,
        idx2,
        cost_diff,
        cost_combo,
    })
}

/// Keep the cheapest pair at the head of the list.
#[inline]
fn update_head(list: &mut [HistogramPair], j: usize) {
    if list[j].cost_diff < list[0].cost_diff {
        list.swap(0, j);
    }
}

/// Append the pair if it beats `threshold`; returns its cost difference or 0.
fn push_pair(
    list: &mut Vec<HistogramPair>,
    max_size: usize,
    histos: &[Option<Histogram>],
    idx1: usize,
    idx2: usize,
    threshold: f64,
) -> f64 {
    if list.len() == max_size {
        return 0.0;
    }
    let (idx1, idx2) = if idx1 > idx2 { (idx2, idx1) } else { (idx1, idx2) };
    match evaluate_pair(histos, idx1, idx2, threshold) {
        Some(pair) => {
            list.push(pair);
            let last = list.len() - 1;
            update_head(list, last);
            pair.cost_diff
        }
        None => 0.0,
    }
}

/// Fold `idx2` into `idx1`.
fn merge_pair(histos: &mut [Option<Histogram>], pair: &HistogramPair) {
    let Some(h2) = histos[pair.idx2].take() else {
        return;
    };
    if let Some(h1) = histos[pair.idx1].as_mut() {
        h1.add(&h2);
        h1.bit_cost = pair.cost_combo;
    }
}

/// Randomized merging until at most `min_cluster_size` histograms remain or
/// sampling stops finding savings.
///
/// Returns whether the greedy pass should follow.
fn combine_stochastic(histos: &mut [Option<Histogram>], min_cluster_size: usize, rng: &mut Lehmer) -> bool {
    let mut num_used = histos.iter().filter(|h| h.is_some()).count();
    if num_used < min_cluster_size {
        return true;
    }
    let outer_iters = num_used;
    let num_tries_no_success = outer_iters / 2;
    let mut tries_with_no_success = 0;

    let mut list: Vec<HistogramPair> = Vec::with_capacity(PRIORITY_LIST_MAX);
    // Positions of the live histograms.
    let mut mappings: Vec<usize> = (0..histos.len()).filter(|&i| histos[i].is_some()).collect();

    let mut iter = 0;
    while iter < outer_iters && num_used >= min_cluster_size {
        tries_with_no_success += 1;
        if tries_with_no_success >= num_tries_no_success {
            break;
        }
        iter += 1;

        let mut best_cost = list.first().map_or(0.0, |p| p.cost_diff);
        let num_tries = num_used / 2;
        if num_used >= 2 {
            let rand_range = ((num_used - 1) * num_used) as u64;
            for _ in 0..num_tries {
                let tmp = u64::from(rng.next_u32()) % rand_range;
                let idx1 = (tmp / (num_used as u64 - 1)) as usize;
                let mut idx2 = (tmp % (num_used as u64 - 1)) as usize;
                if idx2 >= idx1 {
                    idx2 += 1;
                }
                let curr_cost =
                    push_pair(&mut list, PRIORITY_LIST_MAX, histos, mappings[idx1], mappings[idx2], best_cost);
                if curr_cost < 0.0 {
                    best_cost = curr_cost;
                    if list.len() == PRIORITY_LIST_MAX {
                        break;
                    }
                }
            }
        }

        let Some(&best) = list.first() else {
            continue;
        };
        mappings.retain(|&m| m != best.idx2);
        merge_pair(histos, &best);
        num_used -= 1;

        // Drop pairs made stale by the merge and re-score the ones that
        // referred to either merged histogram.
        let mut j = 0;
        while j < list.len() {
            let mut p = list[j];
            let first_merged = p.idx1 == best.idx1 || p.idx1 == best.idx2;
            let second_merged = p.idx2 == best.idx1 || p.idx2 == best.idx2;
            if first_merged && second_merged {
                list.swap_remove(j);
                continue;
            }
            if first_merged {
                p.idx1 = best.idx1;
            } else if second_merged {
                p.idx2 = best.idx1;
            }
            if p.idx1 > p.idx2 {
                core::mem::swap(&mut p.idx1, &mut p.idx2);
            }
            if first_merged || second_merged {
                match evaluate_pair(histos, p.idx1, p.idx2, 0.0) {
                    Some(updated) => p = updated,
                    None => {
                        list.swap_remove(j);
                        continue;
                    }
                }
            }
            list[j] = p;
            update_head(&mut list, j);
            j += 1;
        }
        tries_with_no_success = 0;
    }
    num_used <= min_cluster_size
}

/// Exhaustive pairwise merging of compacted histograms.
///
/// Pairs are merged while that saves bits. If more than `max_clusters`
/// remain afterwards, the cheapest pairs are merged anyway until the
/// ceiling is met; from `get_histo_image_symbols` the stochastic pass has already
/// met it, so this only binds when called directly.
fn combine_greedy(histos: &mut [Option<Histogram>], max_clusters: usize) {
    let size = histos.len();
    let mut list: Vec<HistogramPair> = Vec::new();
    for i in 0..size {
        for j in i + 1..size {
            push_pair(&mut list, usize::MAX, histos, i, j, 0.0);
        }
    }

    while let Some(&best) = list.first() {
        merge_pair(histos, &best);
        let mut i = 0;
        while i < list.len() {
            let p = list[i];
            if p.idx1 == best.idx1 || p.idx2 == best.idx1 || p.idx1 == best.idx2 || p.idx2 == best.idx2 {
                list.swap_remove(i);
            } else {
                update_head(&mut list, i);
                i += 1;
            }
        }
        for i in 0..size {
            if i != best.idx1 && histos[i].is_some() {
                push_pair(&mut list, usize::MAX, histos, best.idx1, i, 0.0);
            }
        }
    }

    let mut live = histos.iter().filter(|h| h.is_some()).count();
    while live > max_clusters.max(1) {
        let mut forced: Option<HistogramPair> = None;
        for i in 0..size {
            for j in i + 1..size {
                if let Some(pair) = evaluate_pair(histos, i, j, f64::MAX) {
                    if forced.map_or(true, |f| pair.cost_diff < f.cost_diff) {
                        forced = Some(pair);
                    }
                }
            }
        }
        let Some(pair) = forced else {
            break;
        };
        merge_pair(histos, &pair);
        live -= 1;
    }
}

/// Assign every tile histogram to the cluster it adds the fewest bits to,
/// then rebuild the clusters from their members.
fn remap(input: &[Option<Histogram>], clusters: &[Histogram], cache_bits: u8) -> (Vec<Histogram>, Vec<u16>) {
    let mut symbols = vec![0u16; input.len()];
    if clusters.len() > 1 {
        for i in 0..input.len() {
            let Some(h) = input[i].as_ref() else {
                // Unused tiles copy their neighbour, which helps LZ77 on
                // the histogram image.
                symbols[i] = if i > 0 { symbols[i - 1] } else { 0 };
                continue;
            };
            let mut best_out = 0usize;
            let mut best_bits = f64::MAX;
            for (k, cluster) in clusters.iter().enumerate() {
                if let Some(bits) = cluster.add_thresh(h, best_bits) {
                    if k == 0 || bits < best_bits {
                        best_bits = bits;
                        best_out = k;
                    }
                }
            }
            symbols[i] = best_out as u16;
        }
    }

    let mut output = vec![Histogram::new(cache_bits); clusters.len().max(1)];
    for (h, &sym) in input.iter().zip(&symbols) {
        if let Some(h) = h {
            output[usize::from(sym)].add(h);
        }
    }
    (output, symbols)
}

/// Remove clusters no tile maps to and renumber the symbols densely, in
/// order of first use.
fn drop_unused_clusters(histograms: Vec<Histogram>, symbols: &mut [u16]) -> Vec<Histogram> {
    const UNSEEN: u16 = u16::MAX;
    let mut renumber = vec![UNSEEN; histograms.len()];
    let mut next = 0u16;
    for sym in symbols.iter_mut() {
        let slot = &mut renumber[usize::from(*sym)];
        if *slot == UNSEEN {
            *slot = next;
            next += 1;
        }
        *sym = *slot;
    }
    let mut kept: Vec<Option<Histogram>> = vec![None; usize::from(next)];
    for (h, &new) in histograms.into_iter().zip(&renumber) {
        if new != UNSEEN {
            kept[usize::from(new)] = Some(h);
        }
    }
    kept.into_iter().flatten().collect()
}
