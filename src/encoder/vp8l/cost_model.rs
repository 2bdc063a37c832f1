//! Cost model and optimal parsing for VP8L backward references.
//!
//! A Zopfli-like pass that improves greedy LZ77: per-symbol bit costs are
//! derived from a first token stream, then a forward dynamic program finds
//! the cheapest literal/copy decomposition of the image.
//!
//! Copies contribute to many future positions at once. Instead of updating
//! each of them, contributions are kept as a sorted list of non-overlapping
//! cost intervals and resolved lazily, one pixel at a time.

use alloc::vec;
use alloc::vec::Vec;

use super::backward_refs::distance_to_plane_code;
use super::color_cache::ColorCache;
use super::entropy::log2;
use super::hash_chain::HashChain;
use super::histogram::{prefix_encode, Histogram};
use super::types::{
    argb_alpha, argb_blue, argb_green, argb_red, BackwardRefs, PixOrCopy, MAX_LENGTH,
    NUM_LENGTH_CODES, NUM_LITERAL_CODES,
};

/// Max active intervals before contributions are applied directly.
const COST_CACHE_INTERVAL_SIZE_MAX: usize = 500;

/// Copies shorter than this are applied directly instead of as intervals.
const SKIP_DISTANCE: usize = 10;

/// Literal cost scale when the pixel is a cache hit / miss.
const CACHE_HIT_COST_SCALE: f64 = 0.68;
const LITERAL_COST_SCALE: f64 = 0.82;

/// Per-symbol cost estimates: `log2(total) - log2(count)`.
///
/// A population with at most one symbol costs nothing to code.
fn population_to_bit_estimates(counts: &[u32]) -> Vec<f64> {
    let nonzeros = counts.iter().filter(|&&c| c > 0).count();
    if nonzeros <= 1 {
        return vec![0.0; counts.len()];
    }
    let logsum = log2(counts.iter().sum());
    counts.iter().map(|&c| logsum - log2(c)).collect()
}

/// Per-symbol bit cost model built from histogram statistics.
#[derive(Debug)]
pub struct CostModel {
    /// Green, length and cache symbols.
    literal: Vec<f64>,
    red: Vec<f64>,
    blue: Vec<f64>,
    alpha: Vec<f64>,
    distance: Vec<f64>,
}

impl CostModel {
    pub fn build(xsize: usize, cache_bits: u8, refs: &BackwardRefs) -> Self {
        let histo = Histogram::from_refs(refs, cache_bits, xsize);
        Self {
            literal: population_to_bit_estimates(&histo.literal),
            red: population_to_bit_estimates(&histo.red),
            blue: population_to_bit_estimates(&histo.blue),
            alpha: population_to_bit_estimates(&histo.alpha),
            distance: population_to_bit_estimates(&histo.distance),
        }
    }

    #[inline]
    fn literal_cost(&self, argb: u32) -> f64 {
        self.alpha[argb_alpha(argb) as usize]
            + self.red[argb_red(argb) as usize]
            + self.literal[argb_green(argb) as usize]
            + self.blue[argb_blue(argb) as usize]
    }

    #[inline]
    fn cache_cost(&self, key: u32) -> f64 {
        self.literal[NUM_LITERAL_CODES + NUM_LENGTH_CODES + key as usize]
    }

    #[inline]
    fn length_cost(&self, length: usize) -> f64 {
        let (code, n_extra, _) = prefix_encode(length as u32);
        self.literal[NUM_LITERAL_CODES + code as usize] + f64::from(n_extra)
    }

    #[inline]
    fn distance_cost(&self, plane_code: u32) -> f64 {
        let (code, n_extra, _) = prefix_encode(plane_code);
        self.distance[code as usize] + f64::from(n_extra)
    }
}

/// Best known contribution of one source position over `[start, end)`.
#[derive(Debug, Clone)]
struct CostInterval {
    cost: f64,
    start: usize,
    end: usize,
    index: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Run of copy lengths sharing the same length cost.
#[derive(Debug)]
struct CostCacheInterval {
    cost: f64,
    start: usize,
    end: usize,
}

/// Sorted, index-linked list of cost intervals plus the resolved costs.
struct CostManager {
    intervals: Vec<CostInterval>,
    head: Option<usize>,
    free_slots: Vec<usize>,
    count: usize,
    cache_intervals: Vec<CostCacheInterval>,
    /// `cost_cache[k]`: cost of the length symbol for a copy ending `k` past its start.
    cost_cache: Vec<f64>,
    /// Cheapest known cost to code pixels `0..=i`.
    costs: Vec<f64>,
    /// Step that reached pixel `i`: 1 for a literal, the copy length otherwise.
    dist_array: Vec<u16>,
}

impl CostManager {
    fn new(pix_count: usize, cost_model: &CostModel) -> Self {
        let cost_cache_size = pix_count.min(MAX_LENGTH);
        let cost_cache: Vec<f64> = (0..cost_cache_size)
            .map(|k| cost_model.length_cost(k.max(1)))
            .collect();

        let mut cache_intervals: Vec<CostCacheInterval> = Vec::with_capacity(32);
        for (i, &cost) in cost_cache.iter().enumerate() {
            match cache_intervals.last_mut() {
                Some(last) if last.cost == cost => last.end = i + 1,
                _ => cache_intervals.push(CostCacheInterval {
                    cost,
                    start: i,
                    end: i + 1,
                }),
            }
        }

        Self {
            intervals: Vec::with_capacity(64),
            head: None,
            free_slots: Vec::new(),
            count: 0,
            cache_intervals,
            cost_cache,
            costs: vec![f64::MAX; pix_count],
            dist_array: vec![0; pix_count],
        }
    }

    fn alloc_interval(&mut self, cost: f64, start: usize, end: usize, index: usize) -> usize {
        let interval = CostInterval {
            cost,
            start,
            end,
            index,
            prev: None,
            next: None,
        };
        if let Some(slot) = self.free_slots.pop() {
            self.intervals[slot] = interval;
            slot
        } else {
            self.intervals.push(interval);
            self.intervals.len() - 1
        }
    }

    /// Lower the cost of pixel `i` if a copy from `position` beats it.
    #[inline]
    fn update_cost(&mut self, i: usize, position: usize, cost: f64) {
        let k = i - position;
        debug_assert!(k < MAX_LENGTH);
        if self.costs[i] > cost {
            self.costs[i] = cost;
            self.dist_array[i] = (k + 1) as u16;
        }
    }

    fn update_cost_per_interval(&mut self, start: usize, end: usize, position: usize, cost: f64) {
        for i in start..end {
            self.update_cost(i, position, cost);
        }
    }

    fn connect(&mut self, prev: Option<usize>, next: Option<usize>) {
        match prev {
            Some(p) => self.intervals[p].next = next,
            None => self.head = next,
        }
        if let Some(n) = next {
            self.intervals[n].prev = prev;
        }
    }

    fn pop_interval(&mut self, slot: usize) {
        let CostInterval { prev, next, .. } = self.intervals[slot];
        self.connect(prev, next);
        self.free_slots.push(slot);
        self.count -= 1;
    }

    /// Link `slot` into the list by start position, searching from `hint`.
    fn position_orphan(&mut self, slot: usize, hint: Option<usize>) {
        let start = self.intervals[slot].start;
        let mut prev = hint.or(self.head);
        while let Some(p) = prev {
            if start >= self.intervals[p].start {
                break;
            }
            prev = self.intervals[p].prev;
        }
        while let Some(p) = prev {
            match self.intervals[p].next {
                Some(n) if self.intervals[n].start < start => prev = Some(n),
                _ => break,
            }
        }
        let after = match prev {
            Some(p) => self.intervals[p].next,
            None => self.head,
        };
        self.connect(Some(slot), after);
        self.connect(prev, Some(slot));
    }

    fn insert_interval(&mut self, hint: Option<usize>, cost: f64, position: usize, start: usize, end: usize) {
        if start >= end {
            return;
        }
        if self.count >= COST_CACHE_INTERVAL_SIZE_MAX {
            self.update_cost_per_interval(start, end, position, cost);
            return;
        }
        let slot = self.alloc_interval(cost, start, end, position);
        self.position_orphan(slot, hint);
        self.count += 1;
    }

    /// Register a copy starting at `position` of up to `len` pixels whose
    /// distance costs `distance_cost`.
    ///
    /// Existing intervals that are cheaper are left untouched; the new one
    /// only fills the gaps where it wins.
    fn push_interval(&mut self, distance_cost: f64, position: usize, len: usize) {
        if len < SKIP_DISTANCE {
            for j in position..position + len {
                let k = j - position;
                let cost = distance_cost + self.cost_cache[k];
                if self.costs[j] > cost {
                    self.costs[j] = cost;
                    self.dist_array[j] = (k + 1) as u16;
                }
            }
            return;
        }

        let mut interval = self.head;
        for ci in 0..self.cache_intervals.len() {
            let CostCacheInterval { cost: ci_cost, start: ci_start, end: ci_end } = self.cache_intervals[ci];
            if ci_start >= len {
                break;
            }
            let mut start = position + ci_start;
            let end = position + ci_end.min(len);
            let cost = distance_cost + ci_cost;

            while let Some(slot) = interval {
                let current = &self.intervals[slot];
                if current.start >= end {
                    break;
                }
                let (cur_start, cur_end, cur_cost, cur_index, next) =
                    (current.start, current.end, current.cost, current.index, current.next);

                if start >= cur_end {
                    interval = next;
                    continue;
                }

                if cost >= cur_cost {
                    // Keep the cheaper interval; only fill the gap before it.
                    self.insert_interval(Some(slot), cost, position, start, cur_start);
                    start = cur_end;
                    if start >= end {
                        break;
                    }
                    interval = next;
                    continue;
                }

                if start <= cur_start {
                    if cur_end <= end {
                        self.pop_interval(slot);
                    } else {
                        self.intervals[slot].start = end;
                        break;
                    }
                } else if end < cur_end {
                    // The old interval surrounds the new one: split it.
                    self.intervals[slot].end = start;
                    self.insert_interval(Some(slot), cur_cost, cur_index, end, cur_end);
                    interval = self.intervals[slot].next;
                    break;
                } else {
                    self.intervals[slot].end = start;
                }
                interval = next;
            }

            self.insert_interval(interval, cost, position, start, end);
        }
    }

    /// Resolve pixel `i` against every interval covering it. With
    /// `do_clean`, intervals ending before `i` are dropped.
    fn update_cost_at_index(&mut self, i: usize, do_clean: bool) {
        let mut current = self.head;
        while let Some(slot) = current {
            let CostInterval { start, end, cost, index, next, .. } = self.intervals[slot];
            if start > i {
                break;
            }
            if end <= i {
                if do_clean {
                    self.pop_interval(slot);
                }
            } else {
                self.update_cost(i, index, cost);
            }
            current = next;
        }
    }

    /// Try pixel `idx` as a literal (or cache hit) following `prev_cost`.
    fn add_single_literal(
        &mut self,
        argb: u32,
        idx: usize,
        prev_cost: f64,
        model: &CostModel,
        cache: Option<&mut ColorCache>,
    ) {
        let mut cost = prev_cost;
        match cache {
            Some(cache) => match cache.contains(argb) {
                Some(key) => cost += model.cache_cost(key) * CACHE_HIT_COST_SCALE,
                None => {
                    cache.insert(argb);
                    cost += model.literal_cost(argb) * LITERAL_COST_SCALE;
                }
            },
            None => cost += model.literal_cost(argb) * LITERAL_COST_SCALE,
        }
        if self.costs[idx] > cost {
            self.costs[idx] = cost;
            self.dist_array[idx] = 1;
        }
    }
}

/// Cheapest token stream for `argb` given the matches in `chain`, with
/// symbol costs learned from `refs`.
///
/// Copies reuse the chain's offsets; only their lengths are re-decided.
pub fn trace_backwards(
    argb: &[u32],
    xsize: usize,
    cache_bits: u8,
    chain: &HashChain,
    refs: &BackwardRefs,
) -> BackwardRefs {
    let pix_count = argb.len();
    if pix_count == 0 {
        return BackwardRefs::default();
    }
    let model = CostModel::build(xsize, cache_bits, refs);
    let dist_array = distance_only(argb, xsize, cache_bits, chain, &model);
    let path = chosen_path(&dist_array);
    follow_path(argb, cache_bits, &path, chain)
}

/// Forward pass: for every pixel, the step of the cheapest way to reach it.
fn distance_only(argb: &[u32], xsize: usize, cache_bits: u8, chain: &HashChain, model: &CostModel) -> Vec<u16> {
    let pix_count = argb.len();
    let mut manager = CostManager::new(pix_count, model);
    let mut cache = (cache_bits > 0).then(|| ColorCache::new(cache_bits));

    manager.add_single_literal(argb[0], 0, 0.0, model, cache.as_mut());

    let mut offset_prev: Option<usize> = None;
    let mut len_prev = 0usize;
    let mut offset_cost = 0.0;
    let mut first_offset_is_constant = true;
    let mut reach = 0usize;

    for i in 1..pix_count {
        let prev_cost = manager.costs[i - 1];
        let (offset, len) = chain.find_copy(i);

        manager.add_single_literal(argb[i], i, prev_cost, model, cache.as_mut());

        if len >= 2 {
            if offset_prev != Some(offset) {
                offset_cost = model.distance_cost(distance_to_plane_code(xsize, offset));
                first_offset_is_constant = true;
                manager.push_interval(prev_cost + offset_cost, i, len);
            } else {
                // Same offset as the previous pixel (e.g. a flat region):
                // its intervals already cover everything up to `reach`.
                if first_offset_is_constant {
                    reach = i - 1 + len_prev - 1;
                    first_offset_is_constant = false;
                }
                if i + len - 1 > reach {
                    let mut j = i;
                    while j <= reach && chain.offset(j + 1) == offset {
                        j += 1;
                    }
                    let len_j = chain.length(j);
                    manager.update_cost_at_index(j - 1, false);
                    manager.update_cost_at_index(j, false);
                    manager.push_interval(manager.costs[j - 1] + offset_cost, j, len_j);
                    reach = (j + len_j).saturating_sub(1);
                }
            }
        }

        manager.update_cost_at_index(i, true);
        offset_prev = Some(offset);
        len_prev = len;
    }
    manager.dist_array
}

/// Walk the steps back from the last pixel; returns them in forward order.
fn chosen_path(dist_array: &[u16]) -> Vec<u16> {
    let mut path = Vec::new();
    let mut cur = dist_array.len();
    while cur > 0 {
        let step = dist_array[cur - 1].max(1);
        path.push(step);
        cur = cur.saturating_sub(usize::from(step));
    }
    path.reverse();
    path
}

fn follow_path(argb: &[u32], cache_bits: u8, path: &[u16], chain: &HashChain) -> BackwardRefs {
    let mut refs = BackwardRefs::with_capacity(path.len());
    let mut cache = (cache_bits > 0).then(|| ColorCache::new(cache_bits));
    let mut i = 0usize;
    for &step in path {
        let len = usize::from(step);
        if len == 1 {
            let pix = argb[i];
            let token = match cache.as_mut() {
                Some(cache) => match cache.contains(pix) {
                    Some(key) => PixOrCopy::cache_idx(key),
                    None => {
                        cache.insert(pix);
                        PixOrCopy::literal(pix)
                    }
                },
                None => PixOrCopy::literal(pix),
            };
            refs.push(token);
        } else {
            refs.push(PixOrCopy::copy(len, chain.offset(i)));
            if let Some(cache) = cache.as_mut() {
                for &p in &argb[i..i + len] {
                    cache.insert(p);
                }
            }
        }
        i += len;
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::vp8l::backward_refs::tests::replay;
    use crate::encoder::vp8l::backward_refs::{lz77_standard, with_local_cache};
    use crate::encoder::vp8l::types::Vp8lQuality;

    fn flat_model(literal_bits: f64) -> CostModel {
        CostModel {
            literal: vec![literal_bits; NUM_LITERAL_CODES + NUM_LENGTH_CODES],
            red: vec![0.0; 256],
            blue: vec![0.0; 256],
            alpha: vec![0.0; 256],
            distance: vec![0.0; 40],
        }
    }

    /// Resolve all pending intervals, as the forward pass would.
    fn settle(manager: &mut CostManager) {
        for i in 0..manager.costs.len() {
            manager.update_cost_at_index(i, false);
        }
    }

    #[test]
    fn bit_estimates() {
        assert!(population_to_bit_estimates(&[0, 100, 0, 0]).iter().all(|&e| e == 0.0));
        let e = population_to_bit_estimates(&[100, 100, 100, 100]);
        assert!(e.iter().all(|&v| (v - 2.0).abs() < 1e-12));
        let e = population_to_bit_estimates(&[1, 3]);
        assert!((e[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn length_cost_cache_groups_equal_costs() {
        let manager = CostManager::new(100, &flat_model(1.0));
        assert_eq!(manager.cost_cache.len(), 100);
        let covered: usize = manager.cache_intervals.iter().map(|c| c.end - c.start).sum();
        assert_eq!(covered, 100);
        for c in &manager.cache_intervals {
            for k in c.start..c.end {
                assert_eq!(manager.cost_cache[k], c.cost);
            }
        }
    }

    #[test]
    fn short_copies_apply_directly() {
        let mut manager = CostManager::new(100, &flat_model(1.0));
        manager.push_interval(0.0, 10, 5);
        for j in 10..15 {
            assert!(manager.costs[j] < f64::MAX);
            assert_eq!(usize::from(manager.dist_array[j]), j - 10 + 1);
        }
        assert_eq!(manager.costs[9], f64::MAX);
        assert_eq!(manager.costs[15], f64::MAX);
        assert_eq!(manager.count, 0);
    }

    #[test]
    fn worse_overlapping_interval_keeps_cheaper_costs() {
        let mut manager = CostManager::new(200, &flat_model(1.0));
        manager.push_interval(10.0, 20, 60);
        manager.push_interval(50.0, 30, 80);
        settle(&mut manager);

        let mut reference = CostManager::new(200, &flat_model(1.0));
        reference.push_interval(10.0, 20, 60);
        settle(&mut reference);

        for j in 20..80 {
            assert_eq!(manager.costs[j], reference.costs[j], "pixel {j}");
            assert_eq!(manager.dist_array[j], reference.dist_array[j]);
        }
        // Beyond the first copy the second one is all there is.
        for j in 80..110 {
            assert!(manager.costs[j] >= 50.0 && manager.costs[j] < f64::MAX);
            assert_eq!(usize::from(manager.dist_array[j]), j - 30 + 1);
        }
    }

    #[test]
    fn cheaper_overlapping_interval_wins() {
        let mut manager = CostManager::new(200, &flat_model(1.0));
        manager.push_interval(50.0, 20, 60);
        manager.push_interval(10.0, 30, 40);
        settle(&mut manager);
        for j in 30..70 {
            assert!(manager.costs[j] < 50.0);
            assert_eq!(usize::from(manager.dist_array[j]), j - 30 + 1);
        }
        for j in 20..30 {
            assert!(manager.costs[j] >= 50.0);
        }
    }

    #[test]
    fn interval_list_stays_sorted_and_disjoint() {
        let mut manager = CostManager::new(400, &flat_model(2.0));
        let pushes = [(30.0, 5, 100), (10.0, 50, 40), (20.0, 40, 200), (5.0, 120, 15), (40.0, 0, 300)];
        for (cost, pos, len) in pushes {
            manager.push_interval(cost, pos, len);
        }
        let mut last_end = 0;
        let mut current = manager.head;
        let mut seen = 0;
        while let Some(slot) = current {
            let interval = &manager.intervals[slot];
            assert!(interval.start < interval.end);
            assert!(interval.start >= last_end);
            last_end = interval.end;
            current = interval.next;
            seen += 1;
        }
        assert_eq!(seen, manager.count);
    }

    #[test]
    fn traced_refs_reconstruct_the_image() {
        let width = 24;
        let mut state = 99u32;
        let pixels: Vec<u32> = (0..width * 18)
            .map(|i| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
                if (state >> 16) % 5 == 0 {
                    0xff00_0000 | ((state >> 10) & 0x3)
                } else {
                    0xff00_0000 | ((i % width) as u32 / 4)
                }
            })
            .collect();
        let quality = Vp8lQuality { quality: 90, method: 4 };
        let chain = HashChain::new(&pixels, width, quality, false);
        for cache_bits in [0u8, 3] {
            let mut refs = BackwardRefs::default();
            lz77_standard(&pixels, &chain, &mut refs);
            if cache_bits > 0 {
                with_local_cache(&pixels, cache_bits, &mut refs);
            }
            let traced = trace_backwards(&pixels, width, cache_bits, &chain, &refs);
            assert_eq!(replay(&traced, cache_bits), pixels);
        }
    }

    #[test]
    fn path_steps_cover_every_pixel() {
        let path = chosen_path(&[1, 1, 2, 3, 1, 1, 5]);
        // 7 pixels: the last step of 5 lands on pixel 1, reached by a literal.
        assert_eq!(path, [1, 1, 5]);
    }
}
