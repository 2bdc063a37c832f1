//! Top-level VP8L encoder: crunch configuration search, transform
//! application and bitstream assembly.

use alloc::vec;
use alloc::vec::Vec;

use super::analysis::{analyze_entropy, histo_bits, transform_bits, Analysis, EntropyMode};
use super::backward_refs::{distance_to_plane_code, get_backward_references, ChosenRefs, Lz77Kind, RefsScratch};
use super::bitwriter::BitWriter;
use super::histogram::{prefix_encode, Histogram};
use super::huffman::{HuffmanCode, MAX_ALLOWED_CODE_LENGTH};
use super::meta_huffman::get_histo_image_symbols;
use super::palette::ColorIndexTransform;
use super::transforms::{
    apply_cross_color_transform, apply_predictor_transform, apply_subtract_green, TransformType,
};
use super::types::{
    argb_alpha, argb_blue, argb_green, argb_red, subsample_size, BackwardRefs, PixOrCopy, Vp8lQuality,
    MAX_COLOR_CACHE_BITS, MAX_PALETTE_SIZE, NUM_LENGTH_CODES, NUM_LITERAL_CODES, VP8L_IMAGE_SIZE_BITS,
    VP8L_MAX_DIMENSION, VP8L_SIGNATURE, VP8L_VERSION_BITS,
};
use crate::encoder::api::{EncodeError, EncodeStats, TransformSet};

/// Quality used for the delta-coded palette sub-image.
const PALETTE_SUB_IMAGE_QUALITY: u8 = 20;

/// Encoder parameters resolved from [`LosslessConfig`](crate::LosslessConfig).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Vp8lParams {
    pub quality: Vp8lQuality,
    /// Upper bound on the color cache; `None` lets the encoder decide.
    pub cache_bits: Option<u8>,
    /// Seed for stochastic histogram clustering.
    pub seed: u32,
}

/// Encode `width * height` ARGB pixels into a bare VP8L bitstream.
pub(crate) fn encode_vp8l(
    argb: &[u32],
    width: usize,
    height: usize,
    params: &Vp8lParams,
    stop: &dyn enough::Stop,
) -> Result<(Vec<u8>, EncodeStats), EncodeError> {
    let max = VP8L_MAX_DIMENSION as usize;
    if width == 0 || height == 0 || width > max || height > max {
        return Err(EncodeError::InvalidDimensions);
    }
    if argb.len() != width * height {
        return Err(EncodeError::InvalidBufferSize(alloc::format!(
            "expected {} pixels, got {}",
            width * height,
            argb.len()
        )));
    }

    let quality = params.quality;
    let palette = ColorIndexTransform::try_build(argb);
    let palette_size = palette.as_ref().map(ColorIndexTransform::len);
    if let Some(size) = palette_size {
        if size == 0 || size > MAX_PALETTE_SIZE {
            return Err(EncodeError::PaletteOverflow(size));
        }
    }

    let histo_bits = histo_bits(quality.method, palette.is_some(), width as u32, height as u32);
    let transform_bits = transform_bits(quality.method, histo_bits);
    let analysis = analyze_entropy(argb, width, height, palette_size, transform_bits);
    let plan = CrunchPlan::new(&analysis, palette_size, quality);
    log::debug!(
        "vp8l {width}x{height} q={} m={}: modes {:?}, palette {palette_size:?}, try_without_cache={}",
        quality.quality,
        quality.method,
        plan.modes,
        plan.try_without_cache
    );

    let ctx = EncodeContext {
        width,
        height,
        has_alpha: argb.iter().any(|&p| argb_alpha(p) != 0xff),
        palette: palette.as_ref(),
        red_and_blue_always_zero: analysis.red_and_blue_always_zero,
        histo_bits,
        transform_bits,
        params,
        try_without_cache: plan.try_without_cache,
    };
    let mut scratch = EncoderScratch::default();

    let Some((&first, rest)) = plan.modes.split_first() else {
        unreachable!("crunch plan always holds at least one mode");
    };
    stop.check()?;
    let mut best = ctx.encode_mode(argb, first, &mut scratch, stop)?;
    for &mode in rest {
        stop.check()?;
        let candidate = ctx.encode_mode(argb, mode, &mut scratch, stop)?;
        if candidate.bytes.len() < best.bytes.len() {
            best = candidate;
        }
    }
    log::debug!("vp8l: kept {:?} at {} bytes", best.mode, best.bytes.len());

    let stats = EncodeStats {
        coded_size: best.bytes.len() as u32,
        transforms: best.transforms,
        palette_size: if best.transforms.palette {
            palette_size.unwrap_or(0) as u16
        } else {
            0
        },
        cache_bits: best.cache_bits,
        histogram_bits: if best.num_histograms > 1 { histo_bits } else { 0 },
        transform_bits: if best.transforms.predictor || best.transforms.cross_color {
            transform_bits
        } else {
            0
        },
        num_histograms: best.num_histograms as u32,
        configs_tried: plan.modes.len() as u32,
    };
    Ok((best.bytes, stats))
}

/// Transform combinations to try, and whether each LZ77 sub-configuration
/// is also tried without a color cache.
#[derive(Debug)]
struct CrunchPlan {
    modes: Vec<EntropyMode>,
    try_without_cache: bool,
}

impl CrunchPlan {
    fn new(analysis: &Analysis, palette_size: Option<usize>, quality: Vp8lQuality) -> Self {
        if quality.method == 6 && quality.quality == 100 {
            let modes = EntropyMode::ALL
                .iter()
                .copied()
                .filter(|m| palette_size.is_some() || !m.uses_palette())
                .collect();
            return Self {
                modes,
                try_without_cache: true,
            };
        }

        let mut modes = vec![analysis.mode];
        let mut try_without_cache = false;
        if quality.quality >= 75 && quality.method == 5 {
            try_without_cache = true;
            if analysis.mode == EntropyMode::Palette {
                modes.push(EntropyMode::PaletteAndSpatial);
            }
        }
        Self {
            modes,
            try_without_cache,
        }
    }
}

/// LZ77 strategy groups tried for one crunch configuration. Each group is
/// resolved to its cheapest strategy before serialization.
fn lz77_sub_configs(mode: EntropyMode, palette_size: Option<usize>) -> Vec<&'static [Lz77Kind]> {
    let mut subs: Vec<&'static [Lz77Kind]> = vec![&[Lz77Kind::Standard, Lz77Kind::Rle]];
    if mode.uses_palette() && palette_size.is_some_and(|n| n <= 16) {
        subs.push(&[Lz77Kind::Box]);
    }
    subs
}

/// Largest color cache worth trying: index images hold at most
/// `palette_size` distinct values.
fn cache_bits_cap(params: &Vp8lParams, palette_size: Option<usize>) -> u8 {
    if let Some(bits) = params.cache_bits {
        return bits.min(MAX_COLOR_CACHE_BITS);
    }
    match palette_size {
        Some(n) => (usize::BITS - 1 - n.max(1).leading_zeros()) as u8 + 1,
        None => MAX_COLOR_CACHE_BITS,
    }
}

/// Buffers reused across crunch configurations.
#[derive(Debug, Default)]
struct EncoderScratch {
    main: RefsScratch,
    /// Sub-images are encoded while `main` still holds the main image's
    /// hash chain.
    sub: RefsScratch,
}

/// Per-image facts shared by every crunch configuration.
struct EncodeContext<'a> {
    width: usize,
    height: usize,
    has_alpha: bool,
    palette: Option<&'a ColorIndexTransform>,
    red_and_blue_always_zero: bool,
    histo_bits: u8,
    transform_bits: u8,
    params: &'a Vp8lParams,
    try_without_cache: bool,
}

/// Serialized result of one crunch configuration.
struct ModeOutcome {
    mode: EntropyMode,
    bytes: Vec<u8>,
    transforms: TransformSet,
    cache_bits: u8,
    num_histograms: usize,
}

impl EncodeContext<'_> {
    fn encode_mode(
        &self,
        original: &[u32],
        mode: EntropyMode,
        scratch: &mut EncoderScratch,
        stop: &dyn enough::Stop,
    ) -> Result<ModeOutcome, EncodeError> {
        let quality = self.params.quality;
        let low_effort = quality.method == 0;
        let mut w = BitWriter::with_capacity(original.len());
        write_image_header(&mut w, self.width, self.height, self.has_alpha);

        let mut argb = original.to_vec();
        let mut width = self.width;
        let mut transforms = TransformSet::default();

        let palette = self.palette.filter(|_| mode.uses_palette());
        if let Some(palette) = palette {
            w.put_bit(true);
            w.put_bits(TransformType::ColorIndexing as u32, 2);
            w.put_bits(palette.len() as u32 - 1, 8);
            let sub_quality = Vp8lQuality {
                quality: PALETTE_SUB_IMAGE_QUALITY,
                method: quality.method,
            };
            encode_image_no_huffman(&mut w, &palette.delta_coded(), palette.len(), 1, sub_quality, &mut scratch.sub);
            let (packed, packed_width) = palette.apply(&argb, self.width, self.height);
            argb = packed;
            width = packed_width;
            transforms.palette = true;
        }

        if mode.uses_subtract_green() {
            w.put_bit(true);
            w.put_bits(TransformType::SubtractGreen as u32, 2);
            apply_subtract_green(&mut argb);
            transforms.subtract_green = true;
        }

        if mode.uses_predictor() {
            let bits = self.transform_bits;
            let modes = apply_predictor_transform(&mut argb, width, self.height, bits, low_effort);
            write_tile_transform(&mut w, TransformType::Predictor, bits, &modes, width, self.height, quality, scratch);
            transforms.predictor = true;

            if !low_effort && !self.red_and_blue_always_zero && !transforms.palette {
                let codes = apply_cross_color_transform(&mut argb, width, self.height, bits, quality.quality);
                write_tile_transform(&mut w, TransformType::CrossColor, bits, &codes, width, self.height, quality, scratch);
                transforms.cross_color = true;
            }
        }
        w.put_bit(false);

        let cache_cap = cache_bits_cap(self.params, self.palette.map(ColorIndexTransform::len));
        let image = self.encode_image(w, &argb, width, mode, cache_cap, scratch, stop)?;
        log::trace!(
            "{mode:?}: {:?} cache_bits={} histograms={} bits={}",
            image.kind,
            image.cache_bits,
            image.num_histograms,
            image.writer.bit_position()
        );

        Ok(ModeOutcome {
            mode,
            bytes: image.writer.finish(),
            transforms,
            cache_bits: image.cache_bits,
            num_histograms: image.num_histograms,
        })
    }

    /// Encode the (transformed) main image after `prefix`, trying every LZ77
    /// sub-configuration and keeping the shortest bitstream.
    #[allow(clippy::too_many_arguments)]
    fn encode_image(
        &self,
        prefix: BitWriter,
        argb: &[u32],
        width: usize,
        mode: EntropyMode,
        cache_cap: u8,
        scratch: &mut EncoderScratch,
        stop: &dyn enough::Stop,
    ) -> Result<ImageCandidate, EncodeError> {
        let quality = self.params.quality;
        scratch.main.hash_chain.fill(argb, width, quality, quality.method == 0);

        let mut caps = vec![cache_cap];
        if self.try_without_cache && cache_cap > 0 {
            caps.push(0);
        }

        let mut best: Option<ImageCandidate> = None;
        for kinds in lz77_sub_configs(mode, self.palette.map(ColorIndexTransform::len)) {
            for &cap in &caps {
                let chosen = get_backward_references(argb, width, quality, kinds, cap, &mut scratch.main);
                let mut w = prefix.clone();
                let num_histograms = write_main_image(
                    &mut w,
                    &chosen,
                    width,
                    self.height,
                    quality,
                    self.histo_bits,
                    self.params.seed,
                    &mut scratch.sub,
                );
                let candidate = ImageCandidate {
                    writer: w,
                    kind: chosen.kind,
                    cache_bits: chosen.cache_bits,
                    num_histograms,
                };
                log::trace!(
                    "sub-config {kinds:?} cap={cap}: cache_bits={} histograms={num_histograms} bits={}",
                    candidate.cache_bits,
                    candidate.writer.bit_position()
                );
                if best
                    .as_ref()
                    .map_or(true, |b| candidate.writer.bit_position() < b.writer.bit_position())
                {
                    best = Some(candidate);
                }
                stop.check()?;
            }
        }
        let Some(best) = best else {
            unreachable!("at least one LZ77 sub-configuration is always tried");
        };
        Ok(best)
    }
}

struct ImageCandidate {
    writer: BitWriter,
    kind: Lz77Kind,
    cache_bits: u8,
    num_histograms: usize,
}

fn write_image_header(w: &mut BitWriter, width: usize, height: usize, has_alpha: bool) {
    w.put_bits(u32::from(VP8L_SIGNATURE), 8);
    w.put_bits(width as u32 - 1, u32::from(VP8L_IMAGE_SIZE_BITS));
    w.put_bits(height as u32 - 1, u32::from(VP8L_IMAGE_SIZE_BITS));
    w.put_bit(has_alpha);
    w.put_bits(0, u32::from(VP8L_VERSION_BITS));
}

/// Write a predictor or cross-color transform: its tile size followed by
/// the per-tile sub-image.
#[allow(clippy::too_many_arguments)]
fn write_tile_transform(
    w: &mut BitWriter,
    kind: TransformType,
    bits: u8,
    tile_image: &[u32],
    width: usize,
    height: usize,
    quality: Vp8lQuality,
    scratch: &mut EncoderScratch,
) {
    w.put_bit(true);
    w.put_bits(kind as u32, 2);
    w.put_bits(u32::from(bits) - 2, 3);
    encode_image_no_huffman(
        w,
        tile_image,
        subsample_size(width as u32, bits) as usize,
        subsample_size(height as u32, bits) as usize,
        quality,
        &mut scratch.sub,
    );
}

/// Write the main image's entropy-coded data for `chosen`: color cache
/// flag, optional histogram image, prefix codes and tokens.
///
/// Returns the number of histograms (prefix code groups) written.
#[allow(clippy::too_many_arguments)]
fn write_main_image(
    w: &mut BitWriter,
    chosen: &ChosenRefs,
    width: usize,
    height: usize,
    quality: Vp8lQuality,
    histo_bits: u8,
    seed: u32,
    sub_scratch: &mut RefsScratch,
) -> usize {
    let cache_bits = chosen.cache_bits;
    write_cache_flag(w, cache_bits);

    let image = get_histo_image_symbols(width, height, &chosen.refs, quality.quality, histo_bits, cache_bits, seed);
    let use_histo_image = image.histograms.len() > 1;
    w.put_bit(use_histo_image);
    if use_histo_image {
        w.put_bits(u32::from(histo_bits) - 2, 3);
        let symbols: Vec<u32> = image.symbols.iter().map(|&s| u32::from(s) << 8).collect();
        encode_image_no_huffman(
            w,
            &symbols,
            subsample_size(width as u32, histo_bits) as usize,
            subsample_size(height as u32, histo_bits) as usize,
            quality,
            sub_scratch,
        );
    }

    let groups: Vec<CodeGroup> = image.histograms.iter().map(CodeGroup::new).collect();
    for group in &groups {
        group.write_headers(w);
    }
    let tiles = use_histo_image.then(|| TileMap {
        bits: histo_bits,
        xsize: subsample_size(width as u32, histo_bits) as usize,
        symbols: &image.symbols,
    });
    write_tokens(w, &chosen.refs, width, &groups, tiles.as_ref());
    groups.len()
}

/// Encode a sub-image (transform data, palette, histogram image) with a
/// single histogram and no color cache.
fn encode_image_no_huffman(
    w: &mut BitWriter,
    argb: &[u32],
    width: usize,
    height: usize,
    quality: Vp8lQuality,
    scratch: &mut RefsScratch,
) {
    debug_assert_eq!(argb.len(), width * height);
    scratch.hash_chain.fill(argb, width, quality, quality.method == 0);
    let chosen = get_backward_references(argb, width, quality, &[Lz77Kind::Standard, Lz77Kind::Rle], 0, scratch);

    write_cache_flag(w, 0);
    let group = CodeGroup::new(&Histogram::from_refs(&chosen.refs, 0, width));
    group.write_headers(w);
    write_tokens(w, &chosen.refs, width, core::slice::from_ref(&group), None);
}

fn write_cache_flag(w: &mut BitWriter, cache_bits: u8) {
    w.put_bit(cache_bits > 0);
    if cache_bits > 0 {
        w.put_bits(u32::from(cache_bits), 4);
    }
}

/// The five prefix codes of one histogram: literal/length/cache, red, blue,
/// alpha and distance.
struct CodeGroup {
    codes: [HuffmanCode; 5],
}

impl CodeGroup {
    fn new(h: &Histogram) -> Self {
        let build = |counts: &[u32]| HuffmanCode::from_histogram(counts, MAX_ALLOWED_CODE_LENGTH);
        Self {
            codes: [
                build(&h.literal[..]),
                build(&h.red[..]),
                build(&h.blue[..]),
                build(&h.alpha[..]),
                build(&h.distance[..]),
            ],
        }
    }

    fn write_headers(&self, w: &mut BitWriter) {
        for code in &self.codes {
            code.write_header(w);
        }
    }
}

/// Tile-to-group map of the histogram image.
struct TileMap<'a> {
    bits: u8,
    xsize: usize,
    symbols: &'a [u16],
}

fn write_tokens(w: &mut BitWriter, refs: &BackwardRefs, width: usize, groups: &[CodeGroup], tiles: Option<&TileMap<'_>>) {
    let (mut x, mut y) = (0usize, 0usize);
    for token in refs.iter() {
        let group = match tiles {
            Some(t) => usize::from(t.symbols[(y >> t.bits) * t.xsize + (x >> t.bits)]),
            None => 0,
        };
        let [literal, red, blue, alpha, distance] = &groups[group].codes;
        match *token {
            PixOrCopy::Literal(argb) => {
                w.write_huffman_code(literal, usize::from(argb_green(argb)));
                w.write_huffman_code(red, usize::from(argb_red(argb)));
                w.write_huffman_code(blue, usize::from(argb_blue(argb)));
                w.write_huffman_code(alpha, usize::from(argb_alpha(argb)));
            }
            PixOrCopy::CacheIdx(key) => {
                w.write_huffman_code(literal, NUM_LITERAL_CODES + NUM_LENGTH_CODES + usize::from(key));
            }
            PixOrCopy::Copy { len, dist } => {
                let (code, n_extra, extra) = prefix_encode(u32::from(len));
                w.write_huffman_code_with_extra_bits(literal, NUM_LITERAL_CODES + code as usize, extra, n_extra);
                let plane_code = distance_to_plane_code(width, dist as usize);
                let (code, n_extra, extra) = prefix_encode(plane_code);
                w.write_huffman_code_with_extra_bits(distance, code as usize, extra, n_extra);
            }
        }
        x += token.pixel_len();
        while x >= width {
            x -= width;
            y += 1;
        }
    }
}
