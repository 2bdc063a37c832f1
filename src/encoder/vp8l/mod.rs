//! VP8L (Lossless WebP) encoder core.
//!
//! Implements the VP8L lossless compression format as specified in:
//! <https://developers.google.com/speed/webp/docs/webp_lossless_bitstream_specification>

mod analysis;
mod backward_refs;
mod bitwriter;
mod color_cache;
mod cost_model;
mod encode;
mod entropy;
mod hash_chain;
mod histogram;
mod huffman;
mod meta_huffman;
mod palette;
mod transforms;
mod types;

pub(crate) use encode::{encode_vp8l, Vp8lParams};
pub(crate) use types::{Vp8lQuality, VP8L_MAX_DIMENSION};
