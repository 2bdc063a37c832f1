//! Lossless WebP (VP8L) encoding in safe Rust.
//!
//! This crate turns ARGB pixel buffers into bare VP8L bitstreams: the
//! payload of a `VP8L` chunk, starting with the `0x2f` signature byte.
//! Wrapping it in a RIFF container is left to the caller.
//!
//! # Features
//!
//! - `std` (default): `std::io` integration ([`EncodeRequest::encode_to`]).
//!
//! # no_std Support
//!
//! The encoder only needs `alloc`:
//! ```toml
//! [dependencies]
//! zenvp8l = { version = "...", default-features = false }
//! ```
//!
//! # Encoding
//!
//! Use the [`EncodeRequest`] builder:
//!
//! ```rust
//! use zenvp8l::{EncodeRequest, LosslessConfig, PixelLayout};
//!
//! let config = LosslessConfig::new().with_quality(85.0).with_method(5);
//! let rgba_data = vec![255u8; 4 * 4 * 4]; // 4x4 RGBA image
//! let vp8l = EncodeRequest::new(&config, &rgba_data, PixelLayout::Rgba8, 4, 4)
//!     .encode()?;
//! # Ok::<(), zenvp8l::EncodeError>(())
//! ```
//!
//! Or [`encode_argb`] for pixels that are already packed as `0xAARRGGBB`.
//!
//! Output depends only on the pixels and the configuration (including
//! [`LosslessConfig::seed`]), so repeated encodes are byte-identical.
//!
//! # Safety
//!
//! This crate uses `#![forbid(unsafe_code)]`.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

extern crate alloc;

mod encoder;

// Re-export encoder public API
pub use encoder::{
    encode_argb, EncodeError, EncodeRequest, EncodeResult, EncodeStats, Limits, LosslessConfig,
    PixelLayout, TransformSet,
};

// Re-export cooperative cancellation types
pub use enough::{Stop, StopReason, Unstoppable};
