//! VP8L lossless encoder.

mod api;
mod config;
mod limits;
/// VP8L bitstream encoder core.
mod vp8l;

pub use api::{
    encode_argb, EncodeError, EncodeRequest, EncodeResult, EncodeStats, PixelLayout, TransformSet,
};
pub use config::LosslessConfig;
pub use limits::Limits;
