//! Lossless encoder configuration.
//!
//! ```rust
//! use zenvp8l::{LosslessConfig, Limits};
//!
//! let config = LosslessConfig::new()
//!     .with_quality(90.0)
//!     .with_method(5)
//!     .with_limits(Limits::default().max_dimensions(4096, 4096));
//! assert_eq!(config.method, 5);
//! ```

use super::limits::Limits;
use super::vp8l::{Vp8lParams, Vp8lQuality};

/// Configuration for lossless (VP8L) encoding.
///
/// Lossless encoding uses prediction, color transforms, and LZ77 compression
/// to achieve perfect reconstruction of the original pixels. Quality and
/// method only trade encoding time for output size.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LosslessConfig {
    /// Encoding effort (0.0 = fastest, 100.0 = best compression). Default: 75.0.
    pub quality: f32,
    /// Quality/speed tradeoff (0 = fast, 6 = slower but better). Default: 4.
    pub method: u8,
    /// Color cache size cap in bits. `None` picks the size by cost,
    /// `Some(0)` disables the cache. Default: `None`.
    pub cache_bits: Option<u8>,
    /// Seed for the randomized histogram clustering. The same seed always
    /// produces the same output. Default: 1.
    pub seed: u32,
    /// Resource limits for validation.
    pub limits: Limits,
}

impl Default for LosslessConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LosslessConfig {
    /// Create a new lossless encoder configuration with defaults.
    ///
    /// Default: quality 75, method 4, automatic color cache, seed 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            quality: 75.0,
            method: 4,
            cache_bits: None,
            seed: 1,
            limits: Limits::default(),
        }
    }

    /// Set encoding effort (0.0 = fastest, 100.0 = best compression).
    #[must_use]
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = if quality.is_nan() { 75.0 } else { quality.clamp(0.0, 100.0) };
        self
    }

    /// Set method (0 = fastest, 6 = slowest but best compression).
    ///
    /// Method 6 at quality 100 tries every transform combination.
    #[must_use]
    pub fn with_method(mut self, method: u8) -> Self {
        self.method = method.min(6);
        self
    }

    /// Cap the color cache at `bits` (0..=10); 0 disables it.
    #[must_use]
    pub fn with_cache_bits(mut self, bits: u8) -> Self {
        self.cache_bits = Some(bits.min(10));
        self
    }

    /// Let the encoder choose the color cache size.
    #[must_use]
    pub fn with_auto_cache(mut self) -> Self {
        self.cache_bits = None;
        self
    }

    /// Set the histogram clustering seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    /// Set resource limits for validation.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set maximum dimensions.
    #[must_use]
    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.limits = self.limits.max_dimensions(width, height);
        self
    }

    /// Resolve into the encoder's internal knobs. Public fields may hold
    /// out-of-range values, so they are clamped again here.
    pub(crate) fn to_params(&self) -> Vp8lParams {
        let quality = if self.quality.is_nan() {
            75
        } else {
            libm::roundf(self.quality.clamp(0.0, 100.0)) as u8
        };
        Vp8lParams {
            quality: Vp8lQuality {
                quality,
                method: self.method.min(6),
            },
            cache_bits: self.cache_bits.map(|b| b.min(10)),
            seed: self.seed,
        }
    }
}
