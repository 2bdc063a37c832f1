//! Configurable limits for lossless encoding.
//!
//! These limits bound the work and memory an encode may consume when the
//! caller does not trust the image dimensions it is handed.

use super::api::EncodeError;

/// Configuration for encode limits.
///
/// All limits are optional; `None` means unlimited. The VP8L format itself
/// never allows more than 16384 pixels per side, whatever these say.
///
/// # Example
///
/// ```rust
/// use zenvp8l::Limits;
///
/// let limits = Limits::default()
///     .max_dimensions(4096, 4096)
///     .max_total_pixels(8_000_000);
///
/// // Or start with no limits for trusted inputs
/// let unlimited = Limits::none();
/// ```
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Limits {
    /// Maximum image width in pixels.
    pub max_width: Option<u32>,

    /// Maximum image height in pixels.
    pub max_height: Option<u32>,

    /// Maximum total pixels (width * height).
    pub max_total_pixels: Option<u64>,
}

impl Default for Limits {
    /// Default limits suitable for server-side use.
    ///
    /// - Max dimensions: 16384 x 16384 (VP8L format max)
    /// - Max total pixels: 100 megapixels
    fn default() -> Self {
        Self {
            max_width: Some(16384),
            max_height: Some(16384),
            max_total_pixels: Some(100_000_000),
        }
    }
}

impl Limits {
    /// Create limits with no restrictions.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_total_pixels: None,
        }
    }

    /// Set maximum dimensions.
    #[must_use]
    pub fn max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    /// Set maximum total pixels.
    #[must_use]
    pub fn max_total_pixels(mut self, pixels: u64) -> Self {
        self.max_total_pixels = Some(pixels);
        self
    }

    /// Check if dimensions are within limits.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), EncodeError> {
        if let Some(max_w) = self.max_width {
            if width > max_w {
                return Err(EncodeError::LimitExceeded(alloc::format!(
                    "width {} exceeds limit {}",
                    width,
                    max_w
                )));
            }
        }

        if let Some(max_h) = self.max_height {
            if height > max_h {
                return Err(EncodeError::LimitExceeded(alloc::format!(
                    "height {} exceeds limit {}",
                    height,
                    max_h
                )));
            }
        }

        let total_pixels = u64::from(width) * u64::from(height);
        if let Some(max_pixels) = self.max_total_pixels {
            if total_pixels > max_pixels {
                return Err(EncodeError::LimitExceeded(alloc::format!(
                    "total pixels {} exceeds limit {}",
                    total_pixels,
                    max_pixels
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_width, Some(16384));
        assert_eq!(limits.max_total_pixels, Some(100_000_000));
    }

    #[test]
    fn check_dimensions_ok() {
        let limits = Limits::default().max_dimensions(1000, 1000);
        assert!(limits.check_dimensions(500, 500).is_ok());
        assert!(limits.check_dimensions(1000, 1000).is_ok());
    }

    #[test]
    fn check_dimensions_too_large() {
        let limits = Limits::default().max_dimensions(1000, 1000);
        assert!(matches!(
            limits.check_dimensions(1001, 500),
            Err(EncodeError::LimitExceeded(_))
        ));
        assert!(limits.check_dimensions(10, 1001).is_err());
    }

    #[test]
    fn check_total_pixels() {
        let limits = Limits::default().max_total_pixels(1_000_000);
        assert!(limits.check_dimensions(1000, 1000).is_ok());
        assert!(limits.check_dimensions(1001, 1000).is_err());
    }

    #[test]
    fn no_limits() {
        let limits = Limits::none();
        assert!(limits.check_dimensions(u32::MAX, u32::MAX).is_ok());
    }
}
