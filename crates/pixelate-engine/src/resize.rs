//! Display-only downscaling.
//!
//! Shrinks an image so it fits inside a display area while keeping its
//! aspect ratio. Images that already fit are left alone. The engine never
//! resizes the buffer it writes to disk; this is only for the preview.

use std::fmt;

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

use crate::types::RgbImage;

/// Interpolation used for the preview downscale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResizeFilter {
    Nearest,
    /// Linear; the default, cheap and smooth enough for a terminal.
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    /// Sharpest result, and the slowest.
    Lanczos3,
}

impl ResizeFilter {
    /// Name as accepted by the `--filter` flag.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Triangle => "triangle",
            Self::CatmullRom => "catmull-rom",
            Self::Gaussian => "gaussian",
            Self::Lanczos3 => "lanczos3",
        }
    }

    const fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Largest size with the image's aspect ratio that fits in
/// `max_width × max_height`, or `None` if the image already fits.
///
/// Both returned dimensions are at least 1.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn fitted_size(width: u32, height: u32, max_width: u32, max_height: u32) -> Option<(u32, u32)> {
    if width <= max_width && height <= max_height {
        return None;
    }
    let (w, h) = (u64::from(width), u64::from(height));
    let (max_w, max_h) = (u64::from(max_width.max(1)), u64::from(max_height.max(1)));

    // Compare w/h against max_w/max_h without floating point.
    let (new_w, new_h) = if w * max_h >= h * max_w {
        (max_w, h * max_w / w)
    } else {
        (w * max_h / h, max_h)
    };
    // Both values are bounded by the u32 maxima.
    Some((new_w.max(1) as u32, new_h.max(1) as u32))
}

/// Downscale `image` to fit inside `max_width × max_height`.
///
/// Returns `None` when the image already fits, so the caller can keep
/// using the original buffer.
#[must_use]
pub fn fit(
    image: &RgbImage,
    max_width: u32,
    max_height: u32,
    filter: ResizeFilter,
) -> Option<RgbImage> {
    let (width, height) = fitted_size(image.width(), image.height(), max_width, max_height)?;
    tracing::debug!(
        from_width = image.width(),
        from_height = image.height(),
        width,
        height,
        %filter,
        "resizing for display"
    );
    Some(imageops::resize(
        image,
        width,
        height,
        filter.filter_type(),
    ))
}
