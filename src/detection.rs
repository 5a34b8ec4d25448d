//! Colour-statistics watermark detection.
//!
//! Semi-transparent white/grey overlays show up as pixels with low
//! saturation and high value. Candidates are found with fixed HSV cutoffs,
//! small gaps are closed with a square structuring element sized from the
//! strength, and everything outside a band along the frame edges is dropped,
//! since watermarks are assumed to sit near the borders.

use image::RgbImage;

use crate::mask::Mask;

/// Saturation (0-255 scale) below which a pixel may be a watermark.
const MAX_SATURATION: u8 = 40;
/// Value (0-255 scale) above which a pixel may be a watermark.
const MIN_VALUE: u8 = 200;
/// Minimum width of the border band in pixels.
const MIN_BORDER_BAND: u32 = 10;
/// The border band is `min(w, h) / BORDER_BAND_DIVISOR` wide when that is larger.
const BORDER_BAND_DIVISOR: u32 = 20;

/// Default watermark strength.
pub const DEFAULT_STRENGTH: u32 = 1;

/// Saturation and value of an RGB pixel, both on a 0-255 scale.
///
/// `V = max(r, g, b)`, `S = 255 * (V - min) / V` (0 for black).
fn saturation_value(r: u8, g: u8, b: u8) -> (u8, u8) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == 0 {
        return (0, 0);
    }
    let s = (u32::from(max - min) * 255 + u32::from(max) / 2) / u32::from(max);
    (u8::try_from(s).unwrap_or(u8::MAX), max)
}

/// Width of the border band searched for watermarks.
#[must_use]
pub fn border_band(width: u32, height: u32) -> u32 {
    MIN_BORDER_BAND.max(width.min(height) / BORDER_BAND_DIVISOR)
}

/// Mask of pixels within `border_band(w, h)` of any frame edge.
#[must_use]
pub fn border_band_mask(width: u32, height: u32) -> Mask {
    let bw = border_band(width, height);
    Mask::from_fn(width, height, |x, y| {
        x < bw || y < bw || x >= width.saturating_sub(bw) || y >= height.saturating_sub(bw)
    })
}

/// Raw low-saturation/high-value candidates, before closing and banding.
#[must_use]
pub fn watermark_candidates(image: &RgbImage) -> Mask {
    Mask::from_fn(image.width(), image.height(), |x, y| {
        let px = image.get_pixel(x, y);
        let (s, v) = saturation_value(px[0], px[1], px[2]);
        s < MAX_SATURATION && v > MIN_VALUE
    })
}

/// Detect watermark candidates in `image`.
///
/// `strength` is the radius of the square closing element (side `2s+1`).
/// Strength 0 skips the closing.
#[must_use]
pub fn detect_watermark_mask(image: &RgbImage, strength: u32) -> Mask {
    let mut mask = watermark_candidates(image).close_square(strength);
    mask.intersect_with(&border_band_mask(image.width(), image.height()));
    log::trace!(
        "watermark mask: {} px in {}x{}",
        mask.count(),
        image.width(),
        image.height()
    );
    mask
}
