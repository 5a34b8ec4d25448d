//! Applying a background mask to an RGBA buffer.
//!
//! Two output modes:
//! - `Transparent`: background becomes alpha 0, and the foreground alpha is
//!   binarised against the alpha threshold so soft fringes don't outline the
//!   sprite. Colour channels are never touched.
//! - `Fill`: background is painted with a solid colour, everything ends up
//!   fully opaque.
//!
//! The map is strictly per-pixel, so rows are processed in parallel when the
//! `parallel` feature is enabled.

use image::{Rgb, RgbaImage};

use crate::mask::Mask;

/// Fill colour used when a configured colour cannot be parsed.
pub const DEFAULT_FILL_COLOR: Rgb<u8> = Rgb([0xf4, 0xf4, 0xf4]);

const CHANNELS: usize = 4;

/// What happens to background pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompositeMode {
    /// Make background transparent and binarise foreground alpha.
    #[default]
    Transparent,
    /// Paint background with a solid colour; force full opacity.
    Fill(Rgb<u8>),
}

/// Parse a `#rrggbb` colour.
///
/// Leading/trailing whitespace and a single leading `#` are ignored. Anything
/// that is not exactly six hex digits falls back to [`DEFAULT_FILL_COLOR`].
#[must_use]
pub fn parse_fill_color(s: &str) -> Rgb<u8> {
    let hex = s.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.is_ascii() {
        return DEFAULT_FILL_COLOR;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match (channel(0), channel(2), channel(4)) {
        (Some(r), Some(g), Some(b)) => Rgb([r, g, b]),
        _ => DEFAULT_FILL_COLOR,
    }
}

/// Rewrite `img` in place according to `mask` and `mode`.
///
/// # Panics
///
/// Panics if `mask` and `img` have different dimensions.
pub fn apply_mask(img: &mut RgbaImage, mask: &Mask, mode: CompositeMode, alpha_threshold: u8) {
    assert_eq!(
        img.dimensions(),
        mask.dimensions(),
        "mask dimensions must match the image"
    );
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let row_len = w as usize * CHANNELS;
    let buf: &mut [u8] = img;

    let process_row = |(y, row): (usize, &mut [u8])| {
        #[allow(clippy::cast_possible_truncation)]
        let y = y as u32;
        for (x, px) in (0..w).zip(row.chunks_exact_mut(CHANNELS)) {
            composite_pixel(px, mask.get(x, y), mode, alpha_threshold);
        }
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        buf.par_chunks_mut(row_len).enumerate().for_each(process_row);
    }

    #[cfg(not(feature = "parallel"))]
    {
        buf.chunks_mut(row_len).enumerate().for_each(process_row);
    }
}

#[inline]
fn composite_pixel(px: &mut [u8], background: bool, mode: CompositeMode, alpha_threshold: u8) {
    match mode {
        CompositeMode::Transparent => {
            px[3] = if background || px[3] <= alpha_threshold {
                0
            } else {
                u8::MAX
            };
        }
        CompositeMode::Fill(Rgb([r, g, b])) => {
            if background {
                px[0] = r;
                px[1] = g;
                px[2] = b;
            }
            px[3] = u8::MAX;
        }
    }
}
