//! Flood-fill background segmentation for sprite frames.
//!
//! Two strategies, chosen once per image from its corners:
//!
//! - **Transparent halo**: the corners are already (nearly) transparent, so
//!   the artist has cut the subject out. What remains is an opaque near-white
//!   fringe; it is grown from every qualifying border pixel.
//! - **Opaque corners**: the mean corner colour is taken as the background
//!   reference, and the region connected to the corners that stays within the
//!   threshold of that reference is grown.
//!
//! Both use the same breadth-first worklist over an owned [`Mask`], with
//! 8-connected adjacency. Membership is a pure function of each pixel's own
//! channels, so the result does not depend on visiting order.

use std::collections::VecDeque;

use image::{Rgba, RgbaImage};

use crate::mask::Mask;

/// Average corner alpha below which an image counts as already cut out.
pub const TRANSPARENT_CORNER_ALPHA: u32 = 10;

/// Default background distance threshold.
pub const DEFAULT_BG_THRESHOLD: u8 = 30;

/// Default alpha-opacity threshold.
pub const DEFAULT_ALPHA_THRESHOLD: u8 = 24;

const NEIGHBORS_8: [(i64, i64); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, -1),
    (-1, 1),
    (1, 1),
];

/// Thresholds controlling segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentParams {
    /// Maximum mean absolute channel distance (or whiteness distance) for a
    /// pixel to count as background.
    pub bg_threshold: u8,
    /// Pixels with alpha at or below this are treated as transparent.
    pub alpha_threshold: u8,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            bg_threshold: DEFAULT_BG_THRESHOLD,
            alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
        }
    }
}

/// How the background of one image is recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationStrategy {
    /// Corners are transparent; remove the opaque near-white fringe touching the border.
    TransparentHalo,
    /// Corners are opaque; remove the corner-connected region close to `reference`.
    OpaqueCorners {
        /// Integer mean RGB of the four corners.
        reference: [u8; 3],
    },
}

impl SegmentationStrategy {
    /// Pick a strategy from the four corner pixels.
    ///
    /// Returns `None` for an empty image.
    #[must_use]
    pub fn classify(img: &RgbaImage) -> Option<Self> {
        let corners = corners(img)?;

        let alpha_sum: u32 = corners.iter().map(|(_, _, px)| u32::from(px[3])).sum();
        if alpha_sum < TRANSPARENT_CORNER_ALPHA * 4 {
            return Some(Self::TransparentHalo);
        }

        let mut reference = [0u8; 3];
        for (ch, slot) in reference.iter_mut().enumerate() {
            let sum: u32 = corners.iter().map(|(_, _, px)| u32::from(px[ch])).sum();
            *slot = u8::try_from(sum / 4).unwrap_or(u8::MAX);
        }
        Some(Self::OpaqueCorners { reference })
    }

    /// Whether `px` belongs to the background under this strategy.
    fn admits(&self, px: Rgba<u8>, params: &SegmentParams) -> bool {
        match *self {
            Self::TransparentHalo => {
                px[3] > params.alpha_threshold && is_near_white(px, params.bg_threshold)
            }
            Self::OpaqueCorners { reference } => {
                color_distance(px, reference) <= u32::from(params.bg_threshold)
            }
        }
    }

    /// Initial flood-fill seeds, in scan order.
    fn seeds(&self, img: &RgbaImage, params: &SegmentParams) -> Vec<(u32, u32)> {
        let (w, h) = img.dimensions();
        let admits = |x: u32, y: u32| self.admits(*img.get_pixel(x, y), params);

        match self {
            Self::TransparentHalo => {
                let mut seeds = Vec::new();
                for x in 0..w {
                    for y in [0, h - 1] {
                        if admits(x, y) {
                            seeds.push((x, y));
                        }
                    }
                }
                for y in 0..h {
                    for x in [0, w - 1] {
                        if admits(x, y) {
                            seeds.push((x, y));
                        }
                    }
                }
                seeds
            }
            Self::OpaqueCorners { .. } => [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)]
                .into_iter()
                .filter(|&(x, y)| admits(x, y))
                .collect(),
        }
    }
}

/// Whiteness distance `255 - mean(r, g, b)` is within `threshold`.
fn is_near_white(px: Rgba<u8>, threshold: u8) -> bool {
    let mean = (u32::from(px[0]) + u32::from(px[1]) + u32::from(px[2])) / 3;
    255 - mean <= u32::from(threshold)
}

/// Mean absolute channel difference, rounded down.
fn color_distance(px: Rgba<u8>, reference: [u8; 3]) -> u32 {
    (0..3)
        .map(|ch| u32::from(px[ch].abs_diff(reference[ch])))
        .sum::<u32>()
        / 3
}

fn corners(img: &RgbaImage) -> Option<[(u32, u32, Rgba<u8>); 4]> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let at = |x: u32, y: u32| (x, y, *img.get_pixel(x, y));
    Some([at(0, 0), at(w - 1, 0), at(0, h - 1), at(w - 1, h - 1)])
}

/// Compute the background mask of `img`.
///
/// The strategy is chosen by [`SegmentationStrategy::classify`]. An image
/// whose corners do not match the background predicate yields an empty mask.
#[must_use]
pub fn segment_background(img: &RgbaImage, params: &SegmentParams) -> Mask {
    match SegmentationStrategy::classify(img) {
        Some(strategy) => segment_with(img, strategy, params),
        None => Mask::new(img.width(), img.height()),
    }
}

/// Compute the background mask of `img` using a specific strategy.
#[must_use]
pub fn segment_with(
    img: &RgbaImage,
    strategy: SegmentationStrategy,
    params: &SegmentParams,
) -> Mask {
    let (w, h) = img.dimensions();
    let mut mask = Mask::new(w, h);
    if w == 0 || h == 0 {
        return mask;
    }

    let mut queue = VecDeque::new();
    for (x, y) in strategy.seeds(img, params) {
        // border scans visit corners twice
        if !mask.get(x, y) {
            mask.set(x, y, true);
            queue.push_back((x, y));
        }
    }
    log::trace!("{strategy:?}: {} seeds", queue.len());

    while let Some((x, y)) = queue.pop_front() {
        for (dx, dy) in NEIGHBORS_8 {
            let nx = i64::from(x) + dx;
            let ny = i64::from(y) + dy;
            if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                continue;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let (nx, ny) = (nx as u32, ny as u32);
            if !mask.get(nx, ny) && strategy.admits(*img.get_pixel(nx, ny), params) {
                mask.set(nx, ny, true);
                queue.push_back((nx, ny));
            }
        }
    }

    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const RED: Rgba<u8> = Rgba([220, 20, 20, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    fn white_with_red_square() -> RgbaImage {
        RgbaImage::from_fn(64, 64, |x, y| {
            if (24..40).contains(&x) && (24..40).contains(&y) {
                RED
            } else {
                WHITE
            }
        })
    }

    #[test]
    fn classify_opaque_uses_mean_corner_color() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([100, 100, 100, 255]));
        img.put_pixel(3, 3, Rgba([104, 108, 112, 255]));
        assert_eq!(
            SegmentationStrategy::classify(&img),
            Some(SegmentationStrategy::OpaqueCorners {
                reference: [101, 102, 103]
            })
        );
    }

    #[test]
    fn classify_transparent_corners() {
        let mut img = RgbaImage::from_pixel(4, 4, CLEAR);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 39]));
        assert_eq!(
            SegmentationStrategy::classify(&img),
            Some(SegmentationStrategy::TransparentHalo)
        );
        img.put_pixel(0, 0, Rgba([0, 0, 0, 40]));
        assert!(matches!(
            SegmentationStrategy::classify(&img),
            Some(SegmentationStrategy::OpaqueCorners { .. })
        ));
    }

    #[test]
    fn classify_empty_image() {
        assert_eq!(SegmentationStrategy::classify(&RgbaImage::new(0, 0)), None);
    }

    #[test]
    fn opaque_background_marks_exactly_the_white_region() {
        let img = white_with_red_square();
        let mask = segment_background(&img, &SegmentParams::default());
        for (x, y, px) in img.enumerate_pixels() {
            assert_eq!(mask.get(x, y), *px == WHITE, "pixel ({x},{y})");
        }
        assert_eq!(mask.count(), 64 * 64 - 16 * 16);
    }

    #[test]
    fn fill_uses_global_reference_not_neighbor_color() {
        // a gentle gradient drifts away from the corner colour step by step;
        // per-step comparison would swallow the whole row
        let img = RgbaImage::from_fn(100, 1, |x, _| {
            #[allow(clippy::cast_possible_truncation)]
            let v = 255 - (x as u8);
            Rgba([v, v, v, 255])
        });
        let strategy = SegmentationStrategy::OpaqueCorners {
            reference: [255, 255, 255],
        };
        let mask = segment_with(&img, strategy, &SegmentParams::default());
        assert_eq!(mask.count(), 31);
        assert!(mask.get(30, 0));
        assert!(!mask.get(31, 0));
    }

    #[test]
    fn enclosed_background_color_is_not_reached() {
        // white hole inside a red ring is not connected to the corners
        let img = RgbaImage::from_fn(30, 30, |x, y| {
            let ring = (5..25).contains(&x) && (5..25).contains(&y);
            let hole = (10..20).contains(&x) && (10..20).contains(&y);
            if ring && !hole {
                RED
            } else {
                WHITE
            }
        });
        let mask = segment_background(&img, &SegmentParams::default());
        assert!(mask.get(0, 0));
        assert!(!mask.get(15, 15));
    }

    #[test]
    fn no_matching_corner_yields_empty_mask() {
        // corners are all different, so none is near the mean reference
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([128, 128, 128, 255]));
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        img.put_pixel(9, 0, Rgba([255, 255, 255, 255]));
        img.put_pixel(0, 9, Rgba([255, 0, 0, 255]));
        img.put_pixel(9, 9, Rgba([0, 0, 255, 255]));
        let mask = segment_background(&img, &SegmentParams::default());
        assert!(mask.is_empty());
    }

    #[test]
    fn single_pixel_image_does_not_panic() {
        let img = RgbaImage::from_pixel(1, 1, WHITE);
        let mask = segment_background(&img, &SegmentParams::default());
        assert_eq!(mask.count(), 1);

        let clear = RgbaImage::from_pixel(1, 1, CLEAR);
        assert!(segment_background(&clear, &SegmentParams::default()).is_empty());
    }

    #[test]
    fn transparent_halo_removes_only_opaque_near_white_fringe() {
        // transparent canvas, a near-white halo ring touching the left edge,
        // and a saturated blue subject inside it
        let img = RgbaImage::from_fn(40, 40, |x, y| {
            if (8..32).contains(&x) && (8..32).contains(&y) {
                Rgba([30, 60, 200, 255])
            } else if x < 8 && (4..36).contains(&y) {
                Rgba([245, 245, 240, 255])
            } else {
                CLEAR
            }
        });
        let params = SegmentParams::default();
        let mask = segment_background(&img, &params);

        assert!(mask.get(0, 20));
        assert!(mask.get(7, 20));
        assert!(!mask.get(20, 20));
        assert!(!mask.get(0, 0));
        for (x, y, px) in img.enumerate_pixels() {
            if mask.get(x, y) {
                assert!(px[3] > params.alpha_threshold);
                assert!(is_near_white(*px, params.bg_threshold));
            }
        }
    }

    #[test]
    fn mask_is_independent_of_seed_order() {
        let img = white_with_red_square();
        let params = SegmentParams::default();
        let strategy = SegmentationStrategy::classify(&img).unwrap();
        let a = segment_with(&img, strategy, &params);

        let mut flipped = img.clone();
        image::imageops::flip_horizontal_in_place(&mut flipped);
        image::imageops::flip_vertical_in_place(&mut flipped);
        let b = segment_with(&flipped, strategy, &params);
        assert_eq!(a.count(), b.count());
    }
}
