//! Content-aware reconstruction of masked regions.
//!
//! [`Reconstructor`] owns the strength → radius policy and hands the actual
//! fill to an [`InpaintKernel`]. The default kernel, [`Telea`], is the
//! fast-marching method: pixels are filled in order of their distance from
//! the known region, each one as a weighted average of already-known pixels
//! within the radius.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use image::RgbImage;

use crate::mask::Mask;

/// Base inpainting radius; strength is added on top.
pub const BASE_RADIUS: u32 = 3;

/// Radius used to reconstruct a watermark detected at `strength`.
#[must_use]
pub fn reconstruction_radius(strength: u32) -> u32 {
    BASE_RADIUS + strength
}

/// A low-level inpainting algorithm.
pub trait InpaintKernel: Sync {
    /// Fill the pixels of `image` selected by `mask` from their surroundings.
    ///
    /// Unmasked pixels must be returned unchanged.
    fn inpaint(&self, image: &RgbImage, mask: &Mask, radius: u32) -> RgbImage;
}

/// Applies an [`InpaintKernel`] with the radius derived from a strength.
#[derive(Debug, Clone)]
pub struct Reconstructor<K = Telea> {
    kernel: K,
    strength: u32,
}

impl Reconstructor<Telea> {
    /// Reconstructor using the fast-marching kernel.
    #[must_use]
    pub fn new(strength: u32) -> Self {
        Self::with_kernel(Telea, strength)
    }
}

impl<K: InpaintKernel> Reconstructor<K> {
    /// Reconstructor using a custom kernel.
    pub fn with_kernel(kernel: K, strength: u32) -> Self {
        Self { kernel, strength }
    }

    /// Radius passed to the kernel.
    #[must_use]
    pub fn radius(&self) -> u32 {
        reconstruction_radius(self.strength)
    }

    /// Reconstruct the masked pixels of `image`.
    ///
    /// # Panics
    ///
    /// Panics if `mask` and `image` have different dimensions.
    #[must_use]
    pub fn reconstruct(&self, image: &RgbImage, mask: &Mask) -> RgbImage {
        assert_eq!(
            image.dimensions(),
            mask.dimensions(),
            "mask dimensions must match the image"
        );
        if mask.is_empty() {
            return image.clone();
        }
        self.kernel.inpaint(image, mask, self.radius())
    }
}

/// Telea's fast-marching inpainting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Telea;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Known,
    Band,
    Inside,
}

/// Heap entry ordered so the smallest distance pops first.
#[derive(Debug, Clone, Copy)]
struct Front {
    t: f32,
    x: u32,
    y: u32,
}

impl PartialEq for Front {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Front {}

impl PartialOrd for Front {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Front {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| (other.y, other.x).cmp(&(self.y, self.x)))
    }
}

const FAR: f32 = 1.0e6;
const NEIGHBORS_4: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Working state of one fast-marching pass.
struct March {
    width: u32,
    height: u32,
    flags: Vec<Flag>,
    dist: Vec<f32>,
    pixels: Vec<[f32; 3]>,
}

impl March {
    fn new(image: &RgbImage, mask: &Mask) -> (Self, BinaryHeap<Front>) {
        let (width, height) = image.dimensions();
        let n = width as usize * height as usize;
        let mut march = Self {
            width,
            height,
            flags: vec![Flag::Known; n],
            dist: vec![0.0; n],
            pixels: image
                .pixels()
                .map(|p| [f32::from(p[0]), f32::from(p[1]), f32::from(p[2])])
                .collect(),
        };

        for y in 0..height {
            for x in 0..width {
                if mask.get(x, y) {
                    let i = march.idx(x, y);
                    march.flags[i] = Flag::Inside;
                    march.dist[i] = FAR;
                }
            }
        }

        // the narrow band starts as the known pixels touching the hole
        let mut heap = BinaryHeap::new();
        for y in 0..height {
            for x in 0..width {
                let i = march.idx(x, y);
                if march.flags[i] != Flag::Known {
                    continue;
                }
                let borders_hole = march
                    .neighbors(x, y)
                    .any(|(nx, ny)| march.flag(nx, ny) == Flag::Inside);
                if borders_hole {
                    march.flags[i] = Flag::Band;
                    heap.push(Front { t: 0.0, x, y });
                }
            }
        }
        (march, heap)
    }

    #[inline]
    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    fn flag(&self, x: u32, y: u32) -> Flag {
        self.flags[self.idx(x, y)]
    }

    #[inline]
    fn t(&self, x: u32, y: u32) -> f32 {
        self.dist[self.idx(x, y)]
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn in_bounds(&self, x: i64, y: i64) -> Option<(u32, u32)> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        Some((x as u32, y as u32))
    }

    fn neighbors(&self, x: u32, y: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        NEIGHBORS_4
            .iter()
            .filter_map(move |&(dx, dy)| self.in_bounds(i64::from(x) + dx, i64::from(y) + dy))
    }

    /// First-order eikonal update from two orthogonal neighbours.
    fn solve(&self, a: Option<(u32, u32)>, b: Option<(u32, u32)>) -> f32 {
        let known = |p: Option<(u32, u32)>| {
            p.filter(|&(x, y)| self.flag(x, y) != Flag::Inside)
                .map(|(x, y)| self.t(x, y))
        };
        match (known(a), known(b)) {
            (Some(ta), Some(tb)) => {
                let diff = ta - tb;
                if diff.abs() >= 1.0 {
                    1.0 + ta.min(tb)
                } else {
                    (ta + tb + (2.0 - diff * diff).sqrt()) * 0.5
                }
            }
            (Some(ta), None) => 1.0 + ta,
            (None, Some(tb)) => 1.0 + tb,
            (None, None) => FAR,
        }
    }

    fn arrival_time(&self, x: u32, y: u32) -> f32 {
        let (xi, yi) = (i64::from(x), i64::from(y));
        let left = self.in_bounds(xi - 1, yi);
        let right = self.in_bounds(xi + 1, yi);
        let up = self.in_bounds(xi, yi - 1);
        let down = self.in_bounds(xi, yi + 1);
        [
            self.solve(up, left),
            self.solve(down, left),
            self.solve(up, right),
            self.solve(down, right),
        ]
        .into_iter()
        .fold(FAR, f32::min)
    }

    /// Central (or one-sided) difference of the distance field along one axis.
    fn gradient_axis(
        &self,
        before: Option<(u32, u32)>,
        here: f32,
        after: Option<(u32, u32)>,
    ) -> f32 {
        let usable = |p: Option<(u32, u32)>| {
            p.filter(|&(x, y)| self.flag(x, y) != Flag::Inside)
                .map(|(x, y)| self.t(x, y))
        };
        match (usable(before), usable(after)) {
            (Some(b), Some(a)) => (a - b) * 0.5,
            (None, Some(a)) => a - here,
            (Some(b), None) => here - b,
            (None, None) => 0.0,
        }
    }

    fn fill_pixel(&mut self, x: u32, y: u32, radius: u32) {
        let (xi, yi) = (i64::from(x), i64::from(y));
        let here = self.t(x, y);
        let gx = self.gradient_axis(self.in_bounds(xi - 1, yi), here, self.in_bounds(xi + 1, yi));
        let gy = self.gradient_axis(self.in_bounds(xi, yi - 1), here, self.in_bounds(xi, yi + 1));

        let r = i64::from(radius);
        let r2 = r * r;
        let mut acc = [0.0_f32; 3];
        let mut total = 0.0_f32;
        for qy in (yi - r)..=(yi + r) {
            for qx in (xi - r)..=(xi + r) {
                let (dx, dy) = (xi - qx, yi - qy);
                if dx * dx + dy * dy > r2 {
                    continue;
                }
                let Some((ux, uy)) = self.in_bounds(qx, qy) else {
                    continue;
                };
                if (ux, uy) == (x, y) || self.flag(ux, uy) == Flag::Inside {
                    continue;
                }
                #[allow(clippy::cast_precision_loss)]
                let (rx, ry) = (dx as f32, dy as f32);
                let len2 = rx * rx + ry * ry;
                let dir = (rx * gx + ry * gy).abs().max(1.0e-6);
                let dst = 1.0 / (len2 * len2.sqrt());
                let lev = 1.0 / (1.0 + (self.t(ux, uy) - here).abs());
                let w = dir * dst * lev;

                let q = self.pixels[self.idx(ux, uy)];
                for (a, v) in acc.iter_mut().zip(q) {
                    *a += w * v;
                }
                total += w;
            }
        }

        if total > 0.0 {
            let i = self.idx(x, y);
            for (dst, a) in self.pixels[i].iter_mut().zip(acc) {
                *dst = a / total;
            }
        }
    }

    fn run(&mut self, mut heap: BinaryHeap<Front>, radius: u32) {
        while let Some(Front { x, y, .. }) = heap.pop() {
            let i = self.idx(x, y);
            self.flags[i] = Flag::Known;

            let next: Vec<(u32, u32)> = self
                .neighbors(x, y)
                .filter(|&(nx, ny)| self.flag(nx, ny) == Flag::Inside)
                .collect();
            for (nx, ny) in next {
                let t = self.arrival_time(nx, ny);
                let j = self.idx(nx, ny);
                self.dist[j] = t;
                self.flags[j] = Flag::Band;
                self.fill_pixel(nx, ny, radius);
                heap.push(Front { t, x: nx, y: ny });
            }
        }
    }

    fn into_image(self) -> RgbImage {
        let Self {
            width,
            height,
            pixels,
            ..
        } = self;
        let raw = pixels.into_iter().flat_map(|p| p.map(quantize)).collect();
        RgbImage::from_raw(width, height, raw).unwrap_or_else(|| RgbImage::new(width, height))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantize(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

impl InpaintKernel for Telea {
    fn inpaint(&self, image: &RgbImage, mask: &Mask, radius: u32) -> RgbImage {
        let (mut march, heap) = March::new(image, mask);
        march.run(heap, radius.max(1));
        let mut out = march.into_image();
        // masked pixels never reached from the known region keep their input
        for (x, y, px) in out.enumerate_pixels_mut() {
            if !mask.get(x, y) {
                *px = *image.get_pixel(x, y);
            }
        }
        out
    }
}
