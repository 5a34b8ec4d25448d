//! Boolean pixel masks and square-element morphology.
//!
//! A [`Mask`] marks the pixels of one buffer that should be removed or
//! reconstructed (`true`). Masks are plain owned grids indexed by `(x, y)`;
//! every operation here either reads or rebuilds the whole grid, so there is
//! no aliasing between a mask and the buffer it was computed from.

use image::{GrayImage, Luma};

/// A `width × height` grid of flags, `true` meaning "background/watermark".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    /// Create an all-`false` mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    /// Create a mask by evaluating `f(x, y)` for every pixel.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut bits = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                bits.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            bits,
        }
    }

    /// Build a mask from a grayscale image; any non-zero sample is `true`.
    #[must_use]
    pub fn from_luma(img: &GrayImage) -> Self {
        Self::from_fn(img.width(), img.height(), |x, y| img.get_pixel(x, y)[0] > 0)
    }

    /// Render the mask as a 0/255 grayscale image.
    #[must_use]
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { u8::MAX } else { 0 }])
        })
    }

    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y as usize * self.width as usize + x as usize
    }

    /// Flag at `(x, y)`.
    #[inline]
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[self.index(x, y)]
    }

    /// Set the flag at `(x, y)`.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        let idx = self.index(x, y);
        self.bits[idx] = value;
    }

    /// Number of `true` pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Whether no pixel is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|&b| b)
    }

    /// Whether every set pixel of `self` is also set in `other`.
    ///
    /// # Panics
    ///
    /// Panics if the masks have different dimensions.
    #[must_use]
    pub fn is_subset_of(&self, other: &Mask) -> bool {
        self.assert_same_dims(other);
        self.bits.iter().zip(&other.bits).all(|(&a, &b)| !a || b)
    }

    /// Logical OR with `other`, in place.
    ///
    /// # Panics
    ///
    /// Panics if the masks have different dimensions.
    pub fn union_with(&mut self, other: &Mask) {
        self.assert_same_dims(other);
        for (a, &b) in self.bits.iter_mut().zip(&other.bits) {
            *a |= b;
        }
    }

    /// Logical AND with `other`, in place.
    ///
    /// # Panics
    ///
    /// Panics if the masks have different dimensions.
    pub fn intersect_with(&mut self, other: &Mask) {
        self.assert_same_dims(other);
        for (a, &b) in self.bits.iter_mut().zip(&other.bits) {
            *a &= b;
        }
    }

    /// Number of pixels set in exactly one of the two masks.
    ///
    /// # Panics
    ///
    /// Panics if the masks have different dimensions.
    #[must_use]
    pub fn symmetric_difference_count(&self, other: &Mask) -> usize {
        self.assert_same_dims(other);
        self.bits
            .iter()
            .zip(&other.bits)
            .filter(|(&a, &b)| a != b)
            .count()
    }

    /// Dilate with a `(2r+1)²` square. Samples outside the image never set a pixel.
    #[must_use]
    pub fn dilate_square(&self, radius: u32) -> Mask {
        if radius == 0 {
            return self.clone();
        }
        self.sweep(radius, Axis::Rows, Window::Any)
            .sweep(radius, Axis::Columns, Window::Any)
    }

    /// Erode with a `(2r+1)²` square. Samples outside the image count as set,
    /// so the frame edge does not erode the mask.
    #[must_use]
    pub fn erode_square(&self, radius: u32) -> Mask {
        if radius == 0 {
            return self.clone();
        }
        self.sweep(radius, Axis::Rows, Window::All)
            .sweep(radius, Axis::Columns, Window::All)
    }

    /// Morphological closing (dilate, then erode) with a `(2r+1)²` square.
    #[must_use]
    pub fn close_square(&self, radius: u32) -> Mask {
        self.dilate_square(radius).erode_square(radius)
    }

    /// One separable pass of a square element along `axis`, using running
    /// counts so each line costs O(len) regardless of the radius.
    fn sweep(&self, radius: u32, axis: Axis, window: Window) -> Mask {
        let (lines, len) = match axis {
            Axis::Rows => (self.height, self.width),
            Axis::Columns => (self.width, self.height),
        };
        let at = |line: u32, pos: u32| match axis {
            Axis::Rows => (pos, line),
            Axis::Columns => (line, pos),
        };

        let mut out = Mask::new(self.width, self.height);
        let mut prefix = vec![0usize; len as usize + 1];
        for line in 0..lines {
            for pos in 0..len {
                let (x, y) = at(line, pos);
                prefix[pos as usize + 1] = prefix[pos as usize] + usize::from(self.get(x, y));
            }
            for pos in 0..len {
                let lo = pos.saturating_sub(radius) as usize;
                let hi = (pos.saturating_add(radius)).min(len - 1) as usize + 1;
                let set = prefix[hi] - prefix[lo];
                let hit = match window {
                    Window::Any => set > 0,
                    Window::All => set == hi - lo,
                };
                if hit {
                    let (x, y) = at(line, pos);
                    out.set(x, y, true);
                }
            }
        }
        out
    }

    fn assert_same_dims(&self, other: &Mask) {
        assert_eq!(
            self.dimensions(),
            other.dimensions(),
            "mask dimensions must match"
        );
    }
}

#[derive(Clone, Copy)]
enum Axis {
    Rows,
    Columns,
}

#[derive(Clone, Copy)]
enum Window {
    Any,
    All,
}
