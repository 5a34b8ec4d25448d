//! Preparing sprite animation frames for a transparent overlay.

use std::path::Path;

use image::imageops::FilterType;
use image::RgbaImage;

use crate::engine::{self, BackgroundOptions, BACKGROUND_EXTENSIONS};
use crate::error::Result;

/// How sprite frames are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteOptions {
    /// Resize every frame to this width, keeping the aspect ratio.
    pub width: Option<u32>,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Background removal applied to each frame.
    pub background: BackgroundOptions,
}

impl Default for SpriteOptions {
    fn default() -> Self {
        Self {
            width: None,
            recursive: false,
            background: BackgroundOptions::default(),
        }
    }
}

/// Scale `img` to `width`, keeping the aspect ratio (height at least 1).
#[must_use]
pub fn resize_to_width(img: &RgbaImage, width: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    if w == 0 || width == 0 || w == width {
        return img.clone();
    }
    let height = (u64::from(h) * u64::from(width) / u64::from(w)).max(1);
    let height = u32::try_from(height).unwrap_or(u32::MAX);
    image::imageops::resize(img, width, height, FilterType::Lanczos3)
}

/// Matte one in-memory frame: optional resize, then background removal.
#[must_use]
pub fn prepare_frame(img: &RgbaImage, options: &SpriteOptions) -> RgbaImage {
    let mut frame = match options.width {
        Some(width) => resize_to_width(img, width),
        None => img.clone(),
    };
    engine::remove_background(&mut frame, &options.background);
    frame
}

/// Load and matte every sprite frame under `dir`, in file-name order.
///
/// Frames that fail to decode are skipped with a warning.
///
/// # Errors
///
/// Returns an error if `dir` is missing or cannot be read.
pub fn load_sprite_frames(dir: &Path, options: &SpriteOptions) -> Result<Vec<RgbaImage>> {
    let paths = engine::collect_sources(dir, options.recursive, BACKGROUND_EXTENSIONS)?;
    log::debug!("{}: {} sprite frames", dir.display(), paths.len());

    let mut frames = Vec::with_capacity(paths.len());
    for path in &paths {
        match image::open(path) {
            Ok(img) => frames.push(prepare_frame(&img.to_rgba8(), options)),
            Err(e) => log::warn!("skipping frame {}: {e}", path.display()),
        }
    }
    Ok(frames)
}
