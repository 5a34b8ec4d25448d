//! Batch processing of image directories.
//!
//! A batch enumerates eligible files under a source directory, caps the list,
//! and processes every file independently: one bad file only bumps the
//! failure count. Results are written as PNG under the destination directory,
//! named after the source file's stem.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use walkdir::WalkDir;

use crate::composite::{self, CompositeMode};
use crate::detection::{self, DEFAULT_STRENGTH};
use crate::error::{Error, Result};
use crate::inpaint::Reconstructor;
use crate::mask::Mask;
use crate::refine::{self, DEFAULT_EDGE_SHRINK};
use crate::segment::{self, SegmentParams};

/// Extensions eligible for background removal.
pub const BACKGROUND_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];

/// Extensions eligible for watermark removal.
pub const WATERMARK_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Default cap for background batches.
pub const DEFAULT_BACKGROUND_LIMIT: usize = 300;

/// Default cap for watermark batches.
pub const DEFAULT_WATERMARK_LIMIT: usize = 200;

/// How a background is removed from one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundOptions {
    /// Segmentation thresholds.
    pub segment: SegmentParams,
    /// Erosion rounds applied to the background mask.
    pub edge_shrink: u32,
    /// Transparent output or solid fill.
    pub mode: CompositeMode,
}

impl Default for BackgroundOptions {
    fn default() -> Self {
        Self {
            segment: SegmentParams::default(),
            edge_shrink: DEFAULT_EDGE_SHRINK,
            mode: CompositeMode::Transparent,
        }
    }
}

/// Parameters of one batch invocation.
#[derive(Debug, Clone)]
pub struct BatchJob {
    /// Directory to read from.
    pub source: PathBuf,
    /// Directory results are written to; created if missing.
    pub destination: PathBuf,
    /// Maximum number of files attempted.
    pub limit: usize,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Background removal settings.
    pub background: BackgroundOptions,
    /// Watermark strength.
    pub strength: u32,
}

impl BatchJob {
    /// A job with default settings.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            limit: DEFAULT_BACKGROUND_LIMIT,
            recursive: true,
            background: BackgroundOptions::default(),
            strength: DEFAULT_STRENGTH,
        }
    }
}

/// Success/failure counts over the files a batch attempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Files written successfully.
    pub succeeded: usize,
    /// Files that failed to load, process or save.
    pub failed: usize,
}

impl BatchResult {
    /// Total files attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Check if `path` has one of `extensions` (case-insensitive).
#[must_use]
pub fn is_supported(path: &Path, extensions: &[&str]) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

fn ensure_supported(path: &Path, extensions: &[&str]) -> Result<()> {
    if is_supported(path, extensions) {
        return Ok(());
    }
    let ext = path.extension().unwrap_or_default().to_string_lossy();
    Err(Error::UnsupportedFormat(format!("{} ({ext:?})", path.display())))
}

/// List eligible files under `dir`, sorted by name within each directory.
///
/// Unreadable subdirectories are skipped with a warning.
///
/// # Errors
///
/// Returns [`Error::SourceDirMissing`] if `dir` is not a directory, or
/// [`Error::Walk`] if `dir` itself cannot be read.
pub fn collect_sources(dir: &Path, recursive: bool, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::SourceDirMissing(dir.to_path_buf()));
    }
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    let mut paths = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                log::warn!("skipping unreadable entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && is_supported(path, extensions) {
            paths.push(path.to_path_buf());
        }
    }
    Ok(paths)
}

/// Output location for `input`: `<destination>/<stem>.png`.
#[must_use]
pub fn output_path(destination: &Path, input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    destination.join(format!("{stem}.png"))
}

/// Segment, refine and composite `img` in place. Returns the refined mask.
pub fn remove_background(img: &mut RgbaImage, options: &BackgroundOptions) -> Mask {
    let mask = segment::segment_background(img, &options.segment);
    let mask = refine::edge_shrink(&mask, options.edge_shrink);
    composite::apply_mask(img, &mask, options.mode, options.segment.alpha_threshold);
    mask
}

/// Detect and inpaint border watermarks. An alpha channel is carried through.
#[must_use]
pub fn remove_watermark(img: &DynamicImage, strength: u32) -> DynamicImage {
    let reconstructor = Reconstructor::new(strength);
    if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        let rgb = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let p = rgba.get_pixel(x, y);
            image::Rgb([p[0], p[1], p[2]])
        });
        let mask = detection::detect_watermark_mask(&rgb, strength);
        let fixed = reconstructor.reconstruct(&rgb, &mask);
        let merged = RgbaImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let c = fixed.get_pixel(x, y);
            image::Rgba([c[0], c[1], c[2], rgba.get_pixel(x, y)[3]])
        });
        DynamicImage::ImageRgba8(merged)
    } else {
        let rgb = img.to_rgb8();
        let mask = detection::detect_watermark_mask(&rgb, strength);
        DynamicImage::ImageRgb8(reconstructor.reconstruct(&rgb, &mask))
    }
}

/// Remove the background of one file and save the result as PNG.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for extensions outside
/// [`BACKGROUND_EXTENSIONS`], or an error if the file cannot be decoded or
/// the output not written.
pub fn process_background_file(
    input: &Path,
    output: &Path,
    options: &BackgroundOptions,
) -> Result<()> {
    ensure_supported(input, BACKGROUND_EXTENSIONS)?;
    let mut img = image::open(input)?.to_rgba8();
    let mask = remove_background(&mut img, options);
    log::debug!(
        "{}: {} of {} px background",
        input.display(),
        mask.count(),
        u64::from(img.width()) * u64::from(img.height())
    );
    img.save_with_format(output, ImageFormat::Png)?;
    Ok(())
}

/// Remove watermarks from one file and save the result as PNG.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for extensions outside
/// [`WATERMARK_EXTENSIONS`], or an error if the file cannot be decoded or
/// the output not written.
pub fn process_watermark_file(input: &Path, output: &Path, strength: u32) -> Result<()> {
    ensure_supported(input, WATERMARK_EXTENSIONS)?;
    let img = image::open(input)?;
    let cleaned = remove_watermark(&img, strength);
    cleaned.save_with_format(output, ImageFormat::Png)?;
    Ok(())
}

/// Remove backgrounds from every eligible image of `job.source`.
#[must_use]
pub fn remove_background_batch(job: &BatchJob) -> BatchResult {
    let options = job.background;
    run_batch(job, BACKGROUND_EXTENSIONS, |input, output| {
        process_background_file(input, output, &options)
    })
}

/// Remove border watermarks from every eligible image of `job.source`.
#[must_use]
pub fn remove_watermark_batch(job: &BatchJob) -> BatchResult {
    let strength = job.strength;
    run_batch(job, WATERMARK_EXTENSIONS, |input, output| {
        process_watermark_file(input, output, strength)
    })
}

fn run_batch<F>(job: &BatchJob, extensions: &[&str], process: F) -> BatchResult
where
    F: Fn(&Path, &Path) -> Result<()> + Sync,
{
    let mut paths = match collect_sources(&job.source, job.recursive, extensions) {
        Ok(paths) => paths,
        Err(e) => {
            log::warn!("nothing to do: {e}");
            return BatchResult::default();
        }
    };
    if let Err(e) = std::fs::create_dir_all(&job.destination) {
        log::error!(
            "failed to create output directory {}: {e}",
            job.destination.display()
        );
        return BatchResult::default();
    }

    if paths.len() > job.limit {
        log::info!(
            "{} eligible files, processing the first {}",
            paths.len(),
            job.limit
        );
        paths.truncate(job.limit);
    }

    // first file (in name order) claims an output path; later ones would overwrite it
    let mut claimed = HashSet::new();
    let mut collisions = 0;
    let mut work = Vec::with_capacity(paths.len());
    for input in paths {
        let output = output_path(&job.destination, &input);
        if claimed.insert(output.clone()) {
            work.push((input, output));
        } else {
            log::warn!(
                "{}: output {} already produced by another file, skipping",
                input.display(),
                output.display()
            );
            collisions += 1;
        }
    }

    let attempt = |(input, output): &(PathBuf, PathBuf)| {
        match process(input, output) {
            Ok(()) => {
                log::debug!("{} -> {}", input.display(), output.display());
                true
            }
            Err(e) => {
                log::warn!("{}: {e}", input.display());
                false
            }
        }
    };

    #[cfg(feature = "parallel")]
    let outcomes: Vec<bool> = {
        use rayon::prelude::*;
        work.par_iter().map(attempt).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<bool> = work.iter().map(attempt).collect();

    let succeeded = outcomes.iter().filter(|&&ok| ok).count();
    BatchResult {
        succeeded,
        failed: outcomes.len() - succeeded + collisions,
    }
}
