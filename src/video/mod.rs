//! Watermark removal for video with a temporally stable mask.
//!
//! Per-frame detection flickers: compression noise and moving content make
//! the detected region jitter from frame to frame. The [`TemporalStabilizer`]
//! therefore runs in two passes over the stream:
//!
//! 1. **Sampling**: detect on the first `N` frames and OR the masks together
//!    into a fixed mask.
//! 2. **Reconstruction**: rewind, and for every frame pick either the fixed
//!    mask or a freshly detected one according to [`VideoMode`], inpaint, and
//!    hand the frame to the sink.
//!
//! Decoding and encoding live behind [`FrameSource`] and [`FrameSink`]; the
//! [`ffmpeg`] module provides implementations backed by the `ffmpeg` tools.

pub mod ffmpeg;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::RgbImage;

use crate::detection::{self, DEFAULT_STRENGTH};
use crate::error::{Error, Result};
use crate::inpaint::{InpaintKernel, Reconstructor, Telea};
use crate::mask::Mask;

/// Default number of leading frames used to build the fixed mask.
pub const DEFAULT_SAMPLE_FRAMES: usize = 50;

/// In auto mode, the fixed mask is kept while the per-frame mask differs from
/// it on fewer than this fraction of the fixed mask's area.
pub const STATIC_TOLERANCE: f64 = 0.1;

/// How the mask for each frame is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum VideoMode {
    /// Fixed mask while the frame's own detection agrees with it, else per-frame.
    #[default]
    Auto,
    /// Always the fixed mask.
    Fixed,
    /// Always a per-frame mask.
    Moving,
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Fixed => "fixed",
            Self::Moving => "moving",
        })
    }
}

/// Error returned when parsing an unknown [`VideoMode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown video mode {0:?} (expected auto, fixed or moving)")]
pub struct ParseVideoModeError(String);

impl FromStr for VideoMode {
    type Err = ParseVideoModeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "fixed" => Ok(Self::Fixed),
            "moving" => Ok(Self::Moving),
            _ => Err(ParseVideoModeError(s.to_string())),
        }
    }
}

/// Options for one video.
#[derive(Debug, Clone)]
pub struct VideoOptions {
    /// Mask selection policy.
    pub mode: VideoMode,
    /// Number of leading frames sampled for the fixed mask.
    pub sample_frames: usize,
    /// Watermark strength (closing radius and inpaint radius offset).
    pub strength: u32,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            mode: VideoMode::Auto,
            sample_frames: DEFAULT_SAMPLE_FRAMES,
            strength: DEFAULT_STRENGTH,
        }
    }
}

/// Stream geometry reported by a [`FrameSource`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub fps: f64,
}

/// A rewindable stream of decoded RGB frames.
pub trait FrameSource {
    /// Geometry of the stream.
    fn info(&self) -> VideoInfo;

    /// Decode the next frame, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be decoded.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Restart decoding from the first frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be reopened.
    fn rewind(&mut self) -> Result<()>;
}

/// Consumer of processed frames, in presentation order.
pub trait FrameSink {
    /// Encode one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder rejects the frame.
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush and close the output.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder fails to finalize the output.
    fn finish(&mut self) -> Result<()>;
}

/// Lifecycle of one stabilizer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing read yet.
    Idle,
    /// Building the fixed mask from leading frames.
    Sampling,
    /// Inpainting and writing frames.
    Reconstructing,
    /// All frames written.
    Done,
}

/// Which mask a frame was reconstructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskChoice {
    /// The fixed mask from the sampling window.
    Fixed,
    /// The frame's own detection.
    Frame,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoReport {
    /// Frames read during sampling.
    pub sampled_frames: usize,
    /// Pixels set in the fixed mask.
    pub fixed_mask_area: usize,
    /// Mask used for each written frame, in order.
    pub choices: Vec<MaskChoice>,
}

impl VideoReport {
    /// Number of frames written.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.choices.len()
    }

    /// Number of frames reconstructed with the fixed mask.
    #[must_use]
    pub fn fixed_mask_frames(&self) -> usize {
        self.choices
            .iter()
            .filter(|&&c| c == MaskChoice::Fixed)
            .count()
    }

    /// Number of frames reconstructed with their own detection.
    #[must_use]
    pub fn frame_mask_frames(&self) -> usize {
        self.frames() - self.fixed_mask_frames()
    }
}

/// Pick the mask for one frame.
///
/// `Fixed` falls back to `current` when sampling produced no fixed mask.
/// `Auto` keeps the fixed mask only if it is non-empty and `current` differs
/// from it on fewer than [`STATIC_TOLERANCE`] of its area; an empty fixed
/// mask therefore always yields the per-frame mask.
#[must_use]
pub fn select_mask<'a>(
    mode: VideoMode,
    fixed: Option<&'a Mask>,
    current: &'a Mask,
) -> (MaskChoice, &'a Mask) {
    match (mode, fixed) {
        (VideoMode::Fixed, Some(f)) => (MaskChoice::Fixed, f),
        (VideoMode::Auto, Some(f)) if is_static(f, current) => (MaskChoice::Fixed, f),
        _ => (MaskChoice::Frame, current),
    }
}

fn is_static(fixed: &Mask, current: &Mask) -> bool {
    let area = fixed.count();
    if area == 0 {
        return false;
    }
    #[allow(clippy::cast_precision_loss)]
    let (diff, area) = (fixed.symmetric_difference_count(current) as f64, area as f64);
    diff < STATIC_TOLERANCE * area
}

/// Two-pass watermark remover for one video.
#[derive(Debug)]
pub struct TemporalStabilizer<K = Telea> {
    options: VideoOptions,
    reconstructor: Reconstructor<K>,
    phase: Phase,
    fixed_mask: Option<Mask>,
    sampled_frames: usize,
}

impl TemporalStabilizer<Telea> {
    /// Stabilizer using the fast-marching inpainting kernel.
    #[must_use]
    pub fn new(options: VideoOptions) -> Self {
        Self::with_kernel(options, Telea)
    }
}

impl<K: InpaintKernel> TemporalStabilizer<K> {
    /// Stabilizer using a custom inpainting kernel.
    pub fn with_kernel(options: VideoOptions, kernel: K) -> Self {
        let reconstructor = Reconstructor::with_kernel(kernel, options.strength);
        Self {
            options,
            reconstructor,
            phase: Phase::Idle,
            fixed_mask: None,
            sampled_frames: 0,
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The fixed mask, once sampling has produced one.
    #[must_use]
    pub fn fixed_mask(&self) -> Option<&Mask> {
        self.fixed_mask.as_ref()
    }

    /// Run both passes: sample, rewind, reconstruct into `sink`.
    ///
    /// The sink is finished on success only.
    ///
    /// # Errors
    ///
    /// Any decode, geometry or encode error aborts the run.
    pub fn run<S, W>(&mut self, source: &mut S, sink: &mut W) -> Result<VideoReport>
    where
        S: FrameSource + ?Sized,
        W: FrameSink + ?Sized,
    {
        self.sample(source)?;
        source.rewind()?;
        let report = self.reconstruct(source, sink)?;
        sink.finish()?;
        Ok(report)
    }

    /// Sampling pass: OR the detections of up to `sample_frames` leading frames.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyVideo`] if the stream has no frames, or any
    /// decode error from the source.
    pub fn sample<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> Result<Option<&Mask>> {
        self.phase = Phase::Sampling;
        let info = source.info();
        let mut fixed: Option<Mask> = None;
        let mut count = 0;

        while count < self.options.sample_frames {
            let Some(frame) = source.next_frame()? else {
                break;
            };
            check_geometry(&frame, info, count)?;
            let mask = detection::detect_watermark_mask(&frame, self.options.strength);
            match fixed.as_mut() {
                Some(f) => f.union_with(&mask),
                None => fixed = Some(mask),
            }
            count += 1;
        }

        if count == 0 && self.options.sample_frames > 0 {
            return Err(Error::EmptyVideo);
        }
        log::debug!(
            "sampled {count} frames, fixed mask {} px",
            fixed.as_ref().map_or(0, Mask::count)
        );
        self.sampled_frames = count;
        self.fixed_mask = fixed;
        Ok(self.fixed_mask.as_ref())
    }

    /// Reconstruction pass over the (rewound) source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyVideo`] if no frame was written, or any decode
    /// or encode error.
    pub fn reconstruct<S, W>(&mut self, source: &mut S, sink: &mut W) -> Result<VideoReport>
    where
        S: FrameSource + ?Sized,
        W: FrameSink + ?Sized,
    {
        self.phase = Phase::Reconstructing;
        let info = source.info();
        let mode = self.options.mode;
        let fixed = self.fixed_mask.as_ref();
        let mut report = VideoReport {
            sampled_frames: self.sampled_frames,
            fixed_mask_area: fixed.map_or(0, Mask::count),
            choices: Vec::new(),
        };

        while let Some(frame) = source.next_frame()? {
            check_geometry(&frame, info, report.frames())?;
            let current;
            let (choice, mask) = match (mode, fixed) {
                // no need to detect when the answer is already known
                (VideoMode::Fixed, Some(f)) => (MaskChoice::Fixed, f),
                _ => {
                    current = detection::detect_watermark_mask(&frame, self.options.strength);
                    select_mask(mode, fixed, &current)
                }
            };
            let out = self.reconstructor.reconstruct(&frame, mask);
            sink.write_frame(&out)?;
            report.choices.push(choice);
        }

        if report.frames() == 0 {
            return Err(Error::EmptyVideo);
        }
        log::debug!(
            "{mode}: {} frames, {} with fixed mask",
            report.frames(),
            report.fixed_mask_frames()
        );
        self.phase = Phase::Done;
        Ok(report)
    }
}

fn check_geometry(frame: &RgbImage, info: VideoInfo, index: usize) -> Result<()> {
    if frame.dimensions() == (info.width, info.height) {
        return Ok(());
    }
    Err(Error::VideoDecode {
        frame: index,
        reason: format!(
            "frame is {}x{}, stream is {}x{}",
            frame.width(),
            frame.height(),
            info.width,
            info.height
        ),
    })
}

/// Outcome of [`remove_watermark_video`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOutcome {
    /// Whether a complete output file was written.
    pub success: bool,
    /// Where the output was (or would have been) written.
    pub output: PathBuf,
}

/// Remove watermarks from the video at `input`, writing an MP4 to `output`.
///
/// Failures are fatal to the video: they are logged, any partially written
/// output is deleted, and `success` is `false`.
#[must_use]
pub fn remove_watermark_video(
    input: &Path,
    output: &Path,
    options: &VideoOptions,
) -> VideoOutcome {
    let result = ffmpeg::FfmpegSource::open(input).and_then(|mut source| {
        let mut sink = ffmpeg::FfmpegSink::create(output, source.info())?;
        TemporalStabilizer::new(options.clone()).run(&mut source, &mut sink)
    });

    finish_outcome(input, output, result)
}

/// Log the result of one video run and delete `output` on failure.
fn finish_outcome(input: &Path, output: &Path, result: Result<VideoReport>) -> VideoOutcome {
    let success = match result {
        Ok(report) => {
            log::info!(
                "{}: {} frames written ({} fixed-mask)",
                output.display(),
                report.frames(),
                report.fixed_mask_frames()
            );
            true
        }
        Err(e) => {
            log::error!("{}: {e}", input.display());
            if output.exists() {
                if let Err(rm) = std::fs::remove_file(output) {
                    log::warn!("could not remove partial output {}: {rm}", output.display());
                }
            }
            false
        }
    };

    VideoOutcome {
        success,
        output: output.to_path_buf(),
    }
}

/// Output path for a cleaned video: `<out_dir>/<stem>_clean.mp4`.
#[must_use]
pub fn default_video_output_path(input: &Path, out_dir: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    out_dir.join(format!("{stem}_clean.mp4"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: u32, side: u32) -> Mask {
        Mask::from_fn(50, 50, |x, y| {
            (x0..x0 + side).contains(&x) && (0..side).contains(&y)
        })
    }

    #[test]
    fn parse_modes() {
        assert_eq!("auto".parse::<VideoMode>(), Ok(VideoMode::Auto));
        assert_eq!(" Fixed ".parse::<VideoMode>(), Ok(VideoMode::Fixed));
        assert_eq!("moving".parse::<VideoMode>(), Ok(VideoMode::Moving));
        assert!("static".parse::<VideoMode>().is_err());
        assert_eq!(VideoMode::Moving.to_string(), "moving");
    }

    #[test]
    fn auto_keeps_fixed_mask_when_close() {
        let fixed = square(0, 10);
        let mut current = fixed.clone();
        current.set(20, 20, true); // 1 px differs, well under 10 of 100
        let (choice, mask) = select_mask(VideoMode::Auto, Some(&fixed), &current);
        assert_eq!(choice, MaskChoice::Fixed);
        assert_eq!(mask, &fixed);
    }

    #[test]
    fn auto_switches_to_frame_mask_when_far() {
        let fixed = square(0, 10);
        let current = square(30, 10);
        let (choice, mask) = select_mask(VideoMode::Auto, Some(&fixed), &current);
        assert_eq!(choice, MaskChoice::Frame);
        assert_eq!(mask, &current);
    }

    #[test]
    fn auto_tolerance_is_strict() {
        // exactly 10% differing is not "less than 10%"
        let fixed = square(0, 10);
        let mut current = fixed.clone();
        for x in 0..10 {
            current.set(x, 0, false);
        }
        assert_eq!(
            select_mask(VideoMode::Auto, Some(&fixed), &current).0,
            MaskChoice::Frame
        );
    }

    #[test]
    fn empty_fixed_mask_always_uses_frame_mask() {
        let fixed = Mask::new(50, 50);
        let current = Mask::new(50, 50);
        assert_eq!(
            select_mask(VideoMode::Auto, Some(&fixed), &current).0,
            MaskChoice::Frame
        );
        assert_eq!(
            select_mask(VideoMode::Auto, None, &current).0,
            MaskChoice::Frame
        );
    }

    #[test]
    fn fixed_and_moving_modes() {
        let fixed = square(0, 10);
        let current = square(30, 10);
        assert_eq!(
            select_mask(VideoMode::Fixed, Some(&fixed), &current).0,
            MaskChoice::Fixed
        );
        assert_eq!(
            select_mask(VideoMode::Fixed, None, &current).0,
            MaskChoice::Frame
        );
        assert_eq!(
            select_mask(VideoMode::Moving, Some(&fixed), &fixed).0,
            MaskChoice::Frame
        );
    }

    #[test]
    fn failed_run_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip_clean.mp4");
        std::fs::write(&output, b"half an mp4").unwrap();

        let outcome = finish_outcome(Path::new("clip.mp4"), &output, Err(Error::EmptyVideo));
        assert!(!outcome.success);
        assert_eq!(outcome.output, output);
        assert!(!output.exists());
    }

    #[test]
    fn successful_run_keeps_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip_clean.mp4");
        std::fs::write(&output, b"mp4").unwrap();
        let report = VideoReport {
            sampled_frames: 1,
            fixed_mask_area: 0,
            choices: vec![MaskChoice::Frame],
        };

        let outcome = finish_outcome(Path::new("clip.mp4"), &output, Ok(report));
        assert!(outcome.success);
        assert!(output.exists());
    }

    #[test]
    fn default_output_path_appends_clean_suffix() {
        let p = default_video_output_path(Path::new("/videos/clip.mov"), Path::new("/out"));
        assert_eq!(p, PathBuf::from("/out/clip_clean.mp4"));
    }
}
