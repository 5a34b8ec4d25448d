//! Background matting for sprite frames and border watermark removal for
//! images and video.
//!
//! The crate is a set of small, synchronous image transforms plus the batch
//! and video drivers that chain them:
//!
//! - [`segment`]: flood-fill background segmentation seeded from the border.
//! - [`refine`]: edge shrink (erosion) to trim halos.
//! - [`composite`]: apply a mask as transparency or a solid fill.
//! - [`detection`]: low-saturation/high-value watermark candidates near the
//!   frame edges.
//! - [`inpaint`]: fast-marching reconstruction of masked pixels.
//! - [`video`]: two-pass, temporally stabilized watermark removal.
//! - [`engine`]: directory batches with per-file failure isolation.
//!
//! # Quick Start
//!
//! ```no_run
//! use bgwipe::{remove_background, BackgroundOptions};
//!
//! let mut img = image::open("frame.png").unwrap().to_rgba8();
//! remove_background(&mut img, &BackgroundOptions::default());
//! img.save("frame_clean.png").unwrap();
//! ```
//!
//! # Batches
//!
//! ```no_run
//! use bgwipe::{remove_watermark_batch, BatchJob};
//!
//! let mut job = BatchJob::new("photos", "cleaned");
//! job.limit = 200;
//! let result = remove_watermark_batch(&job);
//! println!("{} ok, {} failed", result.succeeded, result.failed);
//! ```

#![deny(missing_docs)]

pub mod composite;
pub mod detection;
pub mod engine;
pub mod error;
pub mod inpaint;
pub mod mask;
pub mod refine;
pub mod segment;
pub mod sprite;
pub mod video;

pub use composite::{parse_fill_color, CompositeMode};
pub use engine::{
    collect_sources, is_supported, output_path, process_background_file, process_watermark_file,
    remove_background, remove_background_batch, remove_watermark, remove_watermark_batch,
    BackgroundOptions, BatchJob, BatchResult, BACKGROUND_EXTENSIONS, DEFAULT_BACKGROUND_LIMIT,
    DEFAULT_WATERMARK_LIMIT, WATERMARK_EXTENSIONS,
};
pub use error::{Error, Result};
pub use mask::Mask;
pub use segment::{SegmentParams, SegmentationStrategy};
pub use video::{
    default_video_output_path, remove_watermark_video, TemporalStabilizer, VideoMode,
    VideoOptions, VideoOutcome,
};
