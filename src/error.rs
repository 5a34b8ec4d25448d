//! Error types for the bgwipe crate.

use std::path::PathBuf;

/// Errors that can occur while segmenting, reconstructing or writing media.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The batch source directory does not exist or is not a directory.
    #[error("source directory not found: {}", .0.display())]
    SourceDirMissing(PathBuf),

    /// Walking the source directory tree failed.
    #[error("failed to walk source directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file format is not supported.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred while decoding or encoding a still image.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Probing a video for its dimensions and frame rate failed.
    #[error("failed to probe video {}: {reason}", path.display())]
    VideoProbe {
        /// Video that was probed.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A frame could not be decoded.
    #[error("video decode failed at frame {frame}: {reason}")]
    VideoDecode {
        /// Zero-based index of the frame being read.
        frame: usize,
        /// What went wrong.
        reason: String,
    },

    /// A frame could not be handed to the encoder, or the encoder failed.
    #[error("video encode failed: {0}")]
    VideoEncode(String),

    /// The video stream produced no frames at all.
    #[error("video contains no decodable frames")]
    EmptyVideo,
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
