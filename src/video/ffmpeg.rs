//! Frame I/O through the `ffmpeg` and `ffprobe` command-line tools.
//!
//! Decoding spawns `ffmpeg` writing raw `rgb24` frames to a pipe; encoding
//! spawns `ffmpeg` reading raw frames from a pipe and muxing an MP4. Both
//! binaries must be on `PATH`.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use image::RgbImage;

use super::{FrameSink, FrameSource, VideoInfo};
use crate::error::{Error, Result};

/// Frame rate assumed when the container does not report one.
pub const FALLBACK_FPS: f64 = 25.0;

const RGB_CHANNELS: usize = 3;

/// Parse an ffprobe rate such as `30000/1001` or `25`.
///
/// Returns `None` for zero, negative or malformed rates.
#[must_use]
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let s = s.trim();
    let fps = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Parse `key=value` lines printed by
/// `ffprobe -show_entries stream=width,height,r_frame_rate:stream_tags=rotate:stream_side_data=rotation -of default=noprint_wrappers=1`.
///
/// The decoder applies the display rotation, so a quarter-turn swaps the
/// reported width and height.
fn parse_probe_output(path: &Path, stdout: &str) -> Result<VideoInfo> {
    let mut width = None;
    let mut height = None;
    let mut fps = None;
    let mut rotation = 0i64;
    for line in stdout.lines() {
        match line.trim().split_once('=') {
            Some(("width", v)) => width = v.trim().parse::<u32>().ok(),
            Some(("height", v)) => height = v.trim().parse::<u32>().ok(),
            Some(("r_frame_rate", v)) => fps = parse_frame_rate(v),
            Some(("rotation" | "TAG:rotate", v)) => {
                if let Some(deg) = parse_rotation(v) {
                    rotation = deg;
                }
            }
            _ => {}
        }
    }
    match (width, height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => {
            let (width, height) = if rotation.rem_euclid(180) == 90 {
                (height, width)
            } else {
                (width, height)
            };
            Ok(VideoInfo {
                width,
                height,
                fps: fps.unwrap_or(FALLBACK_FPS),
            })
        }
        _ => Err(Error::VideoProbe {
            path: path.to_path_buf(),
            reason: "no video stream with known dimensions".to_string(),
        }),
    }
}

/// Rotation in whole degrees; side data may print it as `-90.00`.
fn parse_rotation(s: &str) -> Option<i64> {
    let deg: f64 = s.trim().parse().ok()?;
    #[allow(clippy::cast_possible_truncation)]
    let deg = deg.round() as i64;
    Some(deg)
}

/// Query width, height and frame rate of the first video stream.
///
/// # Errors
///
/// Returns [`Error::VideoProbe`] if `ffprobe` cannot be run, fails, or
/// reports no usable video stream.
pub fn probe(path: &Path) -> Result<VideoInfo> {
    let probe_err = |reason: String| Error::VideoProbe {
        path: path.to_path_buf(),
        reason,
    };
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,r_frame_rate:stream_tags=rotate:stream_side_data=rotation",
            "-of",
            "default=noprint_wrappers=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| probe_err(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(probe_err(format!(
            "ffprobe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    parse_probe_output(path, &String::from_utf8_lossy(&output.stdout))
}

/// Decoder reading frames from an `ffmpeg` child process.
#[derive(Debug)]
pub struct FfmpegSource {
    path: PathBuf,
    info: VideoInfo,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    frame_index: usize,
}

impl FfmpegSource {
    /// Probe `path` and start decoding it.
    ///
    /// # Errors
    ///
    /// Returns an error if probing fails or `ffmpeg` cannot be started.
    pub fn open(path: &Path) -> Result<Self> {
        let info = probe(path)?;
        log::debug!(
            "{}: {}x{} @ {:.3} fps",
            path.display(),
            info.width,
            info.height,
            info.fps
        );
        let mut source = Self {
            path: path.to_path_buf(),
            info,
            child: None,
            stdout: None,
            frame_index: 0,
        };
        source.spawn()?;
        Ok(source)
    }

    fn spawn(&mut self) -> Result<()> {
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::VideoDecode {
                frame: 0,
                reason: format!("failed to start ffmpeg: {e}"),
            })?;
        self.stdout = child.stdout.take();
        self.child = Some(child);
        self.frame_index = 0;
        Ok(())
    }

    fn stop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            // already-exited children report an error here; nothing to do
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn frame_len(&self) -> usize {
        self.info.width as usize * self.info.height as usize * RGB_CHANNELS
    }

    fn decode_error(&self, reason: String) -> Error {
        Error::VideoDecode {
            frame: self.frame_index,
            reason,
        }
    }

    /// Called at end of stream: a non-zero exit means the input was bad.
    fn reap(&mut self) -> Result<()> {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() {
                return Err(self.decode_error(format!("ffmpeg exited with {status}")));
            }
        }
        Ok(())
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let frame_len = self.frame_len();
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; frame_len];
        let mut filled = 0;
        while filled < frame_len {
            match stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(self.decode_error(e.to_string())),
            }
        }

        if filled == 0 {
            self.reap()?;
            return Ok(None);
        }
        if filled < frame_len {
            return Err(self.decode_error(format!(
                "truncated frame ({filled} of {frame_len} bytes)"
            )));
        }

        let frame = RgbImage::from_raw(self.info.width, self.info.height, buf)
            .ok_or_else(|| self.decode_error("frame buffer size mismatch".to_string()))?;
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<()> {
        self.stop();
        self.spawn()
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Encoder writing an MP4 through an `ffmpeg` child process.
#[derive(Debug)]
pub struct FfmpegSink {
    info: VideoInfo,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl FfmpegSink {
    /// Start an encoder writing `path` at the geometry and rate of `info`.
    ///
    /// An existing file at `path` is overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VideoEncode`] if `ffmpeg` cannot be started.
    pub fn create(path: &Path, info: VideoInfo) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-y", "-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
            .arg(format!("{}x{}", info.width, info.height))
            .arg("-r")
            .arg(info.fps.to_string())
            .args(["-i", "-", "-an", "-c:v", "mpeg4", "-q:v", "2", "-pix_fmt", "yuv420p"])
            .args(["-f", "mp4"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::VideoEncode(format!("failed to start ffmpeg: {e}")))?;
        let stdin = child.stdin.take();
        Ok(Self {
            info,
            child: Some(child),
            stdin,
        })
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.info.width, self.info.height) {
            return Err(Error::VideoEncode(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.info.width,
                self.info.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::VideoEncode("encoder already finished".to_string()))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| Error::VideoEncode(e.to_string()))
    }

    fn finish(&mut self) -> Result<()> {
        // closing stdin signals end of input
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() {
                return Err(Error::VideoEncode(format!("ffmpeg exited with {status}")));
            }
        }
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_frame_rate_variants() {
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn probe_output_is_parsed() {
        let out = "width=1280\nheight=720\nr_frame_rate=24000/1001\n";
        let info = parse_probe_output(Path::new("a.mp4"), out).unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert!((info.fps - 23.976).abs() < 0.01);
    }

    #[test]
    fn quarter_turn_rotation_swaps_dimensions() {
        let side_data = "width=1920\nheight=1080\nr_frame_rate=30/1\nrotation=-90\n";
        let info = parse_probe_output(Path::new("a.mp4"), side_data).unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));

        let tag = "width=1920\nheight=1080\nTAG:rotate=270\n";
        let info = parse_probe_output(Path::new("a.mp4"), tag).unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));
    }

    #[test]
    fn half_turn_rotation_keeps_dimensions() {
        let out = "width=1920\nheight=1080\nrotation=180.00\n";
        let info = parse_probe_output(Path::new("a.mp4"), out).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
    }

    #[test]
    fn probe_output_without_rate_falls_back() {
        let info = parse_probe_output(Path::new("a.mp4"), "width=64\nheight=48\n").unwrap();
        assert!((info.fps - FALLBACK_FPS).abs() < f64::EPSILON);
    }

    #[test]
    fn probe_output_without_stream_is_an_error() {
        let err = parse_probe_output(Path::new("a.mp4"), "").unwrap_err();
        assert!(matches!(err, Error::VideoProbe { .. }));
    }
}
