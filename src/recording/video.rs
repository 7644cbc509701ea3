//! Video stream output of display-scaled frames.
//!
//! The container is selected by a four-character code. Grayscale codes
//! (`Y800`, `GREY`, `Y8  `) are written as YUV4MPEG2 streams with a mono
//! colour space, readable by ffmpeg and most players.

use super::error::RecordingError;
use crate::pipeline::DisplayImage;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Four-character codec code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC([u8; 4]);

impl FourCC {
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    fn is_gray8(&self) -> bool {
        matches!(&self.0, b"Y800" | b"GREY" | b"Y8  ")
    }
}

impl FromStr for FourCC {
    type Err = RecordingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| RecordingError::UnsupportedCodec(s.to_string()))?;
        if !bytes.is_ascii() {
            return Err(RecordingError::UnsupportedCodec(s.to_string()));
        }
        Ok(FourCC(bytes))
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Sink for display frames.
pub trait VideoEncoder: Send {
    fn write_frame(&mut self, image: &DisplayImage) -> Result<(), RecordingError>;
    fn frames_written(&self) -> u64;
    /// Flushes and closes the stream.
    fn finish(self: Box<Self>) -> Result<u64, RecordingError>;
}

/// YUV4MPEG2 mono writer.
pub struct Y4mEncoder<W: Write + Send> {
    writer: W,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl<W: Write + Send> Y4mEncoder<W> {
    /// Writes the stream header. `fps` is stored as a rational with
    /// millisecond precision.
    pub fn new(mut writer: W, width: u32, height: u32, fps: f64) -> std::io::Result<Self> {
        let num = (fps * 1000.0).round().max(1.0) as u64;
        writeln!(
            writer,
            "YUV4MPEG2 W{} H{} F{}:1000 Ip A1:1 Cmono",
            width, height, num
        )?;
        Ok(Self {
            writer,
            width,
            height,
            frames_written: 0,
        })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> VideoEncoder for Y4mEncoder<W> {
    fn write_frame(&mut self, image: &DisplayImage) -> Result<(), RecordingError> {
        if image.width != self.width || image.height != self.height {
            return Err(RecordingError::InvalidWindow {
                width: self.width,
                height: self.height,
                frame_width: image.width,
                frame_height: image.height,
            });
        }
        let io = |e| RecordingError::io("video stream", e);
        self.writer.write_all(b"FRAME\n").map_err(io)?;
        self.writer.write_all(&image.pixels).map_err(io)?;
        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(mut self: Box<Self>) -> Result<u64, RecordingError> {
        self.writer
            .flush()
            .map_err(|e| RecordingError::io("video stream", e))?;
        Ok(self.frames_written)
    }
}

/// File extension for streams written with `fourcc`.
pub fn extension_for(fourcc: &FourCC) -> Result<&'static str, RecordingError> {
    if fourcc.is_gray8() {
        Ok("y4m")
    } else {
        Err(RecordingError::UnsupportedCodec(fourcc.to_string()))
    }
}

/// Opens a video file at `path` for `width x height` frames.
pub fn open_video(
    path: &Path,
    fourcc: &FourCC,
    width: u32,
    height: u32,
    fps: f64,
) -> Result<Box<dyn VideoEncoder>, RecordingError> {
    extension_for(fourcc)?;
    let file = File::create(path).map_err(|e| RecordingError::io(path, e))?;
    let encoder = Y4mEncoder::new(BufWriter::new(file), width, height, fps)
        .map_err(|e| RecordingError::io(path, e))?;

    tracing::info!(path = %path.display(), %fourcc, fps, "Video recording opened");
    Ok(Box::new(encoder))
}
