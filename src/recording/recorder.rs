//! Sequence and video recording muxer.
//!
//! The two kinds are started and stopped independently. A write failure
//! closes only the kind that failed.

use super::error::{RecordingError, RecordingKind};
use super::sequence::SequenceWriter;
use super::video::{extension_for, open_video, FourCC, VideoEncoder};
use super::window::WindowSpec;
use crate::capture::{Frame, RecordingConfig, SensorConfig};
use crate::pipeline::DisplayImage;
use std::fs;
use std::path::{Path, PathBuf};

/// What happened to one frame.
#[derive(Debug, Default)]
pub struct RecordOutcome {
    pub written: Vec<RecordingKind>,
    /// Recordings closed because of a write failure.
    pub aborted: Vec<(RecordingKind, RecordingError)>,
}

pub struct Recorder {
    dir: PathBuf,
    spec: WindowSpec,
    fourcc: FourCC,
    sensor: SensorConfig,
    sequence: Option<SequenceWriter>,
    video: Option<Box<dyn VideoEncoder>>,
    opened: u32,
}

impl Recorder {
    pub fn new(config: &RecordingConfig, sensor: SensorConfig) -> Result<Self, RecordingError> {
        Ok(Self {
            dir: config.dir.clone(),
            spec: WindowSpec::from_config(config),
            fourcc: config.fourcc.parse()?,
            sensor,
            sequence: None,
            video: None,
            opened: 0,
        })
    }

    pub fn is_active(&self, kind: RecordingKind) -> bool {
        match kind {
            RecordingKind::Sequence => self.sequence.is_some(),
            RecordingKind::Video => self.video.is_some(),
        }
    }

    pub fn frames_written(&self, kind: RecordingKind) -> u64 {
        match kind {
            RecordingKind::Sequence => self.sequence.as_ref().map_or(0, |s| s.frames_written()),
            RecordingKind::Video => self.video.as_ref().map_or(0, |v| v.frames_written()),
        }
    }

    fn next_path(&mut self, prefix: &str, extension: &str) -> Result<PathBuf, RecordingError> {
        fs::create_dir_all(&self.dir).map_err(|e| RecordingError::io(&self.dir, e))?;
        self.opened += 1;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        Ok(self
            .dir
            .join(format!("{prefix}_{stamp}_{:03}.{extension}", self.opened)))
    }

    /// Opens a new multi-page TIFF sequence.
    pub fn start_sequence(&mut self) -> Result<PathBuf, RecordingError> {
        if self.sequence.is_some() {
            return Err(RecordingError::AlreadyActive(RecordingKind::Sequence));
        }
        let path = self.next_path("seq", "tif")?;
        let writer = SequenceWriter::create(
            &path,
            self.spec,
            self.sensor.width,
            self.sensor.height,
            self.sensor.pixel_bits,
        )?;
        self.sequence = Some(writer);
        Ok(path)
    }

    /// Opens a new video stream at `fps`.
    pub fn start_video(&mut self, fps: f64) -> Result<PathBuf, RecordingError> {
        if self.video.is_some() {
            return Err(RecordingError::AlreadyActive(RecordingKind::Video));
        }
        let extension = extension_for(&self.fourcc)?;
        let path = self.next_path("vid", extension)?;
        let encoder = open_video(
            &path,
            &self.fourcc,
            self.sensor.width,
            self.sensor.height,
            fps,
        )?;
        self.video = Some(encoder);
        Ok(path)
    }

    /// Closes the sequence. Returns pages written, or `None` if none was open.
    pub fn stop_sequence(&mut self) -> Result<Option<u64>, RecordingError> {
        self.sequence.take().map(SequenceWriter::finish).transpose()
    }

    /// Closes the video. Returns frames written, or `None` if none was open.
    pub fn stop_video(&mut self) -> Result<Option<u64>, RecordingError> {
        let Some(video) = self.video.take() else {
            return Ok(None);
        };
        let frames = video.finish()?;
        tracing::info!(frames, "Video recording closed");
        Ok(Some(frames))
    }

    /// Closes whatever is open, logging close failures.
    pub fn stop_all(&mut self) {
        if let Err(e) = self.stop_sequence() {
            tracing::error!(error = %e, "Failed to close sequence recording");
        }
        if let Err(e) = self.stop_video() {
            tracing::error!(error = %e, "Failed to close video recording");
        }
    }

    /// Writes a frame to every active recording.
    pub fn record(&mut self, corrected: &Frame, display: &DisplayImage, exposure_ms: f64) -> RecordOutcome {
        let mut outcome = RecordOutcome::default();

        if let Some(writer) = self.sequence.as_mut() {
            match writer.write(corrected, exposure_ms) {
                Ok(()) => outcome.written.push(RecordingKind::Sequence),
                Err(e) => {
                    tracing::error!(error = %e, "Sequence recording aborted");
                    if let Some(Err(close)) = self.sequence.take().map(SequenceWriter::finish) {
                        tracing::error!(error = %close, "Failed to close aborted sequence");
                    }
                    outcome.aborted.push((RecordingKind::Sequence, e));
                }
            }
        }

        if let Some(video) = self.video.as_mut() {
            match video.write_frame(display) {
                Ok(()) => outcome.written.push(RecordingKind::Video),
                Err(e) => {
                    tracing::error!(error = %e, "Video recording aborted");
                    if let Some(Err(close)) = self.video.take().map(|v| v.finish()) {
                        tracing::error!(error = %close, "Failed to close aborted video");
                    }
                    outcome.aborted.push((RecordingKind::Video, e));
                }
            }
        }

        outcome
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop_all();
    }
}
