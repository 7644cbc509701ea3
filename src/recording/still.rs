//! Still captures of the latest corrected frame.

use super::error::RecordingError;
use crate::capture::{CaptureConfig, Frame, SensorConfig};
use crate::pipeline::IntensityWindow;
use chrono::{DateTime, Local, Timelike};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tiff::encoder::{colortype, TiffEncoder};

/// One captured frame.
#[derive(Debug, Clone)]
pub struct CapturedStill {
    /// 1-based capture number.
    pub number: usize,
    pub frame: Frame,
    /// Intensity window in effect when the still was taken.
    pub window: IntensityWindow,
    pub captured_at: DateTime<Local>,
    pub saved_to: Option<PathBuf>,
}

impl CapturedStill {
    /// `"n/total @ h:mm:ss"`.
    pub fn title(&self, total: usize) -> String {
        format!(
            "{}/{} @ {}:{:02}:{:02}",
            self.number,
            total,
            self.captured_at.hour(),
            self.captured_at.minute(),
            self.captured_at.second()
        )
    }
}

/// Writes a single-page 16-bit TIFF, shifting samples left by `shift`.
pub fn write_tiff16(path: &Path, frame: &Frame, shift: u32) -> Result<(), RecordingError> {
    let data: Vec<u16> = frame
        .pixels()
        .iter()
        .map(|&v| ((v.max(0) as u32) << shift).min(u32::from(u16::MAX)) as u16)
        .collect();
    let file = File::create(path).map_err(|e| RecordingError::io(path, e))?;
    let mut encoder = TiffEncoder::new(file)?;
    encoder.write_image::<colortype::Gray16>(frame.width(), frame.height(), &data)?;
    Ok(())
}

/// In-memory list of stills with optional auto-save.
pub struct StillCapture {
    dir: PathBuf,
    auto_save: bool,
    shift: u32,
    session_start: DateTime<Local>,
    stills: Vec<CapturedStill>,
}

impl StillCapture {
    pub fn new(config: &CaptureConfig, sensor: &SensorConfig, session_start: DateTime<Local>) -> Self {
        Self {
            dir: config.dir.clone(),
            auto_save: config.auto_save,
            shift: sensor.shift_to_16(),
            session_start,
            stills: Vec::new(),
        }
    }

    /// `<dir>/cYYYY-MM-DD/cHHMMSS_NNN.tif`, dated by session start.
    pub fn path_for(&self, number: usize) -> PathBuf {
        self.dir
            .join(self.session_start.format("c%Y-%m-%d").to_string())
            .join(format!(
                "c{}_{:03}.tif",
                self.session_start.format("%H%M%S"),
                number
            ))
    }

    /// Stores a copy of `frame`. A failed save is logged and the still is
    /// kept in memory only.
    pub fn capture(&mut self, frame: &Frame, window: IntensityWindow) -> &CapturedStill {
        let number = self.stills.len() + 1;
        let saved_to = if self.auto_save {
            self.save(number, frame)
                .map_err(|e| tracing::warn!(error = %e, "Capture not saved"))
                .ok()
        } else {
            None
        };

        tracing::info!(number, saved = saved_to.is_some(), "Still captured");
        self.stills.push(CapturedStill {
            number,
            frame: frame.clone(),
            window,
            captured_at: Local::now(),
            saved_to,
        });
        &self.stills[number - 1]
    }

    fn save(&self, number: usize, frame: &Frame) -> Result<PathBuf, RecordingError> {
        let path = self.path_for(number);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| RecordingError::io(parent, e))?;
        }
        write_tiff16(&path, frame, self.shift)?;
        tracing::debug!(path = %path.display(), "Writing capture");
        Ok(path)
    }

    pub fn stills(&self) -> &[CapturedStill] {
        &self.stills
    }

    pub fn len(&self) -> usize {
        self.stills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stills.is_empty()
    }

    /// Capture by 1-based number.
    pub fn get(&self, number: usize) -> Option<&CapturedStill> {
        number.checked_sub(1).and_then(|i| self.stills.get(i))
    }
}
