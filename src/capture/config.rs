//! Session configuration.
//!
//! Sensor geometry and bit depth are fixed for the lifetime of a session
//! and passed by value into every component that needs them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Sensor geometry and sample depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Native bits per sample.
    pub pixel_bits: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 1024,
            pixel_bits: 10,
        }
    }
}

impl SensorConfig {
    /// Creates a configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Largest representable sample, `2^pixel_bits - 1`.
    pub fn pixel_maxval(&self) -> i32 {
        (1i32 << self.pixel_bits) - 1
    }

    /// Left shift that maps native samples onto the full 16-bit range.
    pub fn shift_to_16(&self) -> u32 {
        16u32.saturating_sub(self.pixel_bits)
    }

    /// Samples per frame.
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        // Samples are stored as i16, so 15 bits is the ceiling.
        if self.pixel_bits == 0 || self.pixel_bits > 15 {
            return Err(ConfigError::InvalidPixelBits(self.pixel_bits));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    #[error("invalid pixel depth {0} (must be 1-15 bits)")]
    InvalidPixelBits(u32),
    #[error("rebin factor {0} must be a power of two")]
    InvalidRebin(u32),
    #[error("rebin factor {rebin} overflows 16 bits at {pixel_bits}-bit depth")]
    RebinOverflow { rebin: u32, pixel_bits: u32 },
    #[error("video codec must be a four-character code, got {0:?}")]
    InvalidFourCC(String),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub exposure: ExposureConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Initial exposure selections for the two control channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureConfig {
    /// Preferred primary ("bright") exposure in milliseconds.
    pub initial_primary_ms: f64,
    /// Preferred secondary ("fluor") exposure in milliseconds.
    pub initial_secondary_ms: f64,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            initial_primary_ms: 100.0,
            initial_secondary_ms: 100.0,
        }
    }
}

/// Black-reference calibration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Directory holding one reference file per exposure duration.
    pub dir: PathBuf,
    /// Load stored references at startup.
    pub auto_load: bool,
    /// Persist each reference as soon as it is acquired.
    pub auto_save: bool,
    /// Apply black correction to live frames.
    pub enabled: bool,
    /// RMS drift from the previous reference above which a warning is raised.
    pub max_rms_drift: f64,
    /// Mean black level, as a fraction of full scale, above which the field
    /// is reported as not dark.
    pub max_black_fraction: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("calibration"),
            auto_load: true,
            auto_save: true,
            enabled: true,
            max_rms_drift: 8.0,
            max_black_fraction: 0.25,
        }
    }
}

/// Still capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Root directory for captured stills.
    pub dir: PathBuf,
    /// Write every capture to disk.
    pub auto_save: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("captures"),
            auto_save: true,
        }
    }
}

/// Sequence and video recording configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Output directory for sequence and video files.
    pub dir: PathBuf,
    /// Width of the centered window written to sequences.
    pub window_width: u32,
    /// Height of the centered window written to sequences.
    pub window_height: u32,
    /// Block-sum factor applied to sequence frames.
    pub rebin: u32,
    /// Four-character code selecting the video container/codec.
    pub fourcc: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("recordings"),
            window_width: 640,
            window_height: 512,
            rebin: 1,
            fourcc: "Y800".to_string(),
        }
    }
}

impl RecordingConfig {
    /// Validates recording settings against the sensor depth.
    ///
    /// The block sum of an `r x r` tile adds `2*log2(r)` bits, which must
    /// still fit in 16 bits.
    pub fn validate(&self, sensor: &SensorConfig) -> Result<(), ConfigError> {
        if self.rebin == 0 || !self.rebin.is_power_of_two() {
            return Err(ConfigError::InvalidRebin(self.rebin));
        }
        if sensor.pixel_bits + 2 * self.rebin.trailing_zeros() > 16 {
            return Err(ConfigError::RebinOverflow {
                rebin: self.rebin,
                pixel_bits: sensor.pixel_bits,
            });
        }
        if self.fourcc.len() != 4 || !self.fourcc.is_ascii() {
            return Err(ConfigError::InvalidFourCC(self.fourcc.clone()));
        }
        Ok(())
    }
}

/// Live display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Number of samples in the frame-rate moving average.
    pub fps_window: usize,
    /// Histogram bins reported with each frame.
    pub histogram_bins: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            fps_window: 5,
            histogram_bins: 64,
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 0 }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sensor.validate()?;
        self.recording.validate(&self.sensor)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(FileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = SensorConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_pixel_maxval() {
        let sensor = SensorConfig::default();
        assert_eq!(sensor.pixel_maxval(), 1023);
        assert_eq!(sensor.shift_to_16(), 6);
    }

    #[test]
    fn test_rebin_must_be_power_of_two() {
        let sensor = SensorConfig::default();
        let recording = RecordingConfig {
            rebin: 3,
            ..Default::default()
        };
        assert!(matches!(
            recording.validate(&sensor),
            Err(ConfigError::InvalidRebin(3))
        ));
    }

    #[test]
    fn test_rebin_overflow_rejected() {
        let sensor = SensorConfig::default();
        let ok = RecordingConfig {
            rebin: 8,
            ..Default::default()
        };
        let too_big = RecordingConfig {
            rebin: 16,
            ..Default::default()
        };
        assert!(ok.validate(&sensor).is_ok());
        assert!(matches!(
            too_big.validate(&sensor),
            Err(ConfigError::RebinOverflow { .. })
        ));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = FileConfig::from_toml(
            r#"
            [sensor]
            width = 320
            height = 240
            pixel_bits = 8

            [calibration]
            dir = "/tmp/cal"
            auto_load = false
            auto_save = false
            enabled = true
            max_rms_drift = 4.0
            "#,
        )
        .unwrap();

        assert_eq!(config.sensor.width, 320);
        assert_eq!(config.sensor.pixel_maxval(), 255);
        assert!(!config.calibration.auto_load);
        assert_eq!(config.display.fps_window, 5);
        assert_eq!(config.recording.fourcc, "Y800");
    }
}
