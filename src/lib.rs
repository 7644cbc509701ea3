//! Darkfield: scientific camera acquisition with dark-field calibration.
//!
//! Frames from a scientific sensor (or a simulated / generic video source)
//! are black-corrected against a per-exposure reference, scaled through an
//! intensity window for display and optionally recorded as 16-bit TIFF
//! sequences or 8-bit video.
//!
//! # Architecture
//!
//! ```text
//! capture → pipeline → recording
//!    ↑          ↑
//! calibration (black references)
//!
//! session: owns the device and serializes events and commands
//! ```
//!
//! # Example
//!
//! ```no_run
//! use darkfield::{
//!     capture::{DeviceProfile, ExposureTable, FileConfig, SimulatedCamera},
//!     session::{ControlCommand, NullDisplay, Session},
//! };
//! use std::sync::atomic::AtomicBool;
//!
//! let config = FileConfig::default();
//! let profile = DeviceProfile::new(config.sensor, ExposureTable::standard());
//! let camera = SimulatedCamera::new(profile);
//!
//! let mut session = Session::new(Box::new(camera), &config, Box::new(NullDisplay)).unwrap();
//! session.controller().send(ControlCommand::StartCalibration).unwrap();
//!
//! let stop = AtomicBool::new(false);
//! session.run(&stop, Some(100)).unwrap();
//! session.shutdown();
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod calibration;
pub mod capture;
pub mod metrics;
pub mod pipeline;
pub mod recording;
pub mod session;

// Re-export commonly used types at crate root
pub use calibration::{BlackReferenceSet, CalibrationEngine, CalibrationReport};
pub use capture::{CameraDevice, ExposureTable, FileConfig, Frame, SensorConfig};
pub use pipeline::{AcquisitionPipeline, IntensityWindow};
pub use recording::Recorder;
pub use session::{ControlCommand, Session, SessionError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
