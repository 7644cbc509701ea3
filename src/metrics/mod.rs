//! Prometheus metrics exporter for acquisition monitoring.
//!
//! # Metrics Exposed
//!
//! ## Acquisition
//! - `darkfield_frames_delivered_total` - Frames delivered by the camera
//! - `darkfield_fps` - Smoothed frame rate
//! - `darkfield_exposure_ms` - Actual exposure time
//!
//! ## Calibration
//! - `darkfield_calibration_active` - 1 while a black calibration runs
//! - `darkfield_calibration_index` - Exposure index being calibrated, -1 when idle
//!
//! ## Recording
//! - `darkfield_sequence_frames_total` - Sequence pages written
//! - `darkfield_video_frames_total` - Video frames written
//! - `darkfield_recording_failures_total` - Recordings aborted by I/O failures
//!
//! The HTTP endpoint requires the `metrics` feature.
//!
//! # Example
//!
//! ```no_run
//! use darkfield::metrics::{MetricsRegistry, MetricsSnapshot};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! let snapshot = MetricsSnapshot {
//!     frames_delivered: 120,
//!     fps: 9.8,
//!     exposure_ms: 100.0,
//!     ..Default::default()
//! };
//!
//! registry.update(&snapshot);
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
