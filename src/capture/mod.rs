//! Camera devices and frame handling.
//!
//! This module provides the [`CameraDevice`] capability, the three device
//! variants (hardware-triggered sensor, simulated noise source, generic
//! video capture), the exposure table they share and the sub-frame
//! accumulator that turns raw reads into logical frames.

mod accumulator;
mod camera;
mod config;
pub mod driver;
mod exposure;
mod frame;
mod simulated;
mod triggered;
pub mod webcam;

pub use accumulator::SubFrameAccumulator;
pub(crate) use camera::tick_interval;
pub use camera::{
    CameraDevice, CameraError, DeviceEvent, DeviceInfo, DeviceProfile, FrameSink, LedMode,
    SampleMode, SurfaceHandle,
};
pub use config::{
    CalibrationConfig, CaptureConfig, ConfigError, DisplayConfig, ExposureConfig, FileConfig,
    MetricsConfig, RecordingConfig, SensorConfig,
};
pub use driver::{MockSensorDriver, SensorDriver};
pub use exposure::{ExposureError, ExposureSetting, ExposureTable};
pub use frame::Frame;
pub use simulated::{SimulatedCamera, CALIBRATION_LEVEL};
pub use triggered::TriggeredCamera;
pub use webcam::{VideoCaptureCamera, VideoSource};
