//! Camera device capability.
//!
//! Every sensor variant implements [`CameraDevice`]. Frames are delivered
//! asynchronously through a [`FrameSink`] that the device calls whenever a
//! logical frame is complete; delivery is driven by [`DeviceEvent`]s coming
//! from whatever the platform provides (frame-ready notifications or timer
//! ticks).

use super::{ExposureTable, Frame, SensorConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during camera operations.
///
/// A [`CameraError::CommandFailed`] is fatal for the session.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("device command {command} failed with status {status}")]
    CommandFailed { command: &'static str, status: i32 },
    #[error("camera not connected")]
    NotConnected,
    #[error("invalid exposure selection: {0}")]
    InvalidExposure(#[from] super::ExposureError),
    #[error("video source error: {0}")]
    Source(String),
}

impl CameraError {
    /// Returns true for failures after which the device must be torn down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CommandFailed { .. } | Self::Source(_))
    }
}

/// Callback invoked once per logical frame.
pub type FrameSink = Box<dyn FnMut(Frame) + Send>;

/// Opaque handle of the surface that receives frame-ready notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceHandle(pub u64);

/// Platform events that advance a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The sensor reported a completed readout.
    FrameReady,
    /// The device timer fired.
    TimerTick,
}

/// Acquisition mode of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleMode {
    /// Not acquiring.
    #[default]
    Off,
    /// Free-running continuous acquisition.
    Live,
    /// Software-triggered acquisition at the selected IFI.
    Still,
}

/// Trigger/illumination LED control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    On,
    Off,
    /// LED follows the exposure.
    Auto,
}

/// Identification reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: u32,
    pub model: String,
    pub serial: String,
}

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.index, self.model, self.serial)
    }
}

/// Immutable configuration shared by a device and the components that
/// interpret its frames.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub sensor: SensorConfig,
    pub table: Arc<ExposureTable>,
}

impl DeviceProfile {
    pub fn new(sensor: SensorConfig, table: ExposureTable) -> Self {
        Self {
            sensor,
            table: Arc::new(table),
        }
    }
}

/// Trait for camera implementations.
///
/// `set_exposure` may be called while sampling: the device stops any
/// in-flight acquisition, reprograms duration and trigger mode, resumes in
/// the mode it was in and resets its sub-frame accumulator. The caller is
/// responsible for only requesting IFIs longer than the exposure.
pub trait CameraDevice: Send {
    /// Device identification.
    fn info(&self) -> &DeviceInfo;

    /// Sensor geometry and exposure table.
    fn profile(&self) -> &DeviceProfile;

    /// Prepares the device and registers `surface` for frame notifications.
    fn connect(&mut self, surface: SurfaceHandle) -> Result<(), CameraError>;

    /// Selects an exposure and inter-frame interval.
    fn set_exposure(&mut self, exposure_index: usize, ifi_index: usize) -> Result<(), CameraError>;

    /// Starts delivering frames to `sink`.
    fn start_sampling(&mut self, sink: FrameSink) -> Result<(), CameraError>;

    /// Stops delivering frames.
    fn stop_sampling(&mut self) -> Result<(), CameraError>;

    /// Releases all device resources.
    fn release(&mut self) -> Result<(), CameraError>;

    /// Advances the device on a platform event.
    fn handle_event(&mut self, event: DeviceEvent) -> Result<(), CameraError>;

    /// Period at which `DeviceEvent::TimerTick` must be delivered, if any.
    fn timer_interval(&self) -> Option<Duration>;

    /// Notifies the device that a black calibration is (or is no longer) running.
    fn set_calibration_active(&mut self, active: bool) -> Result<(), CameraError>;

    /// Sets the trigger LED mode. Devices without an LED ignore this.
    fn set_trigger_led(&mut self, _mode: LedMode) -> Result<(), CameraError> {
        Ok(())
    }

    /// Current acquisition mode.
    fn sample_mode(&self) -> SampleMode;

    /// Currently selected exposure index.
    fn exposure_index(&self) -> usize;

    /// Currently selected IFI index.
    fn ifi_index(&self) -> usize;

    /// Exposure reported by the hardware, in milliseconds.
    fn actual_exposure_ms(&self) -> f64;

    /// Frame rate reported by the hardware.
    fn actual_frame_rate(&self) -> f64;
}

/// Timer period for timer-driven devices: the sub-frame duration when
/// free-running, otherwise the selected IFI.
pub(crate) fn tick_interval(
    table: &ExposureTable,
    exposure_index: usize,
    ifi_index: usize,
) -> Result<Duration, CameraError> {
    let ms = if ifi_index == 0 {
        table.get(exposure_index)?.sub_frame_ms()
    } else {
        f64::from(table.ifi_ms(ifi_index)?)
    };
    Ok(Duration::from_micros((ms.max(1.0) * 1000.0).round() as u64))
}
