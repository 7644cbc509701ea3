//! Vendor driver interface for hardware-triggered sensors.
//!
//! [`SensorDriver`] is the opaque command set a triggered sensor exposes.
//! Each command either succeeds or reports the vendor status code; the
//! camera turns any failure into a fatal [`CameraError::CommandFailed`].

use super::{CameraError, DeviceInfo, SurfaceHandle};

/// A failed driver command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverError {
    pub command: &'static str,
    pub status: i32,
}

impl From<DriverError> for CameraError {
    fn from(e: DriverError) -> Self {
        CameraError::CommandFailed {
            command: e.command,
            status: e.status,
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Exposure start condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Free-running at the programmed frame rate.
    Off,
    /// Each exposure starts on a software trigger.
    Software,
}

/// Flash (LED strobe) output state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashMode {
    /// Output held high.
    On,
    /// Output held low.
    Off,
    /// Output is active high for the duration of each exposure.
    ActiveHigh,
}

/// Command set of a hardware-triggered sensor.
pub trait SensorDriver: Send {
    fn info(&self) -> DeviceInfo;
    fn reset_to_defaults(&mut self) -> DriverResult<()>;
    fn allocate_buffer(&mut self, width: u32, height: u32, bits_per_pixel: u32) -> DriverResult<()>;
    fn set_mono_mode(&mut self, pixel_bits: u32) -> DriverResult<()>;
    /// Returns the clock actually applied.
    fn set_pixel_clock(&mut self, mhz: u32) -> DriverResult<u32>;
    fn set_flash(&mut self, mode: FlashMode) -> DriverResult<()>;
    /// Routes frame-ready notifications to `surface`, or disables them.
    fn enable_frame_events(&mut self, surface: Option<SurfaceHandle>) -> DriverResult<()>;
    /// Returns the frame rate actually applied.
    fn set_frame_rate(&mut self, fps: f64) -> DriverResult<f64>;
    fn set_trigger(&mut self, mode: TriggerMode) -> DriverResult<()>;
    /// Returns the exposure actually applied, in milliseconds.
    fn set_exposure(&mut self, ms: f64) -> DriverResult<f64>;
    /// Starts continuous acquisition.
    fn capture_video(&mut self) -> DriverResult<()>;
    /// Acquires a single frame (fires the software trigger when armed).
    fn freeze_video(&mut self) -> DriverResult<()>;
    fn stop_video(&mut self, force: bool) -> DriverResult<()>;
    /// Copies the last completed readout into `dest`.
    fn copy_image(&mut self, dest: &mut [i16]) -> DriverResult<()>;
    fn free_buffer(&mut self) -> DriverResult<()>;
    fn exit(&mut self) -> DriverResult<()>;
}

/// A recorded driver command.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    ResetToDefaults,
    AllocateBuffer(u32, u32, u32),
    SetMonoMode(u32),
    SetPixelClock(u32),
    SetFlash(FlashMode),
    EnableFrameEvents(Option<SurfaceHandle>),
    SetFrameRate(f64),
    SetTrigger(TriggerMode),
    SetExposure(f64),
    CaptureVideo,
    FreezeVideo,
    StopVideo { force: bool },
    CopyImage,
    FreeBuffer,
    Exit,
}

impl DriverCall {
    fn name(&self) -> &'static str {
        match self {
            Self::ResetToDefaults => "reset_to_defaults",
            Self::AllocateBuffer(..) => "allocate_buffer",
            Self::SetMonoMode(_) => "set_mono_mode",
            Self::SetPixelClock(_) => "set_pixel_clock",
            Self::SetFlash(_) => "set_flash",
            Self::EnableFrameEvents(_) => "enable_frame_events",
            Self::SetFrameRate(_) => "set_frame_rate",
            Self::SetTrigger(_) => "set_trigger",
            Self::SetExposure(_) => "set_exposure",
            Self::CaptureVideo => "capture_video",
            Self::FreezeVideo => "freeze_video",
            Self::StopVideo { .. } => "stop_video",
            Self::CopyImage => "copy_image",
            Self::FreeBuffer => "free_buffer",
            Self::Exit => "exit",
        }
    }
}

/// In-memory driver that records every command.
///
/// Used for testing the triggered camera without hardware. Readouts return
/// the image set with [`MockSensorDriver::set_image`].
#[derive(Debug, Default)]
pub struct MockSensorDriver {
    calls: Vec<DriverCall>,
    image: Vec<i16>,
    fail_on: Option<&'static str>,
}

impl MockSensorDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the samples returned by the next readouts.
    pub fn set_image(&mut self, image: Vec<i16>) {
        self.image = image;
    }

    /// Makes the named command fail with status -1 from now on.
    pub fn fail_on(&mut self, command: &'static str) {
        self.fail_on = Some(command);
    }

    /// Commands issued so far.
    pub fn calls(&self) -> &[DriverCall] {
        &self.calls
    }

    /// Forgets recorded commands.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn record(&mut self, call: DriverCall) -> DriverResult<()> {
        let command = call.name();
        self.calls.push(call);
        if self.fail_on == Some(command) {
            return Err(DriverError { command, status: -1 });
        }
        Ok(())
    }
}

impl SensorDriver for MockSensorDriver {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            index: 0,
            model: "MOCK1240".to_string(),
            serial: "0000000".to_string(),
        }
    }

    fn reset_to_defaults(&mut self) -> DriverResult<()> {
        self.record(DriverCall::ResetToDefaults)
    }

    fn allocate_buffer(&mut self, width: u32, height: u32, bits_per_pixel: u32) -> DriverResult<()> {
        self.record(DriverCall::AllocateBuffer(width, height, bits_per_pixel))
    }

    fn set_mono_mode(&mut self, pixel_bits: u32) -> DriverResult<()> {
        self.record(DriverCall::SetMonoMode(pixel_bits))
    }

    fn set_pixel_clock(&mut self, mhz: u32) -> DriverResult<u32> {
        self.record(DriverCall::SetPixelClock(mhz)).map(|()| mhz)
    }

    fn set_flash(&mut self, mode: FlashMode) -> DriverResult<()> {
        self.record(DriverCall::SetFlash(mode))
    }

    fn enable_frame_events(&mut self, surface: Option<SurfaceHandle>) -> DriverResult<()> {
        self.record(DriverCall::EnableFrameEvents(surface))
    }

    fn set_frame_rate(&mut self, fps: f64) -> DriverResult<f64> {
        self.record(DriverCall::SetFrameRate(fps)).map(|()| fps)
    }

    fn set_trigger(&mut self, mode: TriggerMode) -> DriverResult<()> {
        self.record(DriverCall::SetTrigger(mode))
    }

    fn set_exposure(&mut self, ms: f64) -> DriverResult<f64> {
        self.record(DriverCall::SetExposure(ms)).map(|()| ms)
    }

    fn capture_video(&mut self) -> DriverResult<()> {
        self.record(DriverCall::CaptureVideo)
    }

    fn freeze_video(&mut self) -> DriverResult<()> {
        self.record(DriverCall::FreezeVideo)
    }

    fn stop_video(&mut self, force: bool) -> DriverResult<()> {
        self.record(DriverCall::StopVideo { force })
    }

    fn copy_image(&mut self, dest: &mut [i16]) -> DriverResult<()> {
        self.record(DriverCall::CopyImage)?;
        for (d, &s) in dest.iter_mut().zip(self.image.iter()) {
            *d = s;
        }
        Ok(())
    }

    fn free_buffer(&mut self) -> DriverResult<()> {
        self.record(DriverCall::FreeBuffer)
    }

    fn exit(&mut self) -> DriverResult<()> {
        self.record(DriverCall::Exit)
    }
}
