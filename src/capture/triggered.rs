//! Hardware-triggered scientific sensor.
//!
//! Frames arrive as frame-ready notifications from the driver. In live
//! mode the sensor free-runs; in still mode each exposure is started by a
//! software trigger fired from the device timer at the selected IFI.

use super::driver::{FlashMode, SensorDriver, TriggerMode};
use super::{
    CameraDevice, CameraError, DeviceEvent, DeviceInfo, DeviceProfile, Frame, FrameSink, LedMode,
    SampleMode, SubFrameAccumulator, SurfaceHandle,
};
use std::time::Duration;

/// Pixel clock giving frame periods up to ~1.27 s on the supported sensors.
const DEFAULT_PIXEL_CLOCK_MHZ: u32 = 24;
/// Upper bound on the free-running frame rate.
const DEFAULT_MAX_FPS: f64 = 15.0;
/// Bits per pixel of the readout buffer.
const BUFFER_BITS_PER_PIXEL: u32 = 16;

/// Camera backed by a [`SensorDriver`].
pub struct TriggeredCamera<D: SensorDriver> {
    driver: D,
    info: DeviceInfo,
    profile: DeviceProfile,
    max_fps: f64,
    pixel_clock_mhz: u32,
    connected: bool,
    mode: SampleMode,
    exposure_index: usize,
    ifi_index: usize,
    actual_exposure_ms: f64,
    actual_frame_rate: f64,
    accumulator: SubFrameAccumulator,
    readout: Vec<i16>,
    sink: Option<FrameSink>,
    calibration_active: bool,
}

impl<D: SensorDriver> TriggeredCamera<D> {
    pub fn new(driver: D, profile: DeviceProfile) -> Self {
        let sensor = profile.sensor;
        let exposure_index = profile.table.default_index();
        Self {
            info: driver.info(),
            driver,
            max_fps: DEFAULT_MAX_FPS,
            pixel_clock_mhz: DEFAULT_PIXEL_CLOCK_MHZ,
            connected: false,
            mode: SampleMode::Off,
            exposure_index,
            ifi_index: 0,
            actual_exposure_ms: 0.0,
            actual_frame_rate: 1.0,
            accumulator: SubFrameAccumulator::new(sensor.width, sensor.height, sensor.pixel_maxval()),
            readout: vec![0; sensor.pixel_count()],
            sink: None,
            calibration_active: false,
            profile,
        }
    }

    /// Overrides the free-running frame-rate ceiling.
    pub fn with_max_fps(mut self, max_fps: f64) -> Self {
        self.max_fps = max_fps;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    fn free_run_fps(&self, sub_frame_ms: f64) -> f64 {
        (1000.0 / sub_frame_ms).min(self.max_fps)
    }

    fn ensure_connected(&self) -> Result<(), CameraError> {
        if self.connected {
            Ok(())
        } else {
            Err(CameraError::NotConnected)
        }
    }

    /// Starts acquisition in the mode implied by the current IFI.
    fn resume(&mut self) -> Result<(), CameraError> {
        if self.ifi_index == 0 {
            self.mode = SampleMode::Live;
            self.driver.capture_video()?;
        } else {
            self.mode = SampleMode::Still;
            self.driver.freeze_video()?;
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<(), CameraError> {
        self.driver.copy_image(&mut self.readout)?;
        let sensor = self.profile.sensor;
        let raw = Frame::new(self.readout.clone(), sensor.width, sensor.height, 0);
        if let Some(frame) = self.accumulator.push(raw) {
            if let Some(sink) = self.sink.as_mut() {
                sink(frame);
            }
        }
        Ok(())
    }
}

impl<D: SensorDriver> CameraDevice for TriggeredCamera<D> {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    fn connect(&mut self, surface: SurfaceHandle) -> Result<(), CameraError> {
        let sensor = self.profile.sensor;
        self.driver.reset_to_defaults()?;
        self.driver
            .allocate_buffer(sensor.width, sensor.height, BUFFER_BITS_PER_PIXEL)?;
        self.driver.set_mono_mode(sensor.pixel_bits)?;
        let clock = self.driver.set_pixel_clock(self.pixel_clock_mhz)?;
        self.driver.set_flash(FlashMode::ActiveHigh)?;
        self.driver.enable_frame_events(Some(surface))?;
        self.connected = true;
        tracing::info!(device = %self.info, pixel_clock_mhz = clock, "Triggered camera connected");
        Ok(())
    }

    fn set_exposure(&mut self, exposure_index: usize, ifi_index: usize) -> Result<(), CameraError> {
        self.ensure_connected()?;
        let setting = *self.profile.table.get(exposure_index)?;
        let ifi_ms = self.profile.table.ifi_ms(ifi_index)?;

        let sampling = self.mode != SampleMode::Off;
        if sampling {
            self.driver.stop_video(false)?;
        }

        self.exposure_index = exposure_index;
        self.ifi_index = ifi_index;
        let sub_ms = setting.sub_frame_ms();

        if ifi_index == 0 {
            self.actual_frame_rate = self.driver.set_frame_rate(self.free_run_fps(sub_ms))?;
            self.driver.set_trigger(TriggerMode::Off)?;
        } else {
            self.driver.set_trigger(TriggerMode::Software)?;
            self.actual_frame_rate = 1000.0 / f64::from(ifi_ms);
        }
        let sensor_ms = self.driver.set_exposure(sub_ms)?;
        self.actual_exposure_ms = sensor_ms * f64::from(setting.sub_frame_count);

        self.accumulator.set_target(setting.sub_frame_count);
        if sampling {
            self.resume()?;
        }

        tracing::debug!(
            exposure_ms = self.actual_exposure_ms,
            ifi_ms,
            fps = self.actual_frame_rate,
            mode = ?self.mode,
            "Exposure programmed"
        );
        Ok(())
    }

    fn start_sampling(&mut self, sink: FrameSink) -> Result<(), CameraError> {
        self.ensure_connected()?;
        self.sink = Some(sink);
        self.accumulator.reset();
        self.resume()?;
        tracing::info!(mode = ?self.mode, "Sampling started");
        Ok(())
    }

    fn stop_sampling(&mut self) -> Result<(), CameraError> {
        self.ensure_connected()?;
        self.driver.stop_video(true)?;
        self.driver.set_flash(FlashMode::Off)?;
        self.mode = SampleMode::Off;
        tracing::info!("Sampling stopped");
        Ok(())
    }

    fn release(&mut self) -> Result<(), CameraError> {
        if !self.connected {
            return Ok(());
        }
        self.mode = SampleMode::Off;
        self.sink = None;
        self.driver.enable_frame_events(None)?;
        self.driver.free_buffer()?;
        self.driver.exit()?;
        self.connected = false;
        tracing::info!(device = %self.info, "Triggered camera released");
        Ok(())
    }

    fn handle_event(&mut self, event: DeviceEvent) -> Result<(), CameraError> {
        // Notifications still trickle in while the device shuts down.
        if self.mode == SampleMode::Off {
            return Ok(());
        }
        match event {
            DeviceEvent::FrameReady => self.read_frame(),
            DeviceEvent::TimerTick if self.mode == SampleMode::Still => {
                self.driver.freeze_video()?;
                Ok(())
            }
            DeviceEvent::TimerTick => Ok(()),
        }
    }

    fn timer_interval(&self) -> Option<Duration> {
        if self.mode != SampleMode::Still {
            return None;
        }
        self.profile
            .table
            .ifi_ms(self.ifi_index)
            .ok()
            .map(|ms| Duration::from_millis(u64::from(ms)))
    }

    fn set_calibration_active(&mut self, active: bool) -> Result<(), CameraError> {
        self.calibration_active = active;
        if self.connected {
            let mode = if active { LedMode::Off } else { LedMode::Auto };
            self.set_trigger_led(mode)?;
        }
        Ok(())
    }

    fn set_trigger_led(&mut self, mode: LedMode) -> Result<(), CameraError> {
        self.ensure_connected()?;
        match mode {
            LedMode::On => self.driver.set_flash(FlashMode::On)?,
            LedMode::Off => self.driver.set_flash(FlashMode::Off)?,
            LedMode::Auto => {
                // The flash polarity can only be changed with the trigger disarmed.
                let triggered = self.ifi_index != 0;
                if triggered {
                    self.driver.set_trigger(TriggerMode::Off)?;
                }
                self.driver.set_flash(FlashMode::ActiveHigh)?;
                if triggered {
                    self.driver.set_trigger(TriggerMode::Software)?;
                }
            }
        }
        Ok(())
    }

    fn sample_mode(&self) -> SampleMode {
        self.mode
    }

    fn exposure_index(&self) -> usize {
        self.exposure_index
    }

    fn ifi_index(&self) -> usize {
        self.ifi_index
    }

    fn actual_exposure_ms(&self) -> f64 {
        self.actual_exposure_ms
    }

    fn actual_frame_rate(&self) -> f64 {
        self.actual_frame_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::driver::{DriverCall, MockSensorDriver};
    use crate::capture::{ExposureTable, SensorConfig};
    use std::sync::{Arc, Mutex};

    fn camera() -> TriggeredCamera<MockSensorDriver> {
        let profile = DeviceProfile::new(SensorConfig::with_dimensions(4, 2), ExposureTable::standard());
        let mut cam = TriggeredCamera::new(MockSensorDriver::new(), profile);
        cam.connect(SurfaceHandle(7)).unwrap();
        cam.driver_mut().clear_calls();
        cam
    }

    fn collecting_sink() -> (FrameSink, Arc<Mutex<Vec<Frame>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&frames);
        (Box::new(move |f| out.lock().unwrap().push(f)), frames)
    }

    #[test]
    fn test_connect_sequence() {
        let profile = DeviceProfile::new(SensorConfig::with_dimensions(4, 2), ExposureTable::standard());
        let mut cam = TriggeredCamera::new(MockSensorDriver::new(), profile);
        cam.connect(SurfaceHandle(7)).unwrap();

        assert_eq!(
            cam.driver().calls(),
            &[
                DriverCall::ResetToDefaults,
                DriverCall::AllocateBuffer(4, 2, 16),
                DriverCall::SetMonoMode(10),
                DriverCall::SetPixelClock(24),
                DriverCall::SetFlash(FlashMode::ActiveHigh),
                DriverCall::EnableFrameEvents(Some(SurfaceHandle(7))),
            ]
        );
    }

    #[test]
    fn test_commands_require_connect() {
        let profile = DeviceProfile::new(SensorConfig::with_dimensions(4, 2), ExposureTable::standard());
        let mut cam = TriggeredCamera::new(MockSensorDriver::new(), profile);
        assert!(matches!(cam.set_exposure(0, 0), Err(CameraError::NotConnected)));
    }

    #[test]
    fn test_free_running_exposure_while_live() {
        let mut cam = camera();
        let (sink, _) = collecting_sink();
        cam.start_sampling(sink).unwrap();
        cam.driver_mut().clear_calls();

        cam.set_exposure(7, 0).unwrap();

        assert_eq!(
            cam.driver().calls(),
            &[
                DriverCall::StopVideo { force: false },
                DriverCall::SetFrameRate(5.0),
                DriverCall::SetTrigger(TriggerMode::Off),
                DriverCall::SetExposure(200.0),
                DriverCall::CaptureVideo,
            ]
        );
        assert_eq!(cam.sample_mode(), SampleMode::Live);
        assert_eq!(cam.actual_frame_rate(), 5.0);
        assert_eq!(cam.timer_interval(), None);
    }

    #[test]
    fn test_triggered_exposure_switches_to_still() {
        let mut cam = camera();
        let (sink, _) = collecting_sink();
        cam.start_sampling(sink).unwrap();
        cam.driver_mut().clear_calls();

        cam.set_exposure(5, 3).unwrap();

        assert_eq!(
            cam.driver().calls(),
            &[
                DriverCall::StopVideo { force: false },
                DriverCall::SetTrigger(TriggerMode::Software),
                DriverCall::SetExposure(100.0),
                DriverCall::FreezeVideo,
            ]
        );
        assert_eq!(cam.sample_mode(), SampleMode::Still);
        assert_eq!(cam.actual_frame_rate(), 1.0);
        assert_eq!(cam.timer_interval(), Some(Duration::from_millis(1000)));

        cam.driver_mut().clear_calls();
        cam.handle_event(DeviceEvent::TimerTick).unwrap();
        assert_eq!(cam.driver().calls(), &[DriverCall::FreezeVideo]);
    }

    #[test]
    fn test_exposure_while_off_does_not_start() {
        let mut cam = camera();
        cam.set_exposure(2, 0).unwrap();
        assert_eq!(cam.sample_mode(), SampleMode::Off);
        assert!(!cam.driver().calls().contains(&DriverCall::CaptureVideo));
    }

    #[test]
    fn test_sub_frames_are_accumulated() {
        let mut cam = camera();
        let (sink, frames) = collecting_sink();
        cam.set_exposure(16, 0).unwrap();
        assert_eq!(cam.actual_exposure_ms(), 4000.0);
        cam.start_sampling(sink).unwrap();

        cam.driver_mut().set_image(vec![600; 8]);
        cam.handle_event(DeviceEvent::FrameReady).unwrap();
        assert!(frames.lock().unwrap().is_empty());

        cam.handle_event(DeviceEvent::FrameReady).unwrap();
        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].pixels().iter().all(|&v| v == 1023));
    }

    #[test]
    fn test_exposure_change_resets_partial_set() {
        let mut cam = camera();
        let (sink, frames) = collecting_sink();
        cam.set_exposure(16, 0).unwrap();
        cam.start_sampling(sink).unwrap();
        cam.driver_mut().set_image(vec![1; 8]);

        cam.handle_event(DeviceEvent::FrameReady).unwrap();
        cam.set_exposure(15, 0).unwrap();
        cam.handle_event(DeviceEvent::FrameReady).unwrap();
        assert!(frames.lock().unwrap().is_empty());

        cam.handle_event(DeviceEvent::FrameReady).unwrap();
        assert_eq!(frames.lock().unwrap()[0].pixels(), &[2; 8]);
    }

    #[test]
    fn test_events_ignored_when_off() {
        let mut cam = camera();
        cam.handle_event(DeviceEvent::FrameReady).unwrap();
        assert!(cam.driver().calls().is_empty());
    }

    #[test]
    fn test_stop_sampling_forces_stop_and_flash_off() {
        let mut cam = camera();
        let (sink, _) = collecting_sink();
        cam.start_sampling(sink).unwrap();
        cam.driver_mut().clear_calls();

        cam.stop_sampling().unwrap();
        assert_eq!(
            cam.driver().calls(),
            &[
                DriverCall::StopVideo { force: true },
                DriverCall::SetFlash(FlashMode::Off),
            ]
        );
        assert_eq!(cam.sample_mode(), SampleMode::Off);
    }

    #[test]
    fn test_auto_led_rearms_trigger() {
        let mut cam = camera();
        cam.set_exposure(5, 3).unwrap();
        cam.driver_mut().clear_calls();

        cam.set_trigger_led(LedMode::Auto).unwrap();
        assert_eq!(
            cam.driver().calls(),
            &[
                DriverCall::SetTrigger(TriggerMode::Off),
                DriverCall::SetFlash(FlashMode::ActiveHigh),
                DriverCall::SetTrigger(TriggerMode::Software),
            ]
        );
    }

    #[test]
    fn test_calibration_forces_flash_off() {
        let mut cam = camera();
        cam.set_calibration_active(true).unwrap();
        assert_eq!(cam.driver().calls(), &[DriverCall::SetFlash(FlashMode::Off)]);
    }

    #[test]
    fn test_command_failure_is_surfaced() {
        let mut cam = camera();
        cam.driver_mut().fail_on("set_exposure");
        let err = cam.set_exposure(3, 0).unwrap_err();
        assert!(matches!(
            err,
            CameraError::CommandFailed {
                command: "set_exposure",
                status: -1
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_release_sequence() {
        let mut cam = camera();
        cam.release().unwrap();
        assert_eq!(
            cam.driver().calls(),
            &[
                DriverCall::EnableFrameEvents(None),
                DriverCall::FreeBuffer,
                DriverCall::Exit,
            ]
        );
        // Second release is a no-op
        cam.release().unwrap();
        assert_eq!(cam.driver().calls().len(), 3);
    }
}
