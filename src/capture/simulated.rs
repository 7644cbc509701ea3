//! Simulated sensor for testing without hardware.
//!
//! Produces Gaussian noise around mid-scale with a dark and a bright
//! rectangle so correction and contrast behaviour are visible. While a
//! calibration is active it emits a flat low-level frame instead.

use super::{
    tick_interval, CameraDevice, CameraError, DeviceEvent, DeviceInfo, DeviceProfile, Frame,
    FrameSink, SampleMode, SubFrameAccumulator, SurfaceHandle,
};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use std::time::Duration;

const NOISE_MEAN: f64 = 128.0;
const NOISE_SIGMA: f64 = 10.0;
const PATCH_OFFSET: i16 = 50;
/// Level of every sample while calibrating.
pub const CALIBRATION_LEVEL: i16 = 10;

/// Timer-driven noise source.
pub struct SimulatedCamera {
    info: DeviceInfo,
    profile: DeviceProfile,
    rng: ChaCha20Rng,
    connected: bool,
    mode: SampleMode,
    exposure_index: usize,
    ifi_index: usize,
    accumulator: SubFrameAccumulator,
    sink: Option<FrameSink>,
    calibration_active: bool,
}

impl SimulatedCamera {
    /// Creates a simulated camera seeded from OS entropy.
    pub fn new(profile: DeviceProfile) -> Self {
        Self::with_rng(profile, ChaCha20Rng::from_entropy())
    }

    /// Creates a simulated camera with a fixed seed (reproducible frames).
    pub fn seeded(profile: DeviceProfile, seed: u64) -> Self {
        Self::with_rng(profile, ChaCha20Rng::seed_from_u64(seed))
    }

    fn with_rng(profile: DeviceProfile, rng: ChaCha20Rng) -> Self {
        let sensor = profile.sensor;
        let exposure_index = profile.table.default_index();
        Self {
            info: DeviceInfo {
                index: 0,
                model: "Pseudo".to_string(),
                serial: "S/N".to_string(),
            },
            rng,
            connected: false,
            mode: SampleMode::Off,
            exposure_index,
            ifi_index: 0,
            accumulator: SubFrameAccumulator::new(sensor.width, sensor.height, sensor.pixel_maxval()),
            sink: None,
            calibration_active: false,
            profile,
        }
    }

    /// Generates one raw read.
    fn generate(&mut self) -> Frame {
        let sensor = self.profile.sensor;
        if self.calibration_active {
            return Frame::filled(sensor.width, sensor.height, CALIBRATION_LEVEL);
        }

        let maxval = f64::from(sensor.pixel_maxval());
        let mut frame = Frame::zeros(sensor.width, sensor.height);
        for v in frame.pixels_mut() {
            let z: f64 = StandardNormal.sample(&mut self.rng);
            *v = (NOISE_MEAN + NOISE_SIGMA * z).clamp(0.0, maxval) as i16;
        }

        let (w, h) = (sensor.width, sensor.height);
        offset_patch(&mut frame, (w / 12, h / 10), (w / 20, h / 17), -PATCH_OFFSET);
        offset_patch(&mut frame, (w * 7 / 12, h * 6 / 10), (w / 12, h / 12), PATCH_OFFSET);
        frame
    }
}

/// Adds `delta` to a rectangle, saturating at zero.
fn offset_patch(frame: &mut Frame, origin: (u32, u32), size: (u32, u32), delta: i16) {
    let width = frame.width() as usize;
    let x_end = (origin.0 + size.0).min(frame.width()) as usize;
    let y_end = (origin.1 + size.1).min(frame.height()) as usize;
    let pixels = frame.pixels_mut();
    for y in origin.1 as usize..y_end {
        for x in origin.0 as usize..x_end {
            let p = &mut pixels[y * width + x];
            *p = p.saturating_add(delta).max(0);
        }
    }
}

impl CameraDevice for SimulatedCamera {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    fn connect(&mut self, _surface: SurfaceHandle) -> Result<(), CameraError> {
        self.connected = true;
        tracing::info!(device = %self.info, "Simulated camera connected");
        Ok(())
    }

    fn set_exposure(&mut self, exposure_index: usize, ifi_index: usize) -> Result<(), CameraError> {
        let setting = *self.profile.table.get(exposure_index)?;
        self.profile.table.ifi_ms(ifi_index)?;
        self.exposure_index = exposure_index;
        self.ifi_index = ifi_index;
        self.accumulator.set_target(setting.sub_frame_count);
        if self.mode != SampleMode::Off {
            self.mode = if ifi_index == 0 { SampleMode::Live } else { SampleMode::Still };
        }
        Ok(())
    }

    fn start_sampling(&mut self, sink: FrameSink) -> Result<(), CameraError> {
        if !self.connected {
            return Err(CameraError::NotConnected);
        }
        self.sink = Some(sink);
        self.accumulator.reset();
        self.mode = if self.ifi_index == 0 { SampleMode::Live } else { SampleMode::Still };
        Ok(())
    }

    fn stop_sampling(&mut self) -> Result<(), CameraError> {
        self.mode = SampleMode::Off;
        Ok(())
    }

    fn release(&mut self) -> Result<(), CameraError> {
        self.mode = SampleMode::Off;
        self.sink = None;
        self.connected = false;
        Ok(())
    }

    fn handle_event(&mut self, event: DeviceEvent) -> Result<(), CameraError> {
        if self.mode == SampleMode::Off || event != DeviceEvent::TimerTick {
            return Ok(());
        }
        let raw = self.generate();
        if let Some(frame) = self.accumulator.push(raw) {
            if let Some(sink) = self.sink.as_mut() {
                sink(frame);
            }
        }
        Ok(())
    }

    fn timer_interval(&self) -> Option<Duration> {
        if self.mode == SampleMode::Off {
            return None;
        }
        tick_interval(&self.profile.table, self.exposure_index, self.ifi_index).ok()
    }

    fn set_calibration_active(&mut self, active: bool) -> Result<(), CameraError> {
        self.calibration_active = active;
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
        self.profile
            .table
            .get(self.exposure_index)
            .map(|e| e.duration_ms)
            .unwrap_or(0.0)
    }

    fn actual_frame_rate(&self) -> f64 {
        self.timer_interval()
            .map(|d| 1.0 / d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ExposureTable, SensorConfig};
    use std::sync::{Arc, Mutex};

    fn camera() -> (SimulatedCamera, Arc<Mutex<Vec<Frame>>>) {
        let profile = DeviceProfile::new(SensorConfig::with_dimensions(64, 48), ExposureTable::standard());
        let mut cam = SimulatedCamera::seeded(profile, 42);
        cam.connect(SurfaceHandle::default()).unwrap();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&frames);
        cam.start_sampling(Box::new(move |f| out.lock().unwrap().push(f)))
            .unwrap();
        (cam, frames)
    }

    #[test]
    fn test_tick_delivers_frame() {
        let (mut cam, frames) = camera();
        cam.handle_event(DeviceEvent::TimerTick).unwrap();
        cam.handle_event(DeviceEvent::TimerTick).unwrap();

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_valid());
        assert_eq!(frames[1].sequence(), 2);
        assert!(frames[0].pixels().iter().all(|&v| (0..=1023).contains(&v)));
    }

    #[test]
    fn test_seeded_frames_are_reproducible() {
        let (mut a, fa) = camera();
        let (mut b, fb) = camera();
        a.handle_event(DeviceEvent::TimerTick).unwrap();
        b.handle_event(DeviceEvent::TimerTick).unwrap();
        assert_eq!(fa.lock().unwrap()[0].pixels(), fb.lock().unwrap()[0].pixels());
    }

    #[test]
    fn test_calibration_emits_flat_frame() {
        let (mut cam, frames) = camera();
        cam.set_calibration_active(true).unwrap();
        cam.handle_event(DeviceEvent::TimerTick).unwrap();
        assert!(frames.lock().unwrap()[0]
            .pixels()
            .iter()
            .all(|&v| v == CALIBRATION_LEVEL));
    }

    #[test]
    fn test_timer_follows_exposure_and_ifi() {
        let (mut cam, _) = camera();
        cam.set_exposure(3, 0).unwrap();
        assert_eq!(cam.timer_interval(), Some(Duration::from_millis(57)));
        assert_eq!(cam.sample_mode(), SampleMode::Live);

        cam.set_exposure(3, 2).unwrap();
        assert_eq!(cam.timer_interval(), Some(Duration::from_millis(500)));
        assert_eq!(cam.sample_mode(), SampleMode::Still);

        cam.stop_sampling().unwrap();
        assert_eq!(cam.timer_interval(), None);
    }

    #[test]
    fn test_frame_ready_is_ignored() {
        let (mut cam, frames) = camera();
        cam.handle_event(DeviceEvent::FrameReady).unwrap();
        assert!(frames.lock().unwrap().is_empty());
    }
}
