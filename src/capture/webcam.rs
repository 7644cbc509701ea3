//! Generic video-capture source.
//!
//! Any 8-bit capture device can stand in for a scientific sensor: each
//! timer tick reads one image, averages its colour channels and places it
//! on a sensor-sized canvas together with a 180-degree rotated copy.

use super::{
    tick_interval, CameraDevice, CameraError, DeviceEvent, DeviceInfo, DeviceProfile, Frame,
    FrameSink, SampleMode, SensorConfig, SubFrameAccumulator, SurfaceHandle,
};
use std::time::Duration;

/// A grayscale image read from a video source.
#[derive(Debug, Clone)]
pub struct GrayImage {
    pub width: u32,
    pub height: u32,
    /// Row-major channel-averaged samples.
    pub pixels: Vec<u16>,
}

/// Frame source behind a [`VideoCaptureCamera`].
pub trait VideoSource: Send {
    fn describe(&self) -> DeviceInfo;
    fn open(&mut self) -> Result<(), CameraError>;
    /// Requests a capture rate; sources may ignore it.
    fn set_frame_rate(&mut self, fps: f64) -> Result<(), CameraError>;
    fn read(&mut self) -> Result<GrayImage, CameraError>;
    fn close(&mut self) -> Result<(), CameraError>;
}

/// Places `image` top-left on a sensor-sized canvas filled at mid-scale,
/// with the rotated image in the bottom-right corner.
pub fn embed_on_canvas(image: &GrayImage, sensor: &SensorConfig) -> Frame {
    let maxval = sensor.pixel_maxval();
    let fill = (maxval / 2) as i16;
    let mut frame = Frame::filled(sensor.width, sensor.height, fill);

    let w = image.width.min(sensor.width) as usize;
    let h = image.height.min(sensor.height) as usize;
    let src_w = image.width as usize;
    let dst_w = sensor.width as usize;
    let dst_h = sensor.height as usize;
    let sample = |x: usize, y: usize| -> i16 {
        let v = image.pixels.get(y * src_w + x).copied().unwrap_or(0);
        i32::from(v).min(maxval) as i16
    };

    let pixels = frame.pixels_mut();
    for y in 0..h {
        for x in 0..w {
            pixels[y * dst_w + x] = sample(x, y);
        }
    }
    // Rotated copy: the last source pixel lands in the first corner slot.
    for y in 0..h {
        for x in 0..w {
            let dy = dst_h - h + y;
            let dx = dst_w - w + x;
            pixels[dy * dst_w + dx] = sample(image.width as usize - 1 - x, image.height as usize - 1 - y);
        }
    }
    frame
}

/// Camera backed by a [`VideoSource`].
pub struct VideoCaptureCamera<S: VideoSource> {
    source: S,
    info: DeviceInfo,
    profile: DeviceProfile,
    connected: bool,
    mode: SampleMode,
    exposure_index: usize,
    ifi_index: usize,
    accumulator: SubFrameAccumulator,
    sink: Option<FrameSink>,
}

impl<S: VideoSource> VideoCaptureCamera<S> {
    pub fn new(source: S, profile: DeviceProfile) -> Self {
        let sensor = profile.sensor;
        Self {
            info: source.describe(),
            source,
            connected: false,
            mode: SampleMode::Off,
            exposure_index: profile.table.default_index(),
            ifi_index: 0,
            accumulator: SubFrameAccumulator::new(sensor.width, sensor.height, sensor.pixel_maxval()),
            sink: None,
            profile,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: VideoSource> CameraDevice for VideoCaptureCamera<S> {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    fn connect(&mut self, _surface: SurfaceHandle) -> Result<(), CameraError> {
        self.source.open()?;
        self.connected = true;
        tracing::info!(device = %self.info, "Video source connected");
        Ok(())
    }

    fn set_exposure(&mut self, exposure_index: usize, ifi_index: usize) -> Result<(), CameraError> {
        let setting = *self.profile.table.get(exposure_index)?;
        let interval = tick_interval(&self.profile.table, exposure_index, ifi_index)?;
        self.exposure_index = exposure_index;
        self.ifi_index = ifi_index;
        if self.connected {
            self.source.set_frame_rate(1.0 / interval.as_secs_f64())?;
        }
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
        if self.connected {
            self.connected = false;
            self.source.close()?;
        }
        Ok(())
    }

    fn handle_event(&mut self, event: DeviceEvent) -> Result<(), CameraError> {
        if self.mode == SampleMode::Off || event != DeviceEvent::TimerTick {
            return Ok(());
        }
        let image = self.source.read()?;
        let raw = embed_on_canvas(&image, &self.profile.sensor);
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

    fn set_calibration_active(&mut self, _active: bool) -> Result<(), CameraError> {
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

/// Webcam source using the platform's native capture backend.
#[cfg(feature = "camera")]
pub mod native {
    use super::{GrayImage, VideoSource};
    use crate::capture::{CameraError, DeviceInfo};
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
    use nokhwa::Camera;

    /// First webcam on the system.
    pub struct NativeWebcam {
        index: u32,
        camera: Option<Camera>,
    }

    impl NativeWebcam {
        pub fn new(index: u32) -> Self {
            Self { index, camera: None }
        }

        fn camera(&mut self) -> Result<&mut Camera, CameraError> {
            self.camera.as_mut().ok_or(CameraError::NotConnected)
        }
    }

    fn source_error(e: nokhwa::NokhwaError) -> CameraError {
        CameraError::Source(e.to_string())
    }

    impl VideoSource for NativeWebcam {
        fn describe(&self) -> DeviceInfo {
            DeviceInfo {
                index: self.index,
                model: "web".to_string(),
                serial: "S/N".to_string(),
            }
        }

        fn open(&mut self) -> Result<(), CameraError> {
            let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            let mut camera = Camera::new(CameraIndex::Index(self.index), format).map_err(source_error)?;
            camera.open_stream().map_err(source_error)?;
            self.camera = Some(camera);
            Ok(())
        }

        fn set_frame_rate(&mut self, fps: f64) -> Result<(), CameraError> {
            let fps = fps.round().max(1.0) as u32;
            // Not every backend supports rate changes; the timer paces delivery anyway.
            if let Err(e) = self.camera()?.set_frame_rate(fps) {
                tracing::debug!(error = %e, fps, "Webcam ignored frame rate request");
            }
            Ok(())
        }

        fn read(&mut self) -> Result<GrayImage, CameraError> {
            let buffer = self.camera()?.frame().map_err(source_error)?;
            let rgb = buffer.decode_image::<RgbFormat>().map_err(source_error)?;
            let (width, height) = rgb.dimensions();
            let pixels = rgb
                .pixels()
                .map(|p| (u16::from(p[0]) + u16::from(p[1]) + u16::from(p[2])) / 3)
                .collect();
            Ok(GrayImage {
                width,
                height,
                pixels,
            })
        }

        fn close(&mut self) -> Result<(), CameraError> {
            if let Some(mut camera) = self.camera.take() {
                camera.stop_stream().map_err(source_error)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ExposureTable;
    use std::sync::{Arc, Mutex};

    struct FakeSource {
        image: GrayImage,
        rates: Vec<f64>,
        open: bool,
    }

    impl VideoSource for FakeSource {
        fn describe(&self) -> DeviceInfo {
            DeviceInfo {
                index: 0,
                model: "fake".to_string(),
                serial: "1".to_string(),
            }
        }

        fn open(&mut self) -> Result<(), CameraError> {
            self.open = true;
            Ok(())
        }

        fn set_frame_rate(&mut self, fps: f64) -> Result<(), CameraError> {
            self.rates.push(fps);
            Ok(())
        }

        fn read(&mut self) -> Result<GrayImage, CameraError> {
            Ok(self.image.clone())
        }

        fn close(&mut self) -> Result<(), CameraError> {
            self.open = false;
            Ok(())
        }
    }

    fn image_2x2() -> GrayImage {
        GrayImage {
            width: 2,
            height: 2,
            pixels: vec![1, 2, 3, 4],
        }
    }

    #[test]
    fn test_embed_places_rotated_copy() {
        let sensor = SensorConfig {
            width: 4,
            height: 3,
            pixel_bits: 8,
        };
        let frame = embed_on_canvas(&image_2x2(), &sensor);

        assert_eq!(
            frame.pixels(),
            &[
                1, 2, 127, 127, //
                3, 4, 4, 3, //
                127, 127, 2, 1,
            ]
        );
    }

    #[test]
    fn test_embed_clips_oversized_source() {
        let sensor = SensorConfig {
            width: 1,
            height: 1,
            pixel_bits: 8,
        };
        let image = GrayImage {
            width: 2,
            height: 1,
            pixels: vec![300, 7],
        };
        let frame = embed_on_canvas(&image, &sensor);
        // Rotated copy overwrites the single pixel with the last source sample
        assert_eq!(frame.pixels(), &[7]);
    }

    #[test]
    fn test_tick_reads_source() {
        let source = FakeSource {
            image: image_2x2(),
            rates: Vec::new(),
            open: false,
        };
        let profile = DeviceProfile::new(
            SensorConfig {
                width: 4,
                height: 4,
                pixel_bits: 8,
            },
            ExposureTable::standard(),
        );
        let mut cam = VideoCaptureCamera::new(source, profile);
        cam.connect(SurfaceHandle::default()).unwrap();
        assert!(cam.source().open);

        cam.set_exposure(5, 0).unwrap();
        assert_eq!(cam.source().rates, vec![10.0]);

        let frames = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&frames);
        cam.start_sampling(Box::new(move |f| out.lock().unwrap().push(f)))
            .unwrap();
        cam.handle_event(DeviceEvent::TimerTick).unwrap();

        assert_eq!(frames.lock().unwrap().len(), 1);
        cam.release().unwrap();
        assert!(!cam.source().open);
    }
}
