//! Per-frame acquisition path.
//!
//! Every delivered frame updates the frame-rate estimate. Outside a
//! calibration run it is then black-corrected, stored as the latest frame
//! and scaled for display.

use super::display::{
    auto_contrast, histogram, region_auto_contrast, to_display, DisplayImage, IntensityWindow,
    Region,
};
use super::fps::FpsSmoother;
use crate::calibration::BlackReferenceSet;
use crate::capture::{DisplayConfig, Frame, SensorConfig};
use std::time::Instant;

/// Live display state.
#[derive(Debug, Clone)]
pub struct DisplayState {
    /// Most recent corrected frame.
    pub latest: Option<Frame>,
    /// Window applied to the live display.
    pub window: IntensityWindow,
    /// Window remembered for the inactive exposure channel.
    pub saved_window: IntensityWindow,
    pub fps: f64,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            latest: None,
            window: IntensityWindow::default(),
            saved_window: IntensityWindow::default(),
            fps: 0.0,
        }
    }
}

/// A frame after correction and display scaling.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub corrected: Frame,
    pub display: DisplayImage,
    pub histogram: Vec<f64>,
    pub fps: f64,
}

/// Status line for live sampling.
pub fn live_status(actual_exposure_ms: f64, fps: f64) -> String {
    format!("Live {} ms {:.1} FPS", actual_exposure_ms as i64, fps)
}

pub struct AcquisitionPipeline {
    sensor: SensorConfig,
    fps: FpsSmoother,
    histogram_bins: usize,
    correction_enabled: bool,
    state: DisplayState,
}

impl AcquisitionPipeline {
    pub fn new(sensor: SensorConfig, display: &DisplayConfig, correction_enabled: bool) -> Self {
        Self {
            sensor,
            fps: FpsSmoother::new(display.fps_window),
            histogram_bins: display.histogram_bins,
            correction_enabled,
            state: DisplayState::default(),
        }
    }

    pub fn state(&self) -> &DisplayState {
        &self.state
    }

    pub fn latest(&self) -> Option<&Frame> {
        self.state.latest.as_ref()
    }

    pub fn window(&self) -> IntensityWindow {
        self.state.window
    }

    pub fn set_window(&mut self, window: IntensityWindow) {
        self.state.window = window;
    }

    pub fn window_mut(&mut self) -> &mut IntensityWindow {
        &mut self.state.window
    }

    pub fn correction_enabled(&self) -> bool {
        self.correction_enabled
    }

    pub fn set_correction_enabled(&mut self, enabled: bool) {
        self.correction_enabled = enabled;
    }

    /// Swaps the live window with the one saved for the other channel.
    pub fn swap_saved_window(&mut self) {
        std::mem::swap(&mut self.state.window, &mut self.state.saved_window);
    }

    /// Records a frame arrival and returns the smoothed frame rate.
    pub fn record_arrival(&mut self, at: Instant) -> f64 {
        self.state.fps = self.fps.tick(at);
        self.state.fps
    }

    pub fn fps(&self) -> f64 {
        self.state.fps
    }

    /// Corrects, stores and scales a frame.
    ///
    /// `references` is only consulted when correction is enabled.
    pub fn process(
        &mut self,
        raw: Frame,
        references: &BlackReferenceSet,
        exposure_index: usize,
    ) -> ProcessedFrame {
        let corrected = if self.correction_enabled {
            references.correct(&raw, exposure_index)
        } else {
            raw
        };

        let maxval = self.sensor.pixel_maxval();
        let display = to_display(&corrected, &self.state.window, maxval);
        let histogram = histogram(&corrected, self.histogram_bins, maxval);
        self.state.latest = Some(corrected.clone());

        tracing::trace!(sequence = corrected.sequence(), "Processed frame");
        ProcessedFrame {
            corrected,
            display,
            histogram,
            fps: self.state.fps,
        }
    }

    /// Fits the window to the latest frame. Returns false without a frame.
    pub fn auto_contrast(&mut self) -> bool {
        let window = self
            .state
            .latest
            .as_ref()
            .and_then(|f| auto_contrast(f, self.sensor.pixel_maxval()));
        self.apply_window(window)
    }

    /// Fits the window to a region of the latest frame.
    pub fn region_auto_contrast(&mut self, region: &Region) -> bool {
        let window = self
            .state
            .latest
            .as_ref()
            .and_then(|f| region_auto_contrast(f, region, self.sensor.pixel_maxval()));
        self.apply_window(window)
    }

    fn apply_window(&mut self, window: Option<IntensityWindow>) -> bool {
        match window {
            Some(window) => {
                tracing::debug!(low = window.low(), high = window.high(), "Auto contrast");
                self.state.window = window;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pipeline() -> AcquisitionPipeline {
        AcquisitionPipeline::new(
            SensorConfig::with_dimensions(2, 2),
            &DisplayConfig::default(),
            true,
        )
    }

    fn references(value: i16) -> BlackReferenceSet {
        let mut set = BlackReferenceSet::zeroed(&SensorConfig::with_dimensions(2, 2), 2);
        set.replace(1, Frame::filled(2, 2, value));
        set
    }

    #[test]
    fn test_process_corrects_and_stores_latest() {
        let mut p = pipeline();
        let raw = Frame::new(vec![10, 20, 30, 1023], 2, 2, 4);
        let out = p.process(raw, &references(15), 1);

        assert_eq!(out.corrected.pixels(), &[0, 5, 15, 1008]);
        assert_eq!(p.latest().unwrap().pixels(), &[0, 5, 15, 1008]);
        assert_eq!(out.display.pixels.len(), 4);
        assert_eq!(out.histogram.len(), 64);
    }

    #[test]
    fn test_correction_disabled_passes_raw() {
        let mut p = pipeline();
        p.set_correction_enabled(false);
        let out = p.process(Frame::filled(2, 2, 10), &references(15), 1);
        assert_eq!(out.corrected.pixels(), &[10; 4]);
    }

    #[test]
    fn test_record_arrival_smooths() {
        let mut p = pipeline();
        let t0 = Instant::now();
        p.record_arrival(t0);
        p.record_arrival(t0 + Duration::from_millis(100));
        assert!((p.fps() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_auto_contrast_needs_frame() {
        let mut p = pipeline();
        assert!(!p.auto_contrast());

        p.process(Frame::new(vec![0, 0, 0, 1023], 2, 2, 0), &references(0), 0);
        assert!(p.auto_contrast());
        assert_eq!(p.window().high(), 100.0);
    }

    #[test]
    fn test_swap_saved_window() {
        let mut p = pipeline();
        p.set_window(IntensityWindow::new(10.0, 20.0));
        p.swap_saved_window();
        assert_eq!(p.window(), IntensityWindow::default());
        p.swap_saved_window();
        assert_eq!(p.window(), IntensityWindow::new(10.0, 20.0));
    }

    #[test]
    fn test_live_status() {
        assert_eq!(live_status(100.4, 9.96), "Live 100 ms 10.0 FPS");
    }
}
