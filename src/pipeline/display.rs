//! Display scaling, histogram and contrast control.

use crate::capture::Frame;
use serde::{Deserialize, Serialize};

/// Range of the raw dynamic range, in percent of full scale, mapped onto
/// the 0-255 display range.
///
/// `low` is always at least one percent below `high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityWindow {
    low: f64,
    high: f64,
}

impl Default for IntensityWindow {
    fn default() -> Self {
        Self {
            low: 0.0,
            high: 100.0,
        }
    }
}

impl IntensityWindow {
    /// Builds a window, clamping into `[0, 100]` and keeping `low <= high - 1`.
    pub fn new(low: f64, high: f64) -> Self {
        let high = high.clamp(1.0, 100.0);
        let low = low.clamp(0.0, high - 1.0);
        Self { low, high }
    }

    /// Window spanning `[min, max]` raw values.
    pub fn from_range(min: i16, max: i16, pixel_maxval: i32) -> Self {
        let maxval = f64::from(pixel_maxval.max(1));
        let low = (f64::from(min) * 100.0 / maxval).clamp(0.0, 99.0);
        let high = (f64::from(max) * 100.0 / maxval).max(low + 1.0);
        Self::new(low, high)
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    /// Moves the low edge; it stops one percent short of `high`.
    pub fn set_low(&mut self, low: f64) {
        self.low = low.clamp(0.0, self.high - 1.0);
    }

    /// Moves the high edge; it stops one percent above `low`.
    pub fn set_high(&mut self, high: f64) {
        self.high = high.clamp(self.low + 1.0, 100.0);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Rectangle in sensor pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 8-bit image ready for a display surface.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Scales a frame to 8 bits through an intensity window.
pub fn to_display(frame: &Frame, window: &IntensityWindow, pixel_maxval: i32) -> DisplayImage {
    let offset = window.low() / 100.0;
    let gain = 255.0 / ((window.high() - window.low()) / 100.0);
    let norm = 1.0 / f64::from(pixel_maxval.max(1));

    let pixels = frame
        .pixels()
        .iter()
        .map(|&v| ((f64::from(v) * norm - offset) * gain).clamp(0.0, 255.0) as u8)
        .collect();

    DisplayImage {
        width: frame.width(),
        height: frame.height(),
        pixels,
    }
}

/// Histogram of every other row and column over `[0, pixel_maxval]`,
/// normalised so the tallest bin is 1.
pub fn histogram(frame: &Frame, bins: usize, pixel_maxval: i32) -> Vec<f64> {
    let bins = bins.max(1);
    let mut counts = vec![0u64; bins];
    let maxval = f64::from(pixel_maxval.max(1));

    for y in (0..frame.height()).step_by(2) {
        for &v in frame.row(y).iter().step_by(2) {
            let v = f64::from(v);
            if !(0.0..=maxval).contains(&v) {
                continue;
            }
            // The top edge belongs to the last bin.
            let bin = ((v / maxval * bins as f64) as usize).min(bins - 1);
            counts[bin] += 1;
        }
    }

    let peak = counts.iter().copied().max().unwrap_or(0);
    if peak == 0 {
        return vec![0.0; bins];
    }
    counts
        .into_iter()
        .map(|c| c as f64 / peak as f64)
        .collect()
}

/// Window covering the frame's full range of values.
pub fn auto_contrast(frame: &Frame, pixel_maxval: i32) -> Option<IntensityWindow> {
    frame
        .min_max()
        .map(|(min, max)| IntensityWindow::from_range(min, max, pixel_maxval))
}

/// Window covering the range of values inside `region`.
///
/// Returns `None` when the region misses the frame.
pub fn region_auto_contrast(
    frame: &Frame,
    region: &Region,
    pixel_maxval: i32,
) -> Option<IntensityWindow> {
    let x_end = region.x.saturating_add(region.width).min(frame.width());
    let y_end = region.y.saturating_add(region.height).min(frame.height());
    if region.x >= x_end || region.y >= y_end {
        return None;
    }

    let mut min = i16::MAX;
    let mut max = i16::MIN;
    for y in region.y..y_end {
        for &v in &frame.row(y)[region.x as usize..x_end as usize] {
            min = min.min(v);
            max = max.max(v);
        }
    }
    Some(IntensityWindow::from_range(min, max, pixel_maxval))
}
