//! Frame type representing one logical sensor exposure.

use std::time::Instant;

/// A single logical frame delivered by a camera device.
///
/// Samples are signed 16-bit intensities stored row-major. A frame is
/// produced after any sub-frame accumulation inside the device, so one
/// `Frame` always corresponds to one exposure setting.
#[derive(Clone)]
pub struct Frame {
    /// Row-major intensity samples.
    pixels: Vec<i16>,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    /// Delivery timestamp.
    timestamp: Instant,
    /// Monotonic sequence number assigned by the device.
    sequence: u64,
}

impl Frame {
    /// Creates a new frame with the given parameters.
    pub fn new(pixels: Vec<i16>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            pixels,
            width,
            height,
            timestamp: Instant::now(),
            sequence,
        }
    }

    /// Creates an all-zero frame.
    pub fn zeros(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0)
    }

    /// Creates a frame with every sample set to `value`.
    pub fn filled(width: u32, height: u32, value: i16) -> Self {
        let count = (width as usize) * (height as usize);
        Self::new(vec![value; count], width, height, 0)
    }

    /// Returns a reference to the samples.
    #[inline]
    pub fn pixels(&self) -> &[i16] {
        &self.pixels
    }

    /// Returns a mutable reference to the samples.
    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [i16] {
        &mut self.pixels
    }

    /// Consumes the frame, returning its samples.
    pub fn into_pixels(self) -> Vec<i16> {
        self.pixels
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the delivery timestamp.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Sets the sequence number and timestamp, as done when the device emits it.
    pub(crate) fn stamp(&mut self, sequence: u64) {
        self.sequence = sequence;
        self.timestamp = Instant::now();
    }

    /// Returns the total number of pixels (width * height).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Returns the sample at column `x`, row `y`.
    pub fn get(&self, x: u32, y: u32) -> Option<i16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get((y as usize) * (self.width as usize) + x as usize)
            .copied()
    }

    /// Returns one row of samples.
    pub fn row(&self, y: u32) -> &[i16] {
        let w = self.width as usize;
        let start = (y as usize) * w;
        &self.pixels[start..start + w]
    }

    /// Returns true when both frames have identical dimensions.
    pub fn same_shape(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Sets every sample to zero.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Validates that the pixel buffer size matches dimensions.
    pub fn is_valid(&self) -> bool {
        self.pixels.len() == self.pixel_count()
    }

    /// Returns the smallest and largest sample, or `None` for an empty frame.
    pub fn min_max(&self) -> Option<(i16, i16)> {
        let mut iter = self.pixels.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("samples", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(vec![0i16; 64 * 48], 64, 48, 1);

        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.sequence(), 1);
        assert!(frame.is_valid());
    }

    #[test]
    fn test_frame_invalid_size() {
        let frame = Frame::new(vec![0i16; 100], 64, 48, 1);
        assert!(!frame.is_valid());
    }

    #[test]
    fn test_get_is_row_major() {
        let pixels: Vec<i16> = (0..12).collect();
        let frame = Frame::new(pixels, 4, 3, 0);

        assert_eq!(frame.get(1, 0), Some(1));
        assert_eq!(frame.get(0, 2), Some(8));
        assert_eq!(frame.get(4, 0), None);
        assert_eq!(frame.row(1), &[4, 5, 6, 7]);
    }

    #[test]
    fn test_min_max() {
        let frame = Frame::new(vec![5, -2, 9, 3], 2, 2, 0);
        assert_eq!(frame.min_max(), Some((-2, 9)));
        assert_eq!(Frame::zeros(0, 0).min_max(), None);
    }
}
