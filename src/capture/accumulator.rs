//! Sub-frame accumulation.
//!
//! Long exposures are synthesized by summing several raw sensor reads.
//! The accumulator collects raw reads until the count required by the
//! active exposure is reached and then emits one logical frame.

use super::Frame;

/// Collects raw sub-frames into one logical frame.
#[derive(Debug)]
pub struct SubFrameAccumulator {
    width: u32,
    height: u32,
    pixel_maxval: i32,
    /// Running sum in a wider type so intermediate values never wrap.
    sum: Vec<i32>,
    /// Raw reads collected for the current logical frame.
    cursor: u32,
    /// Reads required per logical frame.
    target: u32,
    emitted: u64,
}

impl SubFrameAccumulator {
    /// Creates an accumulator for frames of the given size.
    pub fn new(width: u32, height: u32, pixel_maxval: i32) -> Self {
        Self {
            width,
            height,
            pixel_maxval,
            sum: vec![0; (width as usize) * (height as usize)],
            cursor: 0,
            target: 1,
            emitted: 0,
        }
    }

    /// Sets the number of raw reads per logical frame and discards any
    /// partially collected set.
    pub fn set_target(&mut self, sub_frame_count: u32) {
        self.target = sub_frame_count.max(1);
        self.reset();
    }

    /// Discards any partially collected set.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Reads collected toward the next logical frame.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Reads required per logical frame.
    pub fn target(&self) -> u32 {
        self.target
    }

    /// Adds one raw read. Returns the logical frame once the set is complete.
    ///
    /// With a target of one the raw read is passed through untouched;
    /// otherwise the sum is clipped to `[0, pixel_maxval]`.
    pub fn push(&mut self, raw: Frame) -> Option<Frame> {
        debug_assert_eq!(raw.width(), self.width);
        debug_assert_eq!(raw.height(), self.height);

        if self.target == 1 {
            self.cursor = 0;
            return Some(self.emit(raw));
        }

        if self.cursor == 0 {
            for (acc, &v) in self.sum.iter_mut().zip(raw.pixels()) {
                *acc = i32::from(v);
            }
        } else {
            for (acc, &v) in self.sum.iter_mut().zip(raw.pixels()) {
                *acc += i32::from(v);
            }
        }
        self.cursor += 1;

        if self.cursor < self.target {
            return None;
        }
        self.cursor = 0;

        let maxval = self.pixel_maxval;
        let pixels = self
            .sum
            .iter()
            .map(|&s| s.clamp(0, maxval) as i16)
            .collect();
        let frame = Frame::new(pixels, self.width, self.height, 0);
        Some(self.emit(frame))
    }

    fn emit(&mut self, mut frame: Frame) -> Frame {
        self.emitted += 1;
        frame.stamp(self.emitted);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(values: &[i16]) -> Frame {
        Frame::new(values.to_vec(), 2, 2, 0)
    }

    #[test]
    fn test_single_sub_frame_passes_through() {
        let mut acc = SubFrameAccumulator::new(2, 2, 1023);
        // Out-of-range values are not clipped on the pass-through path
        let frame = acc.push(raw(&[-5, 0, 2000, 7])).unwrap();
        assert_eq!(frame.pixels(), &[-5, 0, 2000, 7]);
        assert_eq!(frame.sequence(), 1);
    }

    #[test]
    fn test_sums_and_clips() {
        let mut acc = SubFrameAccumulator::new(2, 2, 1023);
        acc.set_target(3);

        assert!(acc.push(raw(&[100, 600, -50, 0])).is_none());
        assert!(acc.push(raw(&[100, 600, 10, 0])).is_none());
        let frame = acc.push(raw(&[100, 600, 10, 1])).unwrap();

        assert_eq!(frame.pixels(), &[300, 1023, 0, 1]);
        assert_eq!(acc.cursor(), 0);
    }

    #[test]
    fn test_reset_discards_partial_set() {
        let mut acc = SubFrameAccumulator::new(2, 2, 1023);
        acc.set_target(2);

        assert!(acc.push(raw(&[500, 500, 500, 500])).is_none());
        acc.set_target(2);
        assert!(acc.push(raw(&[1, 2, 3, 4])).is_none());
        let frame = acc.push(raw(&[1, 2, 3, 4])).unwrap();

        assert_eq!(frame.pixels(), &[2, 4, 6, 8]);
    }
}
