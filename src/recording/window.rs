//! Sequence frame preparation: centered crop, block-sum rebinning and
//! scaling to the full 16-bit range.

use super::error::RecordingError;
use crate::capture::{Frame, RecordingConfig};

/// Crop and rebin applied to every sequence frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub width: u32,
    pub height: u32,
    /// Block-sum factor, a power of two.
    pub rebin: u32,
}

impl WindowSpec {
    pub fn new(width: u32, height: u32, rebin: u32) -> Self {
        Self {
            width,
            height,
            rebin: rebin.max(1),
        }
    }

    pub fn from_config(config: &RecordingConfig) -> Self {
        Self::new(config.window_width, config.window_height, config.rebin)
    }

    /// Dimensions after rebinning. Partial edge blocks are dropped.
    pub fn output_size(&self) -> (u32, u32) {
        (self.width / self.rebin, self.height / self.rebin)
    }

    /// Left shift taking `pixel_bits`-deep block sums to 16 bits.
    pub fn shift(&self, pixel_bits: u32) -> u32 {
        let headroom = 2 * self.rebin.trailing_zeros();
        16u32.saturating_sub(pixel_bits + headroom)
    }

    /// Checks the window fits inside a `width x height` frame.
    pub fn check_fits(&self, width: u32, height: u32) -> Result<(), RecordingError> {
        let (out_w, out_h) = self.output_size();
        if self.width > width || self.height > height || out_w == 0 || out_h == 0 {
            return Err(RecordingError::InvalidWindow {
                width: self.width,
                height: self.height,
                frame_width: width,
                frame_height: height,
            });
        }
        Ok(())
    }

    /// Crops, rebins and shifts `frame`.
    pub fn apply(&self, frame: &Frame, pixel_bits: u32) -> Result<Vec<u16>, RecordingError> {
        self.check_fits(frame.width(), frame.height())?;

        let x0 = (frame.width() - self.width) / 2;
        let y0 = (frame.height() - self.height) / 2;
        let (out_w, out_h) = self.output_size();
        let r = self.rebin;
        let shift = self.shift(pixel_bits);

        let mut out = Vec::with_capacity(out_w as usize * out_h as usize);
        for by in 0..out_h {
            for bx in 0..out_w {
                let mut sum: u32 = 0;
                for dy in 0..r {
                    let row = frame.row(y0 + by * r + dy);
                    let start = (x0 + bx * r) as usize;
                    sum += row[start..start + r as usize]
                        .iter()
                        .map(|&v| v.max(0) as u32)
                        .sum::<u32>();
                }
                out.push((sum << shift).min(u32::from(u16::MAX)) as u16);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_centered_crop() {
        #[rustfmt::skip]
        let frame = Frame::new(vec![
            1, 2, 3, 4,
            5, 6, 7, 8,
            9, 10, 11, 12,
            13, 14, 15, 16,
        ], 4, 4, 0);
        let spec = WindowSpec::new(2, 2, 1);
        // 16-bit source needs no shift
        assert_eq!(spec.apply(&frame, 16).unwrap(), vec![6, 7, 10, 11]);
    }

    #[test]
    fn test_rebin_block_sum_and_shift() {
        let frame = Frame::filled(4, 4, 1023);
        let spec = WindowSpec::new(4, 4, 2);
        assert_eq!(spec.shift(10), 4);
        // 4 * 1023 << 4
        assert_eq!(spec.apply(&frame, 10).unwrap(), vec![65472; 4]);
    }

    #[test]
    fn test_window_larger_than_frame() {
        let frame = Frame::zeros(4, 4);
        let spec = WindowSpec::new(8, 2, 1);
        assert!(matches!(
            spec.apply(&frame, 10),
            Err(RecordingError::InvalidWindow { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_full_scale_never_overflows(bits in 1u32..=14, log_r in 0u32..=1) {
            let r = 1u32 << log_r;
            prop_assume!(bits + 2 * log_r <= 16);
            let maxval = ((1i32 << bits) - 1) as i16;
            let frame = Frame::filled(4, 4, maxval);
            let spec = WindowSpec::new(4, 4, r);
            let out = spec.apply(&frame, bits).unwrap();
            let expected = (u32::from(maxval as u16) * r * r) << spec.shift(bits);
            prop_assert!(expected <= u32::from(u16::MAX));
            for v in out {
                prop_assert_eq!(u32::from(v), expected);
            }
        }
    }
}
