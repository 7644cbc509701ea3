//! Static exposure and inter-frame-interval tables.
//!
//! Every device carries one immutable [`ExposureTable`]. The rest of the
//! system refers to an exposure only by its index into this table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected exposure or IFI selections.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExposureError {
    #[error("exposure index {index} out of range (table has {len} entries)")]
    ExposureOutOfRange { index: usize, len: usize },
    #[error("IFI index {index} out of range (table has {len} entries)")]
    IfiOutOfRange { index: usize, len: usize },
    #[error("inter-frame interval {ifi_ms} ms does not exceed exposure {exposure_ms} ms")]
    IfiTooShort { ifi_ms: u32, exposure_ms: f64 },
}

/// One selectable exposure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureSetting {
    /// Logical exposure duration in milliseconds (all sub-frames together).
    pub duration_ms: f64,
    /// Raw sensor reads summed into one logical frame.
    pub sub_frame_count: u32,
    /// Frames averaged into the black reference during calibration.
    pub calibration_frame_count: u32,
}

impl ExposureSetting {
    /// Duration of a single raw sensor read.
    pub fn sub_frame_ms(&self) -> f64 {
        self.duration_ms / f64::from(self.sub_frame_count.max(1))
    }
}

/// Ordered, immutable table of exposures and inter-frame intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureTable {
    exposures: Vec<ExposureSetting>,
    /// IFI choices in milliseconds; entry 0 means free-running.
    ifi_ms: Vec<u32>,
    default_index: usize,
}

const STANDARD_DURATIONS_MS: [f64; 17] = [
    20.0, 28.0, 40.0, 57.0, 80.0, 100.0, 140.0, 200.0, 280.0, 400.0, 570.0, 800.0, 1000.0,
    1400.0, 2000.0, 2800.0, 4000.0,
];
const STANDARD_CAL_FRAMES: [u32; 17] = [20, 28, 10, 10, 10, 10, 10, 10, 10, 5, 5, 5, 4, 2, 2, 1, 1];
const STANDARD_SUB_FRAMES: [u32; 17] = [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2];
// 100 ms triggering crashed the acquisition host; 200 ms is the shortest safe period.
const STANDARD_IFI_MS: [u32; 9] = [0, 200, 500, 1000, 2000, 5000, 10000, 20000, 60000];

impl ExposureTable {
    /// Builds a table, checking that it is usable.
    ///
    /// `ifi_ms[0]` must be 0 (free-running) and every exposure needs at
    /// least one sub-frame and one calibration frame.
    pub fn new(
        exposures: Vec<ExposureSetting>,
        ifi_ms: Vec<u32>,
        default_index: usize,
    ) -> Result<Self, ExposureError> {
        if default_index >= exposures.len() {
            return Err(ExposureError::ExposureOutOfRange {
                index: default_index,
                len: exposures.len(),
            });
        }
        if ifi_ms.first() != Some(&0) {
            return Err(ExposureError::IfiOutOfRange { index: 0, len: ifi_ms.len() });
        }
        let exposures = exposures
            .into_iter()
            .map(|e| ExposureSetting {
                sub_frame_count: e.sub_frame_count.max(1),
                calibration_frame_count: e.calibration_frame_count.max(1),
                ..e
            })
            .collect();
        Ok(Self {
            exposures,
            ifi_ms,
            default_index,
        })
    }

    /// The standard 17-step table used by the supplied devices.
    pub fn standard() -> Self {
        let exposures = STANDARD_DURATIONS_MS
            .iter()
            .zip(STANDARD_SUB_FRAMES)
            .zip(STANDARD_CAL_FRAMES)
            .map(|((&duration_ms, sub_frame_count), calibration_frame_count)| ExposureSetting {
                duration_ms,
                sub_frame_count,
                calibration_frame_count,
            })
            .collect();
        Self {
            exposures,
            ifi_ms: STANDARD_IFI_MS.to_vec(),
            default_index: 5,
        }
    }

    /// Number of exposure settings.
    pub fn len(&self) -> usize {
        self.exposures.len()
    }

    /// Returns true if the table has no exposures.
    pub fn is_empty(&self) -> bool {
        self.exposures.is_empty()
    }

    /// Exposure at `index`.
    pub fn get(&self, index: usize) -> Result<&ExposureSetting, ExposureError> {
        self.exposures
            .get(index)
            .ok_or(ExposureError::ExposureOutOfRange {
                index,
                len: self.exposures.len(),
            })
    }

    /// All exposures in order.
    pub fn exposures(&self) -> &[ExposureSetting] {
        &self.exposures
    }

    /// IFI choices in milliseconds.
    pub fn ifi_settings(&self) -> &[u32] {
        &self.ifi_ms
    }

    /// IFI in milliseconds at `index`.
    pub fn ifi_ms(&self, index: usize) -> Result<u32, ExposureError> {
        self.ifi_ms
            .get(index)
            .copied()
            .ok_or(ExposureError::IfiOutOfRange {
                index,
                len: self.ifi_ms.len(),
            })
    }

    /// Index selected at startup when no preference is configured.
    pub fn default_index(&self) -> usize {
        self.default_index
    }

    /// Index of the exposure whose duration is closest to `duration_ms`.
    pub fn closest_index(&self, duration_ms: f64) -> usize {
        self.exposures
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                (a.duration_ms - duration_ms)
                    .abs()
                    .total_cmp(&(b.duration_ms - duration_ms).abs())
            })
            .map(|(i, _)| i)
            .unwrap_or(self.default_index)
    }

    /// Checks that `ifi_index` may be used with `exposure_index`.
    ///
    /// Index 0 (free-running) is always valid; any other interval must be
    /// strictly longer than the exposure.
    pub fn validate_ifi(&self, exposure_index: usize, ifi_index: usize) -> Result<(), ExposureError> {
        let exposure = self.get(exposure_index)?;
        let ifi_ms = self.ifi_ms(ifi_index)?;
        if ifi_index != 0 && f64::from(ifi_ms) <= exposure.duration_ms {
            return Err(ExposureError::IfiTooShort {
                ifi_ms,
                exposure_ms: exposure.duration_ms,
            });
        }
        Ok(())
    }

    /// Returns `ifi_index` if valid, otherwise the shortest valid triggered
    /// interval, or 0 (free-running) when none qualifies.
    pub fn resolve_ifi(&self, exposure_index: usize, ifi_index: usize) -> Result<usize, ExposureError> {
        match self.validate_ifi(exposure_index, ifi_index) {
            Ok(()) => Ok(ifi_index),
            Err(ExposureError::IfiTooShort { .. }) => {
                let exposure_ms = self.get(exposure_index)?.duration_ms;
                Ok(self
                    .ifi_ms
                    .iter()
                    .enumerate()
                    .skip(1)
                    .find(|(_, &ms)| f64::from(ms) > exposure_ms)
                    .map(|(i, _)| i)
                    .unwrap_or(0))
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for ExposureTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_shape() {
        let table = ExposureTable::standard();
        assert_eq!(table.len(), 17);
        assert_eq!(table.ifi_settings()[0], 0);
        assert_eq!(table.get(5).unwrap().duration_ms, 100.0);
        assert_eq!(table.get(16).unwrap().sub_frame_count, 2);
        assert_eq!(table.get(16).unwrap().sub_frame_ms(), 2000.0);
    }

    #[test]
    fn test_closest_index() {
        let table = ExposureTable::standard();
        assert_eq!(table.closest_index(100.0), 5);
        assert_eq!(table.closest_index(95.0), 5);
        assert_eq!(table.closest_index(1.0), 0);
        assert_eq!(table.closest_index(1e9), 16);
    }

    #[test]
    fn test_free_running_always_valid() {
        let table = ExposureTable::standard();
        assert!(table.validate_ifi(16, 0).is_ok());
    }

    #[test]
    fn test_ifi_must_exceed_exposure() {
        let table = ExposureTable::standard();
        // 200 ms exposure with 200 ms IFI is rejected
        assert!(matches!(
            table.validate_ifi(7, 1),
            Err(ExposureError::IfiTooShort { ifi_ms: 200, .. })
        ));
        assert!(table.validate_ifi(7, 2).is_ok());
    }

    #[test]
    fn test_resolve_clamps_to_shortest_valid() {
        let table = ExposureTable::standard();
        // 400 ms exposure: 200 invalid, 500 is the first valid interval
        assert_eq!(table.resolve_ifi(9, 1).unwrap(), 2);
        // 2800 ms exposure: first valid interval is 5000 ms
        assert_eq!(table.resolve_ifi(15, 3).unwrap(), 5);
    }

    #[test]
    fn test_resolve_falls_back_to_free_running() {
        let table = ExposureTable::new(
            vec![ExposureSetting {
                duration_ms: 5000.0,
                sub_frame_count: 1,
                calibration_frame_count: 1,
            }],
            vec![0, 200, 1000],
            0,
        )
        .unwrap();
        assert_eq!(table.resolve_ifi(0, 2).unwrap(), 0);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let table = ExposureTable::standard();
        assert!(matches!(
            table.resolve_ifi(0, 99),
            Err(ExposureError::IfiOutOfRange { .. })
        ));
        assert!(matches!(
            table.validate_ifi(99, 0),
            Err(ExposureError::ExposureOutOfRange { .. })
        ));
    }
}
