//! Per-exposure black references and frame correction.

use super::store::ReferenceStore;
use crate::capture::{ExposureTable, Frame, SensorConfig};

/// Subtracts `reference` from `frame`, clamping negative results to zero.
///
/// The corrected frame keeps the source sequence number and timestamp.
pub fn black_correct(frame: &Frame, reference: &Frame) -> Frame {
    let mut corrected = frame.clone();
    for (f, &b) in corrected.pixels_mut().iter_mut().zip(reference.pixels()) {
        *f = (i32::from(*f) - i32::from(b)).clamp(0, i32::from(i16::MAX)) as i16;
    }
    corrected
}

/// One black reference per exposure table entry.
#[derive(Debug, Clone)]
pub struct BlackReferenceSet {
    references: Vec<Frame>,
}

impl BlackReferenceSet {
    /// All-zero references, which leave frames unchanged.
    pub fn zeroed(sensor: &SensorConfig, count: usize) -> Self {
        Self {
            references: (0..count)
                .map(|_| Frame::zeros(sensor.width, sensor.height))
                .collect(),
        }
    }

    /// Loads references from `store`.
    ///
    /// Missing files leave a zero reference. Unreadable files are logged and
    /// also leave a zero reference.
    pub fn load(store: &ReferenceStore, table: &ExposureTable, sensor: &SensorConfig) -> Self {
        let mut set = Self::zeroed(sensor, table.len());
        let mut loaded = 0;

        for (index, setting) in table.exposures().iter().enumerate() {
            match store.load(setting.duration_ms, sensor.width, sensor.height) {
                Ok(Some(reference)) => {
                    set.references[index] = reference;
                    loaded += 1;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Ignoring unreadable black reference"),
            }
        }

        tracing::info!(
            loaded,
            total = table.len(),
            dir = %store.dir().display(),
            "Loaded black references"
        );
        set
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.references.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.references.get_mut(index)
    }

    /// Replaces the reference at `index`.
    pub fn replace(&mut self, index: usize, reference: Frame) {
        if let Some(slot) = self.references.get_mut(index) {
            *slot = reference;
        }
    }

    /// Black-corrects `frame` with the reference for `exposure_index`.
    ///
    /// Frames whose shape does not match the reference are returned
    /// unchanged.
    pub fn correct(&self, frame: &Frame, exposure_index: usize) -> Frame {
        match self.references.get(exposure_index) {
            Some(reference) if reference.same_shape(frame) => black_correct(frame, reference),
            _ => frame.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_correct_clamps_at_zero() {
        let frame = Frame::new(vec![10, 5, 0, 100], 2, 2, 7);
        let reference = Frame::new(vec![3, 8, 1, 100], 2, 2, 0);
        let corrected = black_correct(&frame, &reference);

        assert_eq!(corrected.pixels(), &[7, 0, 0, 0]);
        assert_eq!(corrected.sequence(), 7);
    }

    #[test]
    fn test_correct_keeps_delivery_time() {
        let frame = Frame::new(vec![10, 20, 30, 40], 2, 2, 3);
        let reference = Frame::filled(2, 2, 5);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let corrected = black_correct(&frame, &reference);

        assert_eq!(corrected.timestamp(), frame.timestamp());
        assert_eq!(corrected.pixels(), &[5, 15, 25, 35]);
    }

    #[test]
    fn test_zero_reference_is_identity() {
        let sensor = SensorConfig::with_dimensions(2, 2);
        let set = BlackReferenceSet::zeroed(&sensor, 3);
        let frame = Frame::new(vec![1, 2, 3, 4], 2, 2, 0);

        assert_eq!(set.correct(&frame, 1).pixels(), frame.pixels());
    }

    #[test]
    fn test_load_missing_and_corrupt_fall_back_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::new(dir.path());
        let table = ExposureTable::standard();
        let sensor = SensorConfig::with_dimensions(2, 2);

        store.save(20.0, &Frame::filled(2, 2, 9)).unwrap();
        std::fs::write(store.path_for(28.0), b"garbage").unwrap();

        let set = BlackReferenceSet::load(&store, &table, &sensor);
        assert_eq!(set.len(), table.len());
        assert_eq!(set.get(0).unwrap().pixels(), &[9, 9, 9, 9]);
        assert!(set.get(1).unwrap().pixels().iter().all(|&v| v == 0));
        assert!(set.get(2).unwrap().pixels().iter().all(|&v| v == 0));
    }

    proptest! {
        #[test]
        fn prop_corrected_is_non_negative_and_bounded(
            data in proptest::collection::vec((0i16..1024, 0i16..1024), 16)
        ) {
            let (f, b): (Vec<i16>, Vec<i16>) = data.into_iter().unzip();
            let frame = Frame::new(f.clone(), 4, 4, 0);
            let reference = Frame::new(b, 4, 4, 0);
            let corrected = black_correct(&frame, &reference);
            for (c, raw) in corrected.pixels().iter().zip(&f) {
                prop_assert!(*c >= 0);
                prop_assert!(c <= raw);
            }
        }
    }
}
