//! Quality checks for newly acquired references.
//!
//! A reference that drifts far from the previous one, or whose black level
//! sits high in the dynamic range, usually means the field was not dark.

use super::statistics::ReferenceStatistics;
use serde::{Deserialize, Serialize};

/// Acceptance limits for a black reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftThresholds {
    /// Maximum RMS drift from the previous reference.
    pub max_rms_drift: f64,
    /// Maximum mean black level as a fraction of full scale.
    pub max_black_fraction: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            max_rms_drift: 8.0,
            max_black_fraction: 0.25,
        }
    }
}

impl DriftThresholds {
    /// Limits that accept any reference.
    pub fn permissive() -> Self {
        Self {
            max_rms_drift: f64::INFINITY,
            max_black_fraction: 1.0,
        }
    }

    /// Checks statistics against thresholds.
    ///
    /// The first calibration has nothing meaningful to drift from, so drift
    /// is only checked when `has_prior` is set.
    pub fn check(
        &self,
        stats: &ReferenceStatistics,
        pixel_maxval: i32,
        has_prior: bool,
    ) -> Result<(), DriftViolation> {
        let limit = self.max_black_fraction * f64::from(pixel_maxval);
        if stats.mean > limit {
            return Err(DriftViolation::BrightField {
                observed: stats.mean,
                threshold: limit,
            });
        }

        if has_prior && stats.rms_drift > self.max_rms_drift {
            return Err(DriftViolation::ExcessiveDrift {
                observed: stats.rms_drift,
                threshold: self.max_rms_drift,
            });
        }

        Ok(())
    }
}

/// Threshold violation types.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriftViolation {
    #[error("black level {observed:.1} exceeds {threshold:.1}; is the field dark?")]
    BrightField { observed: f64, threshold: f64 },

    #[error("RMS drift {observed:.2} from previous reference exceeds {threshold:.2}")]
    ExcessiveDrift { observed: f64, threshold: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(mean: f64, rms_drift: f64) -> ReferenceStatistics {
        ReferenceStatistics {
            mean,
            rms_drift,
            sample_size: 100,
        }
    }

    #[test]
    fn test_good_reference_passes() {
        let thresholds = DriftThresholds::default();
        assert!(thresholds.check(&stats(12.0, 1.5), 1023, true).is_ok());
    }

    #[test]
    fn test_bright_field_fails() {
        let thresholds = DriftThresholds::default();
        assert!(matches!(
            thresholds.check(&stats(600.0, 0.0), 1023, true),
            Err(DriftViolation::BrightField { .. })
        ));
    }

    #[test]
    fn test_drift_only_checked_with_prior() {
        let thresholds = DriftThresholds::default();
        assert!(matches!(
            thresholds.check(&stats(12.0, 30.0), 1023, true),
            Err(DriftViolation::ExcessiveDrift { .. })
        ));
        assert!(thresholds.check(&stats(12.0, 30.0), 1023, false).is_ok());
    }

    #[test]
    fn test_permissive_accepts_anything() {
        let thresholds = DriftThresholds::permissive();
        assert!(thresholds.check(&stats(1023.0, 1e6), 1023, true).is_ok());
    }
}
