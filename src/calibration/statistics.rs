//! Statistics reported for each newly acquired black reference.

use crate::capture::Frame;

/// Summary of one reference compared with the one it replaces.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceStatistics {
    /// Mean black level.
    pub mean: f64,
    /// RMS of `prior - new` about its mean (population standard deviation).
    pub rms_drift: f64,
    /// Number of samples analyzed.
    pub sample_size: usize,
}

impl ReferenceStatistics {
    /// Compares a new reference against the prior one.
    pub fn analyze(reference: &Frame, prior: &Frame) -> Self {
        Self {
            mean: compute_mean(reference.pixels()),
            rms_drift: compute_rms_drift(prior.pixels(), reference.pixels()),
            sample_size: reference.pixel_count(),
        }
    }
}

/// Arithmetic mean of the samples.
pub fn compute_mean(data: &[i16]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let sum: i64 = data.iter().map(|&v| i64::from(v)).sum();
    sum as f64 / data.len() as f64
}

/// Standard deviation of the elementwise difference `prior - new`.
///
/// A uniform offset between the two references does not count as drift;
/// only changes in the fixed pattern do.
pub fn compute_rms_drift(prior: &[i16], new: &[i16]) -> f64 {
    let n = prior.len().min(new.len());
    if n == 0 {
        return 0.0;
    }
    let diff = || {
        prior
            .iter()
            .zip(new)
            .map(|(&p, &q)| f64::from(i32::from(p) - i32::from(q)))
    };
    let mean = diff().sum::<f64>() / n as f64;
    let variance = diff().map(|d| (d - mean).powi(2)).sum::<f64>() / n as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        assert_eq!(compute_mean(&[1, 2, 3, 6]), 3.0);
        assert_eq!(compute_mean(&[]), 0.0);
    }

    #[test]
    fn test_uniform_offset_is_not_drift() {
        let prior = [10, 20, 30, 40];
        let new = [15, 25, 35, 45];
        assert_eq!(compute_rms_drift(&prior, &new), 0.0);
    }

    #[test]
    fn test_pattern_change_is_drift() {
        let prior = [0, 0, 0, 0];
        let new = [2, -2, 2, -2];
        assert!((compute_rms_drift(&prior, &new) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_analyze() {
        let prior = Frame::zeros(2, 2);
        let reference = Frame::new(vec![4, 4, 8, 8], 2, 2, 0);
        let stats = ReferenceStatistics::analyze(&reference, &prior);

        assert_eq!(stats.mean, 6.0);
        assert_eq!(stats.rms_drift, 2.0);
        assert_eq!(stats.sample_size, 4);
    }
}
