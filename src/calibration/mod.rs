//! Dark-field (black) calibration.
//!
//! Every exposure setting has its own black reference, the fixed offset the
//! sensor reports with no light. Live frames are corrected by subtracting
//! the reference for the active exposure. References are acquired by a run
//! of the [`CalibrationEngine`] that walks the whole exposure table.

mod engine;
mod reference;
mod statistics;
mod store;
mod threshold;

pub use engine::{
    CalibrationCommand, CalibrationEngine, CalibrationError, CalibrationProgress,
    CalibrationReport,
};
pub use reference::{black_correct, BlackReferenceSet};
pub use statistics::{compute_mean, compute_rms_drift, ReferenceStatistics};
pub use store::{CalibrationIoError, ReferenceStore};
pub use threshold::{DriftThresholds, DriftViolation};
