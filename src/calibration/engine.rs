//! Black-field calibration state machine.
//!
//! The engine never talks to the camera directly. [`CalibrationEngine::start`],
//! [`CalibrationEngine::handle_frame`] and [`CalibrationEngine::cancel`]
//! return a [`CalibrationCommand`] that the owner applies to the device,
//! so a run advances only when frames arrive and nothing blocks the frame
//! path.

use super::reference::BlackReferenceSet;
use super::statistics::ReferenceStatistics;
use super::store::ReferenceStore;
use super::threshold::{DriftThresholds, DriftViolation};
use crate::capture::{ExposureTable, Frame, SensorConfig};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("calibration is already running")]
    AlreadyRunning,
}

/// Device action requested by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationCommand {
    /// Flag calibration active on the device, then select the exposure.
    Begin { exposure_index: usize, ifi_index: usize },
    /// Select the next exposure to calibrate (free-running).
    Advance { exposure_index: usize },
    /// Restore the pre-calibration selection and clear the device flag.
    Finish {
        exposure_index: usize,
        ifi_index: usize,
        cancelled: bool,
    },
}

/// Outcome for one calibrated exposure.
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    pub exposure_index: usize,
    pub duration_ms: f64,
    pub frames: u32,
    pub mean: f64,
    pub rms_drift: f64,
    pub violation: Option<DriftViolation>,
    /// Where the reference was written, if it was.
    pub saved_to: Option<PathBuf>,
}

impl CalibrationReport {
    pub fn drift_exceeded(&self) -> bool {
        self.violation.is_some()
    }
}

/// Progress of an active run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationProgress {
    /// Exposure indices completed so far.
    pub completed: usize,
    pub total: usize,
    /// Duration of the exposure being calibrated.
    pub duration_ms: f64,
}

impl CalibrationProgress {
    pub fn status(&self) -> String {
        format!("Calibrating {} ms exposure...", self.duration_ms)
    }
}

/// State of an active run.
#[derive(Debug)]
struct CalibrationRun {
    exposure_index: usize,
    frames_accumulated: u32,
    prior: Frame,
    discard_next: bool,
    sum: Vec<i32>,
    restore_exposure: usize,
    restore_ifi: usize,
}

#[derive(Debug)]
enum State {
    Idle,
    Running(CalibrationRun),
}

/// Drives a calibration run across every exposure in the table.
pub struct CalibrationEngine {
    table: Arc<ExposureTable>,
    sensor: SensorConfig,
    references: BlackReferenceSet,
    store: Option<ReferenceStore>,
    thresholds: DriftThresholds,
    state: State,
    reports: Vec<CalibrationReport>,
}

impl CalibrationEngine {
    pub fn new(table: Arc<ExposureTable>, sensor: SensorConfig, references: BlackReferenceSet) -> Self {
        Self {
            table,
            sensor,
            references,
            store: None,
            thresholds: DriftThresholds::default(),
            state: State::Idle,
            reports: Vec::new(),
        }
    }

    /// Persists every new reference to `store`.
    pub fn with_store(mut self, store: ReferenceStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_thresholds(mut self, thresholds: DriftThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    /// References for correction. Only meaningful while idle.
    pub fn references(&self) -> &BlackReferenceSet {
        &self.references
    }

    /// Reports of the current or most recent run.
    pub fn reports(&self) -> &[CalibrationReport] {
        &self.reports
    }

    pub fn progress(&self) -> Option<CalibrationProgress> {
        match &self.state {
            State::Idle => None,
            State::Running(run) => Some(CalibrationProgress {
                completed: run.exposure_index,
                total: self.table.len(),
                duration_ms: self.duration_ms(run.exposure_index),
            }),
        }
    }

    /// Black-corrects a live frame; frames pass through while running.
    pub fn correct(&self, frame: &Frame, exposure_index: usize) -> Frame {
        match self.state {
            State::Idle => self.references.correct(frame, exposure_index),
            State::Running(_) => frame.clone(),
        }
    }

    /// Starts a run, remembering the current selection for restoration.
    pub fn start(
        &mut self,
        current_exposure: usize,
        current_ifi: usize,
    ) -> Result<CalibrationCommand, CalibrationError> {
        if self.is_running() {
            return Err(CalibrationError::AlreadyRunning);
        }

        self.reports.clear();
        let run = self.enter_index(0, current_exposure, current_ifi);
        self.state = State::Running(run);

        tracing::info!(
            exposures = self.table.len(),
            restore_exposure = current_exposure,
            restore_ifi = current_ifi,
            "Black calibration started"
        );
        Ok(CalibrationCommand::Begin {
            exposure_index: 0,
            ifi_index: 0,
        })
    }

    /// Feeds a raw frame to the active run.
    ///
    /// Returns the device command due after this frame, if any.
    pub fn handle_frame(&mut self, frame: &Frame) -> Option<CalibrationCommand> {
        let State::Running(run) = &mut self.state else {
            return None;
        };

        if run.discard_next {
            run.discard_next = false;
            tracing::trace!(index = run.exposure_index, "Discarded first calibration frame");
            return None;
        }

        if frame.pixel_count() != run.sum.len() {
            tracing::warn!(
                width = frame.width(),
                height = frame.height(),
                "Ignoring calibration frame of unexpected size"
            );
            return None;
        }

        for (acc, &v) in run.sum.iter_mut().zip(frame.pixels()) {
            *acc += i32::from(v);
        }
        run.frames_accumulated += 1;

        let target = self
            .table
            .get(run.exposure_index)
            .map(|s| s.calibration_frame_count.max(1))
            .unwrap_or(1);
        if run.frames_accumulated < target {
            return None;
        }

        match std::mem::replace(&mut self.state, State::Idle) {
            State::Running(run) => Some(self.complete_index(run)),
            State::Idle => None,
        }
    }

    /// Aborts the active run.
    ///
    /// The reference being accumulated is restored from its snapshot;
    /// indices already completed keep their new values.
    pub fn cancel(&mut self) -> Option<CalibrationCommand> {
        let State::Running(run) = std::mem::replace(&mut self.state, State::Idle) else {
            return None;
        };

        self.references.replace(run.exposure_index, run.prior);
        tracing::info!(
            interrupted_index = run.exposure_index,
            "Black calibration cancelled"
        );
        Some(CalibrationCommand::Finish {
            exposure_index: run.restore_exposure,
            ifi_index: run.restore_ifi,
            cancelled: true,
        })
    }

    fn duration_ms(&self, index: usize) -> f64 {
        self.table.get(index).map(|s| s.duration_ms).unwrap_or(0.0)
    }

    /// Snapshots and zeroes the reference at `index`.
    fn enter_index(&mut self, index: usize, restore_exposure: usize, restore_ifi: usize) -> CalibrationRun {
        let prior = self
            .references
            .get(index)
            .cloned()
            .unwrap_or_else(|| Frame::zeros(self.sensor.width, self.sensor.height));
        if let Some(reference) = self.references.get_mut(index) {
            reference.clear();
        }

        CalibrationRun {
            exposure_index: index,
            frames_accumulated: 0,
            prior,
            discard_next: true,
            sum: vec![0; self.sensor.pixel_count()],
            restore_exposure,
            restore_ifi,
        }
    }

    /// Averages the finished index and moves on to the next one.
    fn complete_index(&mut self, run: CalibrationRun) -> CalibrationCommand {
        let index = run.exposure_index;
        let duration_ms = self.duration_ms(index);
        let count = run.frames_accumulated as i32;
        let mean: Vec<i16> = run.sum.iter().map(|&s| (s / count) as i16).collect();
        let reference = Frame::new(mean, self.sensor.width, self.sensor.height, 0);

        let stats = ReferenceStatistics::analyze(&reference, &run.prior);
        let has_prior = run.prior.pixels().iter().any(|&v| v != 0);
        let violation = self
            .thresholds
            .check(&stats, self.sensor.pixel_maxval(), has_prior)
            .err();

        tracing::info!(
            exposure_ms = duration_ms,
            "Black mean {:.1}, RMS error from previous {:.1}",
            stats.mean,
            stats.rms_drift
        );
        if let Some(v) = &violation {
            tracing::warn!(exposure_ms = duration_ms, "{}", v);
        }

        let saved_to = self.store.as_ref().and_then(|store| {
            store
                .save(duration_ms, &reference)
                .map_err(|e| tracing::warn!(error = %e, "Skipping black reference persistence"))
                .ok()
        });

        self.references.replace(index, reference);
        self.reports.push(CalibrationReport {
            exposure_index: index,
            duration_ms,
            frames: run.frames_accumulated,
            mean: stats.mean,
            rms_drift: stats.rms_drift,
            violation,
            saved_to,
        });

        let next = index + 1;
        if next >= self.table.len() {
            tracing::info!(exposures = self.reports.len(), "Black calibration finished");
            return CalibrationCommand::Finish {
                exposure_index: run.restore_exposure,
                ifi_index: run.restore_ifi,
                cancelled: false,
            };
        }

        let next_run = self.enter_index(next, run.restore_exposure, run.restore_ifi);
        self.state = State::Running(next_run);
        CalibrationCommand::Advance {
            exposure_index: next,
        }
    }
}
