//! Metrics collection and registry.

use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of session state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Frames delivered by the device since the session started.
    pub frames_delivered: u64,
    /// Smoothed frame rate.
    pub fps: f64,
    /// Actual exposure reported by the device.
    pub exposure_ms: f64,
    /// Whether a calibration run is active.
    pub calibration_active: bool,
    /// Exposure index being calibrated, if any.
    pub calibration_index: Option<usize>,
    /// Sequence pages written since the session started.
    pub sequence_frames: u64,
    /// Video frames written since the session started.
    pub video_frames: u64,
    /// Recordings aborted by write or open failures.
    pub recording_failures: u64,
}

/// Prometheus metrics registry for acquisition monitoring.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,

    // Acquisition
    frames_delivered: IntCounter,
    fps: Gauge,
    exposure_ms: Gauge,

    // Calibration
    calibration_active: IntGauge,
    calibration_index: IntGauge,

    // Recording
    sequence_frames: IntCounter,
    video_frames: IntCounter,
    recording_failures: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all acquisition metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_delivered = IntCounter::new(
            "darkfield_frames_delivered_total",
            "Total number of frames delivered by the camera",
        )?;
        let fps = Gauge::new("darkfield_fps", "Smoothed frame rate")?;
        let exposure_ms = Gauge::new(
            "darkfield_exposure_ms",
            "Actual exposure time reported by the camera",
        )?;

        let calibration_active = IntGauge::new(
            "darkfield_calibration_active",
            "Whether a black calibration is running (1=running, 0=idle)",
        )?;
        let calibration_index = IntGauge::new(
            "darkfield_calibration_index",
            "Exposure index being calibrated (-1 when idle)",
        )?;

        let sequence_frames = IntCounter::new(
            "darkfield_sequence_frames_total",
            "Total sequence pages written",
        )?;
        let video_frames = IntCounter::new(
            "darkfield_video_frames_total",
            "Total video frames written",
        )?;
        let recording_failures = IntCounter::new(
            "darkfield_recording_failures_total",
            "Total recordings aborted by I/O failures",
        )?;

        registry.register(Box::new(frames_delivered.clone()))?;
        registry.register(Box::new(fps.clone()))?;
        registry.register(Box::new(exposure_ms.clone()))?;
        registry.register(Box::new(calibration_active.clone()))?;
        registry.register(Box::new(calibration_index.clone()))?;
        registry.register(Box::new(sequence_frames.clone()))?;
        registry.register(Box::new(video_frames.clone()))?;
        registry.register(Box::new(recording_failures.clone()))?;

        calibration_index.set(-1);

        Ok(Self {
            registry,
            frames_delivered,
            fps,
            exposure_ms,
            calibration_active,
            calibration_index,
            sequence_frames,
            video_frames,
            recording_failures,
        })
    }

    /// Updates all metrics from a snapshot of session state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        advance(&self.frames_delivered, snapshot.frames_delivered);
        self.fps.set(snapshot.fps);
        self.exposure_ms.set(snapshot.exposure_ms);

        self.calibration_active
            .set(if snapshot.calibration_active { 1 } else { 0 });
        self.calibration_index
            .set(snapshot.calibration_index.map_or(-1, |i| i as i64));

        advance(&self.sequence_frames, snapshot.sequence_frames);
        advance(&self.video_frames, snapshot.video_frames);
        advance(&self.recording_failures, snapshot.recording_failures);
    }

    /// Whether the last snapshot had a calibration run active.
    pub fn calibration_active(&self) -> bool {
        self.calibration_active.get() != 0
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Counters only move forward, so increment by the difference.
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            frames_delivered: 10,
            fps: 9.5,
            exposure_ms: 100.0,
            calibration_active: true,
            calibration_index: Some(3),
            sequence_frames: 4,
            video_frames: 0,
            recording_failures: 1,
        };

        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("darkfield_frames_delivered_total 10"));
        assert!(output.contains("darkfield_calibration_active 1"));
        assert!(output.contains("darkfield_calibration_index 3"));
        assert!(output.contains("darkfield_sequence_frames_total 4"));
        assert!(output.contains("darkfield_recording_failures_total 1"));
    }

    #[test]
    fn test_counters_never_decrease() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&MetricsSnapshot {
            frames_delivered: 10,
            ..Default::default()
        });
        registry.update(&MetricsSnapshot {
            frames_delivered: 3,
            ..Default::default()
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("darkfield_frames_delivered_total 10"));
        assert!(output.contains("darkfield_calibration_index -1"));
    }

    #[test]
    fn test_clones_share_metrics() {
        let registry = MetricsRegistry::new().unwrap();
        let clone = registry.clone();
        registry.update(&MetricsSnapshot {
            video_frames: 7,
            ..Default::default()
        });
        assert!(clone
            .encode()
            .unwrap()
            .contains("darkfield_video_frames_total 7"));
    }
}
