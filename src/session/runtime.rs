//! Serialized acquisition session.
//!
//! A [`Session`] owns the device and every component that consumes its
//! frames. Device events, frames and control commands are all handled on
//! the thread that drives the session, one at a time. Devices hand frames
//! to an internal channel; the session drains it right after each device
//! event, so a control command never observes a half-delivered frame.

use super::control::{ControlCommand, Controller, ExposureChannel, ExposureChannels};
use crate::calibration::{
    BlackReferenceSet, CalibrationCommand, CalibrationEngine, CalibrationError,
    CalibrationReport, DriftThresholds, ReferenceStore,
};
use crate::capture::{
    CameraDevice, CameraError, ConfigError, DeviceEvent, ExposureError, ExposureTable,
    FileConfig, Frame, SensorConfig, SurfaceHandle,
};
use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use crate::pipeline::{live_status, AcquisitionPipeline, DisplayImage, IntensityWindow};
use crate::recording::{Recorder, RecordingError, RecordingKind, StillCapture};
use chrono::Local;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest sleep between checks of the stop flag and the control queue.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Errors surfaced by a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("exposure error: {0}")]
    Exposure(#[from] ExposureError),

    #[error("calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("exposure cannot be changed while calibrating")]
    CalibrationActive,

    #[error("session is closed")]
    Closed,
}

impl SessionError {
    /// True when the session has been torn down.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Camera(e) => e.is_fatal(),
            Self::Closed => true,
            _ => false,
        }
    }
}

/// A live frame ready for presentation.
#[derive(Debug, Clone)]
pub struct FrameUpdate {
    /// Black-corrected frame.
    pub frame: Frame,
    pub image: DisplayImage,
    pub histogram: Vec<f64>,
    pub status: String,
    pub fps: f64,
    pub window: IntensityWindow,
    pub sequence: u64,
}

/// Everything the session pushes to the user interface.
#[derive(Debug, Clone)]
pub enum DisplayUpdate {
    Frame(FrameUpdate),
    CalibrationProgress {
        status: String,
        completed: usize,
        total: usize,
    },
    CalibrationFinished {
        cancelled: bool,
        reports: Vec<CalibrationReport>,
    },
    Status(String),
}

/// Receiver of display updates.
pub trait DisplaySink: Send {
    fn update(&mut self, update: DisplayUpdate);
}

impl<F> DisplaySink for F
where
    F: FnMut(DisplayUpdate) + Send,
{
    fn update(&mut self, update: DisplayUpdate) {
        self(update)
    }
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn update(&mut self, _update: DisplayUpdate) {}
}

/// Owner of the device and the frame consumers.
pub struct Session {
    device: Box<dyn CameraDevice>,
    table: Arc<ExposureTable>,
    sensor: SensorConfig,
    frames_tx: Sender<Frame>,
    frames_rx: Receiver<Frame>,
    control_tx: Sender<ControlCommand>,
    control_rx: Receiver<ControlCommand>,
    calibration: CalibrationEngine,
    pipeline: AcquisitionPipeline,
    recorder: Recorder,
    stills: StillCapture,
    channels: ExposureChannels,
    display: Box<dyn DisplaySink>,
    metrics: Option<MetricsRegistry>,
    frames_delivered: u64,
    frames_processed: u64,
    sequence_frames: u64,
    video_frames: u64,
    recording_failures: u64,
    started: bool,
    closed: bool,
}

impl Session {
    /// Builds a session around `device`.
    ///
    /// Sensor geometry and the exposure table come from the device profile;
    /// everything else from `config`.
    pub fn new(
        device: Box<dyn CameraDevice>,
        config: &FileConfig,
        display: Box<dyn DisplaySink>,
    ) -> Result<Self, SessionError> {
        let profile = device.profile().clone();
        let sensor = profile.sensor;
        let table = profile.table;
        sensor.validate()?;
        config.recording.validate(&sensor)?;

        let cal = &config.calibration;
        let store = ReferenceStore::new(&cal.dir);
        let references = if cal.auto_load {
            BlackReferenceSet::load(&store, &table, &sensor)
        } else {
            BlackReferenceSet::zeroed(&sensor, table.len())
        };
        let mut calibration = CalibrationEngine::new(Arc::clone(&table), sensor, references)
            .with_thresholds(DriftThresholds {
                max_rms_drift: cal.max_rms_drift,
                max_black_fraction: cal.max_black_fraction,
            });
        if cal.auto_save {
            calibration = calibration.with_store(store);
        }

        let channels = ExposureChannels::new(
            table.closest_index(config.exposure.initial_primary_ms),
            table.closest_index(config.exposure.initial_secondary_ms),
        );
        let (frames_tx, frames_rx) = crossbeam_channel::unbounded();
        let (control_tx, control_rx) = crossbeam_channel::unbounded();

        tracing::info!(
            device = %device.info(),
            width = sensor.width,
            height = sensor.height,
            exposures = table.len(),
            "Session created"
        );

        Ok(Self {
            pipeline: AcquisitionPipeline::new(sensor, &config.display, cal.enabled),
            recorder: Recorder::new(&config.recording, sensor)?,
            stills: StillCapture::new(&config.capture, &sensor, Local::now()),
            device,
            table,
            sensor,
            frames_tx,
            frames_rx,
            control_tx,
            control_rx,
            calibration,
            channels,
            display,
            metrics: None,
            frames_delivered: 0,
            frames_processed: 0,
            sequence_frames: 0,
            video_frames: 0,
            recording_failures: 0,
            started: false,
            closed: false,
        })
    }

    /// Publishes session state to `registry` after every frame.
    pub fn with_metrics(mut self, registry: MetricsRegistry) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Handle for queueing commands from other threads.
    pub fn controller(&self) -> Controller {
        Controller::new(self.control_tx.clone())
    }

    /// Connects the device, programs the active channel and starts sampling.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let connected = self.device.connect(SurfaceHandle::default());
        self.guard(connected)?;

        let selection = self.channels.active_selection();
        let ifi_index = self
            .table
            .resolve_ifi(selection.exposure_index, selection.ifi_index)?;
        let programmed = self.device.set_exposure(selection.exposure_index, ifi_index);
        self.guard(programmed)?;

        let tx = self.frames_tx.clone();
        let sampling = self.device.start_sampling(Box::new(move |frame| {
            let _ = tx.send(frame);
        }));
        self.guard(sampling)?;
        self.started = true;

        tracing::info!(
            exposure_ms = self.device.actual_exposure_ms(),
            mode = ?self.device.sample_mode(),
            "Sampling started"
        );
        Ok(())
    }

    /// Forwards a platform event to the device and handles resulting frames.
    pub fn handle_device_event(&mut self, event: DeviceEvent) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let handled = self.device.handle_event(event);
        self.guard(handled)?;
        while let Ok(frame) = self.frames_rx.try_recv() {
            self.on_frame(frame)?;
        }
        Ok(())
    }

    /// Applies every queued command.
    ///
    /// Returns `Ok(false)` once shutdown has been requested. Rejected
    /// commands are reported to the display and do not stop processing.
    pub fn process_commands(&mut self) -> Result<bool, SessionError> {
        while let Ok(command) = self.control_rx.try_recv() {
            if command == ControlCommand::Shutdown {
                return Ok(false);
            }
            match self.apply(command) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Command rejected");
                    self.display.update(DisplayUpdate::Status(e.to_string()));
                }
            }
        }
        Ok(!self.closed)
    }

    /// Applies one command immediately.
    pub fn apply(&mut self, command: ControlCommand) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        tracing::debug!(?command, "Applying command");
        match command {
            ControlCommand::SelectExposure {
                channel,
                exposure_index,
            } => {
                self.ensure_idle()?;
                let selection = self
                    .channels
                    .set_exposure(&self.table, channel, exposure_index)?;
                self.program(selection.exposure_index, selection.ifi_index)?;
            }
            ControlCommand::SelectIfi { channel, ifi_index } => {
                self.ensure_idle()?;
                let selection = self.channels.set_ifi(&self.table, channel, ifi_index)?;
                if channel == self.channels.active() {
                    self.program(selection.exposure_index, selection.ifi_index)?;
                }
            }
            ControlCommand::ToggleChannel => {
                self.ensure_idle()?;
                let selection = self.channels.toggle();
                self.pipeline.swap_saved_window();
                self.program(selection.exposure_index, selection.ifi_index)?;
            }
            ControlCommand::SetLed(mode) => {
                let result = self.device.set_trigger_led(mode);
                self.guard(result)?;
            }
            ControlCommand::StartCalibration => {
                let command = self
                    .calibration
                    .start(self.device.exposure_index(), self.device.ifi_index())?;
                self.apply_calibration(command)?;
                self.report_progress();
            }
            ControlCommand::CancelCalibration => {
                if let Some(command) = self.calibration.cancel() {
                    self.apply_calibration(command)?;
                }
            }
            ControlCommand::StartSequence => {
                let path = self
                    .recorder
                    .start_sequence()
                    .inspect_err(|_| self.recording_failures += 1)?;
                tracing::info!(path = %path.display(), "Sequence recording started");
                self.status(format!("Recording sequence to {}", path.display()));
            }
            ControlCommand::StopSequence => {
                if let Some(frames) = self.recorder.stop_sequence()? {
                    self.status(format!("Sequence closed after {frames} frames"));
                }
            }
            ControlCommand::StartVideo => {
                // No arrivals measured yet; use the rate the device was programmed for
                let fps = match self.pipeline.fps() {
                    fps if fps > 0.0 => fps,
                    _ => self.device.actual_frame_rate(),
                };
                let path = self
                    .recorder
                    .start_video(fps)
                    .inspect_err(|_| self.recording_failures += 1)?;
                tracing::info!(path = %path.display(), fps, "Video recording started");
                self.status(format!("Recording video to {}", path.display()));
            }
            ControlCommand::StopVideo => {
                if let Some(frames) = self.recorder.stop_video()? {
                    self.status(format!("Video closed after {frames} frames"));
                }
            }
            ControlCommand::Capture => match self.pipeline.latest() {
                Some(frame) => {
                    let still = self.stills.capture(frame, self.pipeline.window());
                    let title = still.title(still.number);
                    self.display.update(DisplayUpdate::Status(format!("Captured {title}")));
                }
                None => self.status("No frame to capture".to_string()),
            },
            ControlCommand::SetWindowLow(low) => self.pipeline.window_mut().set_low(low),
            ControlCommand::SetWindowHigh(high) => self.pipeline.window_mut().set_high(high),
            ControlCommand::ResetWindow => self.pipeline.window_mut().reset(),
            ControlCommand::AutoContrast => {
                if !self.pipeline.auto_contrast() {
                    self.status("No frame for auto contrast".to_string());
                }
            }
            ControlCommand::RegionAutoContrast(region) => {
                if !self.pipeline.region_auto_contrast(&region) {
                    self.status("Region is empty or no frame available".to_string());
                }
            }
            ControlCommand::SetCorrection(enabled) => {
                self.pipeline.set_correction_enabled(enabled);
                tracing::info!(enabled, "Black correction toggled");
            }
            ControlCommand::Shutdown => self.shutdown(),
        }
        Ok(())
    }

    /// Drives a timer-based device until `stop` is set, shutdown is
    /// requested or `max_frames` live frames have been processed.
    ///
    /// A frame limit never interrupts a calibration run. Sampling keeps
    /// going after a normal return; call [`Session::shutdown`] (or drop the
    /// session) when done.
    pub fn run(&mut self, stop: &AtomicBool, max_frames: Option<u64>) -> Result<(), SessionError> {
        if !self.started {
            self.start()?;
        }
        let mut next_tick = Instant::now();
        loop {
            if stop.load(Ordering::SeqCst) {
                tracing::info!("Stop requested");
                return Ok(());
            }
            if !self.process_commands()? {
                return Ok(());
            }
            if max_frames.is_some_and(|n| self.frames_processed >= n)
                && !self.calibration.is_running()
            {
                return Ok(());
            }

            let Some(interval) = self.device.timer_interval() else {
                std::thread::sleep(IDLE_POLL);
                continue;
            };
            let now = Instant::now();
            if now < next_tick {
                std::thread::sleep((next_tick - now).min(IDLE_POLL));
                continue;
            }
            next_tick = now + interval;
            self.handle_device_event(DeviceEvent::TimerTick)?;
        }
    }

    /// Stops recordings and sampling and releases the device.
    ///
    /// Safe to call more than once; failures are logged.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.calibration.cancel().is_some() {
            tracing::warn!("Calibration interrupted by shutdown");
        }
        self.recorder.stop_all();
        if let Err(e) = self.device.stop_sampling() {
            tracing::error!(error = %e, "Failed to stop sampling");
        }
        if let Err(e) = self.device.release() {
            tracing::error!(error = %e, "Failed to release camera");
        }
        tracing::info!(
            frames_delivered = self.frames_delivered,
            stills = self.stills.len(),
            "Session closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn device(&self) -> &dyn CameraDevice {
        self.device.as_ref()
    }

    pub fn sensor(&self) -> &SensorConfig {
        &self.sensor
    }

    pub fn calibration(&self) -> &CalibrationEngine {
        &self.calibration
    }

    pub fn pipeline(&self) -> &AcquisitionPipeline {
        &self.pipeline
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn stills(&self) -> &StillCapture {
        &self.stills
    }

    pub fn channels(&self) -> &ExposureChannels {
        &self.channels
    }

    pub fn active_channel(&self) -> ExposureChannel {
        self.channels.active()
    }

    /// Frames delivered by the device, including calibration frames.
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered
    }

    /// Live frames that went through correction and display.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Current session state for the metrics exporter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_delivered: self.frames_delivered,
            fps: self.pipeline.fps(),
            exposure_ms: self.device.actual_exposure_ms(),
            calibration_active: self.calibration.is_running(),
            calibration_index: self.calibration.progress().map(|p| p.completed),
            sequence_frames: self.sequence_frames,
            video_frames: self.video_frames,
            recording_failures: self.recording_failures,
        }
    }

    fn on_frame(&mut self, frame: Frame) -> Result<(), SessionError> {
        self.frames_delivered += 1;
        let fps = self.pipeline.record_arrival(frame.timestamp());

        if self.calibration.is_running() {
            if let Some(command) = self.calibration.handle_frame(&frame) {
                self.apply_calibration(command)?;
            }
            self.report_progress();
            self.publish_metrics();
            return Ok(());
        }

        self.frames_processed += 1;
        let exposure_index = self.device.exposure_index();
        let exposure_ms = self.device.actual_exposure_ms();
        let processed = self
            .pipeline
            .process(frame, self.calibration.references(), exposure_index);

        let outcome = self
            .recorder
            .record(&processed.corrected, &processed.display, exposure_ms);
        for kind in outcome.written {
            match kind {
                RecordingKind::Sequence => self.sequence_frames += 1,
                RecordingKind::Video => self.video_frames += 1,
            }
        }
        for (kind, e) in outcome.aborted {
            self.recording_failures += 1;
            tracing::error!(%kind, error = %e, "Recording aborted");
            self.status(format!("{kind} recording stopped: {e}"));
        }

        self.display.update(DisplayUpdate::Frame(FrameUpdate {
            sequence: processed.corrected.sequence(),
            frame: processed.corrected,
            image: processed.display,
            histogram: processed.histogram,
            status: live_status(exposure_ms, fps),
            fps,
            window: self.pipeline.window(),
        }));
        self.publish_metrics();
        Ok(())
    }

    fn apply_calibration(&mut self, command: CalibrationCommand) -> Result<(), SessionError> {
        match command {
            CalibrationCommand::Begin {
                exposure_index,
                ifi_index,
            } => {
                let flagged = self.device.set_calibration_active(true);
                self.guard(flagged)?;
                self.program(exposure_index, ifi_index)?;
            }
            CalibrationCommand::Advance { exposure_index } => {
                self.program(exposure_index, 0)?;
            }
            CalibrationCommand::Finish {
                exposure_index,
                ifi_index,
                cancelled,
            } => {
                self.program(exposure_index, ifi_index)?;
                let cleared = self.device.set_calibration_active(false);
                self.guard(cleared)?;
                let reports = self.calibration.reports().to_vec();
                let flagged = reports.iter().filter(|r| r.drift_exceeded()).count();
                if flagged > 0 {
                    tracing::warn!(flagged, "Calibration finished with drift warnings");
                }
                self.display
                    .update(DisplayUpdate::CalibrationFinished { cancelled, reports });
            }
        }
        Ok(())
    }

    fn program(&mut self, exposure_index: usize, ifi_index: usize) -> Result<(), SessionError> {
        let result = self.device.set_exposure(exposure_index, ifi_index);
        self.guard(result)?;
        tracing::debug!(
            exposure_index,
            ifi_index,
            exposure_ms = self.device.actual_exposure_ms(),
            "Exposure programmed"
        );
        Ok(())
    }

    /// Tears the session down when a device failure is fatal.
    fn guard<T>(&mut self, result: Result<T, CameraError>) -> Result<T, SessionError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(error = %e, "Device failure, closing session");
                    self.shutdown();
                }
                Err(e.into())
            }
        }
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.calibration.is_running() {
            return Err(SessionError::CalibrationActive);
        }
        Ok(())
    }

    fn report_progress(&mut self) {
        if let Some(progress) = self.calibration.progress() {
            self.display.update(DisplayUpdate::CalibrationProgress {
                status: progress.status(),
                completed: progress.completed,
                total: progress.total,
            });
        }
    }

    fn status(&mut self, message: String) {
        self.display.update(DisplayUpdate::Status(message));
    }

    fn publish_metrics(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.update(&self.snapshot());
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
