//! Darkfield CLI
//!
//! Headless acquisition: runs a session against the simulated sensor or a
//! webcam, optionally calibrating black references and recording.

use clap::{Parser, ValueEnum};
use darkfield::{
    capture::{CameraDevice, DeviceProfile, ExposureTable, FileConfig, SimulatedCamera},
    metrics::MetricsRegistry,
    session::{ControlCommand, DisplayUpdate, Session},
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CameraKind {
    /// Noise generator, no hardware needed
    Simulated,
    /// First system webcam (requires the `camera` feature)
    Webcam,
}

#[derive(Parser)]
#[command(name = "darkfield")]
#[command(about = "Camera acquisition with dark-field calibration", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame source
    #[arg(long, value_enum, default_value = "simulated")]
    camera: CameraKind,

    /// Stop after this many live frames (runs until Ctrl-C otherwise)
    #[arg(long)]
    frames: Option<u64>,

    /// Acquire black references for every exposure before going live
    #[arg(long)]
    calibrate: bool,

    /// Record a 16-bit TIFF sequence
    #[arg(long)]
    record_sequence: bool,

    /// Record an 8-bit video
    #[arg(long)]
    record_video: bool,

    /// Capture a still of the last frame before exiting
    #[arg(long)]
    capture: bool,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Darkfield v{}", darkfield::VERSION);

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    let profile = DeviceProfile::new(config.sensor, ExposureTable::standard());
    let device = open_device(cli.camera, profile)?;

    let display = |update: DisplayUpdate| match update {
        DisplayUpdate::Frame(frame) => {
            tracing::debug!(sequence = frame.sequence, "{}", frame.status);
        }
        DisplayUpdate::CalibrationProgress {
            status,
            completed,
            total,
        } => info!(completed, total, "{}", status),
        DisplayUpdate::CalibrationFinished { cancelled, reports } => {
            for report in reports.iter().filter(|r| r.drift_exceeded()) {
                warn!(exposure_ms = report.duration_ms, "Reference flagged");
            }
            info!(cancelled, exposures = reports.len(), "Calibration finished");
        }
        DisplayUpdate::Status(message) => info!("{}", message),
    };
    let mut session = Session::new(device, &config, Box::new(display))?;

    let registry = MetricsRegistry::new()?;
    #[cfg(feature = "metrics")]
    {
        use darkfield::metrics::{MetricsServer, MetricsServerConfig};
        if config.metrics.port != 0 {
            let server = MetricsServer::new(
                MetricsServerConfig::with_port(config.metrics.port),
                registry.clone(),
            );
            server.spawn();
        }
    }
    #[cfg(not(feature = "metrics"))]
    {
        if config.metrics.port != 0 {
            warn!("Metrics port configured but the `metrics` feature is disabled");
        }
    }
    session = session.with_metrics(registry);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })?;

    let controller = session.controller();
    if cli.calibrate {
        controller.send(ControlCommand::StartCalibration)?;
    }
    if cli.record_sequence {
        controller.send(ControlCommand::StartSequence)?;
    }
    if cli.record_video {
        controller.send(ControlCommand::StartVideo)?;
    }

    session.start()?;
    let result = session.run(&stop, cli.frames);
    if result.is_ok() && cli.capture {
        session.apply(ControlCommand::Capture)?;
    }
    session.shutdown();
    result?;

    info!(
        frames = session.frames_delivered(),
        stills = session.stills().len(),
        "Done"
    );
    Ok(())
}

fn open_device(
    kind: CameraKind,
    profile: DeviceProfile,
) -> Result<Box<dyn CameraDevice>, Box<dyn std::error::Error>> {
    match kind {
        CameraKind::Simulated => Ok(Box::new(SimulatedCamera::new(profile))),
        #[cfg(feature = "camera")]
        CameraKind::Webcam => {
            use darkfield::capture::{webcam::native::NativeWebcam, VideoCaptureCamera};
            Ok(Box::new(VideoCaptureCamera::new(NativeWebcam::new(0), profile)))
        }
        #[cfg(not(feature = "camera"))]
        CameraKind::Webcam => Err("webcam support requires the `camera` feature".into()),
    }
}
