//! # PPM Bridge
//!
//! Drive an RC car from a racing wheel, pedals and handbrake.
//!
//! This application reads supported input devices, merges them into eight
//! RC channels and emits them as a PPM signal through the pigpio daemon.
//! A serial receiver feed is attached through the library, see
//! [`ppm_bridge::receiver`].

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use ppm_bridge::config::{Config, LoggingConfig};
use ppm_bridge::control::{ControlLoop, DeviceSource, Mixer};
use ppm_bridge::controller::channel_mapper::ChannelMapper;
use ppm_bridge::controller::device::InputDevice;
use ppm_bridge::controller::mapper::{EventMapper, InputSnapshot};
use ppm_bridge::pigpio::PigpiodClient;
use ppm_bridge::ppm::PpmScheduler;
use ppm_bridge::telemetry::ChannelRecorder;

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Prefix of the daily rolling log files
const LOG_FILE_PREFIX: &str = "ppm-bridge.log";

/// Main entry point for PPM Bridge application
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration and set up logging
///    - Connect to the pigpio daemon and drive the PPM pin low
///    - Open every supported input device
///
/// 2. **Main Loop**
///    - One reader thread per device updates its input snapshot
///    - The control loop merges all sources every `update_interval_ms`
///    - The PPM scheduler rebuilds the waveform every `frame_ms`
///
/// 3. **Graceful Shutdown**
///    - Ctrl+C stops both loops
///    - Transmission is halted and every waveform deleted
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be loaded
/// - The pigpio daemon is unreachable
/// - No supported input device is found (transmission is stopped first)
///
/// # Examples
///
/// Run the application:
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
///
/// Expected output:
/// ```text
/// INFO ppm_bridge: PPM Bridge v0.1.0 starting...
/// INFO ppm_bridge::pigpio: Connected to pigpiod at 127.0.0.1:8888
/// INFO ppm_bridge::controller::device: Found G27 Racing Wheel at: /dev/input/event3
/// INFO ppm_bridge::ppm::scheduler: Starting PPM frame loop at 20ms
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_arg = std::env::args().nth(1);
    let config = load_config(config_arg.as_deref(), DEFAULT_CONFIG_PATH)?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&config.logging)?;

    info!("PPM Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let client = PigpiodClient::connect(
        &config.pigpio.host,
        config.pigpio.port,
        config.pigpio.timeout_ms,
    )
    .await
    .context("pigpio daemon unreachable")?;

    let mut scheduler = PpmScheduler::new(client, config.ppm.settings())
        .await
        .context("Failed to initialize PPM output")?;

    let devices = match InputDevice::discover(&config.controller.device_paths) {
        Ok(devices) => devices,
        Err(e) => {
            error!("No input sources: {}", e);
            if let Err(stop_err) = scheduler.cancel().await {
                warn!("Failed to stop transmission: {}", stop_err);
            }
            return Err(e.into());
        }
    };

    let mut control = ControlLoop::new(
        scheduler.handle(),
        ChannelMapper::new(config.mixer.deadzone),
        Mixer::with_reversed(&config.mixer.invert_outputs),
        Duration::from_millis(config.mixer.update_interval_ms),
    );

    if config.telemetry.enabled {
        control = control.with_recorder(ChannelRecorder::from_config(&config.telemetry)?);
    }

    for device in devices {
        let profile = device.profile();
        let label = format!("{} ({})", profile.device_name(), device.device_path());
        let snapshot = Arc::new(InputSnapshot::new());

        device.spawn_reader(EventMapper::new(profile, Arc::clone(&snapshot)))?;
        control.add_source(Box::new(DeviceSource::new(label, profile, snapshot)));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx.clone()));
    let control_task = tokio::spawn(control.run(shutdown_rx));

    info!("Press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");

    // Receivers may already be gone if a loop ended early
    let _ = shutdown_tx.send(true);

    if let Err(e) = control_task.await? {
        warn!("Control loop ended with error: {}", e);
    }
    if let Err(e) = scheduler_task.await? {
        warn!("PPM shutdown incomplete: {}", e);
    }

    info!("PPM output stopped");
    Ok(())
}

/// Load the configuration file
///
/// An explicit path must exist. Without one, `default_path` is used if
/// present and built-in defaults otherwise.
fn load_config(path: Option<&str>, default_path: &str) -> Result<Config> {
    match path {
        Some(path) => {
            Config::load(path).with_context(|| format!("Failed to load config from {}", path))
        }
        None if Path::new(default_path).exists() => Config::load(default_path)
            .with_context(|| format!("Failed to load config from {}", default_path)),
        None => Ok(Config::default()),
    }
}

/// Initialize logging to stdout and, if configured, to a daily log file
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
