//! # Input Device Module
//!
//! This module handles detection, opening and reading of supported input
//! devices through the Linux evdev interface.
//!
//! ## Device Detection
//!
//! Devices are matched by their evdev name against the profile table (see
//! [`DeviceProfile::from_name`]). Either an explicit list of device paths is
//! probed, or every `/dev/input/event*` node is scanned in sorted order.
//! Devices that cannot be opened or have no profile are skipped.
//!
//! ## Reader Threads
//!
//! evdev reads block, so every device gets its own OS thread which feeds
//! events into an [`EventMapper`]. The thread ends when the device stops
//! delivering events (e.g. it was unplugged); its snapshot then keeps the
//! last values it received.

use evdev::Device;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use super::mapper::EventMapper;
use super::profile::DeviceProfile;
use crate::error::{PpmBridgeError, Result};

/// Directory scanned for event devices
pub const INPUT_DIR: &str = "/dev/input";

/// Supported input device handle
///
/// Represents an open evdev device together with the profile that decodes
/// its events.
pub struct InputDevice {
    device: Device,
    device_path: String,
    profile: DeviceProfile,
}

impl std::fmt::Debug for InputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputDevice")
            .field("device_path", &self.device_path)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl InputDevice {
    /// Open a supported device at a known path
    ///
    /// # Errors
    ///
    /// - `Controller`: the device cannot be opened or has no profile
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ppm_bridge::controller::device::InputDevice;
    ///
    /// let device = InputDevice::open("/dev/input/event3")?;
    /// println!("{:?} at {}", device.profile(), device.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let device = Device::open(path).map_err(|e| {
            PpmBridgeError::Controller(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let name = device.name().unwrap_or_default().to_string();
        let profile = DeviceProfile::from_name(&name).ok_or_else(|| {
            PpmBridgeError::Controller(format!(
                "Unsupported device '{}' at {}",
                name,
                path.display()
            ))
        })?;

        let device_path = path.to_string_lossy().to_string();
        info!("Found {} at: {}", name, device_path);

        Ok(Self {
            device,
            device_path,
            profile,
        })
    }

    /// Open every supported device
    ///
    /// Probes `paths` when given, otherwise scans [`INPUT_DIR`]. Devices
    /// that fail to open or are not supported are skipped.
    ///
    /// # Errors
    ///
    /// - `Controller`: the input directory cannot be read
    /// - `ControllerNotFound`: no supported device was found
    pub fn discover(paths: &[String]) -> Result<Vec<Self>> {
        let candidates = if paths.is_empty() {
            scan_event_paths(Path::new(INPUT_DIR))?
        } else {
            paths.iter().map(PathBuf::from).collect()
        };

        let mut devices = Vec::new();
        for path in candidates {
            match Self::open(&path) {
                Ok(device) => devices.push(device),
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }

        if devices.is_empty() {
            return Err(PpmBridgeError::ControllerNotFound);
        }

        Ok(devices)
    }

    /// Get the device path of this device
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Profile used to decode this device's events
    pub fn profile(&self) -> DeviceProfile {
        self.profile
    }

    /// Get device name from evdev
    pub fn name(&self) -> Option<&str> {
        self.device.name()
    }

    /// Fetch events from the device
    ///
    /// This call blocks until at least one event is available.
    ///
    /// # Errors
    ///
    /// Returns `Controller` error if fetching events fails (e.g., device disconnected).
    pub fn fetch_events(&mut self) -> Result<impl Iterator<Item = evdev::InputEvent> + '_> {
        self.device
            .fetch_events()
            .map_err(|e| PpmBridgeError::Controller(format!("Failed to fetch events: {}", e)))
    }

    /// Read events on a dedicated thread until the device fails
    ///
    /// # Errors
    ///
    /// Returns `Io` error if the thread cannot be spawned.
    pub fn spawn_reader(mut self, mapper: EventMapper) -> Result<JoinHandle<()>> {
        let thread_name = format!("input-{}", self.device_path.trim_start_matches("/dev/input/"));

        let path = self.device_path.clone();

        let handle = std::thread::Builder::new().name(thread_name).spawn(move || {
            debug!("Reader started for {}", path);
            loop {
                match self.fetch_events() {
                    Ok(events) => {
                        for event in events {
                            mapper.process_event(&event);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} stopped delivering events, holding last values: {}",
                            path, e
                        );
                        break;
                    }
                }
            }
        })?;

        Ok(handle)
    }
}

/// List `event*` nodes of an input directory in sorted order
///
/// # Errors
///
/// Returns `Controller` error if the directory does not exist or cannot be read.
pub fn scan_event_paths(input_dir: &Path) -> Result<Vec<PathBuf>> {
    if !input_dir.exists() {
        return Err(PpmBridgeError::Controller(format!(
            "{} directory not found",
            input_dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(input_dir)
        .map_err(|e| {
            PpmBridgeError::Controller(format!("Failed to read {}: {}", input_dir.display(), e))
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .map_or(false, |name| name.to_string_lossy().starts_with("event"))
        })
        .collect();

    // Deterministic order when several devices are connected
    paths.sort();
    Ok(paths)
}
