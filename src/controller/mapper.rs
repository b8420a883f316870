//! # Controller Input Mapper Module
//!
//! This module turns raw evdev events from a supported device into the
//! latest-value [`InputSnapshot`] of its profile.
//!
//! ## Snapshot Semantics
//!
//! - One cell per binding of the device profile
//! - Last value wins: a newer event overwrites an older unread one
//! - A cell that has never been written reports `None`, and readers fall
//!   back to the binding's rest value
//!
//! Each cell has exactly one writer (the device's reader thread) and any
//! number of readers (the control loop), so plain atomics are enough.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ppm_bridge::controller::device::InputDevice;
//! use ppm_bridge::controller::mapper::{EventMapper, InputSnapshot};
//!
//! let mut device = InputDevice::open("/dev/input/event3")?;
//! let snapshot = Arc::new(InputSnapshot::new());
//! let mapper = EventMapper::new(device.profile(), Arc::clone(&snapshot));
//!
//! loop {
//!     for event in device.fetch_events()? {
//!         mapper.process_event(&event);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use evdev::{AbsoluteAxisType, InputEvent, InputEventKind};
use tracing::trace;

use super::profile::{DeviceProfile, MAX_BINDINGS};

/// Latest value of one binding.
#[derive(Debug, Default)]
struct BindingCell {
    value: AtomicI32,
    seen: AtomicBool,
}

impl BindingCell {
    fn store(&self, value: i32) {
        self.value.store(value, Ordering::Relaxed);
        self.seen.store(true, Ordering::Release);
    }

    fn load(&self) -> Option<i32> {
        if self.seen.load(Ordering::Acquire) {
            Some(self.value.load(Ordering::Relaxed))
        } else {
            None
        }
    }
}

/// Latest raw value per binding of one device.
///
/// # Examples
///
/// ```
/// use ppm_bridge::controller::mapper::InputSnapshot;
///
/// let snapshot = InputSnapshot::new();
/// assert_eq!(snapshot.get(0), None);
///
/// snapshot.set(0, 4000);
/// snapshot.set(0, 4100);
/// assert_eq!(snapshot.get(0), Some(4100));
/// ```
#[derive(Debug, Default)]
pub struct InputSnapshot {
    cells: [BindingCell; MAX_BINDINGS],
}

impl InputSnapshot {
    /// Creates a snapshot with every binding unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value of a binding slot, `None` if nothing was received yet
    /// or the slot does not exist.
    #[must_use]
    pub fn get(&self, slot: usize) -> Option<i32> {
        self.cells.get(slot).and_then(BindingCell::load)
    }

    /// Overwrites a binding slot. Out-of-range slots are ignored.
    pub fn set(&self, slot: usize, value: i32) {
        if let Some(cell) = self.cells.get(slot) {
            cell.store(value);
        }
    }
}

/// Writes evdev events of one device into its [`InputSnapshot`].
///
/// Events for axes the profile does not bind, key events and sync events
/// are ignored.
#[derive(Debug, Clone)]
pub struct EventMapper {
    profile: DeviceProfile,
    snapshot: Arc<InputSnapshot>,
}

impl EventMapper {
    /// Creates an event mapper writing into `snapshot`.
    #[must_use]
    pub fn new(profile: DeviceProfile, snapshot: Arc<InputSnapshot>) -> Self {
        Self { profile, snapshot }
    }

    /// Processes a single evdev input event.
    ///
    /// Returns `true` if the event updated a binding.
    pub fn process_event(&self, event: &InputEvent) -> bool {
        match event.kind() {
            InputEventKind::AbsAxis(axis) => self.process_axis_event(axis, event.value()),
            _ => false,
        }
    }

    fn process_axis_event(&self, axis: AbsoluteAxisType, value: i32) -> bool {
        match self.profile.slot_for_axis(axis) {
            Some(slot) => {
                self.snapshot.set(slot, value);
                true
            }
            None => {
                trace!("Ignoring unbound axis {:?} = {}", axis, value);
                false
            }
        }
    }
}
