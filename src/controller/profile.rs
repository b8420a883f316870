//! # Device Profiles
//!
//! Static description of each supported input device: which evdev axes it
//! reports, their raw ranges, rest positions and inversion.
//!
//! ## Supported Devices
//!
//! | Device name | Profile | Bindings |
//! |-------------|---------|----------|
//! | G27 Racing Wheel | [`DeviceProfile::Wheel`] | steer (ABS_X), gas (ABS_Z), brake (ABS_RZ) |
//! | Arduino LLC Arduino Micro | [`DeviceProfile::Handbrake`] | handbrake (ABS_X) |
//!
//! Each profile's binding table is ordered by its input enum
//! ([`WheelInput`], [`HandbrakeInput`]), so a binding's position doubles as
//! its slot in the [`InputSnapshot`](super::mapper::InputSnapshot).

use evdev::AbsoluteAxisType;

use super::calibration::Inversion;

/// Largest number of bindings any profile declares.
pub const MAX_BINDINGS: usize = 4;

/// One logical analog input of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Human-readable input name.
    pub label: &'static str,
    /// evdev absolute axis reporting this input.
    pub axis: AbsoluteAxisType,
    /// Raw value at one end of travel.
    pub min: i32,
    /// Raw value at the other end of travel.
    pub max: i32,
    /// Raw value reported while the input is untouched.
    pub rest: i32,
    /// Whether the raw value runs opposite to the desired direction.
    pub invert: bool,
}

impl Binding {
    /// Inversion rule for this binding.
    #[must_use]
    pub fn inversion(&self) -> Inversion {
        Inversion::for_binding(self.invert, self.min, self.max, self.rest)
    }

    /// Applies this binding's inversion to a raw value.
    #[must_use]
    pub fn oriented(&self, raw: i32) -> i32 {
        self.inversion().apply(raw, self.min, self.max)
    }
}

/// Inputs of the racing wheel profile, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelInput {
    Steer = 0,
    Gas = 1,
    Brake = 2,
}

/// Inputs of the handbrake profile, in binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandbrakeInput {
    Brake = 0,
}

const WHEEL_BINDINGS: [Binding; 3] = [
    Binding {
        label: "steer",
        axis: AbsoluteAxisType::ABS_X,
        min: 0,
        max: 16383,
        rest: 8191,
        invert: false,
    },
    // Pedals read 255 released and 0 fully pressed
    Binding {
        label: "gas",
        axis: AbsoluteAxisType::ABS_Z,
        min: 0,
        max: 255,
        rest: 255,
        invert: true,
    },
    Binding {
        label: "brake",
        axis: AbsoluteAxisType::ABS_RZ,
        min: 0,
        max: 255,
        rest: 255,
        invert: true,
    },
];

const HANDBRAKE_BINDINGS: [Binding; 1] = [Binding {
    label: "handbrake",
    axis: AbsoluteAxisType::ABS_X,
    min: -127,
    max: 127,
    rest: -127,
    invert: false,
}];

/// Device names and the profile each one uses.
const DEVICE_TABLE: &[(&str, DeviceProfile)] = &[
    ("G27 Racing Wheel", DeviceProfile::Wheel),
    ("Arduino LLC Arduino Micro", DeviceProfile::Handbrake),
];

/// Supported device types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceProfile {
    /// Logitech G27 wheel with gas and brake pedals.
    Wheel,
    /// Arduino Micro based analog handbrake.
    Handbrake,
}

impl DeviceProfile {
    /// Looks up the profile for a device name.
    ///
    /// # Examples
    ///
    /// ```
    /// use ppm_bridge::controller::profile::DeviceProfile;
    ///
    /// assert_eq!(DeviceProfile::from_name("G27 Racing Wheel"), Some(DeviceProfile::Wheel));
    /// assert_eq!(DeviceProfile::from_name("Wireless Controller"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        DEVICE_TABLE
            .iter()
            .find(|(device_name, _)| *device_name == name)
            .map(|(_, profile)| *profile)
    }

    /// Device name this profile matches.
    #[must_use]
    pub fn device_name(&self) -> &'static str {
        DEVICE_TABLE
            .iter()
            .find(|(_, profile)| profile == self)
            .map_or("unknown", |(name, _)| *name)
    }

    /// Binding table, ordered by the profile's input enum.
    #[must_use]
    pub fn bindings(&self) -> &'static [Binding] {
        match self {
            DeviceProfile::Wheel => &WHEEL_BINDINGS,
            DeviceProfile::Handbrake => &HANDBRAKE_BINDINGS,
        }
    }

    /// Snapshot slot for an evdev axis, or `None` if the profile does not
    /// use that axis.
    #[must_use]
    pub fn slot_for_axis(&self, axis: AbsoluteAxisType) -> Option<usize> {
        self.bindings().iter().position(|b| b.axis == axis)
    }
}
