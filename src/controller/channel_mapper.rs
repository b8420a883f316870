//! # Channel Mapper Module
//!
//! Maps the input snapshot of one device, or the latest frame of a serial
//! receiver, to an 8-channel vector of PPM pulse widths.
//!
//! ## Channel Assignments
//!
//! | Channel | Wheel | Handbrake | Receiver |
//! |---------|-------|-----------|----------|
//! | CH1 | Steering | neutral | receiver CH1 |
//! | CH2 | Gas / brake (split pedal) | Handbrake | receiver CH2 |
//! | CH3-CH8 | neutral | neutral | receiver CH3-CH8 |
//!
//! ## Value Ranges
//!
//! - Output: 1000-2000 us, neutral 1500 us
//! - Gas drives CH2 above neutral (1500-2000 us)
//! - Brake and handbrake drive CH2 below neutral (1000-1500 us)
//! - Receiver input: 0-1000, mapped linearly onto 1000-2000 us
//!
//! ## Usage
//!
//! ```
//! use ppm_bridge::controller::channel_mapper::ChannelMapper;
//! use ppm_bridge::controller::mapper::InputSnapshot;
//! use ppm_bridge::controller::profile::DeviceProfile;
//!
//! let mapper = ChannelMapper::new(5);
//! let snapshot = InputSnapshot::new();
//!
//! // Nothing received yet: every binding sits at rest
//! let channels = mapper.map_device(DeviceProfile::Wheel, &snapshot);
//! assert_eq!(channels, [1500; 8]);
//! ```

use super::calibration::{map_to_range, map_to_range_with_deadzone};
use super::mapper::InputSnapshot;
use super::profile::{Binding, DeviceProfile, HandbrakeInput, WheelInput};
use crate::ppm::frame::{CHANNEL_CENTER_US, CHANNEL_MAX_US, CHANNEL_MIN_US};

/// Number of channels in a channel vector.
pub const NUM_CHANNELS: usize = 8;

/// One pulse width per output channel, in microseconds.
pub type ChannelVector = [u16; NUM_CHANNELS];

/// Vector with every channel at neutral.
pub const NEUTRAL_CHANNELS: ChannelVector = [CHANNEL_CENTER_US; NUM_CHANNELS];

/// Default deadzone around the centre of a mapped range, in microseconds.
pub const DEFAULT_DEADZONE_US: i32 = 5;

/// Raw receiver value at the low end of travel.
pub const RECEIVER_VALUE_MIN: i32 = 0;

/// Raw receiver value at the high end of travel.
pub const RECEIVER_VALUE_MAX: i32 = 1000;

/// Channel indices for semantic access.
pub mod channels {
    /// Steering
    pub const STEER: usize = 0;
    /// Throttle and brake (ESC)
    pub const ESC: usize = 1;
}

const MIN: i32 = CHANNEL_MIN_US as i32;
const MAX: i32 = CHANNEL_MAX_US as i32;
const CENTER: i32 = CHANNEL_CENTER_US as i32;

/// Maps device snapshots and receiver frames to channel vectors.
///
/// # Examples
///
/// ```
/// use ppm_bridge::controller::channel_mapper::ChannelMapper;
/// use ppm_bridge::controller::mapper::InputSnapshot;
/// use ppm_bridge::controller::profile::{DeviceProfile, WheelInput};
///
/// let mapper = ChannelMapper::default();
/// let snapshot = InputSnapshot::new();
/// snapshot.set(WheelInput::Steer as usize, 16383);
///
/// let channels = mapper.map_device(DeviceProfile::Wheel, &snapshot);
/// assert_eq!(channels[0], 2000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMapper {
    /// Deadzone around the middle of every mapped range.
    deadzone: i32,
}

impl Default for ChannelMapper {
    fn default() -> Self {
        Self::new(DEFAULT_DEADZONE_US)
    }
}

impl ChannelMapper {
    /// Creates a channel mapper with the given deadzone in microseconds.
    #[must_use]
    pub fn new(deadzone: i32) -> Self {
        Self {
            deadzone: deadzone.max(0),
        }
    }

    /// Deadzone in microseconds.
    #[must_use]
    pub fn deadzone(&self) -> i32 {
        self.deadzone
    }

    /// Maps one device's snapshot to its channel contribution.
    ///
    /// Bindings without a sample yet use their rest value.
    #[must_use]
    pub fn map_device(&self, profile: DeviceProfile, snapshot: &InputSnapshot) -> ChannelVector {
        match profile {
            DeviceProfile::Wheel => self.map_wheel(profile.bindings(), snapshot),
            DeviceProfile::Handbrake => self.map_handbrake(profile.bindings(), snapshot),
        }
    }

    /// Maps a receiver frame (values 0-1000) to a channel vector.
    ///
    /// Missing channels are neutral and extra channels are dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use ppm_bridge::controller::channel_mapper::ChannelMapper;
    ///
    /// let channels = ChannelMapper::default().map_receiver(&[0, 500, 1000]);
    /// assert_eq!(channels, [1000, 1500, 2000, 1500, 1500, 1500, 1500, 1500]);
    /// ```
    #[must_use]
    pub fn map_receiver(&self, values: &[u16]) -> ChannelVector {
        let mut channels = NEUTRAL_CHANNELS;
        for (channel, &value) in channels.iter_mut().zip(values) {
            *channel = to_width(map_to_range(
                i32::from(value),
                RECEIVER_VALUE_MIN,
                RECEIVER_VALUE_MAX,
                MIN,
                MAX,
            ));
        }
        channels
    }

    fn map_wheel(&self, bindings: &[Binding], snapshot: &InputSnapshot) -> ChannelVector {
        let steer = oriented_value(bindings, snapshot, WheelInput::Steer as usize);
        let gas = oriented_value(bindings, snapshot, WheelInput::Gas as usize);
        let brake = oriented_value(bindings, snapshot, WheelInput::Brake as usize);

        let steer_binding = &bindings[WheelInput::Steer as usize];
        let gas_binding = &bindings[WheelInput::Gas as usize];
        let brake_binding = &bindings[WheelInput::Brake as usize];

        let mut channels = NEUTRAL_CHANNELS;
        channels[channels::STEER] = to_width(self.map_axis(steer, steer_binding, MIN, MAX));

        let gas = self.map_axis(gas, gas_binding, CENTER, MAX);
        let brake = self.map_axis(brake, brake_binding, MIN, CENTER);
        channels[channels::ESC] = to_width(split_pedal(gas, brake));

        channels
    }

    fn map_handbrake(&self, bindings: &[Binding], snapshot: &InputSnapshot) -> ChannelVector {
        let slot = HandbrakeInput::Brake as usize;
        let value = oriented_value(bindings, snapshot, slot);
        let brake = self.map_axis(value, &bindings[slot], MIN, CENTER);

        let mut channels = NEUTRAL_CHANNELS;
        channels[channels::ESC] = to_width(reflect_low_half(brake));
        channels
    }

    fn map_axis(&self, value: i32, binding: &Binding, min_output: i32, max_output: i32) -> i32 {
        map_to_range_with_deadzone(
            value,
            binding.min,
            binding.max,
            min_output,
            max_output,
            self.deadzone,
        )
    }
}

/// Latest value of a binding, falling back to its rest value, with the
/// binding's inversion applied.
fn oriented_value(bindings: &[Binding], snapshot: &InputSnapshot, slot: usize) -> i32 {
    let binding = &bindings[slot];
    let raw = snapshot.get(slot).unwrap_or(binding.rest);
    binding.oriented(raw)
}

/// Reflects a lower half-range value (1000-1500) so that more travel means
/// further below neutral.
#[inline]
fn reflect_low_half(value: i32) -> i32 {
    CENTER - value + MIN
}

/// Combines gas (1500-2000) and brake (1000-1500) into one ESC value,
/// keeping whichever pedal is pressed further.
fn split_pedal(gas: i32, brake: i32) -> i32 {
    let gas_travel = gas - CENTER;
    let brake_travel = brake - MIN;

    if gas_travel > brake_travel {
        gas
    } else {
        reflect_low_half(brake)
    }
}

#[inline]
fn to_width(value: i32) -> u16 {
    value.clamp(MIN, MAX) as u16
}
