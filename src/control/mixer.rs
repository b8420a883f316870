//! # Control Mixer
//!
//! Merges the channel vectors of every active source into one.
//!
//! ## Merge Rule
//!
//! Per channel, the value furthest from neutral (1500 us) wins. A source
//! that leaves a channel at neutral therefore never overrides another
//! source driving it. Ties keep the value seen first, so the result is
//! repeatable for a fixed source order.
//!
//! ## Output Inversion
//!
//! After merging, configured output channels are inverted around neutral
//! (`3000 - value`), for servos or ESCs mounted the other way round.

use crate::controller::channel_mapper::{ChannelVector, NUM_CHANNELS};
use crate::error::{PpmBridgeError, Result};
use crate::ppm::frame::{CHANNEL_CENTER_US, CHANNEL_MAX_US, CHANNEL_MIN_US};

/// Distance of a width from neutral.
#[inline]
fn deviation(width: u16) -> u16 {
    width.abs_diff(CHANNEL_CENTER_US)
}

/// Merges channel vectors by largest deviation from neutral.
///
/// # Errors
///
/// Returns `NoSources` if `sources` is empty.
///
/// # Examples
///
/// ```
/// use ppm_bridge::control::mixer::merge;
///
/// let wheel = [2000, 1500, 1500, 1500, 1500, 1500, 1500, 1500];
/// let handbrake = [1500, 1000, 1500, 1500, 1500, 1500, 1500, 1500];
///
/// let merged = merge(&[wheel, handbrake])?;
/// assert_eq!(merged[0], 2000);
/// assert_eq!(merged[1], 1000);
/// # Ok::<(), ppm_bridge::error::PpmBridgeError>(())
/// ```
pub fn merge(sources: &[ChannelVector]) -> Result<ChannelVector> {
    let (first, rest) = sources.split_first().ok_or(PpmBridgeError::NoSources)?;

    let mut merged = *first;
    for source in rest {
        for (current, &candidate) in merged.iter_mut().zip(source) {
            if deviation(candidate) > deviation(*current) {
                *current = candidate;
            }
        }
    }

    Ok(merged)
}

/// Inverts a width around neutral.
#[inline]
#[must_use]
pub fn reverse_width(width: u16) -> u16 {
    let width = width.clamp(CHANNEL_MIN_US, CHANNEL_MAX_US);
    CHANNEL_MIN_US + CHANNEL_MAX_US - width
}

/// Merges sources and applies output inversion.
///
/// # Examples
///
/// ```
/// use ppm_bridge::control::mixer::Mixer;
///
/// // Invert the ESC channel
/// let mixer = Mixer::with_reversed(&[1]);
/// let merged = mixer.mix(&[[1500, 1200, 1500, 1500, 1500, 1500, 1500, 1500]])?;
/// assert_eq!(merged[1], 1800);
/// # Ok::<(), ppm_bridge::error::PpmBridgeError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mixer {
    /// Output channels to invert.
    reversed_channels: [bool; NUM_CHANNELS],
}

impl Mixer {
    /// Creates a mixer without output inversion.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mixer inverting the given output channels (0-based).
    ///
    /// Out-of-range indices are ignored.
    #[must_use]
    pub fn with_reversed(reversed: &[usize]) -> Self {
        let mut reversed_channels = [false; NUM_CHANNELS];
        for &ch in reversed {
            if let Some(flag) = reversed_channels.get_mut(ch) {
                *flag = true;
            }
        }
        Self { reversed_channels }
    }

    /// Whether an output channel is inverted.
    #[must_use]
    pub fn is_reversed(&self, channel: usize) -> bool {
        self.reversed_channels.get(channel).copied().unwrap_or(false)
    }

    /// Merges `sources` and inverts the configured outputs.
    ///
    /// # Errors
    ///
    /// Returns `NoSources` if `sources` is empty.
    pub fn mix(&self, sources: &[ChannelVector]) -> Result<ChannelVector> {
        let mut merged = merge(sources)?;
        self.apply_reverse(&mut merged);
        Ok(merged)
    }

    /// Inverts the configured outputs of a merged vector in place.
    pub fn apply_reverse(&self, channels: &mut ChannelVector) {
        for (width, &reversed) in channels.iter_mut().zip(&self.reversed_channels) {
            if reversed {
                *width = reverse_width(*width);
            }
        }
    }
}
