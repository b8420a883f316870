//! # PPM Frame Construction
//!
//! Turns a list of channel pulse widths into the pulse train of one PPM frame.
//!
//! ## Frame Layout
//!
//! ```text
//! | GAP | w0 - GAP | GAP | w1 - GAP | ... | GAP | fill to frame_us |
//!   on     off       on     off             on     off
//! ```
//!
//! Every channel occupies exactly its width `w` (a `GAP` sync pulse plus the
//! remainder), and a final `GAP` pulse plus a trailing segment pad the frame
//! so the total is always `frame_us`, independent of the channel values.

/// Channel value range in microseconds.
pub const CHANNEL_MIN_US: u16 = 1000;
/// Channel value range in microseconds.
pub const CHANNEL_MAX_US: u16 = 2000;
/// Neutral channel value in microseconds.
pub const CHANNEL_CENTER_US: u16 = 1500;

/// Sync pulse duration in microseconds.
pub const GAP_US: u32 = 300;

/// Frame period bounds in milliseconds.
pub const FRAME_MS_MIN: u32 = 5;
/// Frame period bounds in milliseconds.
pub const FRAME_MS_MAX: u32 = 100;

/// One segment of a waveform: GPIO bits to set, GPIO bits to clear, then hold
/// for `duration_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// Bit mask of GPIOs switched on at the start of the segment.
    pub set_mask: u32,
    /// Bit mask of GPIOs switched off at the start of the segment.
    pub clear_mask: u32,
    /// Segment duration in microseconds.
    pub duration_us: u32,
}

impl Pulse {
    /// Creates a pulse segment.
    #[must_use]
    pub const fn new(set_mask: u32, clear_mask: u32, duration_us: u32) -> Self {
        Self {
            set_mask,
            clear_mask,
            duration_us,
        }
    }
}

/// Clamps a pulse width to the valid channel range.
#[inline]
#[must_use]
pub fn clamp_width(width: u16) -> u16 {
    width.clamp(CHANNEL_MIN_US, CHANNEL_MAX_US)
}

/// Largest channel count that fits a frame of `frame_ms` milliseconds.
///
/// The count is capped at `frame_ms / 2` and further reduced so that a frame
/// of all-maximum widths still leaves room for the closing sync pulse and a
/// non-empty trailing segment.
#[must_use]
pub fn max_channels(frame_ms: u32) -> usize {
    let frame_us = frame_ms * 1000;
    let fit = frame_us.saturating_sub(2 * GAP_US) / u32::from(CHANNEL_MAX_US);
    (frame_ms / 2).min(fit).max(1) as usize
}

/// Builds the pulse train for one frame.
///
/// # Arguments
///
/// * `widths` - Channel pulse widths in microseconds (clamped to 1000-2000)
/// * `gpio` - GPIO pin number the signal is emitted on
/// * `frame_us` - Total frame duration in microseconds
///
/// # Returns
///
/// `2 * widths.len() + 2` pulses whose durations sum to `frame_us`, provided
/// the channel count respects [`max_channels`].
///
/// # Examples
///
/// ```
/// use ppm_bridge::ppm::frame::{build_frame, frame_duration};
///
/// let pulses = build_frame(&[1500; 8], 8, 20_000);
/// assert_eq!(pulses.len(), 18);
/// assert_eq!(frame_duration(&pulses), 20_000);
/// ```
#[must_use]
pub fn build_frame(widths: &[u16], gpio: u32, frame_us: u32) -> Vec<Pulse> {
    let mask = 1u32 << gpio;
    let mut pulses = Vec::with_capacity(widths.len() * 2 + 2);
    let mut micros: u32 = 0;

    for &width in widths {
        let width = u32::from(clamp_width(width));
        pulses.push(Pulse::new(mask, 0, GAP_US));
        pulses.push(Pulse::new(0, mask, width - GAP_US));
        micros += width;
    }

    // Closing sync pulse, then off for the remaining frame period
    pulses.push(Pulse::new(mask, 0, GAP_US));
    micros += GAP_US;
    pulses.push(Pulse::new(0, mask, frame_us.saturating_sub(micros)));

    pulses
}

/// Sums the durations of a pulse train.
#[must_use]
pub fn frame_duration(pulses: &[Pulse]) -> u32 {
    pulses.iter().map(|p| p.duration_us).sum()
}
