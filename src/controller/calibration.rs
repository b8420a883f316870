//! # Calibration Module
//!
//! Range mapping, deadzones and axis inversion for raw device values.
//!
//! ## Range Mapping
//!
//! A raw value is linearly interpolated from the device range onto an output
//! range of pulse widths and clamped to it. Integer math is used throughout,
//! so results are truncated towards the lower end of the output range.
//!
//! ## Deadzone
//!
//! Worn analog hardware jitters around its centre. Any mapped value closer
//! than `deadzone` microseconds to the middle of the output range is snapped
//! to exactly the middle.
//!
//! ## Usage
//!
//! ```
//! use ppm_bridge::controller::calibration::map_to_range_with_deadzone;
//!
//! // Steering wheel, 14-bit raw range, onto a full channel with a 5us deadzone
//! assert_eq!(map_to_range_with_deadzone(0, 0, 16383, 1000, 2000, 5), 1000);
//! assert_eq!(map_to_range_with_deadzone(8191, 0, 16383, 1000, 2000, 5), 1500);
//! assert_eq!(map_to_range_with_deadzone(16383, 0, 16383, 1000, 2000, 5), 2000);
//! ```

/// How a binding flips its raw value before mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inversion {
    /// Raw value used as-is.
    None,
    /// Reflect within the raw range: `max - value + min`.
    Reflect,
    /// Negate the raw value.
    Negate,
}

impl Inversion {
    /// Picks the inversion rule for a binding.
    ///
    /// Axes whose rest value equals `min - max` rest at the negative span and
    /// are negated; every other inverted axis is reflected within its range.
    ///
    /// # Examples
    ///
    /// ```
    /// use ppm_bridge::controller::calibration::Inversion;
    ///
    /// assert_eq!(Inversion::for_binding(false, 0, 255, 255), Inversion::None);
    /// assert_eq!(Inversion::for_binding(true, 0, 255, 255), Inversion::Reflect);
    /// assert_eq!(Inversion::for_binding(true, 0, 255, -255), Inversion::Negate);
    /// ```
    #[must_use]
    pub fn for_binding(invert: bool, min: i32, max: i32, rest: i32) -> Self {
        if !invert {
            Inversion::None
        } else if rest == min - max {
            Inversion::Negate
        } else {
            Inversion::Reflect
        }
    }

    /// Applies the inversion to a raw value of a `[min, max]` axis.
    ///
    /// Values far outside the axis range saturate at the `i32` bounds, so they
    /// still land on the matching end of the output range after mapping.
    #[must_use]
    pub fn apply(self, value: i32, min: i32, max: i32) -> i32 {
        let value = i64::from(value);
        let inverted = match self {
            Inversion::None => value,
            Inversion::Reflect => i64::from(max) - value + i64::from(min),
            Inversion::Negate => -value,
        };

        inverted.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

/// Maps a value from `[min_input, max_input]` onto `[min_output, max_output]`.
///
/// The result is clamped to the output range, so raw values beyond the
/// documented device range still produce a valid width. A degenerate input
/// range maps everything to `min_output`.
///
/// # Examples
///
/// ```
/// use ppm_bridge::controller::calibration::map_to_range;
///
/// assert_eq!(map_to_range(128, 0, 255, 1000, 2000), 1501);
/// assert_eq!(map_to_range(-50, 0, 255, 1000, 2000), 1000);
/// assert_eq!(map_to_range(9000, 0, 255, 1000, 2000), 2000);
/// ```
#[must_use]
pub fn map_to_range(
    value: i32,
    min_input: i32,
    max_input: i32,
    min_output: i32,
    max_output: i32,
) -> i32 {
    let input_span = i64::from(max_input) - i64::from(min_input);
    if input_span == 0 {
        return min_output;
    }

    let output_span = i64::from(max_output) - i64::from(min_output);
    let offset = i64::from(value) - i64::from(min_input);
    let mapped = output_span * offset / input_span + i64::from(min_output);

    mapped.clamp(i64::from(min_output), i64::from(max_output)) as i32
}

/// Maps a value like [`map_to_range`], snapping results within `deadzone` of
/// the output midpoint to the midpoint.
#[must_use]
pub fn map_to_range_with_deadzone(
    value: i32,
    min_input: i32,
    max_input: i32,
    min_output: i32,
    max_output: i32,
    deadzone: i32,
) -> i32 {
    let mid = (min_output + max_output) / 2;
    let mapped = map_to_range(value, min_input, max_input, min_output, max_output);

    if (mapped - mid).abs() < deadzone {
        mid
    } else {
        mapped
    }
}
