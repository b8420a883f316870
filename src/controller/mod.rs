//! # Controller Module
//!
//! Racing wheel and handbrake input handling.
//!
//! This module handles:
//! - Device detection and reading via evdev
//! - Per-device profiles (axes, ranges, rest values, inversion)
//! - Latest-value input snapshots shared with the control loop
//! - Range mapping with deadzones
//! - Mapping inputs to PPM channel vectors

pub mod calibration;
pub mod channel_mapper;
pub mod device;
pub mod mapper;
pub mod profile;
