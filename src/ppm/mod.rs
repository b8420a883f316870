//! # PPM Output Module
//!
//! Generation of the 8-channel Pulse-Position-Modulation signal.
//!
//! This module handles:
//! - Building fixed-duration PPM frames from channel widths
//! - Rotating waveform handles so nothing still transmitting is deleted
//! - Running the frame loop against a GPIO waveform engine

pub mod engine;
pub mod frame;
pub mod ring;
pub mod scheduler;

pub use engine::WaveformEngine;
pub use scheduler::{PpmHandle, PpmScheduler, PpmSettings, SchedulerState};
