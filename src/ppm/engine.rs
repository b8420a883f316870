//! Trait abstraction for the GPIO waveform engine to enable testing

use async_trait::async_trait;

use super::frame::Pulse;
use super::ring::WaveId;
use crate::error::Result;

/// Operations the PPM scheduler needs from a GPIO waveform engine.
///
/// The engine owns the hardware timing: it turns a pulse list into a waveform,
/// repeats the active waveform on its pin until told otherwise, and switches
/// to a newly transmitted waveform at the end of the current repetition.
#[async_trait]
pub trait WaveformEngine: Send {
    /// Drive a GPIO pin low.
    async fn set_pin_low(&mut self, pin: u32) -> Result<()>;

    /// Stop any waveform currently being transmitted.
    async fn stop_all_transmission(&mut self) -> Result<()>;

    /// Create a waveform from a pulse list and return its handle.
    async fn create_waveform(&mut self, pulses: &[Pulse]) -> Result<WaveId>;

    /// Transmit a waveform repeatedly, synchronised to the end of the
    /// previous waveform.
    async fn transmit_repeating(&mut self, id: WaveId) -> Result<()>;

    /// Delete a waveform and release its resources.
    async fn delete_waveform(&mut self, id: WaveId) -> Result<()>;
}
