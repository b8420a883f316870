//! # pigpio Socket Protocol
//!
//! Command framing for the pigpio daemon (`pigpiod`) socket interface.
//!
//! ## Frame Structure
//!
//! Every command is a 16-byte little-endian header followed by an optional
//! extension whose length is given by `p3`:
//!
//! ```text
//! | cmd (u32) | p1 (u32) | p2 (u32) | p3 (u32) | extension (p3 bytes) |
//! ```
//!
//! Every response is 16 bytes; the last word is the signed result, negative
//! on failure:
//!
//! ```text
//! | cmd (u32) | p1 (u32) | p2 (u32) | res (i32) |
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PpmBridgeError, Result};
use crate::ppm::frame::Pulse;

/// Default pigpiod TCP port
pub const PIGPIOD_DEFAULT_PORT: u16 = 8888;

/// Size of a command header and of a response
pub const MESSAGE_SIZE: usize = 16;

/// Size of one pulse in a WVAG extension (on mask, off mask, delay)
pub const PULSE_SIZE: usize = 12;

/// Write a GPIO level
pub const CMD_WRITE: u32 = 4;
/// Append generic pulses to the waveform under construction
pub const CMD_WVAG: u32 = 28;
/// Stop waveform transmission
pub const CMD_WVHLT: u32 = 33;
/// Start a new waveform, discarding pulses appended so far
pub const CMD_WVNEW: u32 = 53;
/// Create a waveform from the appended pulses
pub const CMD_WVCRE: u32 = 49;
/// Delete a waveform
pub const CMD_WVDEL: u32 = 50;
/// Transmit a waveform with a mode
pub const CMD_WVTXM: u32 = 100;

/// Repeat the waveform, switching at the end of the current cycle
pub const WAVE_MODE_REPEAT_SYNC: u32 = 3;

/// GPIO low level
pub const LEVEL_LOW: u32 = 0;

/// A command ready to be sent to the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub cmd: u32,
    pub p1: u32,
    pub p2: u32,
    pub extension: Bytes,
}

impl Command {
    /// Creates a command without extension
    #[must_use]
    pub fn new(cmd: u32, p1: u32, p2: u32) -> Self {
        Self {
            cmd,
            p1,
            p2,
            extension: Bytes::new(),
        }
    }

    /// Encode the command header and extension
    ///
    /// # Examples
    ///
    /// ```
    /// use ppm_bridge::pigpio::protocol::{Command, CMD_WVDEL};
    ///
    /// let bytes = Command::new(CMD_WVDEL, 7, 0).encode();
    /// assert_eq!(bytes.len(), 16);
    /// assert_eq!(&bytes[0..4], &[50, 0, 0, 0]);
    /// assert_eq!(&bytes[4..8], &[7, 0, 0, 0]);
    /// ```
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MESSAGE_SIZE + self.extension.len());
        buf.put_u32_le(self.cmd);
        buf.put_u32_le(self.p1);
        buf.put_u32_le(self.p2);
        buf.put_u32_le(self.extension.len() as u32);
        buf.put_slice(&self.extension);
        buf.freeze()
    }
}

/// Drive a GPIO low
#[must_use]
pub fn write_low(gpio: u32) -> Command {
    Command::new(CMD_WRITE, gpio, LEVEL_LOW)
}

/// Stop waveform transmission
#[must_use]
pub fn wave_halt() -> Command {
    Command::new(CMD_WVHLT, 0, 0)
}

/// Discard pulses appended to the waveform under construction
///
/// Existing waveforms, including the one being transmitted, are kept.
#[must_use]
pub fn wave_add_new() -> Command {
    Command::new(CMD_WVNEW, 0, 0)
}

/// Append pulses to the waveform under construction
#[must_use]
pub fn wave_add_generic(pulses: &[Pulse]) -> Command {
    let mut extension = BytesMut::with_capacity(pulses.len() * PULSE_SIZE);
    for pulse in pulses {
        extension.put_u32_le(pulse.set_mask);
        extension.put_u32_le(pulse.clear_mask);
        extension.put_u32_le(pulse.duration_us);
    }

    Command {
        cmd: CMD_WVAG,
        p1: 0,
        p2: 0,
        extension: extension.freeze(),
    }
}

/// Create a waveform from the appended pulses
#[must_use]
pub fn wave_create() -> Command {
    Command::new(CMD_WVCRE, 0, 0)
}

/// Transmit a waveform on repeat
#[must_use]
pub fn wave_send_repeat_sync(wave_id: u32) -> Command {
    Command::new(CMD_WVTXM, wave_id, WAVE_MODE_REPEAT_SYNC)
}

/// Delete a waveform
#[must_use]
pub fn wave_delete(wave_id: u32) -> Command {
    Command::new(CMD_WVDEL, wave_id, 0)
}

/// Decode a 16-byte response into its result value
///
/// # Errors
///
/// Returns error if:
/// - Response is not 16 bytes
/// - Response echoes a different command
/// - Result is negative (daemon-side failure)
pub fn decode_response(command: u32, response: &[u8]) -> Result<u32> {
    if response.len() != MESSAGE_SIZE {
        return Err(PpmBridgeError::Engine(format!(
            "Invalid response length: expected {} bytes, got {}",
            MESSAGE_SIZE,
            response.len()
        )));
    }

    let mut buf = response;
    let echoed = buf.get_u32_le();
    buf.advance(8);
    let res = buf.get_i32_le();

    if echoed != command {
        return Err(PpmBridgeError::Engine(format!(
            "Response for command {} while waiting for {}",
            echoed, command
        )));
    }

    if res < 0 {
        return Err(PpmBridgeError::PigpioCommand { command, code: res });
    }

    Ok(res as u32)
}
