//! # Serial Receiver Module
//!
//! Optional secondary channel source fed by an external receiver decoder
//! (e.g. SBUS). Decoding the wire protocol is done elsewhere; this module
//! only defines the contract the control loop consumes and a shared
//! last-value implementation a decoder can publish into.
//!
//! Receiver values are normalized to 0-1000 per channel.
//!
//! The `ppm-bridge` binary only opens evdev devices. A program that owns a
//! receiver decoder embeds the library instead: it publishes decoded frames
//! into a [`SharedReceiver`] and adds a
//! [`ReceiverSource`](crate::control::ReceiverSource) to its
//! [`ControlLoop`](crate::control::ControlLoop) next to the device sources.
//!
//! ```
//! use ppm_bridge::control::{ChannelSource, ReceiverSource};
//! use ppm_bridge::controller::channel_mapper::ChannelMapper;
//! use ppm_bridge::receiver::SharedReceiver;
//!
//! let receiver = SharedReceiver::new();
//! let source = ReceiverSource::new("sbus", Box::new(receiver.clone()));
//! let mapper = ChannelMapper::default();
//!
//! // Skipped by the mixer until the decoder delivers a frame
//! assert_eq!(source.current(&mapper), None);
//!
//! receiver.publish(&[1000, 0]);
//! assert_eq!(source.current(&mapper).map(|c| c[0]), Some(2000));
//!
//! receiver.disconnect();
//! assert_eq!(source.current(&mapper), None);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// Largest receiver frame kept (SBUS carries 16 channels)
pub const MAX_RECEIVER_CHANNELS: usize = 16;

/// Highest normalized receiver value
pub const RECEIVER_VALUE_MAX: u16 = 1000;

/// Contract of a decoded serial receiver feed
#[cfg_attr(test, automock)]
pub trait SerialReceiver: Send + Sync {
    /// Whether the receiver currently delivers frames
    fn is_connected(&self) -> bool;

    /// Latest normalized channel values (0-1000)
    fn latest_channels(&self) -> Vec<u16>;
}

#[derive(Debug)]
struct ReceiverState {
    connected: AtomicBool,
    len: AtomicUsize,
    values: [AtomicU16; MAX_RECEIVER_CHANNELS],
}

/// Last-value receiver state shared between one decoder and the control loop
///
/// Cloning yields another handle to the same state.
///
/// # Examples
///
/// ```
/// use ppm_bridge::receiver::{SerialReceiver, SharedReceiver};
///
/// let receiver = SharedReceiver::new();
/// assert!(!receiver.is_connected());
///
/// receiver.publish(&[0, 500, 1000]);
/// assert!(receiver.is_connected());
/// assert_eq!(receiver.latest_channels(), vec![0, 500, 1000]);
/// ```
#[derive(Debug, Clone)]
pub struct SharedReceiver {
    state: Arc<ReceiverState>,
}

impl Default for SharedReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedReceiver {
    /// Creates a disconnected receiver with no channels
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(ReceiverState {
                connected: AtomicBool::new(false),
                len: AtomicUsize::new(0),
                values: Default::default(),
            }),
        }
    }

    /// Stores a decoded frame and marks the receiver connected
    ///
    /// Values above 1000 are clamped; channels beyond
    /// [`MAX_RECEIVER_CHANNELS`] are dropped.
    pub fn publish(&self, values: &[u16]) {
        let len = values.len().min(MAX_RECEIVER_CHANNELS);
        for (cell, &value) in self.state.values.iter().zip(values) {
            cell.store(value.min(RECEIVER_VALUE_MAX), Ordering::Relaxed);
        }
        self.state.len.store(len, Ordering::Release);
        self.state.connected.store(true, Ordering::Release);
    }

    /// Marks the receiver disconnected, e.g. on failsafe or port loss
    pub fn disconnect(&self) {
        self.state.connected.store(false, Ordering::Release);
    }
}

impl SerialReceiver for SharedReceiver {
    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    fn latest_channels(&self) -> Vec<u16> {
        let len = self.state.len.load(Ordering::Acquire);
        self.state.values[..len]
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .collect()
    }
}
