//! # Error Types
//!
//! Custom error types for PPM Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for PPM Bridge
#[derive(Debug, Error)]
pub enum PpmBridgeError {
    /// Waveform engine transport errors (daemon unreachable, connection lost)
    #[error("Waveform engine error: {0}")]
    Engine(String),

    /// The pigpio daemon rejected a command
    #[error("pigpio command {command} failed with status {code}")]
    PigpioCommand { command: u32, code: i32 },

    /// No input source produced a channel vector
    #[error("No active input sources")]
    NoSources,

    /// Input device errors
    #[error("Controller error: {0}")]
    Controller(String),

    /// No supported input device was found
    #[error("No supported input device found")]
    ControllerNotFound,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Channel recording errors
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for PPM Bridge
pub type Result<T> = std::result::Result<T, PpmBridgeError>;
