//! # pigpio Daemon Client
//!
//! GPIO waveform engine backed by the pigpio daemon.
//!
//! This module handles:
//! - Connecting to `pigpiod` over TCP
//! - Sending waveform commands and checking their results
//! - Implementing [`WaveformEngine`] for the PPM scheduler

pub mod protocol;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::error::{PpmBridgeError, Result};
use crate::ppm::engine::WaveformEngine;
use crate::ppm::frame::Pulse;
use crate::ppm::ring::WaveId;
use protocol::{Command, MESSAGE_SIZE};

/// Connection to a pigpio daemon
///
/// A command that times out, fails on the socket or receives the reply of
/// another command leaves the stream out of step with the daemon. The stream
/// is dropped in that case and the next command opens a fresh connection.
pub struct PigpiodClient {
    /// TCP stream to the daemon, `None` until the next command reconnects
    stream: Option<TcpStream>,
    /// Daemon address (e.g., 127.0.0.1:8888)
    address: String,
    /// Limit for connecting and for each command round trip
    timeout: Duration,
    /// Pulses of an interrupted waveform may still be queued in the daemon
    discard_pending: bool,
}

impl std::fmt::Debug for PigpiodClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PigpiodClient")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .field("connected", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl PigpiodClient {
    /// Connect to a pigpio daemon
    ///
    /// # Arguments
    ///
    /// * `host` - Daemon host name or address
    /// * `port` - Daemon TCP port (8888 by default)
    /// * `timeout_ms` - Connect and command timeout in milliseconds
    ///
    /// # Errors
    ///
    /// Returns `Engine` error if the daemon cannot be reached in time
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ppm_bridge::pigpio::PigpiodClient;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let client = PigpiodClient::connect("127.0.0.1", 8888, 1000).await?;
    ///     println!("Connected to {}", client.address());
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(host: &str, port: u16, timeout_ms: u64) -> Result<Self> {
        let address = format!("{}:{}", host, port);
        let limit = Duration::from_millis(timeout_ms);

        let stream = open_stream(&address, limit).await?;

        info!("Connected to pigpiod at {}", address);
        Ok(Self {
            stream: Some(stream),
            address,
            timeout: limit,
            discard_pending: false,
        })
    }

    /// Address of the connected daemon
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether a stream is open; false after a failed exchange until the next
    /// command reconnects
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Send a command and wait for its result
    ///
    /// Reconnects first if the previous exchange dropped the stream.
    ///
    /// # Errors
    ///
    /// Returns `Engine` error on I/O failure, timeout or an out-of-step
    /// reply (the stream is dropped), `PigpioCommand` if the daemon reports
    /// a negative status
    async fn execute(&mut self, command: Command) -> Result<u32> {
        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                info!("Reconnecting to pigpiod at {}", self.address);
                open_stream(&self.address, self.timeout).await?
            }
        };

        let request = command.encode();
        let mut response = [0u8; MESSAGE_SIZE];

        let round_trip = async {
            stream.write_all(&request).await?;
            stream.read_exact(&mut response).await?;
            Ok::<(), std::io::Error>(())
        };

        let outcome = timeout(self.timeout, round_trip).await;
        let result = match outcome {
            Ok(Ok(())) => protocol::decode_response(command.cmd, &response),
            Ok(Err(e)) => Err(PpmBridgeError::Engine(format!(
                "Command {} failed: {}",
                command.cmd, e
            ))),
            Err(_) => Err(PpmBridgeError::Engine(format!(
                "Timed out waiting for command {}",
                command.cmd
            ))),
        };

        match &result {
            Err(PpmBridgeError::Engine(e)) => {
                warn!("Dropping pigpiod connection: {}", e);
                self.discard_pending = true;
            }
            _ => self.stream = Some(stream),
        }

        result
    }
}

/// Open a TCP stream to the daemon within `limit`
async fn open_stream(address: &str, limit: Duration) -> Result<TcpStream> {
    debug!("Connecting to pigpiod at {}", address);

    let stream = timeout(limit, TcpStream::connect(address))
        .await
        .map_err(|_| PpmBridgeError::Engine(format!("Timed out connecting to {}", address)))?
        .map_err(|e| PpmBridgeError::Engine(format!("Failed to connect to {}: {}", address, e)))?;

    stream.set_nodelay(true)?;
    Ok(stream)
}

#[async_trait]
impl WaveformEngine for PigpiodClient {
    async fn set_pin_low(&mut self, pin: u32) -> Result<()> {
        self.execute(protocol::write_low(pin)).await?;
        Ok(())
    }

    async fn stop_all_transmission(&mut self) -> Result<()> {
        self.execute(protocol::wave_halt()).await?;
        Ok(())
    }

    async fn create_waveform(&mut self, pulses: &[Pulse]) -> Result<WaveId> {
        if self.discard_pending {
            self.execute(protocol::wave_add_new()).await?;
            self.discard_pending = false;
        }

        let created = match self.execute(protocol::wave_add_generic(pulses)).await {
            Ok(_) => self.execute(protocol::wave_create()).await,
            Err(e) => Err(e),
        };

        if created.is_err() {
            self.discard_pending = true;
        }
        created
    }

    async fn transmit_repeating(&mut self, id: WaveId) -> Result<()> {
        self.execute(protocol::wave_send_repeat_sync(id)).await?;
        Ok(())
    }

    async fn delete_waveform(&mut self, id: WaveId) -> Result<()> {
        self.execute(protocol::wave_delete(id)).await?;
        Ok(())
    }
}
