//! Record types written by the channel recorder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of a channel recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Wall-clock time the vector was recorded.
    pub timestamp: DateTime<Utc>,
    /// Monotonic record counter for this run.
    pub sequence: u64,
    /// Number of sources merged into this vector.
    pub sources: usize,
    /// Channel widths in microseconds.
    pub channels: Vec<u16>,
}

impl ChannelRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn now(sequence: u64, sources: usize, channels: &[u16]) -> Self {
        Self {
            timestamp: Utc::now(),
            sequence,
            sources,
            channels: channels.to_vec(),
        }
    }
}
