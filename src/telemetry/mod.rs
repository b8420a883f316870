//! # Telemetry Module
//!
//! Records merged channel vectors to JSONL files with rotation.
//!
//! This module handles:
//! - Formatting channel vectors as JSONL (JSON Lines)
//! - Writing to rotating log files
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files

pub mod logger;
pub mod types;

pub use logger::ChannelRecorder;
pub use types::ChannelRecord;
