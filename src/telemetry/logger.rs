//! # Channel Recorder
//!
//! Writes merged channel vectors to JSON Lines files.
//!
//! ## File Rotation
//!
//! - A new file is started after `max_records_per_file` records
//! - Files are named `channels_<YYYYmmdd_HHMMSS>_<seq>.jsonl` so that name
//!   order is creation order
//! - Only the newest `max_files_to_keep` recordings are kept
//!
//! Records are written at most once per `log_interval`, no matter how often
//! [`ChannelRecorder::record`] is called.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info};

use super::types::ChannelRecord;
use crate::config::TelemetryConfig;
use crate::error::Result;

const FILE_PREFIX: &str = "channels_";
const FILE_SUFFIX: &str = ".jsonl";

/// Rotating JSONL writer for channel vectors.
#[derive(Debug)]
pub struct ChannelRecorder {
    log_dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    log_interval: Duration,
    writer: Option<BufWriter<File>>,
    current_file: Option<PathBuf>,
    records_in_file: usize,
    file_sequence: u32,
    next_sequence: u64,
    last_write: Option<Instant>,
}

impl ChannelRecorder {
    /// Creates a recorder from the telemetry configuration.
    ///
    /// # Errors
    ///
    /// Returns `Io` error if the log directory cannot be created.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        Self::new(
            &config.log_dir,
            config.max_records_per_file,
            config.max_files_to_keep,
            Duration::from_millis(config.log_interval_ms),
        )
    }

    /// Creates a recorder writing into `log_dir`.
    ///
    /// # Errors
    ///
    /// Returns `Io` error if the log directory cannot be created.
    pub fn new(
        log_dir: impl AsRef<Path>,
        max_records_per_file: usize,
        max_files_to_keep: usize,
        log_interval: Duration,
    ) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&log_dir)?;
        info!("Recording channels to {}", log_dir.display());

        Ok(Self {
            log_dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            log_interval,
            writer: None,
            current_file: None,
            records_in_file: 0,
            file_sequence: 0,
            next_sequence: 0,
            last_write: None,
        })
    }

    /// File currently being written, if any.
    pub fn current_file(&self) -> Option<&Path> {
        self.current_file.as_deref()
    }

    /// Records a channel vector unless the previous record is more recent
    /// than the log interval.
    ///
    /// Returns `true` if a record was written.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Telemetry` error if writing fails.
    pub fn record(&mut self, channels: &[u16], sources: usize) -> Result<bool> {
        let now = Instant::now();
        if let Some(last) = self.last_write {
            if now.duration_since(last) < self.log_interval {
                return Ok(false);
            }
        }

        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = ChannelRecord::now(self.next_sequence, sources, channels);
        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, &record)?;
            writer.write_all(b"\n")?;
        }

        self.next_sequence += 1;
        self.records_in_file += 1;
        self.last_write = Some(now);
        Ok(true)
    }

    /// Flushes buffered records to disk.
    ///
    /// # Errors
    ///
    /// Returns `Io` error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        let name = format!(
            "{}{}_{:04}{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.file_sequence,
            FILE_SUFFIX
        );
        let path = self.log_dir.join(name);
        let file = File::create(&path)?;
        debug!("Started recording file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_file = Some(path);
        self.records_in_file = 0;
        self.file_sequence = self.file_sequence.wrapping_add(1);

        self.prune()
    }

    fn prune(&self) -> Result<()> {
        let mut files = recording_files(&self.log_dir)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        let excess = files.len() - self.max_files_to_keep;
        for path in files.drain(..excess) {
            debug!("Removing old recording {}", path.display());
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Recording files in `dir`, oldest first.
///
/// # Errors
///
/// Returns `Io` error if the directory cannot be read.
pub fn recording_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name().map_or(false, |name| {
                let name = name.to_string_lossy();
                name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)
            })
        })
        .collect();

    files.sort();
    Ok(files)
}
