//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values take their defaults.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::controller::channel_mapper::NUM_CHANNELS;
use crate::error::{PpmBridgeError, Result};
use crate::ppm::frame::{max_channels, FRAME_MS_MAX, FRAME_MS_MIN};
use crate::ppm::scheduler::PpmSettings;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub ppm: PpmConfig,
    pub pigpio: PigpioConfig,
    pub mixer: MixerConfig,
    pub controller: ControllerConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

/// PPM output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PpmConfig {
    #[serde(default = "default_gpio")]
    pub gpio: u32,

    #[serde(default = "default_frame_ms")]
    pub frame_ms: u32,

    #[serde(default = "default_channels")]
    pub channels: usize,
}

/// pigpio daemon connection
#[derive(Debug, Deserialize, Clone)]
pub struct PigpioConfig {
    #[serde(default = "default_pigpio_host")]
    pub host: String,

    #[serde(default = "default_pigpio_port")]
    pub port: u16,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Control loop and mixing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MixerConfig {
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// Deadzone around the centre of mapped axes, in microseconds
    #[serde(default = "default_deadzone")]
    pub deadzone: i32,

    /// Output channels to invert (0-based)
    #[serde(default)]
    pub invert_outputs: Vec<usize>,
}

/// Input device configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ControllerConfig {
    /// Device nodes to probe; empty scans /dev/input
    #[serde(default)]
    pub device_paths: Vec<String>,
}

/// Channel recording configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Application log configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; stdout only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

// Default value functions
fn default_gpio() -> u32 { 8 }
fn default_frame_ms() -> u32 { 20 }
fn default_channels() -> usize { 8 }

fn default_pigpio_host() -> String { "127.0.0.1".to_string() }
fn default_pigpio_port() -> u16 { 8888 }
fn default_timeout_ms() -> u64 { 1000 }

fn default_update_interval_ms() -> u64 { 16 }
fn default_deadzone() -> i32 { 5 }

fn default_telemetry_enabled() -> bool { false }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_interval_ms() -> u64 { 100 }
fn default_log_format() -> String { "jsonl".to_string() }

impl Default for PpmConfig {
    fn default() -> Self {
        Self {
            gpio: default_gpio(),
            frame_ms: default_frame_ms(),
            channels: default_channels(),
        }
    }
}

impl Default for PigpioConfig {
    fn default() -> Self {
        Self {
            host: default_pigpio_host(),
            port: default_pigpio_port(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
            deadzone: default_deadzone(),
            invert_outputs: Vec::new(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            log_interval_ms: default_log_interval_ms(),
            format: default_log_format(),
        }
    }
}

impl PpmConfig {
    /// Scheduler settings for this configuration
    pub fn settings(&self) -> PpmSettings {
        PpmSettings {
            gpio: self.gpio,
            frame_ms: self.frame_ms,
            channels: self.channels,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ppm_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Examples
    ///
    /// ```
    /// use ppm_bridge::config::Config;
    ///
    /// let config = Config::parse("[ppm]\nframe_ms = 27\n")?;
    /// assert_eq!(config.ppm.frame_ms, 27);
    /// assert_eq!(config.ppm.gpio, 8);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate PPM output
        if self.ppm.gpio > 53 {
            return Err(invalid("gpio must be between 0 and 53"));
        }

        if !(FRAME_MS_MIN..=FRAME_MS_MAX).contains(&self.ppm.frame_ms) {
            return Err(invalid(format!(
                "frame_ms must be between {} and {}",
                FRAME_MS_MIN, FRAME_MS_MAX
            )));
        }

        let channel_limit = max_channels(self.ppm.frame_ms).min(NUM_CHANNELS);
        if self.ppm.channels == 0 || self.ppm.channels > channel_limit {
            return Err(invalid(format!(
                "channels must be between 1 and {} for a {}ms frame",
                channel_limit, self.ppm.frame_ms
            )));
        }

        // Validate pigpio connection
        if self.pigpio.host.is_empty() {
            return Err(invalid("pigpio host cannot be empty"));
        }

        if self.pigpio.port == 0 {
            return Err(invalid("pigpio port cannot be 0"));
        }

        if self.pigpio.timeout_ms == 0 || self.pigpio.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        // Validate mixer
        if self.mixer.update_interval_ms == 0 || self.mixer.update_interval_ms > 1000 {
            return Err(invalid("update_interval_ms must be between 1 and 1000"));
        }

        if !(0..=250).contains(&self.mixer.deadzone) {
            return Err(invalid("deadzone must be between 0 and 250"));
        }

        for &channel_idx in &self.mixer.invert_outputs {
            if channel_idx >= NUM_CHANNELS {
                return Err(invalid(format!(
                    "invert_outputs index {} is out of bounds (must be 0-{})",
                    channel_idx,
                    NUM_CHANNELS - 1
                )));
            }
        }

        // Validate telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.log_interval_ms == 0 || self.telemetry.log_interval_ms > 60000 {
            return Err(invalid("log_interval_ms must be between 1 and 60000"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.telemetry.format != "jsonl" {
            return Err(invalid("log format must be 'jsonl' (only supported format)"));
        }

        // Validate logging
        if matches!(&self.logging.dir, Some(dir) if dir.is_empty()) {
            return Err(invalid("logging dir cannot be empty"));
        }

        Ok(())
    }
}

fn invalid(message: impl std::fmt::Display) -> PpmBridgeError {
    PpmBridgeError::Config(toml::de::Error::custom(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn assert_invalid(config: &Config, fragment: &str) {
        match config.validate() {
            Err(PpmBridgeError::Config(e)) => {
                assert!(e.to_string().contains(fragment), "unexpected message: {}", e)
            }
            other => panic!("Expected Config error containing '{}', got: {:?}", fragment, other),
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.ppm.gpio, 8);
        assert_eq!(config.ppm.frame_ms, 20);
        assert_eq!(config.ppm.channels, 8);
        assert_eq!(config.pigpio.host, "127.0.0.1");
        assert_eq!(config.pigpio.port, 8888);
        assert_eq!(config.mixer.update_interval_ms, 16);
        assert_eq!(config.mixer.deadzone, 5);
        assert!(config.mixer.invert_outputs.is_empty());
        assert!(config.controller.device_paths.is_empty());
        assert!(!config.telemetry.enabled);
        assert!(config.logging.dir.is_none());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.ppm.settings(), PpmSettings::default());
    }

    #[test]
    fn test_load_config_from_file() {
        let toml_content = r#"
[ppm]
gpio = 18
frame_ms = 27

[pigpio]
host = "raspberrypi.local"

[mixer]
invert_outputs = [1]

[controller]
device_paths = ["/dev/input/event5"]

[telemetry]
enabled = true
log_dir = "/tmp/ppm"

[logging]
dir = "/var/log/ppm-bridge"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.ppm.gpio, 18);
        assert_eq!(config.ppm.frame_ms, 27);
        assert_eq!(config.ppm.channels, 8);
        assert_eq!(config.pigpio.host, "raspberrypi.local");
        assert_eq!(config.pigpio.port, 8888);
        assert_eq!(config.mixer.invert_outputs, vec![1]);
        assert_eq!(config.controller.device_paths, vec!["/dev/input/event5"]);
        assert!(config.telemetry.enabled);
        assert_eq!(config.logging.dir.as_deref(), Some("/var/log/ppm-bridge"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/ppm-bridge.toml");
        assert!(matches!(result, Err(PpmBridgeError::Io(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::parse("[ppm\nframe_ms = 20");
        assert!(matches!(result, Err(PpmBridgeError::Config(_))));
    }

    #[test]
    fn test_wrong_type() {
        let result = Config::parse("[ppm]\nframe_ms = \"fast\"\n");
        assert!(matches!(result, Err(PpmBridgeError::Config(_))));
    }

    // ==================== PPM Validation Tests ====================

    #[test]
    fn test_gpio_out_of_range() {
        let mut config = Config::default();
        config.ppm.gpio = 54;
        assert_invalid(&config, "gpio");
    }

    #[test]
    fn test_frame_ms_bounds() {
        let mut config = Config::default();
        config.ppm.frame_ms = 4;
        assert_invalid(&config, "frame_ms");

        config.ppm.frame_ms = 101;
        assert_invalid(&config, "frame_ms");

        config.ppm.frame_ms = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_channels_zero() {
        let mut config = Config::default();
        config.ppm.channels = 0;
        assert_invalid(&config, "channels");
    }

    #[test]
    fn test_channels_exceed_frame() {
        let mut config = Config::default();
        config.ppm.frame_ms = 10;
        config.ppm.channels = 8;
        assert_invalid(&config, "channels");

        config.ppm.channels = max_channels(10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_channels_exceed_vector() {
        let mut config = Config::default();
        config.ppm.frame_ms = 100;
        config.ppm.channels = 9;
        assert_invalid(&config, "channels");
    }

    // ==================== Connection Validation Tests ====================

    #[test]
    fn test_empty_pigpio_host() {
        let mut config = Config::default();
        config.pigpio.host = String::new();
        assert_invalid(&config, "host");
    }

    #[test]
    fn test_pigpio_port_zero() {
        let mut config = Config::default();
        config.pigpio.port = 0;
        assert_invalid(&config, "port");
    }

    #[test]
    fn test_timeout_ms_zero() {
        let mut config = Config::default();
        config.pigpio.timeout_ms = 0;
        assert_invalid(&config, "timeout_ms");
    }

    #[test]
    fn test_timeout_ms_too_high() {
        let mut config = Config::default();
        config.pigpio.timeout_ms = 10001;
        assert_invalid(&config, "timeout_ms");
    }

    // ==================== Mixer Validation Tests ====================

    #[test]
    fn test_update_interval_zero() {
        let mut config = Config::default();
        config.mixer.update_interval_ms = 0;
        assert_invalid(&config, "update_interval_ms");
    }

    #[test]
    fn test_update_interval_too_high() {
        let mut config = Config::default();
        config.mixer.update_interval_ms = 1001;
        assert_invalid(&config, "update_interval_ms");
    }

    #[test]
    fn test_deadzone_negative() {
        let mut config = Config::default();
        config.mixer.deadzone = -1;
        assert_invalid(&config, "deadzone");
    }

    #[test]
    fn test_deadzone_too_high() {
        let mut config = Config::default();
        config.mixer.deadzone = 251;
        assert_invalid(&config, "deadzone");
    }

    #[test]
    fn test_invert_outputs_invalid_index() {
        let mut config = Config::default();
        config.mixer.invert_outputs = vec![0, 8];
        assert_invalid(&config, "invert_outputs");
    }

    #[test]
    fn test_invert_outputs_valid_indices() {
        let mut config = Config::default();
        config.mixer.invert_outputs = vec![0, 1, 7];
        assert!(config.validate().is_ok());
    }

    // ==================== Telemetry Validation Tests ====================

    #[test]
    fn test_empty_log_dir_when_enabled() {
        let mut config = Config::default();
        config.telemetry.enabled = true;
        config.telemetry.log_dir = String::new();
        assert_invalid(&config, "log_dir");
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = Config::default();
        config.telemetry.enabled = false;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_interval_zero() {
        let mut config = Config::default();
        config.telemetry.log_interval_ms = 0;
        assert_invalid(&config, "log_interval_ms");
    }

    #[test]
    fn test_max_records_per_file_zero() {
        let mut config = Config::default();
        config.telemetry.max_records_per_file = 0;
        assert_invalid(&config, "max_records_per_file");
    }

    #[test]
    fn test_max_files_to_keep_zero() {
        let mut config = Config::default();
        config.telemetry.max_files_to_keep = 0;
        assert_invalid(&config, "max_files_to_keep");
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = Config::default();
        config.telemetry.format = "csv".to_string();
        assert_invalid(&config, "jsonl");
    }

    #[test]
    fn test_empty_logging_dir() {
        let mut config = Config::default();
        config.logging.dir = Some(String::new());
        assert_invalid(&config, "logging dir");
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_gpio(), 8);
        assert_eq!(default_frame_ms(), 20);
        assert_eq!(default_channels(), 8);
        assert_eq!(default_pigpio_host(), "127.0.0.1");
        assert_eq!(default_pigpio_port(), 8888);
        assert_eq!(default_timeout_ms(), 1000);
        assert_eq!(default_update_interval_ms(), 16);
        assert_eq!(default_deadzone(), 5);
        assert!(!default_telemetry_enabled());
        assert_eq!(default_log_dir(), "./logs");
        assert_eq!(default_max_records_per_file(), 10000);
        assert_eq!(default_max_files_to_keep(), 10);
        assert_eq!(default_log_interval_ms(), 100);
        assert_eq!(default_log_format(), "jsonl");
    }
}
