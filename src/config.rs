//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{NodeError, Result};
use crate::node::actuator::{ActuatorSettings, RecoveryStrategies};
use crate::protocol::constants::{ResponseVerbosity, SERVO_COMM_ATTEMPTS};
use crate::timeout::TimerPeriods;

/// Baud rates the node's UARTs can run at
pub const SUPPORTED_BAUD_RATES: [u32; 7] = [57_600, 115_200, 200_000, 250_000, 400_000, 500_000, 1_000_000];

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub actuator: ActuatorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Device facing the master; shared with the local actuator
    #[serde(default = "default_upstream")]
    pub upstream: String,

    #[serde(default)]
    pub child_a: Option<String>,

    #[serde(default)]
    pub child_b: Option<String>,

    #[serde(default)]
    pub child_c: Option<String>,

    #[serde(default)]
    pub child_d: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// How long a blocking read waits before the line counts as quiet
    #[serde(default = "default_byte_timeout_ms")]
    pub byte_timeout_ms: u64,
}

/// Timer periods
#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    #[serde(default = "default_settle_us")]
    pub settle_us: u64,

    #[serde(default = "default_child_response_ms")]
    pub child_response_ms: u64,

    #[serde(default = "default_hello_window_ms")]
    pub hello_window_ms: u64,

    #[serde(default = "default_actuator_reply_ms")]
    pub actuator_reply_ms: u64,
}

/// Actuator bring-up configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ActuatorConfig {
    #[serde(default = "default_comm_attempts")]
    pub comm_attempts: u8,

    #[serde(default = "default_status_return_level")]
    pub status_return_level: ResponseVerbosity,

    #[serde(default)]
    pub flash_reset_on_silence: bool,

    #[serde(default)]
    pub force_status_level: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write a daily rolling log file here in addition to stdout
    #[serde(default)]
    pub log_dir: Option<String>,
}

// Default value functions
fn default_upstream() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 1_000_000 }
fn default_byte_timeout_ms() -> u64 { 50 }

fn default_settle_us() -> u64 { 1000 }
fn default_child_response_ms() -> u64 { 20 }
fn default_hello_window_ms() -> u64 { 50 }
fn default_actuator_reply_ms() -> u64 { 10 }

fn default_comm_attempts() -> u8 { SERVO_COMM_ATTEMPTS }
fn default_status_return_level() -> ResponseVerbosity { ResponseVerbosity::OnReadOnly }

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            upstream: default_upstream(),
            child_a: None,
            child_b: None,
            child_c: None,
            child_d: None,
            baud_rate: default_baud_rate(),
            byte_timeout_ms: default_byte_timeout_ms(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_us: default_settle_us(),
            child_response_ms: default_child_response_ms(),
            hello_window_ms: default_hello_window_ms(),
            actuator_reply_ms: default_actuator_reply_ms(),
        }
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            comm_attempts: default_comm_attempts(),
            status_return_level: default_status_return_level(),
            flash_reset_on_silence: false,
            force_status_level: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

impl SerialConfig {
    /// Configured child device paths, in port order
    pub fn child_paths(&self) -> [Option<&str>; 4] {
        [
            self.child_a.as_deref(),
            self.child_b.as_deref(),
            self.child_c.as_deref(),
            self.child_d.as_deref(),
        ]
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
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
    /// use revolute_node::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.upstream.is_empty() {
            return Err(invalid("upstream serial port cannot be empty"));
        }

        for (name, path) in ["child_a", "child_b", "child_c", "child_d"]
            .iter()
            .zip(self.serial.child_paths())
        {
            if path == Some("") {
                return Err(invalid(format!("{} cannot be empty when set", name)));
            }
            if path == Some(self.serial.upstream.as_str()) {
                return Err(invalid(format!("{} cannot share the upstream device", name)));
            }
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 57600, 115200, 200000, 250000, 400000, 500000, 1000000",
            ));
        }

        if self.serial.byte_timeout_ms == 0 || self.serial.byte_timeout_ms > 1000 {
            return Err(invalid("byte_timeout_ms must be between 1 and 1000"));
        }

        if self.timing.settle_us == 0 || self.timing.settle_us > 100_000 {
            return Err(invalid("settle_us must be between 1 and 100000"));
        }

        for (name, value) in [
            ("child_response_ms", self.timing.child_response_ms),
            ("hello_window_ms", self.timing.hello_window_ms),
            ("actuator_reply_ms", self.timing.actuator_reply_ms),
        ] {
            if value == 0 || value > 10_000 {
                return Err(invalid(format!("{} must be between 1 and 10000", name)));
            }
        }

        if self.actuator.comm_attempts == 0 {
            return Err(invalid("comm_attempts must be greater than 0"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        if self.logging.log_dir.as_deref() == Some("") {
            return Err(invalid("log_dir cannot be empty when set"));
        }

        Ok(())
    }

    /// Timer periods for the timeout service
    pub fn timer_periods(&self) -> TimerPeriods {
        TimerPeriods {
            settle: Duration::from_micros(self.timing.settle_us),
            child_response: Duration::from_millis(self.timing.child_response_ms),
            hello_window: Duration::from_millis(self.timing.hello_window_ms),
            actuator_reply: Duration::from_millis(self.timing.actuator_reply_ms),
        }
    }

    /// Actuator bring-up settings
    pub fn actuator_settings(&self) -> ActuatorSettings {
        ActuatorSettings {
            comm_attempts: self.actuator.comm_attempts,
            desired_verbosity: self.actuator.status_return_level,
            recovery: RecoveryStrategies {
                flash_reset_on_silence: self.actuator.flash_reset_on_silence,
                force_status_level: self.actuator.force_status_level,
            },
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> NodeError {
    NodeError::Config(toml::de::Error::custom(message))
}
