//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! The broadcast period, retry threshold and watchdog timeouts differ between
//! vehicle variants, so they live here rather than in code.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{EmulatorError, Result};
use crate::frame::protocol::ESP_33_CAN_ID;
use crate::serial::slcan::{SLCAN_BITRATES, SLCAN_MAX_STANDARD_ID};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// CAN adapter configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// Serial device path, or `"auto"` to try the usual paths in turn
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_can_bitrate")]
    pub can_bitrate: u32,

    /// How long to wait for the adapter to answer a command; 0 skips the check
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
}

/// ESP_33 broadcast configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    #[serde(default = "default_can_id")]
    pub can_id: u16,

    /// Interval between transmission attempts; 0 sends on every tick
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Consecutive failed sends that force a restart
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u8,

    /// Control loop tick
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

/// Restart and watchdog configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecoveryConfig {
    #[serde(default = "default_watchdog_timeout_ms")]
    pub watchdog_timeout_ms: u64,

    /// Pause before restarting when the adapter cannot be brought up
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
}

/// Development console configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ConsoleConfig {
    #[serde(default = "default_console_enabled")]
    pub enabled: bool,

    /// Watchdog timeout used instead of the recovery one while the console is enabled
    #[serde(default = "default_console_watchdog_timeout_ms")]
    pub watchdog_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rotated log files; empty disables file logging
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_serial_port() -> String { "auto".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_can_bitrate() -> u32 { 500_000 }
fn default_reply_timeout_ms() -> u64 { 100 }

fn default_can_id() -> u16 { ESP_33_CAN_ID }
fn default_period_ms() -> u64 { 200 }
fn default_max_retry_count() -> u8 { 7 }
fn default_tick_ms() -> u64 { 10 }

fn default_watchdog_timeout_ms() -> u64 { 500 }
fn default_restart_delay_ms() -> u64 { 1000 }

fn default_console_enabled() -> bool { false }
fn default_console_watchdog_timeout_ms() -> u64 { 1000 }

fn default_log_level() -> String { "info".to_string() }

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            can_bitrate: default_can_bitrate(),
            reply_timeout_ms: default_reply_timeout_ms(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            can_id: default_can_id(),
            period_ms: default_period_ms(),
            max_retry_count: default_max_retry_count(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: default_watchdog_timeout_ms(),
            restart_delay_ms: default_restart_delay_ms(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: default_console_enabled(),
            watchdog_timeout_ms: default_console_watchdog_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
        }
    }
}

impl TransportConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

impl BroadcastConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
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
    /// use esp33_emulator::config::Config;
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

    /// Watchdog timeout in effect for this run
    ///
    /// The console may stall a tick while a line is processed, so console
    /// builds get their own (longer) timeout.
    pub fn watchdog_timeout(&self) -> Duration {
        if self.console.enabled {
            Duration::from_millis(self.console.watchdog_timeout_ms)
        } else {
            Duration::from_millis(self.recovery.watchdog_timeout_ms)
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.transport.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if ![9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600, 1000000, 2000000]
            .contains(&self.transport.baud_rate)
        {
            return Err(invalid(
                "baud_rate must be one of: 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600, 1000000, 2000000",
            ));
        }

        if !SLCAN_BITRATES.iter().any(|&(rate, _)| rate == self.transport.can_bitrate) {
            return Err(invalid(
                "can_bitrate must be one of: 10000, 20000, 50000, 100000, 125000, 250000, 500000, 800000, 1000000",
            ));
        }

        if self.transport.reply_timeout_ms > 1000 {
            return Err(invalid("reply_timeout_ms must be between 0 and 1000"));
        }

        if self.broadcast.can_id > SLCAN_MAX_STANDARD_ID {
            return Err(invalid("can_id must be a standard 11-bit identifier (0x000-0x7FF)"));
        }

        if self.broadcast.period_ms > 60000 {
            return Err(invalid("period_ms must be between 0 and 60000"));
        }

        if self.broadcast.max_retry_count == 0 {
            return Err(invalid("max_retry_count must be greater than 0"));
        }

        if self.broadcast.tick_ms == 0 || self.broadcast.tick_ms > 1000 {
            return Err(invalid("tick_ms must be between 1 and 1000"));
        }

        for (name, value) in [
            ("recovery.watchdog_timeout_ms", self.recovery.watchdog_timeout_ms),
            ("console.watchdog_timeout_ms", self.console.watchdog_timeout_ms),
        ] {
            if value < 15 || value > 8000 {
                return Err(invalid(format!("{} must be between 15 and 8000", name)));
            }
        }

        // A tick must fit well inside the watchdog window or every tick risks a reset
        if self.broadcast.tick_ms * 2 > self.watchdog_timeout().as_millis() as u64 {
            return Err(invalid("tick_ms must be at most half of the active watchdog timeout"));
        }

        // A send blocks the loop for up to the reply timeout
        if self.broadcast.tick_ms + self.transport.reply_timeout_ms >= self.watchdog_timeout().as_millis() as u64 {
            return Err(invalid(
                "tick_ms plus reply_timeout_ms must stay below the active watchdog timeout",
            ));
        }

        if self.recovery.restart_delay_ms > 60000 {
            return Err(invalid("restart_delay_ms must be between 0 and 60000"));
        }

        if !["error", "warn", "info", "debug", "trace"].contains(&self.logging.level.as_str()) {
            return Err(invalid("log level must be one of: error, warn, info, debug, trace"));
        }

        Ok(())
    }
}

fn invalid(msg: impl std::fmt::Display) -> EmulatorError {
    EmulatorError::Config(toml::de::Error::custom(msg))
}
