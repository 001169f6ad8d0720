//! # Monitor Configuration
//!
//! This module defines the configuration for the meter poller, the sample
//! thresholds, the defrost detector and the event log.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [sampler]
//! interval_secs = 10
//! max_fail = 100
//!
//! [devices]
//! condenser = "condenser.lan"
//! evaporator = "evaporator.lan"
//!
//! [thresholds]
//! compressor_on_w = 1000.0
//! heat_strip_on_w = 2000.0
//! evaporator_off_w = 50.0
//!
//! [defrost]
//! reheat_timeout_secs = 300
//! ```
//!
//! Every section and field is optional; missing values take the defaults
//! used in the field deployment.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::sample::Thresholds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub defrost: DefrostConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
}

/// Polling cadence and failure policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SamplerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Interval used in `--detail` mode.
    #[serde(default = "default_detail_interval_secs")]
    pub detail_interval_secs: u64,
    /// Consecutive failures tolerated per device before giving up.
    #[serde(default = "default_max_fail")]
    pub max_fail: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            detail_interval_secs: default_detail_interval_secs(),
            max_fail: default_max_fail(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Hostnames of the two power meters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DevicesConfig {
    #[serde(default = "default_condenser_host")]
    pub condenser: String,
    #[serde(default = "default_evaporator_host")]
    pub evaporator: String,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            condenser: default_condenser_host(),
            evaporator: default_evaporator_host(),
        }
    }
}

/// Defrost detector timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DefrostConfig {
    #[serde(default = "default_reheat_timeout_secs")]
    pub reheat_timeout_secs: u64,
}

impl Default for DefrostConfig {
    fn default() -> Self {
        Self {
            reheat_timeout_secs: default_reheat_timeout_secs(),
        }
    }
}

impl DefrostConfig {
    pub fn reheat_timeout(&self) -> Duration {
        Duration::from_secs(self.reheat_timeout_secs)
    }
}

/// Event log destinations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_true")]
    pub stdout: bool,
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
    /// Rotate the log file once it grows past this size.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// Number of rotated files to keep.
    #[serde(default = "default_keep")]
    pub keep: usize,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            file: default_log_file(),
            max_bytes: default_max_bytes(),
            keep: default_keep(),
            level: default_level(),
        }
    }
}

/// Power activity reporting.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActivityConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_activity_on_w")]
    pub on_w: f64,
    #[serde(default = "default_activity_off_w")]
    pub off_w: f64,
    /// Relative band around the previous reading that is not a change.
    #[serde(default = "default_change_ratio")]
    pub change_ratio: f64,
    /// Keep reporting for this long after the last power change.
    #[serde(default = "default_quiet_secs")]
    pub quiet_secs: u64,
    /// Report at least this often while a device is running.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            on_w: default_activity_on_w(),
            off_w: default_activity_off_w(),
            change_ratio: default_change_ratio(),
            quiet_secs: default_quiet_secs(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl Config {
    /// Reject values the sampler or detector cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.sampler.interval_secs == 0 || self.sampler.detail_interval_secs == 0 {
            return invalid("sample interval must be > 0");
        }
        if self.sampler.max_fail == 0 {
            return invalid("max_fail must be > 0");
        }
        if self.devices.condenser.trim().is_empty() || self.devices.evaporator.trim().is_empty() {
            return invalid("device hostnames must not be empty");
        }
        let t = &self.thresholds;
        let watts = [t.compressor_on_w, t.heat_strip_on_w, t.evaporator_off_w];
        if watts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return invalid("thresholds must be finite and not negative");
        }
        if t.heat_strip_on_w <= t.evaporator_off_w {
            return invalid("heat_strip_on_w must be greater than evaporator_off_w");
        }
        if self.defrost.reheat_timeout_secs == 0 {
            return invalid("reheat_timeout_secs must be > 0");
        }
        let a = &self.activity;
        if !a.on_w.is_finite() || !(a.off_w < a.on_w) {
            return invalid("activity off_w must be lower than on_w");
        }
        if !(a.change_ratio > 0.0 && a.change_ratio < 1.0) {
            return invalid("activity change_ratio must be between 0 and 1");
        }
        Ok(())
    }
}

// Default value functions
fn default_interval_secs() -> u64 { 10 }
fn default_detail_interval_secs() -> u64 { 5 }
fn default_max_fail() -> u32 { 100 }
fn default_request_timeout_ms() -> u64 { 2000 }
fn default_condenser_host() -> String { "condenser.lan".to_string() }
fn default_evaporator_host() -> String { "evaporator.lan".to_string() }
fn default_reheat_timeout_secs() -> u64 { 300 }
fn default_true() -> bool { true }
fn default_log_file() -> Option<String> { Some("defrost.log".to_string()) }
fn default_max_bytes() -> u64 { 1024 * 1024 }
fn default_keep() -> usize { 5 }
fn default_level() -> String { "info".to_string() }
fn default_activity_on_w() -> f64 { 50.0 }
fn default_activity_off_w() -> f64 { 20.0 }
fn default_change_ratio() -> f64 { 0.2 }
fn default_quiet_secs() -> u64 { 30 }
fn default_heartbeat_secs() -> u64 { 300 }

/// Load and validate configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let config: Config = match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                return Err(ConfigError::Toml(e));
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.sampler.interval_secs, 10);
        assert_eq!(config.sampler.detail_interval_secs, 5);
        assert_eq!(config.sampler.max_fail, 100);
        assert_eq!(config.devices.condenser, "condenser.lan");
        assert_eq!(config.devices.evaporator, "evaporator.lan");
        assert_eq!(config.thresholds.compressor_on_w, 1000.0);
        assert_eq!(config.thresholds.heat_strip_on_w, 2000.0);
        assert_eq!(config.thresholds.evaporator_off_w, 50.0);
        assert_eq!(config.defrost.reheat_timeout(), Duration::from_secs(300));
        assert_eq!(config.log.file.as_deref(), Some("defrost.log"));
        assert!(!config.activity.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("monitor.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[sampler]\ninterval_secs = 30\n\n[devices]\ncondenser = 'outdoor.lan'").unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.sampler.interval_secs, 30);
        assert_eq!(config.devices.condenser, "outdoor.lan");
        // Defaults for missing fields
        assert_eq!(config.sampler.max_fail, 100);
        assert_eq!(config.devices.evaporator, "evaporator.lan");
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_overlapping_evaporator_thresholds_rejected() {
        let toml = r#"
        [thresholds]
        heat_strip_on_w = 40.0
        evaporator_off_w = 50.0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.sampler.interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_activity_section_parsing() {
        let toml = r#"
        [activity]
        enabled = true
        quiet_secs = 60
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.activity.enabled);
        assert_eq!(config.activity.quiet_secs, 60);
        assert_eq!(config.activity.on_w, 50.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_demo_config_matches_defaults() {
        let config: Config = toml::from_str(include_str!("../demos/defrost.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sampler.request_timeout(), Duration::from_millis(2000));
        assert_eq!(config.log.max_bytes, Config::default().log.max_bytes);
        assert_eq!(config.activity.heartbeat_secs, 300);
    }

    #[test]
    fn test_nan_values_rejected() {
        let mut config = Config::default();
        config.activity.change_ratio = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.thresholds.compressor_on_w = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.thresholds.heat_strip_on_w = f64::INFINITY;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let toml = "[activity]\noff_w = nan\n";
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
