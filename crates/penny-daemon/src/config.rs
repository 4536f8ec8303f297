//! Configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors found while validating a loaded configuration.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("Interval must be greater than zero")]
    ZeroInterval,

    #[error("Device timeout must be greater than zero")]
    ZeroDeviceTimeout,

    #[error("Duplicate sensor name: {0}")]
    DuplicateSensor(String),

    #[error("Duplicate device name: {0}")]
    DuplicateDevice(String),

    #[error("Sensor {sensor} has invalid range {range} (must be >= 0)")]
    InvalidRange { sensor: String, range: f64 },

    #[error("Sensor {0} has a non-finite target")]
    InvalidTarget(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Control loop period as a duration string (e.g. "30s", "1m30s")
    pub interval: String,

    /// Prometheus listen address (e.g. "0.0.0.0:8080" or ":8080")
    #[serde(default)]
    pub metrics_address: Option<String>,

    /// Per-request timeout for device I/O
    #[serde(default = "default_device_timeout")]
    pub device_timeout: String,

    /// Controllable devices
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,

    /// Sensors, updated in this order on every tick
    #[serde(default)]
    pub sensors: Vec<SensorInfo>,
}

/// One physical device family instance and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub kind: String,
    pub connection: String,
}

/// One sensor and the outlet it regulates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorInfo {
    /// Unique name, used as the metric label
    pub name: String,

    /// Reader kind (e.g. "w1-therm")
    pub kind: String,

    /// Source the reader reads from, usually a file path
    pub read_from: String,

    pub target: f64,

    /// Half-width of the dead band around `target`
    #[serde(default)]
    pub range: f64,

    /// Device name; sensors without one only report metrics
    #[serde(default)]
    pub device: Option<String>,

    /// Sub-unit of the device, e.g. an outlet index
    #[serde(default)]
    pub subdevice: Option<String>,
}

fn default_device_timeout() -> String {
    "5s".to_string()
}

fn default_metrics_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl Config {
    /// Loads and validates configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        Self::parse(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse configuration")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Checks everything that can be checked without touching hardware.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.interval()?;
        self.device_timeout()?;

        let mut devices = HashSet::new();
        for device in &self.devices {
            if !devices.insert(device.name.as_str()) {
                return Err(ConfigError::DuplicateDevice(device.name.clone()));
            }
        }

        let mut sensors = HashSet::new();
        for sensor in &self.sensors {
            if !sensors.insert(sensor.name.as_str()) {
                return Err(ConfigError::DuplicateSensor(sensor.name.clone()));
            }
            if !sensor.target.is_finite() {
                return Err(ConfigError::InvalidTarget(sensor.name.clone()));
            }
            if !sensor.range.is_finite() || sensor.range < 0.0 {
                return Err(ConfigError::InvalidRange {
                    sensor: sensor.name.clone(),
                    range: sensor.range,
                });
            }
        }

        Ok(())
    }

    /// Control loop period.
    pub fn interval(&self) -> std::result::Result<Duration, ConfigError> {
        let interval = parse_duration(&self.interval)?;
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(interval)
    }

    /// Device request timeout.
    pub fn device_timeout(&self) -> std::result::Result<Duration, ConfigError> {
        let timeout = parse_duration(&self.device_timeout)?;
        if timeout.is_zero() {
            return Err(ConfigError::ZeroDeviceTimeout);
        }
        Ok(timeout)
    }

    /// Metrics listen address with the host filled in for ":port" forms.
    pub fn metrics_listen_address(&self) -> String {
        match self.metrics_address.as_deref().map(str::trim) {
            None | Some("") => default_metrics_address(),
            Some(addr) if addr.starts_with(':') => format!("0.0.0.0{}", addr),
            Some(addr) => addr.to_string(),
        }
    }
}

/// Parses a duration such as "300ms", "10s", "1m30s" or "1.5h".
///
/// Accepted units: ns, us (µs), ms, s, m, h. A bare "0" is also accepted.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());

    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut nanos = 0.0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_end == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..number_end].parse().map_err(|_| invalid())?;
        rest = &rest[number_end..];

        let unit_end = rest.find(is_number).unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        nanos += value * scale;
        rest = &rest[unit_end..];
    }

    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}
