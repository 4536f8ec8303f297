//! Controllable devices and the registry sensors bind against.
//!
//! A [`Device`] is one physical unit family (e.g. a power strip) owning its
//! connection; each of its sub-units is exposed as a [`PowerToggler`]. The
//! [`Registry`] is built once at startup and hands out borrowed togglers, so a
//! sensor can never outlive the device it switches.

mod kasa;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DeviceInfo;
use crate::sensors::Sensor;

/// Result type for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors raised by a device family.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error(transparent)]
    Hardware(#[from] penny_hw::Error),

    #[error("invalid index {id:?}: {reason}")]
    InvalidIndex { id: String, reason: String },

    #[error("index {index} out of bounds ({count} outlets)")]
    IndexOutOfBounds { index: usize, count: usize },
}

/// Errors raised while binding a sensor to its device.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("Device {0} not found")]
    DeviceNotFound(String),

    #[error("Device {device} has unsupported kind {kind:?}")]
    UnsupportedDevice { device: String, kind: String },

    #[error("Subdevice {subdevice:?} of {device}: {source}")]
    Subdevice {
        device: String,
        subdevice: String,
        source: DeviceError,
    },
}

/// Errors raised while building the registry.
#[derive(Error, Debug)]
#[error("Error initializing device {device}: {source}")]
pub struct RegistryError {
    device: String,
    source: DeviceError,
}

/// Binary power control over one outlet.
#[async_trait]
pub trait PowerToggler: Send + Sync {
    /// Queries the current relay state from the device.
    async fn is_on(&self) -> Result<bool>;

    /// Switches power on.
    async fn on(&self) -> Result<()>;

    /// Switches power off.
    async fn off(&self) -> Result<()>;
}

/// A unit family that owns a connection and exposes sub-units.
pub trait Device: Send + Sync {
    /// Resolves a sub-unit identifier to its toggler.
    fn subdevice(&self, id: &str) -> Result<&dyn PowerToggler>;
}

/// Supported device families, keyed by the config `kind` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    /// TP-Link Kasa multi-outlet power strip.
    Kasa,
}

impl DeviceFamily {
    /// Looks up a family by kind, matched exactly. Unknown kinds yield `None`.
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "kasa" => Some(DeviceFamily::Kasa),
            _ => None,
        }
    }

    /// Opens a device of this family.
    pub async fn connect(
        self,
        info: &DeviceInfo,
        options: &DeviceOptions,
    ) -> Result<Box<dyn Device>> {
        match self {
            DeviceFamily::Kasa => Ok(Box::new(kasa::connect(info, options).await?)),
        }
    }
}

/// Settings shared by all device connections.
#[derive(Debug, Clone, Copy)]
pub struct DeviceOptions {
    /// Upper bound for a single device request.
    pub timeout: Duration,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            timeout: penny_hw::kasa::DEFAULT_TIMEOUT,
        }
    }
}

enum Slot {
    Ready(Box<dyn Device>),
    Unsupported(String),
}

/// Device name to live device mapping.
#[derive(Default)]
pub struct Registry {
    devices: HashMap<String, Slot>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects every configured device. Any connection failure aborts the
    /// whole build.
    pub async fn build(
        infos: &[DeviceInfo],
        options: &DeviceOptions,
    ) -> std::result::Result<Self, RegistryError> {
        let mut registry = Self::new();

        for info in infos {
            let Some(family) = DeviceFamily::from_kind(&info.kind) else {
                warn!(
                    "Device {} has unknown kind {:?}; sensors cannot bind to it",
                    info.name, info.kind
                );
                registry
                    .devices
                    .insert(info.name.clone(), Slot::Unsupported(info.kind.clone()));
                continue;
            };

            let device = family
                .connect(info, options)
                .await
                .map_err(|source| RegistryError {
                    device: info.name.clone(),
                    source,
                })?;
            info!("Device {} ({}) ready", info.name, info.kind);
            registry.insert(&info.name, device);
        }

        Ok(registry)
    }

    /// Adds a connected device under `name`.
    pub fn insert(&mut self, name: &str, device: Box<dyn Device>) {
        self.devices.insert(name.to_string(), Slot::Ready(device));
    }

    /// Number of configured devices, including unsupported ones.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if no device is configured.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Resolves the sensor's device and subdevice and attaches the toggler.
    /// Sensors that name no device are left unbound.
    pub fn bind<'r>(&'r self, sensor: &mut Sensor<'r>) -> std::result::Result<(), BindError> {
        let Some(name) = sensor.info().device.clone() else {
            return Ok(());
        };

        let device = match self.devices.get(&name) {
            Some(Slot::Ready(device)) => device,
            Some(Slot::Unsupported(kind)) => {
                return Err(BindError::UnsupportedDevice {
                    device: name,
                    kind: kind.clone(),
                })
            }
            None => return Err(BindError::DeviceNotFound(name)),
        };

        let subdevice = sensor.info().subdevice.clone().unwrap_or_default();
        let toggler = device
            .subdevice(&subdevice)
            .map_err(|source| BindError::Subdevice {
                device: name,
                subdevice,
                source,
            })?;

        sensor.attach(toggler);
        Ok(())
    }
}

/// Parses a sub-unit id as an index into `count` outlets.
pub fn outlet_index(id: &str, count: usize) -> Result<usize> {
    let index: usize = id.trim().parse().map_err(|e: std::num::ParseIntError| {
        DeviceError::InvalidIndex {
            id: id.to_string(),
            reason: e.to_string(),
        }
    })?;
    if index >= count {
        return Err(DeviceError::IndexOutOfBounds { index, count });
    }
    Ok(index)
}
