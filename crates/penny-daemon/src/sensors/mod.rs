//! Sensors and hysteresis control.
//!
//! Each sensor reads a value, publishes it, and (if bound to an outlet)
//! switches the outlet on below `target - range` and off above
//! `target + range`. Inside that dead band nothing happens.

mod kinds;

pub use kinds::{lookup, ValueReader};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::SensorInfo;
use crate::devices::{DeviceError, PowerToggler};
use crate::metrics::GaugeSink;

/// Errors raised by sensor construction and updates.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Unknown sensor kind: {0}")]
    UnknownKind(String),

    #[error(transparent)]
    Read(#[from] penny_hw::Error),

    #[error("device: {0}")]
    Device(#[from] DeviceError),
}

/// Device switch issued by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    On,
    Off,
}

/// A configured sensor, optionally driving one outlet borrowed from the
/// device registry.
pub struct Sensor<'r> {
    info: SensorInfo,
    reader: ValueReader,
    device: Option<&'r dyn PowerToggler>,
}

impl<'r> Sensor<'r> {
    /// Creates an unbound sensor, resolving its reader from `info.kind`.
    pub fn new(info: SensorInfo) -> Result<Self, SensorError> {
        let reader =
            lookup(&info.kind).ok_or_else(|| SensorError::UnknownKind(info.kind.clone()))?;
        Ok(Self::with_reader(info, reader))
    }

    /// Creates an unbound sensor with an explicit reader.
    pub fn with_reader(info: SensorInfo, reader: ValueReader) -> Self {
        Self {
            info,
            reader,
            device: None,
        }
    }

    /// Attaches the outlet this sensor drives.
    pub(crate) fn attach(&mut self, device: &'r dyn PowerToggler) {
        self.device = Some(device);
    }

    pub fn info(&self) -> &SensorInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Returns true if an outlet is attached.
    pub fn is_bound(&self) -> bool {
        self.device.is_some()
    }

    /// Lower edge of the dead band.
    pub fn low(&self) -> f64 {
        self.info.target - self.info.range
    }

    /// Upper edge of the dead band.
    pub fn high(&self) -> f64 {
        self.info.target + self.info.range
    }

    /// Reads the current value.
    pub fn read(&self) -> Result<f64, SensorError> {
        Ok((self.reader)(&self.info.read_from)?)
    }

    /// Reads, publishes and regulates. A failed read publishes nothing and
    /// leaves the device alone.
    pub async fn update(
        &self,
        metrics: &dyn GaugeSink,
    ) -> Result<Option<Transition>, SensorError> {
        let value = self.read()?;
        metrics.set_gauge(&self.info.name, value);
        debug!("{} read {}", self.info.name, value);

        self.regulate(value).await
    }

    /// Applies the hysteresis rule to `value` against the live device state.
    pub async fn regulate(&self, value: f64) -> Result<Option<Transition>, SensorError> {
        let Some(device) = self.device else {
            return Ok(None);
        };

        let on = device.is_on().await?;
        if !on && value < self.low() {
            info!("{} read {} - turning on.", self.info.name, value);
            device.on().await?;
            Ok(Some(Transition::On))
        } else if on && value > self.high() {
            info!("{} read {} - turning off.", self.info.name, value);
            device.off().await?;
            Ok(Some(Transition::Off))
        } else {
            Ok(None)
        }
    }
}
