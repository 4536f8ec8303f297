//! Kasa power strips as a device family.

use async_trait::async_trait;
use penny_hw::kasa::{Outlet, PowerStrip};
use tracing::debug;

use super::{outlet_index, Device, DeviceOptions, PowerToggler, Result};
use crate::config::DeviceInfo;

/// Connects to the strip named by `info.connection`.
pub async fn connect(info: &DeviceInfo, options: &DeviceOptions) -> Result<PowerStrip> {
    let strip = PowerStrip::connect(&info.connection, options.timeout).await?;
    debug!(
        "Kasa {} {:?} at {}: {} outlets",
        strip.model(),
        strip.alias(),
        strip.addr(),
        strip.outlets().len()
    );
    for outlet in strip.outlets() {
        debug!("  outlet {} {:?} ({})", outlet.index(), outlet.alias(), outlet.id());
    }
    Ok(strip)
}

impl Device for PowerStrip {
    fn subdevice(&self, id: &str) -> Result<&dyn PowerToggler> {
        let index = outlet_index(id, self.outlets().len())?;
        Ok(&self.outlets()[index])
    }
}

#[async_trait]
impl PowerToggler for Outlet {
    async fn is_on(&self) -> Result<bool> {
        Ok(Outlet::is_on(self).await?)
    }

    async fn on(&self) -> Result<()> {
        Ok(self.turn_on().await?)
    }

    async fn off(&self) -> Result<()> {
        Ok(self.turn_off().await?)
    }
}
