//! Transport-agnostic driver.

use super::{Driver, HttpDriver, TelnetDriver};
use crate::error::Result;
use crate::model::{
    OutletAction, OutletInfo, OutletMode, OutletPower, PowerStatus, SystemInfo, UpsStatus,
    WattBoxDevice,
};

/// A WattBox reached over whichever protocol the builder picked.
pub enum WattBox {
    Telnet(TelnetDriver),
    Http(HttpDriver),
}

macro_rules! delegate {
    ($self:ident, $driver:ident => $call:expr) => {
        match $self {
            WattBox::Telnet($driver) => $call,
            WattBox::Http($driver) => $call,
        }
    };
}

impl WattBox {
    /// Host this driver talks to.
    pub fn host(&self) -> &str {
        match self {
            WattBox::Telnet(d) => &d.config().host,
            WattBox::Http(d) => &d.config().host,
        }
    }
}

impl From<TelnetDriver> for WattBox {
    fn from(driver: TelnetDriver) -> Self {
        WattBox::Telnet(driver)
    }
}

impl From<HttpDriver> for WattBox {
    fn from(driver: HttpDriver) -> Self {
        WattBox::Http(driver)
    }
}

impl Driver for WattBox {
    async fn open(&mut self) -> Result<()> {
        delegate!(self, d => d.open().await)
    }

    async fn close(&mut self) -> Result<()> {
        delegate!(self, d => d.close().await)
    }

    fn is_open(&self) -> bool {
        delegate!(self, d => d.is_open())
    }

    async fn get_system_info(&self) -> Result<SystemInfo> {
        delegate!(self, d => d.get_system_info().await)
    }

    async fn get_outlet_count(&self) -> Result<usize> {
        delegate!(self, d => d.get_outlet_count().await)
    }

    async fn get_outlet_status(&self) -> Result<Vec<bool>> {
        delegate!(self, d => d.get_outlet_status().await)
    }

    async fn get_outlet_names(&self) -> Result<Vec<String>> {
        delegate!(self, d => d.get_outlet_names().await)
    }

    async fn get_outlet_power_status(&self, index: usize) -> Result<Option<OutletPower>> {
        delegate!(self, d => d.get_outlet_power_status(index).await)
    }

    async fn get_all_outlets_info(&self, include_power: bool) -> Result<Vec<OutletInfo>> {
        delegate!(self, d => d.get_all_outlets_info(include_power).await)
    }

    async fn set_outlet(&self, index: usize, action: OutletAction) -> Result<bool> {
        delegate!(self, d => d.set_outlet(index, action).await)
    }

    async fn get_power_status(&self) -> Result<Option<PowerStatus>> {
        delegate!(self, d => d.get_power_status().await)
    }

    async fn get_ups_connection_status(&self) -> Result<Option<bool>> {
        delegate!(self, d => d.get_ups_connection_status().await)
    }

    async fn get_ups_status(&self) -> Result<Option<UpsStatus>> {
        delegate!(self, d => d.get_ups_status().await)
    }

    async fn get_auto_reboot_status(&self) -> Result<Option<bool>> {
        delegate!(self, d => d.get_auto_reboot_status().await)
    }

    async fn set_auto_reboot(&self, enabled: bool) -> Result<bool> {
        delegate!(self, d => d.set_auto_reboot(enabled).await)
    }

    async fn get_device_info(
        &self,
        refresh: bool,
        include_outlet_power: bool,
    ) -> Result<WattBoxDevice> {
        delegate!(self, d => d.get_device_info(refresh, include_outlet_power).await)
    }

    async fn get_model(&self) -> Result<String> {
        delegate!(self, d => d.get_model().await)
    }

    async fn get_firmware_version(&self) -> Result<String> {
        delegate!(self, d => d.get_firmware_version().await)
    }

    async fn ping(&self) -> bool {
        delegate!(self, d => d.ping().await)
    }

    async fn reboot_device(&self) -> Result<bool> {
        delegate!(self, d => d.reboot_device().await)
    }

    async fn set_outlet_name(&self, index: usize, name: &str) -> Result<bool> {
        delegate!(self, d => d.set_outlet_name(index, name).await)
    }

    async fn set_outlet_names(&self, names: &[String]) -> Result<bool> {
        delegate!(self, d => d.set_outlet_names(names).await)
    }

    async fn set_outlet_power_on_delay(&self, index: usize, delay: u32) -> Result<bool> {
        delegate!(self, d => d.set_outlet_power_on_delay(index, delay).await)
    }

    async fn set_outlet_mode(&self, index: usize, mode: OutletMode) -> Result<bool> {
        delegate!(self, d => d.set_outlet_mode(index, mode).await)
    }
}
