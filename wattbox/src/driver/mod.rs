//! High-level driver for WattBox devices.
//!
//! The driver layer provides the main API: typed queries, outlet control
//! and full device snapshots, over either the Telnet integration protocol
//! or the HTTP interface.

mod builder;
mod http;
mod telnet;
mod wattbox;

pub use builder::{ConnectionConfig, DriverBuilder, Protocol};
pub use http::HttpDriver;
pub use telnet::TelnetDriver;
pub use wattbox::WattBox;

use std::future::Future;

use crate::error::{Result, ValidationError};
use crate::model::{
    OutletAction, OutletInfo, OutletMode, OutletPower, PowerStatus, SystemInfo, UpsStatus,
    WattBoxDevice,
};

/// Outlet count assumed when the device cannot tell us.
pub const DEFAULT_OUTLET_COUNT: usize = 8;

/// Longest reset or power-on delay the device accepts, in seconds.
pub const MAX_DELAY_SECS: u32 = 600;

/// Check a 1-based outlet index; `0` addresses every outlet when
/// `allow_all` is set.
pub(crate) fn validate_outlet(
    index: usize,
    outlet_count: usize,
    allow_all: bool,
) -> std::result::Result<(), ValidationError> {
    if (index == 0 && allow_all) || (1..=outlet_count).contains(&index) {
        Ok(())
    } else {
        Err(ValidationError::InvalidOutlet {
            index,
            outlet_count,
        })
    }
}

pub(crate) fn validate_delay(delay: u32) -> std::result::Result<(), ValidationError> {
    if (1..=MAX_DELAY_SECS).contains(&delay) {
        Ok(())
    } else {
        Err(ValidationError::InvalidDelay(delay))
    }
}

/// Trait for WattBox drivers.
///
/// Outlet indexes are 1-based; control operations accept `0` for all
/// outlets. Control operations return `Ok(false)` when the device refuses
/// the request and `Err` when it could not be asked.
pub trait Driver: Send + Sync {
    /// Open the connection to the device.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the connection.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close and open again.
    fn reconnect(&mut self) -> impl Future<Output = Result<()>> + Send {
        async move {
            self.close().await?;
            self.open().await
        }
    }

    /// Check if the driver is connected.
    fn is_open(&self) -> bool;

    /// Firmware, hostname, service tag, model and outlet count.
    fn get_system_info(&self) -> impl Future<Output = Result<SystemInfo>> + Send;

    fn get_outlet_count(&self) -> impl Future<Output = Result<usize>> + Send;

    /// Power state of every outlet, in index order.
    ///
    /// Degrades to an empty list when the device keeps answering with
    /// something unusable.
    fn get_outlet_status(&self) -> impl Future<Output = Result<Vec<bool>>> + Send;

    /// Outlet names, in index order.
    fn get_outlet_names(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Telemetry for one outlet; `None` when unsupported.
    fn get_outlet_power_status(
        &self,
        index: usize,
    ) -> impl Future<Output = Result<Option<OutletPower>>> + Send;

    /// Exactly `outlet_count` outlets with names and status, plus
    /// telemetry where available when `include_power` is set.
    fn get_all_outlets_info(
        &self,
        include_power: bool,
    ) -> impl Future<Output = Result<Vec<OutletInfo>>> + Send;

    fn set_outlet(
        &self,
        index: usize,
        action: OutletAction,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn turn_on_outlet(&self, index: usize) -> impl Future<Output = Result<bool>> + Send {
        self.set_outlet(index, OutletAction::On)
    }

    fn turn_off_outlet(&self, index: usize) -> impl Future<Output = Result<bool>> + Send {
        self.set_outlet(index, OutletAction::Off)
    }

    fn toggle_outlet(&self, index: usize) -> impl Future<Output = Result<bool>> + Send {
        self.set_outlet(index, OutletAction::Toggle)
    }

    /// Power-cycle one outlet, optionally with a delay in seconds.
    fn reset_outlet(
        &self,
        index: usize,
        delay: Option<u32>,
    ) -> impl Future<Output = Result<bool>> + Send {
        self.set_outlet(index, OutletAction::Reset(delay))
    }

    fn reset_all_outlets(&self, delay: Option<u32>) -> impl Future<Output = Result<bool>> + Send {
        self.set_outlet(0, OutletAction::Reset(delay))
    }

    fn get_power_status(&self) -> impl Future<Output = Result<Option<PowerStatus>>> + Send;

    fn get_ups_connection_status(&self) -> impl Future<Output = Result<Option<bool>>> + Send;

    fn get_ups_status(&self) -> impl Future<Output = Result<Option<UpsStatus>>> + Send;

    fn get_auto_reboot_status(&self) -> impl Future<Output = Result<Option<bool>>> + Send;

    fn set_auto_reboot(&self, enabled: bool) -> impl Future<Output = Result<bool>> + Send;

    /// Complete snapshot.
    ///
    /// The last snapshot is served from cache unless `refresh` is set.
    /// Power and UPS fields are left empty when they cannot be read;
    /// connection failures always propagate.
    fn get_device_info(
        &self,
        refresh: bool,
        include_outlet_power: bool,
    ) -> impl Future<Output = Result<WattBoxDevice>> + Send;

    fn get_model(&self) -> impl Future<Output = Result<String>> + Send;

    fn get_firmware_version(&self) -> impl Future<Output = Result<String>> + Send;

    /// `true` if the device answers a trivial query.
    fn ping(&self) -> impl Future<Output = bool> + Send;

    /// Reboot the whole unit.
    fn reboot_device(&self) -> impl Future<Output = Result<bool>> + Send;

    fn set_outlet_name(
        &self,
        index: usize,
        name: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Rename every outlet at once; one name per outlet.
    fn set_outlet_names(&self, names: &[String]) -> impl Future<Output = Result<bool>> + Send;

    /// Delay before an outlet powers on after a power loss, 1-600 s.
    fn set_outlet_power_on_delay(
        &self,
        index: usize,
        delay: u32,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn set_outlet_mode(
        &self,
        index: usize,
        mode: OutletMode,
    ) -> impl Future<Output = Result<bool>> + Send;
}
