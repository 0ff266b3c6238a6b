//! Driver for the WattBox web interface.
//!
//! Every query reads the full `wattbox_info.xml` status document; control
//! goes through `control.cgi`. The web interface has no per-outlet
//! telemetry and no way to rename outlets, change modes or delays, or
//! reboot the unit; those operations fail with
//! [`ValidationError::Unsupported`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use super::{DEFAULT_OUTLET_COUNT, Driver, validate_delay, validate_outlet};
use crate::error::{AuthError, DriverError, Error, ParseError, Result, TransportError, ValidationError};
use crate::model::{
    OutletAction, OutletInfo, OutletMode, OutletPower, PowerStatus, SystemInfo, UpsStatus,
    WattBoxDevice,
};
use crate::protocol::StatusDocument;
use crate::protocol::parser;
use crate::retry::RetryPolicy;
use crate::transport::{HttpConfig, HttpResponse, HttpTransport};

const STATUS_PATH: &str = "/wattbox_info.xml";
const CONTROL_PATH: &str = "/control.cgi";

/// `control.cgi` command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlCode {
    Off = 0,
    On = 1,
    Reset = 3,
    AutoRebootOn = 4,
    AutoRebootOff = 5,
}

#[derive(Debug, Default)]
struct DriverCache {
    system_info: Option<SystemInfo>,
    device: Option<WattBoxDevice>,
}

/// WattBox driver speaking HTTP with basic auth.
pub struct HttpDriver {
    config: HttpConfig,
    transport: Option<HttpTransport>,
    retry: RetryPolicy,
    cache: Mutex<DriverCache>,
}

impl HttpDriver {
    /// Create a new driver. Call `open()` to connect.
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            transport: None,
            retry: RetryPolicy::default(),
            cache: Mutex::new(DriverCache::default()),
        }
    }

    /// Retry policy for reading outlet status.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn cache(&self) -> MutexGuard<'_, DriverCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transport(&self) -> Result<&HttpTransport> {
        self.transport
            .as_ref()
            .ok_or_else(|| DriverError::NotConnected.into())
    }

    fn check_auth(&self, response: &HttpResponse) -> Result<()> {
        if response.is_unauthorized() {
            warn!("device rejected credentials for '{}'", self.config.username);
            return Err(AuthError::Rejected {
                user: self.config.username.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Fetch and parse the status document.
    ///
    /// Only the document structure is checked; system info is cached when
    /// it can be read from it.
    pub async fn status(&self) -> Result<StatusDocument> {
        let transport = self.transport()?;
        let response = transport.get(STATUS_PATH, &[]).await?;
        self.check_auth(&response)?;
        if !response.is_success() {
            return Err(TransportError::HttpStatus {
                status: response.status,
                url: format!("{}{}", transport.base_url(), STATUS_PATH),
            }
            .into());
        }

        let document = StatusDocument::parse(&response.body)?;
        match Self::system_info_from(&document) {
            Ok(info) => self.cache().system_info = Some(info),
            Err(e) => debug!("system info not in status document: {}", e),
        }
        Ok(document)
    }

    /// System info with the outlet count taken from the model name, or
    /// [`DEFAULT_OUTLET_COUNT`], when the document lists no outlets.
    fn system_info_from(document: &StatusDocument) -> std::result::Result<SystemInfo, ParseError> {
        let mut info = document.system_info()?;
        if info.outlet_count == 0 {
            info.outlet_count =
                parser::outlet_count_from_model(&info.model).unwrap_or(DEFAULT_OUTLET_COUNT);
            warn!("status document lists no outlets, assuming {}", info.outlet_count);
        }
        Ok(info)
    }

    /// Exactly `count` outlets from one document.
    ///
    /// Unreadable outlet lists fall back to the retried status query and
    /// "Outlet N" names.
    async fn outlets_from(
        &self,
        document: &StatusDocument,
        count: usize,
    ) -> Result<Vec<OutletInfo>> {
        let mut outlets = Self::optional(document.outlets(), "outlet details").unwrap_or_default();
        outlets.truncate(count);
        if outlets.len() == count {
            return Ok(outlets);
        }

        let statuses = match document.outlet_status() {
            Ok(statuses) => statuses,
            Err(_) => self.get_outlet_status().await?,
        };
        let names = document.list("outlet_name");
        for index in outlets.len() + 1..=count {
            let name = names
                .get(index - 1)
                .filter(|n| !n.is_empty())
                .cloned()
                .unwrap_or_else(|| OutletInfo::default_name(index));
            let status = statuses.get(index - 1).copied().unwrap_or(false);
            outlets.push(OutletInfo::new(index, name, status));
        }
        Ok(outlets)
    }

    /// Send one `control.cgi` request; any non-success status is `false`.
    async fn control(&self, outlet: usize, code: ControlCode) -> Result<bool> {
        let response = self
            .transport()?
            .get(
                CONTROL_PATH,
                &[
                    ("outlet", outlet.to_string()),
                    ("command", (code as u8).to_string()),
                ],
            )
            .await?;
        self.check_auth(&response)?;

        if !response.is_success() {
            warn!(
                "control {:?} on outlet {} answered HTTP {}",
                code, outlet, response.status
            );
        }
        Ok(response.is_success())
    }

    async fn system_info(&self) -> Result<SystemInfo> {
        let cached = self.cache().system_info.clone();
        match cached {
            Some(info) => Ok(info),
            None => Ok(Self::system_info_from(&self.status().await?)?),
        }
    }

    /// Parse failures in optional fields become absent values.
    fn optional<T>(
        result: std::result::Result<T, ParseError>,
        what: &str,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("{} not available: {}", what, e);
                None
            }
        }
    }
}

impl Driver for HttpDriver {
    async fn open(&mut self) -> Result<()> {
        if self.transport.is_some() {
            return Err(DriverError::AlreadyConnected.into());
        }
        self.transport = Some(HttpTransport::new(self.config.clone())?);

        // credentials are only checked on the first request
        if let Err(e) = self.status().await {
            self.transport = None;
            return Err(e);
        }
        info!("connected to WattBox at {}", self.config.base_url());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.transport.take().is_some() {
            debug!("closed {}", self.config.base_url());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    async fn get_system_info(&self) -> Result<SystemInfo> {
        Ok(Self::system_info_from(&self.status().await?)?)
    }

    async fn get_outlet_count(&self) -> Result<usize> {
        Ok(self.system_info().await?.outlet_count)
    }

    async fn get_outlet_status(&self) -> Result<Vec<bool>> {
        let result = self
            .retry
            .run("outlet status", || async move {
                let document = self.status().await?;
                document.outlet_status().map_err(Error::from)
            })
            .await;

        match result {
            Ok(statuses) => Ok(statuses),
            Err(e) if e.is_connection_lost() => Err(e),
            Err(e) => {
                warn!("outlet status unavailable, reporting none: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn get_outlet_names(&self) -> Result<Vec<String>> {
        let document = self.status().await?;
        let count = self.get_outlet_count().await?;
        let names = document.list("outlet_name");
        Ok((1..=count)
            .map(|index| {
                names
                    .get(index - 1)
                    .filter(|n| !n.is_empty())
                    .cloned()
                    .unwrap_or_else(|| OutletInfo::default_name(index))
            })
            .collect())
    }

    async fn get_outlet_power_status(&self, index: usize) -> Result<Option<OutletPower>> {
        let count = self.get_outlet_count().await?;
        validate_outlet(index, count, false)?;
        debug!("per-outlet telemetry is not available over HTTP");
        Ok(None)
    }

    async fn get_all_outlets_info(&self, _include_power: bool) -> Result<Vec<OutletInfo>> {
        let document = self.status().await?;
        let count = Self::system_info_from(&document)?.outlet_count;
        self.outlets_from(&document, count).await
    }

    async fn set_outlet(&self, index: usize, action: OutletAction) -> Result<bool> {
        let count = self.get_outlet_count().await?;
        validate_outlet(index, count, true)?;
        if let Some(delay) = action.delay() {
            validate_delay(delay)?;
            warn!("reset delay of {}s ignored over HTTP", delay);
        }

        let code = match action {
            OutletAction::On => ControlCode::On,
            OutletAction::Off => ControlCode::Off,
            OutletAction::Reset(_) => ControlCode::Reset,
            OutletAction::Toggle if index == 0 => {
                return Err(ValidationError::Unsupported("toggling all outlets over HTTP").into());
            }
            OutletAction::Toggle => {
                let statuses = self.get_outlet_status().await?;
                match statuses.get(index - 1) {
                    Some(true) => ControlCode::Off,
                    Some(false) => ControlCode::On,
                    None => {
                        warn!("cannot toggle outlet {}: status unknown", index);
                        return Ok(false);
                    }
                }
            }
        };

        info!("outlet {}: {}", index, action);
        self.control(index, code).await
    }

    async fn get_power_status(&self) -> Result<Option<PowerStatus>> {
        let document = self.status().await?;
        Ok(Self::optional(document.power_status(), "power status").flatten())
    }

    async fn get_ups_connection_status(&self) -> Result<Option<bool>> {
        let document = self.status().await?;
        Ok(Self::optional(document.ups_connected(), "UPS connection"))
    }

    async fn get_ups_status(&self) -> Result<Option<UpsStatus>> {
        let document = self.status().await?;
        Ok(Self::optional(document.ups_status(), "UPS status").flatten())
    }

    async fn get_auto_reboot_status(&self) -> Result<Option<bool>> {
        let document = self.status().await?;
        Ok(Self::optional(document.auto_reboot(), "auto reboot"))
    }

    async fn set_auto_reboot(&self, enabled: bool) -> Result<bool> {
        let code = if enabled {
            ControlCode::AutoRebootOn
        } else {
            ControlCode::AutoRebootOff
        };
        self.control(0, code).await
    }

    async fn get_device_info(
        &self,
        refresh: bool,
        _include_outlet_power: bool,
    ) -> Result<WattBoxDevice> {
        if !refresh {
            let cached = self.cache().device.clone();
            if let Some(device) = cached {
                return Ok(device);
            }
        }

        let document = self.status().await?;
        let system_info = Self::system_info_from(&document)?;
        let outlets = self.outlets_from(&document, system_info.outlet_count).await?;
        let ups_connected = Self::optional(document.ups_connected(), "UPS connection")
            .unwrap_or(false);

        let device = WattBoxDevice {
            system_info,
            outlets,
            power_status: Self::optional(document.power_status(), "power status").flatten(),
            ups_status: if ups_connected {
                Self::optional(document.ups_status(), "UPS status").flatten()
            } else {
                None
            },
            ups_connected,
            auto_reboot_enabled: Self::optional(document.auto_reboot(), "auto reboot")
                .unwrap_or(false),
        };
        self.cache().device = Some(device.clone());
        Ok(device)
    }

    async fn get_model(&self) -> Result<String> {
        Ok(self.system_info().await?.model)
    }

    async fn get_firmware_version(&self) -> Result<String> {
        Ok(self.system_info().await?.firmware)
    }

    async fn ping(&self) -> bool {
        match self.status().await {
            Ok(_) => true,
            Err(e) => {
                debug!("ping failed: {}", e);
                false
            }
        }
    }

    async fn reboot_device(&self) -> Result<bool> {
        Err(ValidationError::Unsupported("device reboot over HTTP").into())
    }

    async fn set_outlet_name(&self, _index: usize, _name: &str) -> Result<bool> {
        Err(ValidationError::Unsupported("outlet names over HTTP").into())
    }

    async fn set_outlet_names(&self, _names: &[String]) -> Result<bool> {
        Err(ValidationError::Unsupported("outlet names over HTTP").into())
    }

    async fn set_outlet_power_on_delay(&self, _index: usize, _delay: u32) -> Result<bool> {
        Err(ValidationError::Unsupported("power-on delay over HTTP").into())
    }

    async fn set_outlet_mode(&self, _index: usize, _mode: OutletMode) -> Result<bool> {
        Err(ValidationError::Unsupported("outlet mode over HTTP").into())
    }
}
