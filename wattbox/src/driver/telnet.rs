//! Driver for the Telnet integration protocol.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::TcpStream;

use super::{DEFAULT_OUTLET_COUNT, Driver, validate_delay, validate_outlet};
use crate::channel::{Authenticator, CommandChannel};
use crate::error::{CommandError, DriverError, Error, ParseError, Result, ValidationError};
use crate::model::{
    OutletAction, OutletInfo, OutletMode, OutletPower, PowerStatus, SystemInfo, UpsStatus,
    WattBoxDevice,
};
use crate::protocol::commands::{self, *};
use crate::protocol::parser;
use crate::retry::RetryPolicy;
use crate::transport::{TcpTransport, TelnetConfig};

/// `!Reboot` answers only once the unit has started going down.
const REBOOT_TIMEOUT: Duration = Duration::from_secs(60);

/// Values remembered between calls; cleared by a refreshing snapshot.
#[derive(Debug, Default)]
struct DriverCache {
    outlet_count: Option<usize>,
    model: Option<String>,
    firmware: Option<String>,
    device: Option<WattBoxDevice>,
}

/// WattBox driver speaking the line protocol on port 23.
///
/// Queries take `&self`; concurrent callers are serialized by the
/// underlying [`CommandChannel`].
pub struct TelnetDriver {
    config: TelnetConfig,
    channel: Option<CommandChannel<TcpStream>>,
    retry: RetryPolicy,
    cache: Mutex<DriverCache>,
}

impl TelnetDriver {
    /// Create a new driver. Call `open()` to connect.
    pub fn new(config: TelnetConfig) -> Self {
        Self {
            config,
            channel: None,
            retry: RetryPolicy::default(),
            cache: Mutex::new(DriverCache::default()),
        }
    }

    /// Retry policy for the outlet status query.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &TelnetConfig {
        &self.config
    }

    fn cache(&self) -> MutexGuard<'_, DriverCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn channel(&self) -> Result<&CommandChannel<TcpStream>> {
        self.channel
            .as_ref()
            .ok_or_else(|| DriverError::NotConnected.into())
    }

    /// Send a raw command and return the response line.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        self.channel()?.execute(command).await
    }

    /// Query and parse.
    async fn fetch<T>(
        &self,
        command: &str,
        parse: impl FnOnce(&str) -> std::result::Result<T, ParseError>,
    ) -> Result<T> {
        let line = self.send_command(command).await?;
        Ok(parse(&line)?)
    }

    /// Control command; a device rejection is `Ok(false)`.
    async fn control(&self, command: &str, timeout: Option<Duration>) -> Result<bool> {
        let channel = self.channel()?;
        let result = match timeout {
            Some(timeout) => channel.execute_with_timeout(command, timeout).await,
            None => channel.execute(command).await,
        };
        match result {
            Ok(response) => {
                let ok = commands::is_success_response(&response);
                if !ok {
                    warn!("{} answered {:?}", command, response);
                }
                Ok(ok)
            }
            Err(Error::Command(CommandError::Rejected { response, .. })) => {
                warn!("{} rejected by device: {}", command, response);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Map rejected and unparsable answers to `None`.
    fn optional<T>(result: Result<T>, what: &str) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_unsupported() => {
                debug!("{} not available: {}", what, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`optional`](Self::optional), but also absorbs timeouts and
    /// anything else short of a lost connection.
    fn best_effort<T>(result: Result<Option<T>>, what: &str) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_connection_lost() => Err(e),
            Err(e) => {
                warn!("{} unavailable: {}", what, e);
                Ok(None)
            }
        }
    }

    /// Outlet count from `?OutletCount`, the model name, a live status
    /// query, or [`DEFAULT_OUTLET_COUNT`], in that order.
    async fn determine_outlet_count(&self, model: &str) -> Result<usize> {
        match self.fetch(OUTLET_COUNT, parser::parse_outlet_count).await {
            Ok(count) if count > 0 => return Ok(count),
            Ok(_) => debug!("device reported 0 outlets"),
            Err(e) if e.is_unsupported() => debug!("outlet count query unusable: {}", e),
            Err(e) => return Err(e),
        }

        if let Some(count) = parser::outlet_count_from_model(model) {
            debug!("outlet count {} from model {}", count, model);
            return Ok(count);
        }

        match self.fetch(OUTLET_STATUS, parser::parse_outlet_status).await {
            Ok(statuses) if !statuses.is_empty() => {
                debug!("outlet count {} from outlet status", statuses.len());
                return Ok(statuses.len());
            }
            Ok(_) => {}
            Err(e) if e.is_connection_lost() => return Err(e),
            Err(e) => debug!("outlet status unusable for counting: {}", e),
        }

        warn!(
            "could not determine outlet count, assuming {}",
            DEFAULT_OUTLET_COUNT
        );
        Ok(DEFAULT_OUTLET_COUNT)
    }

    fn invalidate(&self) {
        let mut cache = self.cache();
        cache.outlet_count = None;
        cache.model = None;
        cache.firmware = None;
    }
}

impl Driver for TelnetDriver {
    async fn open(&mut self) -> Result<()> {
        if self.channel.is_some() {
            return Err(DriverError::AlreadyConnected.into());
        }

        let transport = TcpTransport::connect(&self.config).await?;
        let mut auth = Authenticator::new(
            self.config.username.clone(),
            self.config.password.clone(),
            self.config.login.clone(),
        );
        let session = auth.authenticate(transport).await?;
        self.channel = Some(session.into_channel(self.config.command.clone()));

        info!("connected to WattBox at {}", self.config.socket_addr());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.take() {
            channel.close().await;
            debug!("disconnected from {}", self.config.socket_addr());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    async fn get_system_info(&self) -> Result<SystemInfo> {
        let firmware = self
            .fetch(FIRMWARE, |l| parser::parse_value(l, FIRMWARE))
            .await?;
        let hostname = self
            .fetch(HOSTNAME, |l| parser::parse_value(l, HOSTNAME))
            .await?;
        let service_tag = self
            .fetch(SERVICE_TAG, |l| parser::parse_value(l, SERVICE_TAG))
            .await?;
        let model = self.fetch(MODEL, |l| parser::parse_value(l, MODEL)).await?;
        let outlet_count = self.determine_outlet_count(&model).await?;

        {
            let mut cache = self.cache();
            cache.outlet_count = Some(outlet_count);
            cache.model = Some(model.clone());
            cache.firmware = Some(firmware.clone());
        }

        Ok(SystemInfo {
            firmware,
            hostname,
            service_tag,
            model,
            outlet_count,
        })
    }

    async fn get_outlet_count(&self) -> Result<usize> {
        let cached = self.cache().outlet_count;
        match cached {
            Some(count) => Ok(count),
            None => Ok(self.get_system_info().await?.outlet_count),
        }
    }

    async fn get_outlet_status(&self) -> Result<Vec<bool>> {
        let result = self
            .retry
            .run("outlet status", || async move {
                self.fetch(OUTLET_STATUS, parser::parse_outlet_status).await
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
        match self.fetch(OUTLET_NAMES, parser::parse_outlet_names).await {
            Ok(names) => Ok(names),
            Err(e) if e.is_connection_lost() => Err(e),
            Err(e) => {
                warn!("outlet names unavailable, using defaults: {}", e);
                let count = self.get_outlet_count().await?;
                Ok((1..=count).map(OutletInfo::default_name).collect())
            }
        }
    }

    async fn get_outlet_power_status(&self, index: usize) -> Result<Option<OutletPower>> {
        let count = self.get_outlet_count().await?;
        validate_outlet(index, count, false)?;

        let power = Self::optional(
            self.fetch(&commands::outlet_power_status(index), parser::parse_outlet_power)
                .await,
            "outlet power status",
        )?;
        Ok(power.filter(|p| {
            let matches = p.index == index;
            if !matches {
                debug!("power status for outlet {} answered for {}", index, p.index);
            }
            matches
        }))
    }

    async fn get_all_outlets_info(&self, include_power: bool) -> Result<Vec<OutletInfo>> {
        let count = self.get_outlet_count().await?;
        let statuses = self.get_outlet_status().await?;
        let names = self.get_outlet_names().await?;

        let mut outlets = Vec::with_capacity(count);
        for index in 1..=count {
            let name = names
                .get(index - 1)
                .filter(|n| !n.is_empty())
                .cloned()
                .unwrap_or_else(|| OutletInfo::default_name(index));
            let status = statuses.get(index - 1).copied().unwrap_or(false);
            let mut outlet = OutletInfo::new(index, name, status);

            if include_power {
                match self.get_outlet_power_status(index).await {
                    Ok(Some(power)) => outlet = outlet.with_power(&power),
                    Ok(None) => {}
                    Err(e) if e.is_connection_lost() => return Err(e),
                    Err(e) => debug!("no telemetry for outlet {}: {}", index, e),
                }
            }
            outlets.push(outlet);
        }
        Ok(outlets)
    }

    async fn set_outlet(&self, index: usize, action: OutletAction) -> Result<bool> {
        let count = self.get_outlet_count().await?;
        validate_outlet(index, count, true)?;
        if let Some(delay) = action.delay() {
            validate_delay(delay)?;
        }

        info!("outlet {}: {}", index, action);
        self.control(&commands::outlet_set(index, action), None).await
    }

    async fn get_power_status(&self) -> Result<Option<PowerStatus>> {
        Self::optional(
            self.fetch(POWER_STATUS, parser::parse_power_status).await,
            "power status",
        )
    }

    async fn get_ups_connection_status(&self) -> Result<Option<bool>> {
        Self::optional(
            self.fetch(UPS_CONNECTION, |l| parser::parse_flag(l, UPS_CONNECTION))
                .await,
            "UPS connection",
        )
    }

    async fn get_ups_status(&self) -> Result<Option<UpsStatus>> {
        Self::optional(
            self.fetch(UPS_STATUS, parser::parse_ups_status).await,
            "UPS status",
        )
    }

    async fn get_auto_reboot_status(&self) -> Result<Option<bool>> {
        Self::optional(
            self.fetch(AUTO_REBOOT, |l| parser::parse_flag(l, AUTO_REBOOT))
                .await,
            "auto reboot",
        )
    }

    async fn set_auto_reboot(&self, enabled: bool) -> Result<bool> {
        self.control(&commands::auto_reboot_set(enabled), None).await
    }

    async fn get_device_info(
        &self,
        refresh: bool,
        include_outlet_power: bool,
    ) -> Result<WattBoxDevice> {
        if !refresh {
            let cached = self.cache().device.clone();
            if let Some(device) = cached {
                return Ok(device);
            }
        } else {
            self.invalidate();
        }

        let system_info = self.get_system_info().await?;
        let outlets = self.get_all_outlets_info(include_outlet_power).await?;

        let power_status = Self::best_effort(self.get_power_status().await, "power status")?;
        let ups_connected = Self::best_effort(
            self.get_ups_connection_status().await,
            "UPS connection",
        )?
        .unwrap_or(false);
        let ups_status = if ups_connected {
            Self::best_effort(self.get_ups_status().await, "UPS status")?
        } else {
            None
        };
        let auto_reboot_enabled =
            Self::best_effort(self.get_auto_reboot_status().await, "auto reboot")?
                .unwrap_or(false);

        let device = WattBoxDevice {
            system_info,
            outlets,
            power_status,
            ups_status,
            ups_connected,
            auto_reboot_enabled,
        };
        self.cache().device = Some(device.clone());
        Ok(device)
    }

    async fn get_model(&self) -> Result<String> {
        let cached = self.cache().model.clone();
        if let Some(model) = cached {
            return Ok(model);
        }
        let model = self.fetch(MODEL, |l| parser::parse_value(l, MODEL)).await?;
        self.cache().model = Some(model.clone());
        Ok(model)
    }

    async fn get_firmware_version(&self) -> Result<String> {
        let cached = self.cache().firmware.clone();
        if let Some(firmware) = cached {
            return Ok(firmware);
        }
        let firmware = self
            .fetch(FIRMWARE, |l| parser::parse_value(l, FIRMWARE))
            .await?;
        self.cache().firmware = Some(firmware.clone());
        Ok(firmware)
    }

    async fn ping(&self) -> bool {
        match self
            .fetch(FIRMWARE, |l| parser::parse_value(l, FIRMWARE))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!("ping failed: {}", e);
                false
            }
        }
    }

    async fn reboot_device(&self) -> Result<bool> {
        warn!("rebooting {}", self.config.socket_addr());
        self.control(REBOOT, Some(REBOOT_TIMEOUT)).await
    }

    async fn set_outlet_name(&self, index: usize, name: &str) -> Result<bool> {
        let count = self.get_outlet_count().await?;
        validate_outlet(index, count, false)?;
        self.control(&commands::outlet_name_set(index, name), None)
            .await
    }

    async fn set_outlet_names(&self, names: &[String]) -> Result<bool> {
        let count = self.get_outlet_count().await?;
        if names.len() != count {
            return Err(ValidationError::NameCount {
                expected: count,
                found: names.len(),
            }
            .into());
        }
        self.control(&commands::outlet_name_set_all(names), None)
            .await
    }

    async fn set_outlet_power_on_delay(&self, index: usize, delay: u32) -> Result<bool> {
        let count = self.get_outlet_count().await?;
        validate_outlet(index, count, false)?;
        validate_delay(delay)?;
        self.control(&commands::outlet_power_on_delay_set(index, delay), None)
            .await
    }

    async fn set_outlet_mode(&self, index: usize, mode: OutletMode) -> Result<bool> {
        let count = self.get_outlet_count().await?;
        validate_outlet(index, count, false)?;
        self.control(&commands::outlet_mode_set(index, mode), None)
            .await
    }
}
