//! Typed records describing a WattBox and its outlets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Device identity and outlet count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub firmware: String,
    pub hostname: String,
    pub service_tag: String,
    pub model: String,
    pub outlet_count: usize,
}

/// Operating mode of an outlet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutletMode {
    Enabled,
    Disabled,
    ResetOnly,
}

impl OutletMode {
    /// Numeric value used by `!OutletModeSet`.
    pub fn wire_value(self) -> u8 {
        match self {
            OutletMode::Enabled => 0,
            OutletMode::Disabled => 1,
            OutletMode::ResetOnly => 2,
        }
    }

    /// Inverse of [`wire_value`](Self::wire_value).
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(OutletMode::Enabled),
            1 => Some(OutletMode::Disabled),
            2 => Some(OutletMode::ResetOnly),
            _ => None,
        }
    }
}

/// Everything known about one outlet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutletInfo {
    /// 1-based outlet index.
    pub index: usize,
    pub name: String,
    /// `true` when the outlet is powered.
    pub status: bool,
    pub power_watts: Option<f64>,
    pub current_amps: Option<f64>,
    pub voltage_volts: Option<f64>,
    pub mode: Option<OutletMode>,
    /// Seconds.
    pub power_on_delay: Option<u32>,
}

impl OutletInfo {
    /// Outlet with no telemetry, mode or delay information.
    pub fn new(index: usize, name: impl Into<String>, status: bool) -> Self {
        Self {
            index,
            name: name.into(),
            status,
            power_watts: None,
            current_amps: None,
            voltage_volts: None,
            mode: None,
            power_on_delay: None,
        }
    }

    /// Attach per-outlet telemetry.
    pub fn with_power(mut self, power: &OutletPower) -> Self {
        self.power_watts = Some(power.power_watts);
        self.current_amps = Some(power.current_amps);
        self.voltage_volts = Some(power.voltage_volts);
        self
    }

    /// Name used when the device cannot report one.
    pub fn default_name(index: usize) -> String {
        format!("Outlet {index}")
    }
}

/// Per-outlet telemetry as reported by `?OutletPowerStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutletPower {
    pub index: usize,
    pub power_watts: f64,
    pub current_amps: f64,
    pub voltage_volts: f64,
}

/// System-wide electrical readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerStatus {
    pub current_amps: f64,
    pub power_watts: f64,
    pub voltage_volts: f64,
    pub safe_voltage_status: bool,
}

/// Battery backup state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsStatus {
    /// Percent, 0-100.
    pub battery_charge: u8,
    /// Percent, 0-100.
    pub battery_load: u8,
    /// "Good" or "Bad".
    pub battery_health: String,
    pub power_lost: bool,
    /// Minutes.
    pub battery_runtime: u32,
    pub alarm_enabled: bool,
    pub alarm_muted: bool,
}

/// Point-in-time snapshot of a device.
///
/// `outlets` is ordered by index and always holds exactly
/// `system_info.outlet_count` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WattBoxDevice {
    pub system_info: SystemInfo,
    pub outlets: Vec<OutletInfo>,
    pub power_status: Option<PowerStatus>,
    pub ups_status: Option<UpsStatus>,
    pub ups_connected: bool,
    pub auto_reboot_enabled: bool,
}

impl WattBoxDevice {
    /// Look up an outlet by its 1-based index.
    pub fn outlet(&self, index: usize) -> Option<&OutletInfo> {
        self.outlets.iter().find(|o| o.index == index)
    }
}

/// Outlet control verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutletAction {
    On,
    Off,
    Toggle,
    /// Power-cycle, optionally overriding the device's reset delay (seconds).
    Reset(Option<u32>),
}

impl OutletAction {
    /// Verb as it appears in `!OutletSet`.
    pub fn verb(&self) -> &'static str {
        match self {
            OutletAction::On => "ON",
            OutletAction::Off => "OFF",
            OutletAction::Toggle => "TOGGLE",
            OutletAction::Reset(_) => "RESET",
        }
    }

    /// Reset delay, if any.
    pub fn delay(&self) -> Option<u32> {
        match self {
            OutletAction::Reset(delay) => *delay,
            _ => None,
        }
    }
}

impl fmt::Display for OutletAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

impl FromStr for OutletAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ON" => Ok(OutletAction::On),
            "OFF" => Ok(OutletAction::Off),
            "TOGGLE" => Ok(OutletAction::Toggle),
            "RESET" => Ok(OutletAction::Reset(None)),
            _ => Err(ValidationError::InvalidAction(s.to_string())),
        }
    }
}
