//! Typed mapping of the `wattbox_info.xml` status document.
//!
//! The document is a single flat element whose children each carry one
//! value or a comma-separated list:
//!
//! ```text
//! <request>
//!   <host_name>WattBox</host_name>
//!   <outlet_name>Router,Switch,Camera</outlet_name>
//!   <outlet_status>1,0,1</outlet_status>
//!   <voltage_value>1198</voltage_value>
//!   ...
//! </request>
//! ```
//!
//! Electrical readings are reported in tenths.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::ParseError;
use crate::model::{OutletInfo, OutletMode, PowerStatus, SystemInfo, UpsStatus};

static ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z_][\w.\-]*)>([^<]*)</([A-Za-z_][\w.\-]*)>").unwrap()
});

/// Leaf elements of a status document, in document order.
#[derive(Debug, Clone, Default)]
pub struct StatusDocument {
    elements: IndexMap<String, String>,
}

impl StatusDocument {
    /// Collect every `<tag>text</tag>` leaf.
    pub fn parse(xml: &str) -> Result<Self, ParseError> {
        let mut elements = IndexMap::new();
        for caps in ELEMENT.captures_iter(xml) {
            if caps[1] != caps[3] {
                continue;
            }
            elements.insert(caps[1].to_string(), decode_entities(caps[2].trim()));
        }

        if elements.is_empty() {
            return Err(ParseError::Malformed {
                reason: "no elements in status document",
                text: xml.chars().take(120).collect(),
            });
        }

        Ok(Self { elements })
    }

    /// Raw text of an element.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.elements.get(tag).map(String::as_str)
    }

    fn required(&self, tag: &'static str) -> Result<&str, ParseError> {
        self.get(tag).ok_or(ParseError::MissingField { field: tag })
    }

    /// Comma-separated element split into trimmed, unquoted items.
    pub fn list(&self, tag: &str) -> Vec<String> {
        match self.get(tag) {
            Some(text) if !text.is_empty() => text
                .split(',')
                .map(|item| item.trim().trim_matches('"').to_string())
                .collect(),
            _ => Vec::new(),
        }
    }

    fn flag(&self, tag: &'static str) -> Result<bool, ParseError> {
        match self.get(tag) {
            None => Ok(false),
            Some("1") => Ok(true),
            Some("0") | Some("") => Ok(false),
            Some(other) => Err(invalid(tag, other)),
        }
    }

    fn tenths(&self, tag: &'static str) -> Result<Option<f64>, ParseError> {
        self.get(tag)
            .map(|text| {
                text.parse::<f64>()
                    .map(|raw| raw / 10.0)
                    .map_err(|_| invalid(tag, text))
            })
            .transpose()
    }

    fn integer<T: std::str::FromStr>(&self, tag: &'static str) -> Result<Option<T>, ParseError> {
        self.get(tag)
            .map(|text| text.parse::<T>().map_err(|_| invalid(tag, text)))
            .transpose()
    }

    /// The outlet count is the number of `outlet_status` items; their
    /// values are not checked here.
    pub fn system_info(&self) -> Result<SystemInfo, ParseError> {
        Ok(SystemInfo {
            firmware: self
                .get("firmware_version")
                .or_else(|| self.get("firmware"))
                .unwrap_or_default()
                .to_string(),
            hostname: self.required("host_name")?.to_string(),
            service_tag: self.get("serial_number").unwrap_or_default().to_string(),
            model: self.get("hardware_version").unwrap_or_default().to_string(),
            outlet_count: self.list("outlet_status").len(),
        })
    }

    /// On/off state per outlet; every item must be `1` or `0`.
    pub fn outlet_status(&self) -> Result<Vec<bool>, ParseError> {
        self.required("outlet_status")?;
        self.list("outlet_status")
            .iter()
            .map(|token| match token.as_str() {
                "1" => Ok(true),
                "0" => Ok(false),
                other => Err(invalid("outlet_status", other)),
            })
            .collect()
    }

    /// Outlets in index order; names default when the list is short.
    pub fn outlets(&self) -> Result<Vec<OutletInfo>, ParseError> {
        let names = self.list("outlet_name");
        let methods = self.list("outlet_method");

        self.outlet_status()?
            .into_iter()
            .enumerate()
            .map(|(i, status)| {
                let index = i + 1;
                let name = names
                    .get(i)
                    .filter(|n| !n.is_empty())
                    .cloned()
                    .unwrap_or_else(|| OutletInfo::default_name(index));
                let mut outlet = OutletInfo::new(index, name, status);
                // outlet_method is 1-based on the wire
                outlet.mode = match methods.get(i) {
                    Some(method) => {
                        let value: u8 = method.parse().map_err(|_| invalid("outlet_method", method))?;
                        value.checked_sub(1).and_then(OutletMode::from_wire)
                    }
                    None => None,
                };
                Ok(outlet)
            })
            .collect()
    }

    /// `None` when the document carries no voltage reading.
    pub fn power_status(&self) -> Result<Option<PowerStatus>, ParseError> {
        let Some(voltage) = self.tenths("voltage_value")? else {
            return Ok(None);
        };
        Ok(Some(PowerStatus {
            current_amps: self.tenths("current_value")?.unwrap_or_default(),
            power_watts: self.tenths("power_value")?.unwrap_or_default(),
            voltage_volts: voltage,
            safe_voltage_status: self.flag("safe_voltage_status")?,
        }))
    }

    pub fn ups_connected(&self) -> Result<bool, ParseError> {
        self.flag("has_ups")
    }

    /// `None` unless a UPS is attached.
    pub fn ups_status(&self) -> Result<Option<UpsStatus>, ParseError> {
        if !self.ups_connected()? {
            return Ok(None);
        }
        let percent = |tag: &'static str| -> Result<u8, ParseError> {
            let value: u8 = self.integer(tag)?.unwrap_or_default();
            if value > 100 {
                return Err(invalid(tag, &value.to_string()));
            }
            Ok(value)
        };
        Ok(Some(UpsStatus {
            battery_charge: percent("battery_charge")?,
            battery_load: percent("battery_load")?,
            battery_health: if self.flag("battery_health")? { "Good" } else { "Bad" }.to_string(),
            power_lost: self.flag("power_lost")?,
            battery_runtime: self.integer("est_run_time")?.unwrap_or_default(),
            alarm_enabled: self.flag("audible_alarm")?,
            alarm_muted: self.flag("mute")?,
        }))
    }

    pub fn auto_reboot(&self) -> Result<bool, ParseError> {
        self.flag("auto_reboot")
    }
}

fn invalid(field: &'static str, value: &str) -> ParseError {
    ParseError::InvalidField {
        field,
        value: value.to_string(),
        text: format!("<{field}>{value}</{field}>"),
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
