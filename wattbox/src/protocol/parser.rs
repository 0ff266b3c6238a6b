//! Response parsers.
//!
//! Every parser takes one trimmed response line and returns a typed record
//! or a [`ParseError`] carrying the offending text. Parsers never fill in
//! defaults; deciding what to do with an unparsable answer is up to the
//! driver.

use std::str::FromStr;

use super::commands;
use crate::error::ParseError;
use crate::model::{OutletPower, PowerStatus, UpsStatus};

/// Payload after `<prefix>=`, which must be present.
fn payload<'a>(line: &'a str, prefix: &'static str) -> Result<&'a str, ParseError> {
    let line = line.trim();
    line.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('='))
        .map(str::trim)
        .ok_or_else(|| ParseError::UnexpectedPrefix {
            expected: prefix,
            text: line.to_string(),
        })
}

/// Payload after `<prefix>=` if present, otherwise the bare line.
///
/// A line carrying a *different* query echo is still rejected.
fn optional_payload<'a>(line: &'a str, prefix: &'static str) -> Result<&'a str, ParseError> {
    let line = line.trim();
    if let Ok(rest) = payload(line, prefix) {
        return Ok(rest);
    }
    if line.starts_with(commands::QUERY_MARKER) {
        return Err(ParseError::UnexpectedPrefix {
            expected: prefix,
            text: line.to_string(),
        });
    }
    Ok(line)
}

/// Split a payload into exactly `expected` comma-separated fields.
fn fields<'a>(payload: &'a str, expected: usize, text: &str) -> Result<Vec<&'a str>, ParseError> {
    let values: Vec<&str> = payload.split(',').map(str::trim).collect();
    if values.len() != expected {
        return Err(ParseError::FieldCount {
            expected,
            found: values.len(),
            text: text.trim().to_string(),
        });
    }
    Ok(values)
}

fn number<T: FromStr>(field: &'static str, value: &str, text: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidField {
        field,
        value: value.to_string(),
        text: text.trim().to_string(),
    })
}

fn percent(field: &'static str, value: &str, text: &str) -> Result<u8, ParseError> {
    let pct: u8 = number(field, value, text)?;
    if pct > 100 {
        return Err(ParseError::InvalidField {
            field,
            value: value.to_string(),
            text: text.trim().to_string(),
        });
    }
    Ok(pct)
}

/// `"1"`/`"0"` flag.
fn digit_flag(field: &'static str, value: &str, text: &str) -> Result<bool, ParseError> {
    match value {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(ParseError::InvalidField {
            field,
            value: value.to_string(),
            text: text.trim().to_string(),
        }),
    }
}

/// `"True"`/`"False"` flag, any case.
fn text_flag(field: &'static str, value: &str, text: &str) -> Result<bool, ParseError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ParseError::InvalidField {
            field,
            value: value.to_string(),
            text: text.trim().to_string(),
        })
    }
}

/// Generic `?Name=value` answer. The echo is optional.
pub fn parse_value(line: &str, prefix: &'static str) -> Result<String, ParseError> {
    optional_payload(line, prefix).map(str::to_string)
}

/// `?OutletCount=N`.
pub fn parse_outlet_count(line: &str) -> Result<usize, ParseError> {
    let value = optional_payload(line, commands::OUTLET_COUNT)?;
    number("outlet count", value, line)
}

/// `0`/`1` answers such as `?UPSConnection=1` and `?AutoReboot=0`.
pub fn parse_flag(line: &str, prefix: &'static str) -> Result<bool, ParseError> {
    let value = payload(line, prefix)?;
    digit_flag(prefix, value, line)
}

/// `?OutletStatus=1,0,1` -> `[true, false, true]`.
pub fn parse_outlet_status(line: &str) -> Result<Vec<bool>, ParseError> {
    let values = payload(line, commands::OUTLET_STATUS)?;
    if values.is_empty() {
        return Ok(Vec::new());
    }
    values
        .split(',')
        .map(|token| digit_flag("outlet status", token.trim(), line))
        .collect()
}

/// `?OutletName={Router},{Switch}` -> `["Router", "Switch"]`.
///
/// Names may contain commas; braces frame each one.
pub fn parse_outlet_names(line: &str) -> Result<Vec<String>, ParseError> {
    let mut rest = payload(line, commands::OUTLET_NAMES)?;
    let mut names = Vec::new();
    if rest.is_empty() {
        return Ok(names);
    }

    let malformed = |reason| ParseError::Malformed {
        reason,
        text: line.trim().to_string(),
    };

    loop {
        rest = rest.strip_prefix('{').ok_or_else(|| malformed("expected '{'"))?;
        let end = rest.find('}').ok_or_else(|| malformed("unterminated name"))?;
        names.push(rest[..end].to_string());

        rest = rest[end + 1..].trim_start();
        if rest.is_empty() {
            break;
        }
        rest = rest
            .strip_prefix(',')
            .ok_or_else(|| malformed("expected ',' between names"))?
            .trim_start();
    }

    Ok(names)
}

/// `?OutletPowerStatus=1,1.01,0.02,116.50`.
pub fn parse_outlet_power(line: &str) -> Result<OutletPower, ParseError> {
    let values = fields(payload(line, commands::OUTLET_POWER_STATUS)?, 4, line)?;
    Ok(OutletPower {
        index: number("outlet index", values[0], line)?,
        power_watts: number("power", values[1], line)?,
        current_amps: number("current", values[2], line)?,
        voltage_volts: number("voltage", values[3], line)?,
    })
}

/// `?PowerStatus=5.5,660.0,120.0,1`; some firmware omits the echo.
pub fn parse_power_status(line: &str) -> Result<PowerStatus, ParseError> {
    let values = fields(optional_payload(line, commands::POWER_STATUS)?, 4, line)?;
    Ok(PowerStatus {
        current_amps: number("current", values[0], line)?,
        power_watts: number("power", values[1], line)?,
        voltage_volts: number("voltage", values[2], line)?,
        safe_voltage_status: digit_flag("safe voltage status", values[3], line)?,
    })
}

/// `?UPSStatus=50,0,Good,False,25,True,False`.
pub fn parse_ups_status(line: &str) -> Result<UpsStatus, ParseError> {
    let values = fields(payload(line, commands::UPS_STATUS)?, 7, line)?;
    Ok(UpsStatus {
        battery_charge: percent("battery charge", values[0], line)?,
        battery_load: percent("battery load", values[1], line)?,
        battery_health: values[2].to_string(),
        power_lost: text_flag("power lost", values[3], line)?,
        battery_runtime: number("battery runtime", values[4], line)?,
        alarm_enabled: text_flag("alarm enabled", values[5], line)?,
        alarm_muted: text_flag("alarm muted", values[6], line)?,
    })
}

/// Outlet count encoded as the last hyphen-delimited group of a model
/// name, e.g. `WB-800-IPVM-12` -> 12.
pub fn outlet_count_from_model(model: &str) -> Option<usize> {
    let (_, suffix) = model.trim().rsplit_once('-')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok().filter(|&count| count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outlet_status() {
        assert_eq!(
            parse_outlet_status("?OutletStatus=1,0,1,0,1,0").unwrap(),
            vec![true, false, true, false, true, false]
        );
        assert_eq!(parse_outlet_status("?OutletStatus=").unwrap(), Vec::<bool>::new());
    }

    #[test]
    fn test_outlet_status_rejects_bad_token() {
        let err = parse_outlet_status("?OutletStatus=1,x,0").unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { ref value, .. } if value == "x"));
        assert!(parse_outlet_status("?OutletStatus=1,0,").is_err());
        assert!(parse_outlet_status("?OutletName={A}").is_err());
    }

    #[test]
    fn test_outlet_names() {
        assert_eq!(
            parse_outlet_names("?OutletName={Router},{Switch},{Camera}").unwrap(),
            vec!["Router", "Switch", "Camera"]
        );
        assert_eq!(
            parse_outlet_names("?OutletName={Rack, top},{}").unwrap(),
            vec!["Rack, top", ""]
        );
    }

    #[test]
    fn test_outlet_names_malformed() {
        assert!(parse_outlet_names("?OutletName={Router").is_err());
        assert!(parse_outlet_names("?OutletName=Router,Switch").is_err());
        assert!(parse_outlet_names("?OutletName={A}{B}").is_err());
    }

    #[test]
    fn test_outlet_power() {
        let power = parse_outlet_power("?OutletPowerStatus=1,1.01,0.02,116.50").unwrap();
        assert_eq!(power.index, 1);
        assert_eq!(power.power_watts, 1.01);
        assert_eq!(power.current_amps, 0.02);
        assert_eq!(power.voltage_volts, 116.5);

        let err = parse_outlet_power("?OutletPowerStatus=1,1.01,0.02").unwrap_err();
        assert_eq!(
            err,
            ParseError::FieldCount {
                expected: 4,
                found: 3,
                text: "?OutletPowerStatus=1,1.01,0.02".to_string(),
            }
        );
    }

    #[test]
    fn test_power_status() {
        let status = parse_power_status("?PowerStatus=5.5,660.0,120.0,1").unwrap();
        assert_eq!(status.current_amps, 5.5);
        assert_eq!(status.power_watts, 660.0);
        assert_eq!(status.voltage_volts, 120.0);
        assert!(status.safe_voltage_status);
    }

    #[test]
    fn test_power_status_without_echo() {
        let status = parse_power_status("60.00,600.00,110.00,0").unwrap();
        assert_eq!(status.power_watts, 600.0);
        assert!(!status.safe_voltage_status);
    }

    #[test]
    fn test_power_status_errors() {
        assert!(matches!(
            parse_power_status("?PowerStatus=5.5,660.0,120.0"),
            Err(ParseError::FieldCount { expected: 4, found: 3, .. })
        ));
        assert!(matches!(
            parse_power_status("?OutletName={A},{B}"),
            Err(ParseError::UnexpectedPrefix { .. })
        ));
        assert!(parse_power_status("?PowerStatus=5.5,abc,120.0,1").is_err());
    }

    #[test]
    fn test_ups_status() {
        let ups = parse_ups_status("?UPSStatus=50,0,Good,False,25,True,False").unwrap();
        assert_eq!(ups.battery_charge, 50);
        assert_eq!(ups.battery_load, 0);
        assert_eq!(ups.battery_health, "Good");
        assert!(!ups.power_lost);
        assert_eq!(ups.battery_runtime, 25);
        assert!(ups.alarm_enabled);
        assert!(!ups.alarm_muted);
    }

    #[test]
    fn test_ups_status_errors() {
        assert!(matches!(
            parse_ups_status("?UPSStatus=50,0,Good,False,25,True"),
            Err(ParseError::FieldCount { expected: 7, found: 6, .. })
        ));
        assert!(parse_ups_status("?UPSStatus=150,0,Good,False,25,True,False").is_err());
        assert!(parse_ups_status("?UPSStatus=50,0,Good,maybe,25,True,False").is_err());
    }

    #[test]
    fn test_value_and_count() {
        assert_eq!(parse_value("?Firmware=2.4.0.1", commands::FIRMWARE).unwrap(), "2.4.0.1");
        assert_eq!(parse_value("WB-800-IPVM-12", commands::MODEL).unwrap(), "WB-800-IPVM-12");
        assert!(parse_value("?Hostname=rack", commands::MODEL).is_err());
        assert_eq!(parse_outlet_count("?OutletCount=12").unwrap(), 12);
        assert!(parse_outlet_count("?OutletCount=").is_err());
        assert!(parse_outlet_count("?OutletCount=twelve").is_err());
    }

    #[test]
    fn test_flag() {
        assert!(parse_flag("?UPSConnection=1", commands::UPS_CONNECTION).unwrap());
        assert!(!parse_flag("?AutoReboot=0", commands::AUTO_REBOOT).unwrap());
        assert!(parse_flag("?AutoReboot=yes", commands::AUTO_REBOOT).is_err());
    }

    #[test]
    fn test_outlet_count_from_model() {
        for (model, expected) in [
            ("WB-800-IPVM-12", Some(12)),
            ("WB-800VPS-IPVM-18", Some(18)),
            ("WB-250-IP-3", Some(3)),
            ("WB-800-IPVM", None),
            ("WattBox", None),
            ("WB-800-IPVM-", None),
            ("WB-800-IPVM-0", None),
        ] {
            assert_eq!(outlet_count_from_model(model), expected, "{model}");
        }
    }

    #[test]
    fn test_model_suffix_matches_trailing_group() {
        for model in ["WB-800-IPVM-12", "WB-300-IP-4", "X-6"] {
            let derived = outlet_count_from_model(model).unwrap();
            let trailing = model.rsplit('-').next().unwrap();
            assert_eq!(derived.to_string(), trailing);
        }
    }
}
