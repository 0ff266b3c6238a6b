//! Integration Protocol v2.4 command strings.

use crate::model::{OutletAction, OutletMode};

/// Prefix of read-only queries.
pub const QUERY_MARKER: char = '?';

/// Prefix of control commands.
pub const CONTROL_MARKER: char = '!';

/// Start of a device error response.
pub const ERROR_MARKER: &str = "#Error";

/// Response to a successful control command.
pub const SUCCESS_TOKEN: &str = "OK";

/// Line terminator appended to outgoing commands.
pub const TERMINATOR: &str = "\n";

pub const FIRMWARE: &str = "?Firmware";
pub const HOSTNAME: &str = "?Hostname";
pub const SERVICE_TAG: &str = "?ServiceTag";
pub const MODEL: &str = "?Model";
pub const OUTLET_COUNT: &str = "?OutletCount";
pub const OUTLET_STATUS: &str = "?OutletStatus";
pub const OUTLET_NAMES: &str = "?OutletName";
pub const OUTLET_POWER_STATUS: &str = "?OutletPowerStatus";
pub const POWER_STATUS: &str = "?PowerStatus";
pub const AUTO_REBOOT: &str = "?AutoReboot";
pub const UPS_STATUS: &str = "?UPSStatus";
pub const UPS_CONNECTION: &str = "?UPSConnection";

pub const REBOOT: &str = "!Reboot";
pub const EXIT: &str = "!Exit";

/// Longest outlet name the device accepts.
pub const MAX_OUTLET_NAME_LEN: usize = 32;

/// How a command expects to be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Answer echoes the query name.
    Query,
    /// Answer is `OK` or `#Error`.
    Control,
    /// Anything else; answered with whatever line comes back.
    Raw,
}

impl CommandKind {
    pub fn of(command: &str) -> Self {
        match command.trim_start().chars().next() {
            Some(QUERY_MARKER) => CommandKind::Query,
            Some(CONTROL_MARKER) => CommandKind::Control,
            _ => CommandKind::Raw,
        }
    }
}

/// Prefix a query's response must start with: the command text up to `=`.
///
/// Returns `None` for non-query commands.
pub fn expected_prefix(command: &str) -> Option<&str> {
    let command = command.trim();
    if CommandKind::of(command) != CommandKind::Query {
        return None;
    }
    Some(match command.find('=') {
        Some(pos) => &command[..pos],
        None => command,
    })
}

/// Append the line terminator if missing.
pub fn format_command(command: &str) -> String {
    if command.ends_with(TERMINATOR) {
        command.to_string()
    } else {
        format!("{command}{TERMINATOR}")
    }
}

pub fn is_success_response(response: &str) -> bool {
    response.trim() == SUCCESS_TOKEN
}

pub fn is_error_response(response: &str) -> bool {
    response.trim_start().starts_with(ERROR_MARKER)
}

pub fn outlet_power_status(outlet: usize) -> String {
    format!("{OUTLET_POWER_STATUS}={outlet}")
}

pub fn outlet_set(outlet: usize, action: OutletAction) -> String {
    match action.delay() {
        Some(delay) => format!("!OutletSet={outlet},{},{delay}", action.verb()),
        None => format!("!OutletSet={outlet},{}", action.verb()),
    }
}

pub fn outlet_name_set(outlet: usize, name: &str) -> String {
    format!("!OutletNameSet={outlet},{}", sanitize_outlet_name(name))
}

pub fn outlet_name_set_all<S: AsRef<str>>(names: &[S]) -> String {
    let formatted: Vec<String> = names
        .iter()
        .map(|name| format!("{{{}}}", sanitize_outlet_name(name.as_ref())))
        .collect();
    format!("!OutletNameSetAll={}", formatted.join(","))
}

pub fn outlet_power_on_delay_set(outlet: usize, delay: u32) -> String {
    format!("!OutletPowerOnDelaySet={outlet},{delay}")
}

pub fn outlet_mode_set(outlet: usize, mode: OutletMode) -> String {
    format!("!OutletModeSet={outlet},{}", mode.wire_value())
}

pub fn auto_reboot_set(enabled: bool) -> String {
    format!("!AutoReboot={}", u8::from(enabled))
}

/// Strip characters that would break the brace/comma framing and clamp
/// to the device's name length.
pub fn sanitize_outlet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '{' | '}' | ',' | '\n' | '\r'))
        .collect();
    cleaned
        .trim()
        .chars()
        .take(MAX_OUTLET_NAME_LEN)
        .collect::<String>()
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_kind() {
        assert_eq!(CommandKind::of("?Firmware"), CommandKind::Query);
        assert_eq!(CommandKind::of("!OutletSet=1,ON"), CommandKind::Control);
        assert_eq!(CommandKind::of("help"), CommandKind::Raw);
        assert_eq!(CommandKind::of(""), CommandKind::Raw);
    }

    #[test]
    fn test_expected_prefix() {
        assert_eq!(expected_prefix("?OutletStatus"), Some("?OutletStatus"));
        assert_eq!(
            expected_prefix("?OutletPowerStatus=3\n"),
            Some("?OutletPowerStatus")
        );
        assert_eq!(expected_prefix("!OutletSet=1,ON"), None);
    }

    #[test]
    fn test_format_command() {
        assert_eq!(format_command("?Model"), "?Model\n");
        assert_eq!(format_command("?Model\n"), "?Model\n");
    }

    #[test]
    fn test_outlet_set() {
        assert_eq!(outlet_set(3, OutletAction::On), "!OutletSet=3,ON");
        assert_eq!(outlet_set(0, OutletAction::Reset(None)), "!OutletSet=0,RESET");
        assert_eq!(
            outlet_set(2, OutletAction::Reset(Some(10))),
            "!OutletSet=2,RESET,10"
        );
    }

    #[test]
    fn test_name_commands() {
        assert_eq!(outlet_name_set(1, "Rack {A}, top"), "!OutletNameSet=1,Rack A top");
        assert_eq!(
            outlet_name_set_all(&["Router", "Switch"]),
            "!OutletNameSetAll={Router},{Switch}"
        );
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(40);
        assert_eq!(sanitize_outlet_name(&long).len(), MAX_OUTLET_NAME_LEN);
        assert_eq!(sanitize_outlet_name("  NVR\r\n "), "NVR");
    }

    #[test]
    fn test_response_tokens() {
        assert!(is_success_response("OK\r"));
        assert!(!is_success_response("OKAY"));
        assert!(is_error_response("#Error"));
        assert!(!is_error_response("?Firmware=1.0"));
    }

    #[test]
    fn test_misc_setters() {
        assert_eq!(auto_reboot_set(true), "!AutoReboot=1");
        assert_eq!(auto_reboot_set(false), "!AutoReboot=0");
        assert_eq!(outlet_mode_set(4, OutletMode::ResetOnly), "!OutletModeSet=4,2");
        assert_eq!(outlet_power_on_delay_set(4, 30), "!OutletPowerOnDelaySet=4,30");
        assert_eq!(outlet_power_status(7), "?OutletPowerStatus=7");
    }
}
