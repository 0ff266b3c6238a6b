//! Builder for creating WattBox drivers.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use super::{HttpDriver, TelnetDriver, WattBox};
use crate::error::{DriverError, Result};
use crate::retry::RetryPolicy;
use crate::transport::config::{
    DEFAULT_HTTP_PORT, DEFAULT_PASSWORD, DEFAULT_TELNET_PORT, DEFAULT_USERNAME,
};
use crate::transport::{CommandConfig, HttpConfig, LoginConfig, ReadConfig, TelnetConfig};

/// Which interface of the device to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Integration protocol on port 23.
    #[default]
    Telnet,
    /// Web interface on port 80.
    Http,
}

impl Protocol {
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Telnet => DEFAULT_TELNET_PORT,
            Protocol::Http => DEFAULT_HTTP_PORT,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Telnet => write!(f, "telnet"),
            Protocol::Http => write!(f, "http"),
        }
    }
}

impl FromStr for Protocol {
    type Err = DriverError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "telnet" => Ok(Protocol::Telnet),
            "http" => Ok(Protocol::Http),
            other => Err(DriverError::InvalidConfig {
                message: format!("unknown protocol '{other}'"),
            }),
        }
    }
}

/// Connection settings as loaded from a configuration file.
///
/// ```json
/// { "host": "192.168.1.50", "username": "admin", "password": "secret",
///   "protocol": "http", "timeout_secs": 5 }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,

    /// Defaults to the protocol's port.
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password", deserialize_with = "deserialize_secret")]
    pub password: SecretString,

    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// HTTP only: "http" or "https".
    #[serde(default)]
    pub scheme: Option<String>,
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

fn default_password() -> SecretString {
    SecretString::from(DEFAULT_PASSWORD.to_string())
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// Builder for constructing WattBox drivers.
///
/// # Example
///
/// ```rust,no_run
/// use wattbox::driver::{Driver, DriverBuilder};
///
/// # async fn example() -> Result<(), wattbox::Error> {
/// let mut wattbox = DriverBuilder::new("192.168.1.50")
///     .username("admin")
///     .password("secret")
///     .build()?;
/// wattbox.open().await?;
/// wattbox.turn_on_outlet(3).await?;
/// # Ok(())
/// # }
/// ```
pub struct DriverBuilder {
    host: String,
    port: Option<u16>,
    username: String,
    password: SecretString,
    protocol: Protocol,
    timeout: Option<Duration>,
    scheme: Option<String>,
    retry: Option<RetryPolicy>,
    read: Option<ReadConfig>,
    login: Option<LoginConfig>,
    command: Option<CommandConfig>,
}

impl DriverBuilder {
    /// Create a new driver builder for the specified host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            username: DEFAULT_USERNAME.to_string(),
            password: SecretString::from(DEFAULT_PASSWORD.to_string()),
            protocol: Protocol::default(),
            timeout: None,
            scheme: None,
            retry: None,
            read: None,
            login: None,
            command: None,
        }
    }

    /// Start from file-loaded settings.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        let mut builder = Self::new(config.host.clone())
            .username(config.username.clone())
            .protocol(config.protocol);
        builder.password = config.password.clone();
        builder.port = config.port;
        builder.timeout = config.timeout_secs.map(Duration::from_secs);
        builder.scheme = config.scheme.clone();
        builder
    }

    /// Set the port (default: 23 for Telnet, 80 for HTTP).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the username (default: "wattbox").
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the password (default: "wattbox").
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = SecretString::from(Into::<String>::into(password));
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the connect and per-command timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use "https" for the web interface.
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Retry policy for the outlet status query.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn read_config(mut self, read: ReadConfig) -> Self {
        self.read = Some(read);
        self
    }

    pub fn login_config(mut self, login: LoginConfig) -> Self {
        self.login = Some(login);
        self
    }

    pub fn command_config(mut self, command: CommandConfig) -> Self {
        self.command = Some(command);
        self
    }

    fn validate(&self) -> std::result::Result<(), DriverError> {
        let invalid = |message: &str| DriverError::InvalidConfig {
            message: message.to_string(),
        };

        let host = self.host.trim();
        if host.is_empty() {
            return Err(invalid("host is required"));
        }
        if host.contains(char::is_whitespace) || host.contains('/') {
            return Err(DriverError::InvalidConfig {
                message: format!("invalid host '{}'", self.host),
            });
        }
        if self.port == Some(0) {
            return Err(invalid("port must be between 1 and 65535"));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(invalid("timeout must be positive"));
        }
        if let Some(scheme) = &self.scheme {
            if scheme != "http" && scheme != "https" {
                return Err(DriverError::InvalidConfig {
                    message: format!("unknown scheme '{scheme}'"),
                });
            }
        }
        Ok(())
    }

    /// Build a Telnet driver regardless of the configured protocol.
    pub fn build_telnet(self) -> Result<TelnetDriver> {
        self.validate()?;

        let mut config = TelnetConfig::new(self.host.trim(), self.username, "");
        config.password = self.password;
        config.port = self.port.unwrap_or(DEFAULT_TELNET_PORT);
        if let Some(read) = self.read {
            config.read = read;
        }
        if let Some(login) = self.login {
            config.login = login;
        }
        if let Some(command) = self.command {
            config.command = command;
        }
        if let Some(timeout) = self.timeout {
            config.connect_timeout = timeout;
            config.command.timeout = timeout;
        }

        let mut driver = TelnetDriver::new(config);
        if let Some(retry) = self.retry {
            driver = driver.with_retry_policy(retry);
        }
        Ok(driver)
    }

    /// Build an HTTP driver regardless of the configured protocol.
    pub fn build_http(self) -> Result<HttpDriver> {
        self.validate()?;

        let mut config = HttpConfig::new(self.host.trim(), self.username, "");
        config.password = self.password;
        config.port = self.port.unwrap_or(DEFAULT_HTTP_PORT);
        if let Some(scheme) = self.scheme {
            config.scheme = scheme;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }

        let mut driver = HttpDriver::new(config);
        if let Some(retry) = self.retry {
            driver = driver.with_retry_policy(retry);
        }
        Ok(driver)
    }

    /// Build the driver for the configured protocol.
    ///
    /// This creates the driver but does not connect. Call `open()` on the
    /// returned driver to establish the connection.
    pub fn build(self) -> Result<WattBox> {
        match self.protocol {
            Protocol::Telnet => self.build_telnet().map(WattBox::from),
            Protocol::Http => self.build_http().map(WattBox::from),
        }
    }
}
