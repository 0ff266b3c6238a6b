//! Connection configuration for the Telnet and HTTP transports.

use std::time::Duration;

use secrecy::SecretString;

/// Default Telnet port of the integration protocol.
pub const DEFAULT_TELNET_PORT: u16 = 23;

/// Default port of the web interface.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Factory credentials.
pub const DEFAULT_USERNAME: &str = "wattbox";
pub const DEFAULT_PASSWORD: &str = "wattbox";

/// Low-level read tuning.
#[derive(Debug, Clone)]
pub struct ReadConfig {
    /// Largest single read from the socket.
    pub chunk_size: usize,

    /// How long one read poll waits for data before re-checking deadlines.
    pub chunk_timeout: Duration,

    /// Upper bound on bytes discarded before each command.
    pub drain_limit: usize,

    /// How long a drain waits for stale bytes.
    pub drain_timeout: Duration,

    /// Bytes from the end of the buffer searched for prompts.
    pub search_depth: usize,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_timeout: Duration::from_millis(100),
            drain_limit: 4096,
            drain_timeout: Duration::from_millis(10),
            search_depth: 1000,
        }
    }
}

/// Login handshake timing.
#[derive(Debug, Clone)]
pub struct LoginConfig {
    /// Budget for each of the login and password prompts.
    pub prompt_timeout: Duration,

    /// Pause after sending the password before looking at the reply.
    pub settle: Duration,

    /// How long to collect the post-login banner.
    pub settle_read_window: Duration,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            prompt_timeout: Duration::from_secs(10),
            settle: Duration::from_secs(1),
            settle_read_window: Duration::from_secs(2),
        }
    }
}

/// Command exchange timing.
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// Default budget for the first response line.
    pub timeout: Duration,

    /// Budget for each extra read while recovering from cross-talk.
    pub cross_talk_timeout: Duration,

    /// Extra reads attempted when a query answer has the wrong prefix.
    pub cross_talk_reads: usize,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            cross_talk_timeout: Duration::from_millis(500),
            cross_talk_reads: 3,
        }
    }
}

/// Telnet connection configuration.
#[derive(Debug, Clone)]
pub struct TelnetConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// Telnet port (default: 23).
    pub port: u16,

    /// Username for the login prompt.
    pub username: String,

    /// Password for the password prompt.
    pub password: SecretString,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    pub read: ReadConfig,
    pub login: LoginConfig,
    pub command: CommandConfig,
}

impl TelnetConfig {
    /// Create a config with default port and timings.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_TELNET_PORT,
            username: username.into(),
            password: SecretString::from(Into::<String>::into(password)),
            connect_timeout: Duration::from_secs(10),
            read: ReadConfig::default(),
            login: LoginConfig::default(),
            command: CommandConfig::default(),
        }
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// HTTP connection configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,

    /// HTTP port (default: 80).
    pub port: u16,

    /// "http" or "https".
    pub scheme: String,

    pub username: String,
    pub password: SecretString,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpConfig {
    /// Create a config with default port, scheme and timeout.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_HTTP_PORT,
            scheme: "http".to_string(),
            username: username.into(),
            password: SecretString::from(Into::<String>::into(password)),
            timeout: Duration::from_secs(10),
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}
