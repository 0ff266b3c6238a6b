//! Error types for wattbox.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Main error type for wattbox operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Socket or HTTP transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Login handshake errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Command execution errors
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Response parsing errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Invalid arguments supplied by the caller
    #[error("Invalid argument: {0}")]
    Validation(#[from] ValidationError),

    /// Driver-level errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

impl Error {
    /// The device answered but does not support the request, or answered
    /// with something that cannot be interpreted.
    ///
    /// Optional snapshot fields map these to an absent value.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::Command(CommandError::Rejected { .. }) | Error::Parse(_)
        )
    }

    /// No answer arrived within the allotted time.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Command(CommandError::Timeout { .. })
                | Error::Transport(TransportError::Timeout(_))
                | Error::Auth(AuthError::Timeout { .. })
        )
    }

    /// The session is unusable and the caller should reconnect.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Auth(_)
                | Error::Command(CommandError::Failed { .. })
                | Error::Driver(DriverError::NotConnected)
        ) && !matches!(self, Error::Transport(TransportError::Timeout(_)))
    }
}

/// Transport layer errors (TCP connection, HTTP requests).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Connection was closed by the peer
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request completed with a non-success status
    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },
}

/// Which prompt the login handshake was waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Login,
    Password,
}

impl std::fmt::Display for LoginStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginStage::Login => write!(f, "login"),
            LoginStage::Password => write!(f, "password"),
        }
    }
}

/// Authentication errors.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The device rejected the credentials
    #[error("Authentication failed for user '{user}'")]
    Rejected { user: String },

    /// No prompt was observed in time
    #[error("No {stage} prompt within {waited:?} (received: {received:?})")]
    Timeout {
        stage: LoginStage,
        waited: Duration,
        received: String,
    },
}

/// Command channel errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// No response within the command budget
    #[error("Command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The device answered with an error token
    #[error("Command '{command}' rejected: {response}")]
    Rejected { command: String, response: String },

    /// The exchange broke down at the transport level
    #[error("Command '{command}' failed: {source}")]
    Failed {
        command: String,
        #[source]
        source: TransportError,
    },
}

/// Response text did not have the shape expected for its query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The response belongs to a different query
    #[error("Expected response prefix '{expected}', got '{text}'")]
    UnexpectedPrefix { expected: &'static str, text: String },

    /// Wrong number of comma-separated fields
    #[error("Expected {expected} fields, found {found} in '{text}'")]
    FieldCount {
        expected: usize,
        found: usize,
        text: String,
    },

    /// A field could not be converted to its type
    #[error("Invalid {field} value '{value}' in '{text}'")]
    InvalidField {
        field: &'static str,
        value: String,
        text: String,
    },

    /// Structurally broken response
    #[error("Malformed response '{text}': {reason}")]
    Malformed { reason: &'static str, text: String },

    /// A mandatory element is missing from the status document
    #[error("Missing field '{field}' in status document")]
    MissingField { field: &'static str },
}

/// Invalid caller input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Outlet index out of range
    #[error("Invalid outlet {index}: device has {outlet_count} outlets")]
    InvalidOutlet { index: usize, outlet_count: usize },

    /// Unknown outlet action verb
    #[error("Invalid outlet action '{0}'")]
    InvalidAction(String),

    /// Delay outside the device's accepted range
    #[error("Invalid delay {0}s: must be between 1 and 600 seconds")]
    InvalidDelay(u32),

    /// Wrong number of names for a bulk rename
    #[error("Expected {expected} outlet names, got {found}")]
    NameCount { expected: usize, found: usize },

    /// Operation not expressible over the chosen transport
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Driver layer errors (connection lifecycle, configuration).
#[derive(Error, Debug)]
pub enum DriverError {
    /// Driver not connected
    #[error("Driver not connected - call open() first")]
    NotConnected,

    /// Driver already connected
    #[error("Driver already connected")]
    AlreadyConnected,

    /// Invalid configuration in the driver builder
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Result type alias using wattbox's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_is_unsupported() {
        let err: Error = CommandError::Rejected {
            command: "?UPSStatus".into(),
            response: "#Error".into(),
        }
        .into();
        assert!(err.is_unsupported());
        assert!(!err.is_timeout());
        assert!(!err.is_connection_lost());
    }

    #[test]
    fn test_timeout_is_not_connection_lost() {
        let err: Error = CommandError::Timeout {
            command: "?Firmware".into(),
            timeout: Duration::from_secs(1),
        }
        .into();
        assert!(err.is_timeout());
        assert!(!err.is_connection_lost());
        assert!(!err.is_unsupported());

        let err: Error = TransportError::Timeout(Duration::from_secs(1)).into();
        assert!(err.is_timeout());
        assert!(!err.is_connection_lost());
    }

    #[test]
    fn test_transport_failure_is_connection_lost() {
        let err: Error = CommandError::Failed {
            command: "?Firmware".into(),
            source: TransportError::Disconnected,
        }
        .into();
        assert!(err.is_connection_lost());

        let err: Error = AuthError::Rejected { user: "admin".into() }.into();
        assert!(err.is_connection_lost());
        assert_eq!(
            err.to_string(),
            "Authentication error: Authentication failed for user 'admin'"
        );
    }
}
