//! Byte transports: a Telnet line socket and an HTTP client.
//!
//! This module provides the low-level connection management; it knows
//! nothing about WattBox commands.

pub mod config;
mod http;
mod line;

pub use config::{CommandConfig, HttpConfig, LoginConfig, ReadConfig, TelnetConfig};
pub use http::{HttpResponse, HttpTransport};
pub use line::{LineTransport, ReadResult, TcpTransport};
