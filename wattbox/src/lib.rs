//! # WattBox
//!
//! Async client library for SnapAV WattBox power distribution units.
//!
//! The library talks to a WattBox over its Telnet integration protocol
//! (port 23) or its HTTP interface, and exposes typed queries, outlet
//! control and full device snapshots through one [`Driver`] trait.
//!
//! ## Features
//!
//! - Login handshake with prompt detection and rejection handling
//! - Serialized command channel with stale-response recovery
//! - Typed parsing of every query response
//! - Outlet count, status and name fallbacks for older firmware
//! - HTTP + XML transport with the same API
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wattbox::{Driver, DriverBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wattbox::Error> {
//!     let mut wattbox = DriverBuilder::new("192.168.1.50")
//!         .username("wattbox")
//!         .password("wattbox")
//!         .build()?;
//!
//!     wattbox.open().await?;
//!
//!     let device = wattbox.get_device_info(true, false).await?;
//!     for outlet in &device.outlets {
//!         println!("{} {}: {}", outlet.index, outlet.name, outlet.status);
//!     }
//!     wattbox.reset_outlet(3, None).await?;
//!
//!     wattbox.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod error;
pub mod model;
pub mod protocol;
pub mod retry;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use driver::{
    ConnectionConfig, Driver, DriverBuilder, HttpDriver, Protocol, TelnetDriver, WattBox,
};
pub use error::{Error, Result};
pub use model::{
    OutletAction, OutletInfo, OutletMode, OutletPower, PowerStatus, SystemInfo, UpsStatus,
    WattBoxDevice,
};
pub use retry::RetryPolicy;
pub use transport::{HttpConfig, TelnetConfig};
