//! WattBox Integration Protocol.
//!
//! Command builders, response parsers for the Telnet line protocol and the
//! typed mapping of the HTTP status document.

pub mod commands;
pub mod parser;
pub mod xml;

pub use commands::CommandKind;
pub use xml::StatusDocument;
