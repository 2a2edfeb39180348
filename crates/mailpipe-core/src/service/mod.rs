//! Account services.
//!
//! This module holds the connection registry and the request layer that
//! turns account operations into IMAP commands.

pub mod mail;
pub mod registry;
#[cfg(test)]
pub(crate) mod testing;

pub use mail::{message_range, normalize_newlines};
pub use registry::{Account, Connector, Registry, TcpConnector};
