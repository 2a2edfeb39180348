//! IMAP connection management.
//!
//! - [`Config`]: host, port, security mode, timeouts
//! - [`ImapStream`]: plaintext or TLS socket
//! - [`FramedReader`]: literal-aware response framing
//! - [`Pipeline`]: sans-I/O command queue with selection tracking
//! - [`Connection`]: the per-account driver task and its handle

mod config;
mod driver;
mod framed;
mod pipeline;
mod sasl;
mod stream;

pub use config::{Config, ConfigBuilder, Security};
pub use driver::{Connection, ConnectionState};
pub use framed::FramedReader;
pub use pipeline::{CommandResult, Pipeline, Transmit};
pub use sasl::{Credentials, anonymous_response, plain_response};
pub use stream::{ImapStream, create_tls_connector, open};
