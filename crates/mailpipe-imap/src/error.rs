//! Error types for the IMAP engine.
//!
//! Errors are `Clone`: one connection failure is delivered to every request
//! waiting on that connection, and one memoized failure to every waiter.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::types::Status;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(String),

    /// Response grammar mismatch.
    #[error("Parse error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Authentication was rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned NO.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE.
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// No server activity within the idle timeout.
    #[error("Connection idle for {0:?}")]
    Timeout(Duration),

    /// The connection went away while the command was pending.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<rustls::pki_types::InvalidDnsNameError> for Error {
    fn from(err: rustls::pki_types::InvalidDnsNameError) -> Self {
        Self::InvalidDnsName(err.to_string())
    }
}

impl From<crate::task::Interrupted> for Error {
    fn from(err: crate::task::Interrupted) -> Self {
        Self::InvalidState(err.to_string())
    }
}

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket, TLS, idle timeout or server disconnect.
    Connection,
    /// The server answered NO or BAD.
    Status,
    /// A response did not match the grammar.
    Parse,
    /// The conversation broke an invariant (unknown tag, wrong mailbox).
    Protocol,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_)
            | Self::Tls(_)
            | Self::InvalidDnsName(_)
            | Self::Bye(_)
            | Self::Timeout(_)
            | Self::ConnectionClosed(_) => ErrorKind::Connection,
            Self::Auth(_) | Self::No(_) | Self::Bad(_) => ErrorKind::Status,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::InvalidState(_) | Self::Protocol(_) => ErrorKind::Protocol,
        }
    }

    /// Returns the server status and message for NO/BAD failures.
    #[must_use]
    pub fn status(&self) -> Option<(Status, &str)> {
        match self {
            Self::No(text) | Self::Auth(text) => Some((Status::No, text)),
            Self::Bad(text) => Some((Status::Bad, text)),
            _ => None,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
