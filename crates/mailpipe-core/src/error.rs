//! Error types for the account layer.

use mailpipe_imap::Status;
use mailpipe_imap::task::Interrupted;
use thiserror::Error;

use crate::account::CredentialError;

/// Errors that can occur in account operations.
///
/// `Clone` because a memoized failure is handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailpipe_imap::Error),

    /// Malformed or unsupported account configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential lookup failed or found nothing.
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The server lacks an extension the operation needs.
    #[error("Server does not support {0}")]
    Capability(String),

    /// A lookup found nothing.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<Interrupted> for Error {
    fn from(err: Interrupted) -> Self {
        Self::Imap(err.into())
    }
}

/// The distinguishable failure kinds callers branch on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad URL, unsupported scheme or missing credentials.
    Config,
    /// Socket failure, timeout or server disconnect.
    Connection,
    /// The server answered NO or BAD.
    Status {
        /// NO or BAD.
        status: Status,
        /// The server's text.
        message: String,
    },
    /// A response did not match the grammar.
    Parse,
    /// The conversation broke an invariant.
    Protocol,
    /// Missing server extension.
    Capability,
    /// Nothing matched a lookup.
    NotFound,
}

impl Error {
    /// Classifies this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Credential(_) => ErrorKind::Config,
            Self::Capability(_) => ErrorKind::Capability,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Imap(err) => match err.status() {
                Some((status, message)) => ErrorKind::Status {
                    status,
                    message: message.to_string(),
                },
                None => match err.kind() {
                    mailpipe_imap::ErrorKind::Connection | mailpipe_imap::ErrorKind::Status => {
                        ErrorKind::Connection
                    }
                    mailpipe_imap::ErrorKind::Parse => ErrorKind::Parse,
                    mailpipe_imap::ErrorKind::Protocol => ErrorKind::Protocol,
                },
            },
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
