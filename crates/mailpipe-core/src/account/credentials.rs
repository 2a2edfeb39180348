//! Password resolution.
//!
//! A password comes from the server URL when it embeds one, otherwise from
//! a [`PasswordResolver`]. The default resolver reads the platform's native
//! credential storage:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use keyring::Entry;
use mailpipe_imap::Credentials;
use tracing::{debug, warn};

use super::ServerUrl;

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "mailpipe";

/// Error type for credential operations.
///
/// Keyring errors are kept as text so the error stays `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(String),

    /// No password is configured for the login.
    #[error("No password for {0}")]
    Missing(String),
}

impl From<keyring::Error> for CredentialError {
    fn from(err: keyring::Error) -> Self {
        Self::Keyring(err.to_string())
    }
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// The keyring entry key for a login: `user@host:port`.
#[must_use]
pub fn credential_key(user: &str, host: &str, port: u16) -> String {
    format!("{user}@{host}:{port}")
}

/// Looks up the secret for a login.
///
/// Lookups may block, so callers run them off the async executor.
pub trait PasswordResolver: Send + Sync {
    /// Returns the password for `user` at `host:port`, or `None` when there
    /// is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn resolve(&self, user: &str, host: &str, port: u16) -> CredentialResult<Option<String>>;
}

/// Resolves passwords from the system keyring.
#[derive(Debug, Clone)]
pub struct KeyringResolver {
    service: String,
}

impl Default for KeyringResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringResolver {
    /// Resolver for the `mailpipe` service.
    #[must_use]
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Resolver for another keyring service name.
    #[must_use]
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Stores a password securely in the system keyring.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring operation fails.
    pub fn store(&self, user: &str, host: &str, port: u16, password: &str) -> CredentialResult<()> {
        let key = credential_key(user, host, port);
        let entry = Entry::new(&self.service, &key)?;
        entry.set_password(password)?;
        debug!("Stored password for {key}");
        Ok(())
    }

    /// Deletes a stored password. A missing entry is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring operation fails.
    pub fn delete(&self, user: &str, host: &str, port: u16) -> CredentialResult<()> {
        let key = credential_key(user, host, port);
        let entry = Entry::new(&self.service, &key)?;
        match entry.delete_credential() {
            Ok(()) => {
                debug!("Deleted password for {key}");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!("No password to delete for {key}");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to delete password for {key}: {e}");
                Err(e.into())
            }
        }
    }
}

impl PasswordResolver for KeyringResolver {
    fn resolve(&self, user: &str, host: &str, port: u16) -> CredentialResult<Option<String>> {
        let key = credential_key(user, host, port);
        let entry = Entry::new(&self.service, &key)?;
        match entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => {
                debug!("No password found for {key}");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory resolver.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    passwords: Arc<RwLock<HashMap<String, String>>>,
}

impl StaticResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a password.
    pub fn insert(&self, user: &str, host: &str, port: u16, password: impl Into<String>) {
        self.passwords
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(credential_key(user, host, port), password.into());
    }

    /// Builder form of [`StaticResolver::insert`].
    #[must_use]
    pub fn with(self, user: &str, host: &str, port: u16, password: impl Into<String>) -> Self {
        self.insert(user, host, port, password);
        self
    }
}

impl PasswordResolver for StaticResolver {
    fn resolve(&self, user: &str, host: &str, port: u16) -> CredentialResult<Option<String>> {
        Ok(self
            .passwords
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&credential_key(user, host, port))
            .cloned())
    }
}

/// Login credentials for `url`.
///
/// An empty user logs in anonymously. Otherwise the URL password wins, then
/// the resolver.
///
/// # Errors
///
/// Returns [`CredentialError::Missing`] when neither supplies a password,
/// or the resolver's own error.
pub fn resolve_credentials(
    url: &ServerUrl,
    resolver: &dyn PasswordResolver,
) -> CredentialResult<Credentials> {
    if url.user.is_empty() {
        return Ok(Credentials::Anonymous);
    }
    if let Some(password) = url.password() {
        return Ok(Credentials::new(url.user.clone(), password));
    }
    match resolver.resolve(&url.user, &url.host, url.port)? {
        Some(password) => Ok(Credentials::new(url.user.clone(), password)),
        None => Err(CredentialError::Missing(credential_key(
            &url.user, &url.host, url.port,
        ))),
    }
}
