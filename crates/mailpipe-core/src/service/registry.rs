//! Per-account connection ownership.
//!
//! A [`Registry`] maps account names to [`Account`] handles. Each account
//! owns at most one live [`Connection`], opened by the first request and
//! replaced by the next request after it closes, plus the memoized
//! capability and mailbox listing data the request layer shares.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::BoxFuture;
use mailpipe_imap::task::Memo;
use mailpipe_imap::{Capabilities, Command, CommandResult, Config, Connection, Credentials, ListEntry, Mailbox};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::account::{
    AccountConfig, CredentialError, KeyringResolver, PasswordResolver, ServerUrl,
    resolve_credentials, validate_account,
};
use crate::{Error, Result};

/// Opens authenticated connections.
///
/// [`TcpConnector`] dials the network; tests substitute in-memory servers.
pub trait Connector: Send + Sync {
    /// Connects to `config.host` and authenticates with `credentials`.
    fn connect(
        &self,
        config: Config,
        credentials: Credentials,
    ) -> BoxFuture<'static, mailpipe_imap::Result<Connection>>;
}

/// Connects over TCP, with TLS as the account URL asks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(
        &self,
        config: Config,
        credentials: Credentials,
    ) -> BoxFuture<'static, mailpipe_imap::Result<Connection>> {
        Connection::connect(config, credentials).boxed()
    }
}

pub(crate) struct Inner {
    pub(crate) config: AccountConfig,
    pub(crate) url: ServerUrl,
    resolver: Arc<dyn PasswordResolver>,
    connector: Arc<dyn Connector>,
    connection: Mutex<Option<Connection>>,
    pub(crate) capabilities: Memo<Capabilities, Error>,
    pub(crate) mailboxes: Memo<Arc<Vec<ListEntry>>, Error>,
}

/// One configured mail account.
///
/// Cloning is cheap; clones share the connection and caches.
#[derive(Clone)]
pub struct Account {
    pub(crate) inner: Arc<Inner>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.inner.config.name)
            .field("url", &self.inner.url)
            .finish_non_exhaustive()
    }
}

impl Account {
    /// Creates an account; nothing is dialed until the first request.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the incoming URL is invalid.
    pub fn new(
        config: AccountConfig,
        resolver: Arc<dyn PasswordResolver>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let url = config.incoming_url()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                url,
                resolver,
                connector,
                connection: Mutex::new(None),
                capabilities: Memo::new(),
                mailboxes: Memo::new(),
            }),
        })
    }

    /// The account name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// The account configuration.
    #[must_use]
    pub fn config(&self) -> &AccountConfig {
        &self.inner.config
    }

    /// The parsed incoming server URL.
    #[must_use]
    pub fn url(&self) -> &ServerUrl {
        &self.inner.url
    }

    /// Returns the live connection, opening a new one if there is none or
    /// the previous one closed.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no password can be found, or the
    /// connection error when dialing or authentication fails.
    pub async fn connection(&self) -> Result<Connection> {
        let mut slot = self.inner.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            if !conn.is_closed() {
                return Ok(conn.clone());
            }
            debug!(account = %self.name(), "previous connection closed, reconnecting");
        }
        *slot = None;

        let credentials = self.credentials().await?;
        let config = self.inner.config.connection_config(&self.inner.url);
        info!(account = %self.name(), server = %self.inner.url, "opening connection");

        let conn = self.inner.connector.connect(config, credentials).await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn credentials(&self) -> Result<Credentials> {
        let url = self.inner.url.clone();
        let resolver = Arc::clone(&self.inner.resolver);
        // Keyring lookups block on platform IPC.
        let lookup =
            tokio::task::spawn_blocking(move || resolve_credentials(&url, resolver.as_ref()));
        lookup
            .await
            .map_err(|e| CredentialError::Keyring(e.to_string()))?
            .map_err(Error::from)
    }

    /// Takes the connection out, leaving the account disconnected.
    pub(crate) async fn take_connection(&self) -> Option<Connection> {
        self.inner.connection.lock().await.take()
    }

    /// Runs `command` and returns the full result, failing on NO/BAD.
    pub(crate) async fn execute(
        &self,
        command: Command,
        mailbox: Option<Mailbox>,
    ) -> Result<CommandResult> {
        let conn = self.connection().await?;
        Ok(conn.execute(command, mailbox).await?.check()?)
    }

    /// Runs `command` and returns its untagged payload.
    pub(crate) async fn run(&self, command: Command, mailbox: Option<Mailbox>) -> Result<Vec<Vec<u8>>> {
        let conn = self.connection().await?;
        Ok(conn.run(command, mailbox).await?)
    }
}

/// Owns the configured accounts.
pub struct Registry {
    accounts: RwLock<HashMap<String, Account>>,
    resolver: Arc<dyn PasswordResolver>,
    connector: Arc<dyn Connector>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("accounts", &self.names())
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry that reads passwords from the system keyring and dials TCP.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(Arc::new(KeyringResolver::new()), Arc::new(TcpConnector))
    }

    /// Registry with a custom password resolver and connector.
    #[must_use]
    pub fn with_parts(resolver: Arc<dyn PasswordResolver>, connector: Arc<dyn Connector>) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            resolver,
            connector,
        }
    }

    /// Validates and adds an account.
    ///
    /// # Errors
    ///
    /// Returns a configuration error listing every validation problem, or
    /// when the name is already taken.
    pub fn add(&self, config: AccountConfig) -> Result<Account> {
        validate_account(&config).map_err(|errors| {
            let messages: Vec<&str> = errors.iter().map(|e| e.message()).collect();
            Error::Config(messages.join("; "))
        })?;

        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        if accounts.contains_key(&config.name) {
            return Err(Error::Config(format!("account {:?} already exists", config.name)));
        }
        let name = config.name.clone();
        let account = Account::new(config, Arc::clone(&self.resolver), Arc::clone(&self.connector))?;
        accounts.insert(name, account.clone());
        Ok(account)
    }

    /// Looks up an account by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown names.
    pub fn get(&self, name: &str) -> Result<Account> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("account {name:?}")))
    }

    /// Removes an account. Its connection closes once no clone of the
    /// handle is left.
    pub fn remove(&self, name: &str) -> Option<Account> {
        self.accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    /// Account names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Logs every account out.
    pub async fn disconnect_all(&self) {
        let accounts: Vec<Account> = self
            .accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for account in accounts {
            if let Err(e) = account.disconnect().await {
                debug!(account = %account.name(), error = %e, "logout failed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::account::StaticResolver;
    use crate::service::testing::FakeServer;

    fn registry(server: &FakeServer) -> Registry {
        Registry::with_parts(Arc::new(StaticResolver::new()), Arc::new(server.clone()))
    }

    #[test]
    fn test_add_validates_and_rejects_duplicates() {
        let registry = Registry::with_parts(Arc::new(StaticResolver::new()), Arc::new(TcpConnector));

        let err = registry.add(AccountConfig::new("", "pop3://x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        registry.add(AccountConfig::new("work", "imaps://jo@imap.example.com")).unwrap();
        let err = registry
            .add(AccountConfig::new("work", "imaps://jo@imap.example.com"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);

        assert_eq!(registry.names(), vec!["work".to_string()]);
        assert_eq!(registry.get("home").unwrap_err().kind(), ErrorKind::NotFound);
        assert!(registry.remove("work").is_some());
        assert!(registry.names().is_empty());
    }

    #[tokio::test]
    async fn test_missing_password_is_config_error() {
        let server = FakeServer::new(|_| String::new());
        let registry = registry(&server);
        let account = registry
            .add(AccountConfig::new("work", "imaps://jo@imap.test"))
            .unwrap();

        let err = account.connection().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert_eq!(server.connects(), 0);
    }

    #[tokio::test]
    async fn test_connection_is_reused_then_replaced() {
        let server = FakeServer::new(|_| "$ OK\r\n".to_string());
        let registry = registry(&server);
        let account = registry
            .add(AccountConfig::new("work", "imaps://jo:pw@imap.test"))
            .unwrap();

        let first = account.connection().await.unwrap();
        let again = account.connection().await.unwrap();
        assert_eq!(server.connects(), 1);
        assert!(!again.is_closed());

        first.logout().await.unwrap();
        let mut state = first.watch_state();
        state
            .wait_for(|s| *s == mailpipe_imap::ConnectionState::Closed)
            .await
            .unwrap();

        let fresh = account.connection().await.unwrap();
        assert!(!fresh.is_closed());
        assert_eq!(server.connects(), 2);
    }
}
