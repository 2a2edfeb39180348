//! # mailpipe-core
//!
//! Account layer on top of the [`mailpipe_imap`] engine.
//!
//! This crate provides:
//! - Account configuration: server URLs, mail address, timeouts
//! - Password resolution from the URL or the system keyring
//! - A registry owning one lazily opened connection per account
//! - Request operations: capabilities, mailbox listing, status, range and
//!   UID fetches, search, move
//! - ORDEREDSUBJECT threading of fetched messages
//!
//! ```no_run
//! use mailpipe_core::{AccountConfig, Registry, thread};
//! use mailpipe_imap::Mailbox;
//!
//! # async fn demo() -> mailpipe_core::Result<()> {
//! let registry = Registry::new();
//! let account = registry.add(AccountConfig::new("work", "imaps://jo@imap.example.com"))?;
//!
//! let recent = account.fetch_range(&Mailbox::inbox(), 50, false).await?;
//! for t in thread::thread_records(&recent) {
//!     println!("{} ({} replies)", t.root, t.children.len());
//! }
//! registry.disconnect_all().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
mod error;
pub mod service;
pub mod thread;

pub use account::credentials;
pub use account::{
    AccountConfig, CredentialError, CredentialResult, KeyringResolver, PasswordResolver, Scheme,
    ServerUrl, StaticResolver, ValidationError, ValidationResult, validate_account,
};
pub use error::{Error, ErrorKind, Result};
pub use mailpipe_imap::command::{DateCmp, DateField, Field, FlagKey, SizeCmp};
pub use mailpipe_imap::{FetchRecord, ListEntry, Mailbox, MailboxAttribute, SearchQuery, Uid};
pub use service::{Account, Connector, Registry, TcpConnector};
pub use thread::{Thread, ThreadIndex, ThreadItem, ThreadPosition};
