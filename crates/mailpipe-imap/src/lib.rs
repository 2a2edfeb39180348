//! # mailpipe-imap
//!
//! A pipelined, asynchronous IMAP4rev1 engine.
//!
//! ## Features
//!
//! - **One connection, many callers**: any number of requests may be
//!   outstanding on a [`Connection`]; they are linearized onto the wire one
//!   at a time and their results routed back by tag
//! - **Selection tracking**: a command that needs a mailbox gets a SELECT
//!   inserted ahead of it only when a different mailbox is selected
//! - **Literal-safe framing**: `{n}` payloads are never scanned for syntax
//! - **Sans-I/O core**: [`Pipeline`] and the [`parser`] do no I/O and are
//!   tested without sockets
//! - **TLS via rustls**, implicit or STARTTLS
//! - **Task combinators** ([`task`]) for composing requests: sequencing,
//!   concurrent fan-out, error interception and shared memoized results
//!
//! ## Quick Start
//!
//! ```no_run
//! use mailpipe_imap::{Command, Config, Connection, Credentials, Mailbox, SearchQuery};
//! use mailpipe_imap::parser::records;
//!
//! # async fn demo() -> mailpipe_imap::Result<()> {
//! let config = Config::new("imap.example.com");
//! let conn = Connection::connect(config, Credentials::new("user", "secret")).await?;
//!
//! let payload = conn
//!     .run(
//!         Command::Search {
//!             query: SearchQuery::All,
//!             charset: Some("UTF-8".into()),
//!             returns: Vec::new(),
//!             uid: true,
//!         },
//!         Some(Mailbox::inbox()),
//!     )
//!     .await?;
//! let uids = records::search(&payload)?;
//! println!("{} messages", uids.len());
//!
//! conn.logout().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command types and wire serialization
//! - [`connection`]: configuration, sockets, framing, pipeline and driver
//! - [`parser`]: lexer, response parser and typed record extraction
//! - [`task`]: concurrency combinators
//! - [`types`]: core IMAP types (flags, mailboxes, sequences, etc.)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod task;
pub mod types;

pub use command::{Command, FetchAttribute, FetchItems, SearchQuery, StatusAttribute, TagGenerator};
pub use connection::{
    CommandResult, Config, ConfigBuilder, Connection, ConnectionState, Credentials, FramedReader,
    ImapStream, Pipeline, Security,
};
pub use error::{Error, ErrorKind, Result};
pub use parser::{FetchRecord, Response, ResponseParser, UntaggedResponse};
pub use types::{
    Capabilities, Capability, Flag, Flags, ListEntry, Mailbox, MailboxAttribute, MailboxCounts,
    ResponseCode, Selection, SeqNum, SequenceSet, Status, Tag, Uid, UidValidity,
};
