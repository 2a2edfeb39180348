//! IMAP command builder.
//!
//! This module provides types and serialization for IMAP commands.

mod search;
mod serialize;
mod tag_generator;
mod types;

use crate::types::{Mailbox, SequenceSet, Tag};

pub use search::{DateCmp, DateField, Field, FlagKey, SearchQuery, SizeCmp};
pub use tag_generator::TagGenerator;
pub use types::{FetchAttribute, FetchItems, SearchReturn, StatusAttribute};

use serialize::{Writer, write_fetch_items};

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,
    /// STARTTLS command.
    StartTls,
    /// AUTHENTICATE command.
    Authenticate {
        /// Authentication mechanism.
        mechanism: String,
        /// Base64 initial response (SASL-IR); `=` for an empty one.
        initial_response: Option<String>,
    },
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: Mailbox,
    },
    /// EXAMINE command (read-only SELECT).
    Examine {
        /// Mailbox to examine.
        mailbox: Mailbox,
    },
    /// LIST command.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
        /// `RETURN (STATUS (...))` items (LIST-STATUS); empty for none.
        status: Vec<StatusAttribute>,
    },
    /// STATUS command.
    Status {
        /// Mailbox name.
        mailbox: Mailbox,
        /// Status items to request.
        items: Vec<StatusAttribute>,
    },
    /// FETCH command.
    Fetch {
        /// Sequence set.
        sequence: SequenceSet,
        /// Items to fetch.
        items: FetchItems,
        /// Use UIDs.
        uid: bool,
    },
    /// SEARCH command.
    Search {
        /// The query.
        query: SearchQuery,
        /// Search charset.
        charset: Option<String>,
        /// ESEARCH result options; empty for a plain SEARCH.
        returns: Vec<SearchReturn>,
        /// Use UIDs.
        uid: bool,
    },
    /// MOVE command.
    Move {
        /// Sequence set.
        sequence: SequenceSet,
        /// Target mailbox.
        mailbox: Mailbox,
        /// Use UIDs.
        uid: bool,
    },
}

impl Command {
    /// Serializes the command with the given tag.
    ///
    /// Returns the parts to send; every part after the first may only be
    /// sent after a `+` continuation (see the `serialize` module). With
    /// `literal_plus` there is always exactly one part.
    #[must_use]
    pub fn serialize(&self, tag: &Tag, literal_plus: bool) -> Vec<Vec<u8>> {
        let mut w = Writer::new(literal_plus);
        w.raw(tag.as_str().as_bytes());
        w.push(b' ');

        match self {
            Self::Capability => w.raw(b"CAPABILITY"),
            Self::Noop => w.raw(b"NOOP"),
            Self::Logout => w.raw(b"LOGOUT"),
            Self::StartTls => w.raw(b"STARTTLS"),

            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                w.raw(b"AUTHENTICATE ");
                w.raw(mechanism.as_bytes());
                if let Some(resp) = initial_response {
                    w.push(b' ');
                    w.raw(resp.as_bytes());
                }
            }

            Self::Select { mailbox } => {
                w.raw(b"SELECT ");
                w.mailbox(mailbox);
            }

            Self::Examine { mailbox } => {
                w.raw(b"EXAMINE ");
                w.mailbox(mailbox);
            }

            Self::List {
                reference,
                pattern,
                status,
            } => {
                w.raw(b"LIST ");
                w.string(reference);
                w.push(b' ');
                w.string(pattern);
                if !status.is_empty() {
                    w.raw(b" RETURN (STATUS ");
                    write_status_items(&mut w, status);
                    w.push(b')');
                }
            }

            Self::Status { mailbox, items } => {
                w.raw(b"STATUS ");
                w.mailbox(mailbox);
                w.push(b' ');
                write_status_items(&mut w, items);
            }

            Self::Fetch {
                sequence,
                items,
                uid,
            } => {
                if *uid {
                    w.raw(b"UID ");
                }
                w.raw(b"FETCH ");
                w.raw(sequence.to_string().as_bytes());
                w.push(b' ');
                write_fetch_items(&mut w, items);
            }

            Self::Search {
                query,
                charset,
                returns,
                uid,
            } => {
                if *uid {
                    w.raw(b"UID ");
                }
                w.raw(b"SEARCH ");
                if !returns.is_empty() {
                    w.raw(b"RETURN (");
                    for (i, ret) in returns.iter().enumerate() {
                        if i > 0 {
                            w.push(b' ');
                        }
                        w.raw(ret.as_str().as_bytes());
                    }
                    w.raw(b") ");
                }
                if let Some(charset) = charset {
                    w.raw(b"CHARSET ");
                    w.astring(charset);
                    w.push(b' ');
                }
                query.write(&mut w);
            }

            Self::Move {
                sequence,
                mailbox,
                uid,
            } => {
                if *uid {
                    w.raw(b"UID ");
                }
                w.raw(b"MOVE ");
                w.raw(sequence.to_string().as_bytes());
                w.push(b' ');
                w.mailbox(mailbox);
            }
        }

        w.finish()
    }

    /// The command keyword, for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Select { .. } => "SELECT",
            Self::Examine { .. } => "EXAMINE",
            Self::List { .. } => "LIST",
            Self::Status { .. } => "STATUS",
            Self::Fetch { .. } => "FETCH",
            Self::Search { .. } => "SEARCH",
            Self::Move { .. } => "MOVE",
        }
    }

    /// Whether the wire form carries credentials and must not be logged.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(self, Self::Authenticate { .. })
    }
}

fn write_status_items(w: &mut Writer, items: &[StatusAttribute]) {
    w.push(b'(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            w.push(b' ');
        }
        w.raw(item.as_str().as_bytes());
    }
    w.push(b')');
}
