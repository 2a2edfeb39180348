//! Core IMAP types.
//!
//! Identifiers, flags, capabilities, mailbox metadata and sequence sets
//! shared by the parser, the command serializer and the pipeline.

#![allow(clippy::missing_const_for_fn)]

mod capability;
mod flags;
mod identifiers;
mod mailbox;
mod response_code;
mod sequence;

pub use capability::{Capabilities, Capability, Status};
pub use flags::{Flag, Flags};
pub use identifiers::{SeqNum, Tag, Uid, UidValidity};
pub use mailbox::{ListEntry, Mailbox, MailboxAttribute, MailboxCounts, Selection};
pub use response_code::ResponseCode;
pub use sequence::SequenceSet;
