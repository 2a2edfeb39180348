//! Response data types.

use crate::parser::date;
use crate::types::{
    Capability, Flags, ListEntry, Mailbox, MailboxCounts, ResponseCode, SeqNum, SequenceSet, Uid,
};

/// FETCH response item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// Message flags.
    Flags(Flags),
    /// INTERNALDATE as sent.
    InternalDate(String),
    /// RFC822.SIZE.
    Rfc822Size(u32),
    /// ENVELOPE.
    Envelope(Box<Envelope>),
    /// UID.
    Uid(Uid),
    /// `BODY[section]<origin>` content.
    Body {
        /// Section specifier (empty for the whole message).
        section: String,
        /// Origin offset of a partial fetch.
        origin: Option<u32>,
        /// Body data.
        data: Option<Vec<u8>>,
    },
    /// BODYSTRUCTURE or BODY without a section; consumed, not decoded.
    BodyStructure,
}

/// Message envelope.
///
/// `subject` and address display names are MIME-word decoded; every other
/// field is kept exactly as the server sent it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Date header.
    pub date: Option<String>,
    /// Subject header, decoded.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Sender addresses.
    pub sender: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

impl Envelope {
    /// Date header as epoch seconds, when it parses.
    #[must_use]
    pub fn timestamp(&self) -> Option<i64> {
        self.date.as_deref().and_then(date::parse_header_date)
    }
}

/// Email address from envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Address {
    /// Display name, decoded.
    pub name: Option<String>,
    /// Source route (obsolete).
    pub adl: Option<String>,
    /// Mailbox name (local part).
    pub mailbox: Option<String>,
    /// Host name (domain part).
    pub host: Option<String>,
}

impl Address {
    /// Returns `mailbox@host` when both parts are present.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => Some(format!("{m}@{h}")),
            _ => None,
        }
    }
}

/// Result data of an ESEARCH response (RFC 4731).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ESearch {
    /// Tag of the command this answers, if correlated.
    pub tag: Option<String>,
    /// Whether the numbers are UIDs.
    pub uid: bool,
    /// Lowest match.
    pub min: Option<u32>,
    /// Highest match.
    pub max: Option<u32>,
    /// Number of matches.
    pub count: Option<u32>,
    /// Every match.
    pub all: Option<SequenceSet>,
}

/// Untagged response data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UntaggedResponse {
    /// OK response with optional code.
    Ok {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// NO response.
    No {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BAD response.
    Bad {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// PREAUTH greeting.
    PreAuth {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BYE response.
    Bye {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// CAPABILITY response.
    Capability(Vec<Capability>),
    /// LIST response.
    List(ListEntry),
    /// FLAGS response.
    Flags(Flags),
    /// EXISTS response (message count).
    Exists(u32),
    /// RECENT response.
    Recent(u32),
    /// EXPUNGE response.
    Expunge(SeqNum),
    /// FETCH response.
    Fetch {
        /// Sequence number.
        seq: SeqNum,
        /// Fetched items.
        items: Vec<FetchItem>,
    },
    /// SEARCH response.
    Search(Vec<u32>),
    /// ESEARCH response.
    ESearch(ESearch),
    /// STATUS response.
    Status {
        /// Mailbox name.
        mailbox: Mailbox,
        /// Reported counts.
        counts: MailboxCounts,
    },
    /// A well-formed response the engine does not interpret
    /// (NAMESPACE, ENABLED, ID, ...).
    Other {
        /// Response keyword.
        name: String,
    },
}
