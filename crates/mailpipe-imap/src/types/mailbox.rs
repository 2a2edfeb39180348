//! Mailbox types.

use super::{Flags, SeqNum, Uid, UidValidity};

/// Mailbox name.
///
/// `INBOX` is case-insensitive on every server, so any spelling of it is
/// normalised on construction; other names compare byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mailbox(String);

impl Mailbox {
    /// Creates a new mailbox name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("INBOX") {
            Self::inbox()
        } else {
            Self(name)
        }
    }

    /// The INBOX mailbox.
    #[must_use]
    pub fn inbox() -> Self {
        Self("INBOX".to_string())
    }

    /// Returns the mailbox name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Mailbox {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Mailbox {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Mailbox metadata reported by SELECT or EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Flags defined for this mailbox.
    pub flags: Flags,
    /// Flags that can be permanently stored.
    pub permanent_flags: Flags,
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// First unseen message sequence number.
    pub unseen: Option<SeqNum>,
    /// Next UID to be assigned.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<UidValidity>,
    /// Whether the mailbox was opened read-only.
    pub read_only: bool,
}

/// Message counts reported by STATUS (or LIST ... RETURN (STATUS ...)).
///
/// Every field is optional because the server only answers what was asked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxCounts {
    /// Number of messages.
    pub messages: Option<u32>,
    /// Number of recent messages.
    pub recent: Option<u32>,
    /// Next UID to be assigned.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<UidValidity>,
    /// Number of unseen messages.
    pub unseen: Option<u32>,
}

/// One mailbox from a LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Mailbox attributes.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter.
    pub delimiter: Option<char>,
    /// Mailbox name.
    pub mailbox: Mailbox,
    /// Counts, when listed with `RETURN (STATUS ...)`.
    pub status: Option<MailboxCounts>,
}

impl ListEntry {
    /// Returns true if the mailbox carries the attribute.
    #[must_use]
    pub fn has_attribute(&self, attr: &MailboxAttribute) -> bool {
        self.attributes.contains(attr)
    }

    /// Returns true unless the server marked the mailbox `\NoSelect`.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.attributes.iter().any(|a| {
            matches!(a, MailboxAttribute::NoSelect | MailboxAttribute::NonExistent)
        })
    }

    /// Returns the SPECIAL-USE attribute, if any.
    #[must_use]
    pub fn special_use(&self) -> Option<&MailboxAttribute> {
        self.attributes.iter().find(|a| a.is_special_use())
    }
}

/// Mailbox attributes from LIST response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// Mailbox cannot be selected.
    NoSelect,
    /// Mailbox does not exist (LIST-EXTENDED).
    NonExistent,
    /// Mailbox cannot have children.
    NoInferiors,
    /// Mailbox has no children.
    HasNoChildren,
    /// Mailbox has children.
    HasChildren,
    /// Mailbox is marked for attention.
    Marked,
    /// Mailbox is not marked.
    Unmarked,
    /// Mailbox is subscribed.
    Subscribed,
    /// SPECIAL-USE: all messages.
    All,
    /// SPECIAL-USE: archive.
    Archive,
    /// SPECIAL-USE: drafts.
    Drafts,
    /// SPECIAL-USE: flagged messages.
    Flagged,
    /// SPECIAL-USE: junk.
    Junk,
    /// SPECIAL-USE: sent.
    Sent,
    /// SPECIAL-USE: trash.
    Trash,
    /// Unknown attribute.
    Unknown(String),
}

impl MailboxAttribute {
    /// Parses a mailbox attribute string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\NONEXISTENT" => Self::NonExistent,
            "\\NOINFERIORS" => Self::NoInferiors,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\MARKED" => Self::Marked,
            "\\UNMARKED" => Self::Unmarked,
            "\\SUBSCRIBED" => Self::Subscribed,
            "\\ALL" => Self::All,
            "\\ARCHIVE" => Self::Archive,
            "\\DRAFTS" => Self::Drafts,
            "\\FLAGGED" => Self::Flagged,
            "\\JUNK" | "\\SPAM" => Self::Junk,
            "\\SENT" => Self::Sent,
            "\\TRASH" => Self::Trash,
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Returns true for RFC 6154 special-use attributes.
    #[must_use]
    pub const fn is_special_use(&self) -> bool {
        matches!(
            self,
            Self::All
                | Self::Archive
                | Self::Drafts
                | Self::Flagged
                | Self::Junk
                | Self::Sent
                | Self::Trash
        )
    }
}

impl std::fmt::Display for MailboxAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoSelect => "\\Noselect",
            Self::NonExistent => "\\NonExistent",
            Self::NoInferiors => "\\Noinferiors",
            Self::HasNoChildren => "\\HasNoChildren",
            Self::HasChildren => "\\HasChildren",
            Self::Marked => "\\Marked",
            Self::Unmarked => "\\Unmarked",
            Self::Subscribed => "\\Subscribed",
            Self::All => "\\All",
            Self::Archive => "\\Archive",
            Self::Drafts => "\\Drafts",
            Self::Flagged => "\\Flagged",
            Self::Junk => "\\Junk",
            Self::Sent => "\\Sent",
            Self::Trash => "\\Trash",
            Self::Unknown(s) => s,
        };
        f.write_str(s)
    }
}
