//! Command-related type definitions.

/// STATUS attributes to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttribute {
    /// Number of messages.
    Messages,
    /// Number of recent messages.
    Recent,
    /// Next UID.
    UidNext,
    /// UIDVALIDITY.
    UidValidity,
    /// Number of unseen messages.
    Unseen,
}

impl StatusAttribute {
    /// The attributes used for listings and live counts.
    pub const COUNTS: [Self; 5] = [
        Self::Messages,
        Self::Recent,
        Self::UidNext,
        Self::UidValidity,
        Self::Unseen,
    ];

    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
        }
    }
}

/// FETCH items to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItems {
    /// Fetch all (equivalent to FLAGS INTERNALDATE RFC822.SIZE ENVELOPE).
    All,
    /// Fetch fast (equivalent to FLAGS INTERNALDATE RFC822.SIZE).
    Fast,
    /// Custom list of items.
    Items(Vec<FetchAttribute>),
}

impl FetchItems {
    /// `UID FLAGS RFC822.SIZE ENVELOPE`, the message summary.
    #[must_use]
    pub fn summary() -> Self {
        Self::Items(vec![
            FetchAttribute::Uid,
            FetchAttribute::Flags,
            FetchAttribute::Rfc822Size,
            FetchAttribute::Envelope,
        ])
    }

    /// `BODY[]`, the whole raw message.
    #[must_use]
    pub fn full_body() -> Self {
        Self::Items(vec![FetchAttribute::Body {
            section: None,
            peek: false,
            partial: None,
        }])
    }
}

/// Individual FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// Message flags.
    Flags,
    /// Internal date.
    InternalDate,
    /// RFC822 size.
    Rfc822Size,
    /// Envelope structure.
    Envelope,
    /// Body structure.
    BodyStructure,
    /// UID.
    Uid,
    /// Body section.
    Body {
        /// Section specifier.
        section: Option<String>,
        /// Peek (don't set \Seen).
        peek: bool,
        /// Partial fetch range.
        partial: Option<(u32, u32)>,
    },
}

/// Result options for an extended SEARCH (RFC 4731).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchReturn {
    /// Lowest match.
    Min,
    /// Highest match.
    Max,
    /// All matches as a sequence set.
    All,
    /// Number of matches.
    Count,
}

impl SearchReturn {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::All => "ALL",
            Self::Count => "COUNT",
        }
    }
}
