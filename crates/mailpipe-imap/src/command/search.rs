//! Typed SEARCH query language.
//!
//! Queries are built from field matches, flag tests, size and date
//! comparisons, combined with AND, OR and NOT, and rendered into the
//! IMAP `search-key` grammar.

use chrono::NaiveDate;

use crate::types::SequenceSet;

use super::serialize::Writer;

/// Text field matched by a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// `FROM`.
    From,
    /// `TO`.
    To,
    /// `CC`.
    Cc,
    /// `BCC`.
    Bcc,
    /// `SUBJECT`.
    Subject,
    /// `BODY`.
    Body,
    /// `TEXT` (headers and body).
    Text,
}

impl Field {
    const fn as_str(self) -> &'static str {
        match self {
            Self::From => "FROM",
            Self::To => "TO",
            Self::Cc => "CC",
            Self::Bcc => "BCC",
            Self::Subject => "SUBJECT",
            Self::Body => "BODY",
            Self::Text => "TEXT",
        }
    }
}

/// Which date a date comparison looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    /// The server's internal date.
    Internal,
    /// The `Date:` header.
    Sent,
}

/// Date comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCmp {
    /// Strictly before the day.
    Before,
    /// On the day.
    On,
    /// On or after the day.
    Since,
}

/// Size comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeCmp {
    /// `LARGER n`.
    Larger,
    /// `SMALLER n`.
    Smaller,
}

/// System flag tested by a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKey {
    /// `\Seen`.
    Seen,
    /// `\Answered`.
    Answered,
    /// `\Flagged`.
    Flagged,
    /// `\Deleted`.
    Deleted,
    /// `\Draft`.
    Draft,
    /// `\Recent`.
    Recent,
}

/// A search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Every message.
    All,
    /// Text contained in a field.
    Field(Field, String),
    /// Text contained in an arbitrary header.
    Header(String, String),
    /// A system flag is set (`true`) or unset (`false`).
    Flag(FlagKey, bool),
    /// A keyword is set (`true`) or unset (`false`).
    Keyword(String, bool),
    /// RFC822 size comparison.
    Size(SizeCmp, u32),
    /// Date comparison (day granularity).
    Date(DateField, DateCmp, NaiveDate),
    /// Messages with these UIDs.
    Uid(SequenceSet),
    /// All sub-queries match.
    And(Vec<Self>),
    /// Either sub-query matches.
    Or(Box<Self>, Box<Self>),
    /// The sub-query does not match.
    Not(Box<Self>),
}

impl SearchQuery {
    /// Field match.
    pub fn field(field: Field, text: impl Into<String>) -> Self {
        Self::Field(field, text.into())
    }

    /// Conjunction with another query.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut queries) => {
                queries.push(other);
                Self::And(queries)
            }
            query => Self::And(vec![query, other]),
        }
    }

    /// Disjunction with another query.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Negation.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Writes the query as a `search-key` list.
    pub(crate) fn write(&self, w: &mut Writer) {
        match self {
            Self::And(queries) if queries.is_empty() => w.raw(b"ALL"),
            Self::And(queries) => {
                for (i, q) in queries.iter().enumerate() {
                    if i > 0 {
                        w.push(b' ');
                    }
                    q.write_key(w);
                }
            }
            query => query.write_key(w),
        }
    }

    /// Writes the query as a single `search-key`.
    fn write_key(&self, w: &mut Writer) {
        match self {
            Self::All => w.raw(b"ALL"),
            Self::Field(field, text) => {
                w.raw(field.as_str().as_bytes());
                w.push(b' ');
                w.string(text);
            }
            Self::Header(name, text) => {
                w.raw(b"HEADER ");
                w.astring(name);
                w.push(b' ');
                w.string(text);
            }
            Self::Flag(flag, set) => w.raw(flag_key(*flag, *set).as_bytes()),
            Self::Keyword(keyword, set) => {
                w.raw(if *set { b"KEYWORD ".as_slice() } else { b"UNKEYWORD ".as_slice() });
                w.astring(keyword);
            }
            Self::Size(cmp, n) => {
                let key = match cmp {
                    SizeCmp::Larger => "LARGER",
                    SizeCmp::Smaller => "SMALLER",
                };
                w.raw(format!("{key} {n}").as_bytes());
            }
            Self::Date(field, cmp, date) => {
                let prefix = match field {
                    DateField::Internal => "",
                    DateField::Sent => "SENT",
                };
                let key = match cmp {
                    DateCmp::Before => "BEFORE",
                    DateCmp::On => "ON",
                    DateCmp::Since => "SINCE",
                };
                w.raw(format!("{prefix}{key} {}", date.format("%-d-%b-%Y")).as_bytes());
            }
            Self::Uid(set) => {
                w.raw(b"UID ");
                w.raw(set.to_string().as_bytes());
            }
            Self::And(queries) if queries.is_empty() => w.raw(b"ALL"),
            Self::And(queries) => {
                w.push(b'(');
                for (i, q) in queries.iter().enumerate() {
                    if i > 0 {
                        w.push(b' ');
                    }
                    q.write_key(w);
                }
                w.push(b')');
            }
            Self::Or(a, b) => {
                w.raw(b"OR ");
                a.write_key(w);
                w.push(b' ');
                b.write_key(w);
            }
            Self::Not(q) => {
                w.raw(b"NOT ");
                q.write_key(w);
            }
        }
    }
}

const fn flag_key(flag: FlagKey, set: bool) -> &'static str {
    match (flag, set) {
        (FlagKey::Seen, true) => "SEEN",
        (FlagKey::Seen, false) => "UNSEEN",
        (FlagKey::Answered, true) => "ANSWERED",
        (FlagKey::Answered, false) => "UNANSWERED",
        (FlagKey::Flagged, true) => "FLAGGED",
        (FlagKey::Flagged, false) => "UNFLAGGED",
        (FlagKey::Deleted, true) => "DELETED",
        (FlagKey::Deleted, false) => "UNDELETED",
        (FlagKey::Draft, true) => "DRAFT",
        (FlagKey::Draft, false) => "UNDRAFT",
        (FlagKey::Recent, true) => "RECENT",
        (FlagKey::Recent, false) => "OLD",
    }
}
