//! ORDEREDSUBJECT threading (RFC 5256).
//!
//! Messages whose base subjects match form one thread. Inside a thread
//! messages are ordered by timestamp; threads are ordered by their oldest
//! message. The earliest message is the root and every other message is
//! its direct child, so the result is a two-level forest. Both sorts are
//! stable: equal timestamps keep their input order.

use std::collections::HashMap;
use std::sync::LazyLock;

use mailpipe_imap::{FetchRecord, Uid};
use regex::Regex;

/// One leading `Re:`, `Fwd:` or `[list]` marker.
#[allow(clippy::expect_used)]
static LEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:(?:re|fwd?)\s*(?:\[[^\[\]]*\]\s*)*:|\[[^\[\]]*\])")
        .expect("leading subject pattern")
});

/// Trailing `(fwd)` annotations.
#[allow(clippy::expect_used)]
static TRAILING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:\s*\(fwd\))+\s*$").expect("trailing subject pattern"));

/// A `[fwd: ...]` wrapper around a whole subject.
#[allow(clippy::expect_used)]
static WRAPPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\[fwd:(.*)\]$").expect("wrapped subject pattern"));

/// The base subject used to group messages: reply and forward markers
/// stripped, whitespace collapsed, case folded.
///
/// A `[blob]` is kept when removing it would leave nothing.
#[must_use]
pub fn base_subject(subject: &str) -> String {
    let mut subject = subject.split_whitespace().collect::<Vec<_>>().join(" ");
    loop {
        let trimmed = TRAILING.replace(&subject, "").trim().to_string();
        let next = if let Some(inner) = WRAPPED.captures(&trimmed) {
            inner[1].trim().to_string()
        } else {
            let stripped = LEADING.replace(&trimmed, "").trim().to_string();
            if stripped.is_empty() { trimmed } else { stripped }
        };
        if next == subject {
            return subject.to_lowercase();
        }
        subject = next;
    }
}

/// One message as threading sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadItem {
    /// Message UID.
    pub uid: Uid,
    /// Decoded subject; empty when absent.
    pub subject: String,
    /// Effective timestamp in epoch seconds.
    pub timestamp: i64,
}

impl ThreadItem {
    /// Creates an item.
    #[must_use]
    pub fn new(uid: Uid, subject: impl Into<String>, timestamp: i64) -> Self {
        Self {
            uid,
            subject: subject.into(),
            timestamp,
        }
    }

    /// The item for a fetched message, or `None` when it has no UID.
    ///
    /// The timestamp is the envelope date, else the internal date, else 0.
    #[must_use]
    pub fn from_record(record: &FetchRecord) -> Option<Self> {
        Some(Self::new(
            record.uid?,
            record.subject().unwrap_or_default(),
            record.timestamp(),
        ))
    }
}

/// A thread: the oldest message and its later replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    /// The oldest message.
    pub root: Uid,
    /// Every other message, oldest first.
    pub children: Vec<Uid>,
}

/// Groups `items` into threads.
pub fn thread_by_subject(items: impl IntoIterator<Item = ThreadItem>) -> Vec<Thread> {
    let mut groups: Vec<Vec<ThreadItem>> = Vec::new();
    let mut by_subject: HashMap<String, usize> = HashMap::new();

    for item in items {
        let key = base_subject(&item.subject);
        match by_subject.get(&key) {
            Some(&i) => groups[i].push(item),
            None => {
                by_subject.insert(key, groups.len());
                groups.push(vec![item]);
            }
        }
    }

    for group in &mut groups {
        group.sort_by_key(|item| item.timestamp);
    }
    groups.sort_by_key(|group| group[0].timestamp);

    groups
        .into_iter()
        .filter_map(|group| {
            let mut uids = group.into_iter().map(|item| item.uid);
            let root = uids.next()?;
            Some(Thread {
                root,
                children: uids.collect(),
            })
        })
        .collect()
}

/// Threads fetched messages, skipping any without a UID.
#[must_use]
pub fn thread_records(records: &[FetchRecord]) -> Vec<Thread> {
    thread_by_subject(records.iter().filter_map(ThreadItem::from_record))
}

/// Where a message sits in a threaded listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadPosition {
    /// Row in the flattened listing (each root followed by its children).
    pub position: usize,
    /// 0 for a root, 1 for a child.
    pub level: u8,
    /// Root of the message's thread.
    pub root: Uid,
}

/// Lookup from UID to [`ThreadPosition`].
#[derive(Debug, Clone, Default)]
pub struct ThreadIndex {
    positions: HashMap<Uid, ThreadPosition>,
}

impl ThreadIndex {
    /// Indexes `threads`.
    #[must_use]
    pub fn new(threads: &[Thread]) -> Self {
        let mut positions = HashMap::new();
        let mut position = 0;
        for thread in threads {
            positions.insert(
                thread.root,
                ThreadPosition {
                    position,
                    level: 0,
                    root: thread.root,
                },
            );
            position += 1;
            for &child in &thread.children {
                positions.insert(
                    child,
                    ThreadPosition {
                        position,
                        level: 1,
                        root: thread.root,
                    },
                );
                position += 1;
            }
        }
        Self { positions }
    }

    /// Position of `uid`, if it was threaded.
    #[must_use]
    pub fn get(&self, uid: Uid) -> Option<ThreadPosition> {
        self.positions.get(&uid).copied()
    }

    /// Number of indexed messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true if nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
