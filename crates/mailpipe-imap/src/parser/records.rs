//! Typed records extracted from a command's untagged payload.
//!
//! A completed command hands back every untagged response the server sent
//! before its tagged line. The functions here parse that payload once and
//! pick out what each response class needs. A response that fails to parse
//! is logged with its position and fails the whole extraction; no partial
//! result is ever returned.

use tracing::warn;

use crate::parser::date;
use crate::parser::response::{Envelope, FetchItem, Response, ResponseParser, UntaggedResponse};
use crate::types::{
    Capabilities, Flags, ListEntry, Mailbox, MailboxCounts, ResponseCode, Selection, SeqNum, Uid,
};
use crate::{Error, Result};

/// Bytes of context logged on each side of a parse failure.
const WINDOW: usize = 40;

/// Summary of one message from a FETCH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRecord {
    /// Message sequence number.
    pub seq: SeqNum,
    /// Unique identifier.
    pub uid: Option<Uid>,
    /// Flags.
    pub flags: Flags,
    /// RFC822.SIZE.
    pub size: Option<u32>,
    /// Parsed envelope.
    pub envelope: Option<Envelope>,
    /// INTERNALDATE as epoch seconds.
    pub internal_date: Option<i64>,
    /// Raw `BODY[]` content.
    pub body: Option<Vec<u8>>,
}

impl FetchRecord {
    fn new(seq: SeqNum) -> Self {
        Self {
            seq,
            uid: None,
            flags: Flags::new(),
            size: None,
            envelope: None,
            internal_date: None,
            body: None,
        }
    }

    fn absorb(&mut self, items: Vec<FetchItem>) {
        for item in items {
            match item {
                FetchItem::Uid(uid) => self.uid = Some(uid),
                FetchItem::Flags(flags) => self.flags = flags,
                FetchItem::Rfc822Size(size) => self.size = Some(size),
                FetchItem::Envelope(envelope) => self.envelope = Some(*envelope),
                FetchItem::InternalDate(value) => {
                    self.internal_date = date::parse_internal_date(&value);
                }
                FetchItem::Body { section, data, .. } if section.is_empty() => self.body = data,
                FetchItem::Body { .. } | FetchItem::BodyStructure => {}
            }
        }
    }

    /// Effective timestamp: envelope date, else internal date, else 0.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.envelope
            .as_ref()
            .and_then(Envelope::timestamp)
            .or(self.internal_date)
            .unwrap_or(0)
    }

    /// Decoded subject, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.envelope.as_ref().and_then(|e| e.subject.as_deref())
    }
}

/// Parses one response, logging the failure point when it does not parse.
pub fn parse_response(frame: &[u8]) -> Result<Response> {
    ResponseParser::parse(frame).inspect_err(|err| {
        let position = match err {
            Error::Parse { position, .. } => *position,
            _ => 0,
        };
        let start = position.saturating_sub(WINDOW);
        let end = (position + WINDOW).min(frame.len());
        warn!(
            position,
            len = frame.len(),
            window = %String::from_utf8_lossy(&frame[start.min(end)..end]).escape_debug(),
            error = %err,
            "failed to parse server response"
        );
    })
}

/// Parses every untagged response in `payload`.
pub fn untagged(payload: &[Vec<u8>]) -> Result<Vec<UntaggedResponse>> {
    payload
        .iter()
        .filter_map(|frame| match parse_response(frame) {
            Ok(Response::Untagged(u)) => Some(Ok(u)),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
        .collect()
}

/// Extracts the capability set from CAPABILITY data or response codes.
pub fn capabilities(payload: &[Vec<u8>]) -> Result<Capabilities> {
    let mut caps = Vec::new();
    for response in untagged(payload)? {
        match response {
            UntaggedResponse::Capability(c)
            | UntaggedResponse::Ok {
                code: Some(ResponseCode::Capability(c)),
                ..
            } => caps.extend(c),
            _ => {}
        }
    }
    Ok(Capabilities::new(caps))
}

/// Extracts LIST entries in server order, merging interleaved STATUS data.
pub fn mailbox_list(payload: &[Vec<u8>]) -> Result<Vec<ListEntry>> {
    let mut entries: Vec<ListEntry> = Vec::new();
    let mut statuses = Vec::new();

    for response in untagged(payload)? {
        match response {
            UntaggedResponse::List(entry) => entries.push(entry),
            UntaggedResponse::Status { mailbox, counts } => statuses.push((mailbox, counts)),
            _ => {}
        }
    }

    for (mailbox, counts) in statuses {
        if let Some(entry) = entries.iter_mut().find(|e| e.mailbox == mailbox) {
            entry.status = Some(counts);
        }
    }

    Ok(entries)
}

/// Extracts the STATUS counts reported for `mailbox`.
pub fn status(payload: &[Vec<u8>], mailbox: &Mailbox) -> Result<MailboxCounts> {
    untagged(payload)?
        .into_iter()
        .find_map(|response| match response {
            UntaggedResponse::Status { mailbox: m, counts } if m == *mailbox => Some(counts),
            _ => None,
        })
        .ok_or_else(|| Error::Protocol(format!("no STATUS data for {mailbox}")))
}

fn apply_code(code: ResponseCode, selection: &mut Selection) {
    match code {
        ResponseCode::PermanentFlags(flags) => selection.permanent_flags = flags,
        ResponseCode::Unseen(seq) => selection.unseen = Some(seq),
        ResponseCode::UidNext(uid) => selection.uid_next = Some(uid),
        ResponseCode::UidValidity(v) => selection.uid_validity = Some(v),
        ResponseCode::ReadOnly => selection.read_only = true,
        ResponseCode::ReadWrite => selection.read_only = false,
        _ => {}
    }
}

/// Builds selection metadata from SELECT/EXAMINE data and the tagged code.
pub fn selection(payload: &[Vec<u8>], tagged_code: Option<&ResponseCode>) -> Result<Selection> {
    let mut selection = Selection::default();

    for response in untagged(payload)? {
        match response {
            UntaggedResponse::Flags(flags) => selection.flags = flags,
            UntaggedResponse::Exists(n) => selection.exists = n,
            UntaggedResponse::Recent(n) => selection.recent = n,
            UntaggedResponse::Ok {
                code: Some(code), ..
            } => apply_code(code, &mut selection),
            _ => {}
        }
    }
    if let Some(code) = tagged_code {
        apply_code(code.clone(), &mut selection);
    }

    Ok(selection)
}

/// The last EXISTS count in `payload`.
pub fn exists(payload: &[Vec<u8>]) -> Result<Option<u32>> {
    Ok(untagged(payload)?
        .into_iter()
        .rev()
        .find_map(|response| match response {
            UntaggedResponse::Exists(n) => Some(n),
            _ => None,
        }))
}

/// Extracts FETCH records in server order. Several FETCH responses for the
/// same message are merged.
pub fn fetch_records(payload: &[Vec<u8>]) -> Result<Vec<FetchRecord>> {
    let mut records: Vec<FetchRecord> = Vec::new();

    for response in untagged(payload)? {
        if let UntaggedResponse::Fetch { seq, items } = response {
            match records.iter_mut().find(|r| r.seq == seq) {
                Some(record) => record.absorb(items),
                None => {
                    let mut record = FetchRecord::new(seq);
                    record.absorb(items);
                    records.push(record);
                }
            }
        }
    }

    Ok(records)
}

/// Extracts search hits from SEARCH or ESEARCH data, in server order.
pub fn search(payload: &[Vec<u8>]) -> Result<Vec<u32>> {
    let mut hits = Vec::new();
    for response in untagged(payload)? {
        match response {
            UntaggedResponse::Search(nums) => hits.extend(nums),
            UntaggedResponse::ESearch(es) => {
                if let Some(all) = es.all {
                    hits.extend(all.iter());
                }
            }
            _ => {}
        }
    }
    Ok(hits)
}

/// Number of search hits: the ESEARCH COUNT when present, otherwise the
/// number of hits listed.
pub fn search_count(payload: &[Vec<u8>]) -> Result<u32> {
    let mut listed = 0u32;
    for response in untagged(payload)? {
        match response {
            UntaggedResponse::ESearch(es) => {
                if let Some(count) = es.count {
                    return Ok(count);
                }
                if let Some(all) = es.all {
                    listed = listed.saturating_add(u32::try_from(all.count()).unwrap_or(u32::MAX));
                }
            }
            UntaggedResponse::Search(nums) => {
                listed = listed.saturating_add(u32::try_from(nums.len()).unwrap_or(u32::MAX));
            }
            _ => {}
        }
    }
    Ok(listed)
}
