//! Mail operations on an account.
//!
//! Each operation composes one or more commands on the account's
//! connection. Capabilities and the mailbox listing are memoized per
//! account: concurrent callers share one round trip, success is cached
//! until invalidated, and a failure is retried by the next call.

use std::sync::Arc;

use futures::FutureExt;
use mailpipe_imap::command::SearchReturn;
use mailpipe_imap::parser::records;
use mailpipe_imap::task::{self, Task};
use mailpipe_imap::{
    Capabilities, Capability, Command, FetchItems, FetchRecord, ListEntry, Mailbox,
    MailboxAttribute, MailboxCounts, SearchQuery, Selection, SequenceSet, StatusAttribute, Uid,
};
use tracing::{debug, info};

use super::registry::Account;
use crate::{Error, ErrorKind, Result};

const SEARCH_CHARSET: &str = "UTF-8";

fn status_items() -> Vec<StatusAttribute> {
    vec![
        StatusAttribute::Messages,
        StatusAttribute::Recent,
        StatusAttribute::UidNext,
        StatusAttribute::UidValidity,
        StatusAttribute::Unseen,
    ]
}

/// The 1-based sequence range of the newest `count` messages of a mailbox
/// holding `exists`, optionally leaving out the newest one.
///
/// Returns `None` when the range is empty.
#[must_use]
pub fn message_range(exists: u32, count: u32, exclude_newest: bool) -> Option<(u32, u32)> {
    let end = if exclude_newest {
        exists.saturating_sub(1)
    } else {
        exists
    };
    if end == 0 || count == 0 {
        return None;
    }
    let start = end.saturating_sub(count - 1).max(1);
    Some((start, end))
}

/// Converts CRLF line endings to bare LF.
#[must_use]
pub fn normalize_newlines(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter().peekable();
    while let Some(&b) = bytes.next() {
        if b == b'\r' && bytes.peek() == Some(&&b'\n') {
            continue;
        }
        out.push(b);
    }
    out
}

impl Account {
    /// The server's capabilities.
    ///
    /// # Errors
    ///
    /// Returns the connection or status error of the CAPABILITY command.
    pub async fn capabilities(&self) -> Result<Capabilities> {
        let account = self.clone();
        self.inner
            .capabilities
            .get_or_run(move || async move {
                let payload = account.run(Command::Capability, None).await?;
                Ok(records::capabilities(&payload)?)
            })
            .await
    }

    /// Forgets the cached capabilities.
    pub fn invalidate_capabilities(&self) {
        self.inner.capabilities.invalidate();
    }

    async fn require(&self, capability: Capability) -> Result<()> {
        if self.capabilities().await?.has(&capability) {
            Ok(())
        } else {
            Err(Error::Capability(capability.to_string()))
        }
    }

    /// Every mailbox under the account's path prefix, with counts when the
    /// server supports LIST-STATUS.
    ///
    /// # Errors
    ///
    /// Returns the connection, status or parse error of the LIST command.
    pub async fn mailboxes(&self) -> Result<Arc<Vec<ListEntry>>> {
        let account = self.clone();
        self.inner
            .mailboxes
            .get_or_run(move || async move { account.list_mailboxes().await.map(Arc::new) })
            .await
    }

    /// Drops the cached listing and lists again.
    ///
    /// # Errors
    ///
    /// As [`Account::mailboxes`].
    pub async fn refresh_mailboxes(&self) -> Result<Arc<Vec<ListEntry>>> {
        self.inner.mailboxes.invalidate();
        self.mailboxes().await
    }

    async fn list_mailboxes(&self) -> Result<Vec<ListEntry>> {
        let status = if self.capabilities().await?.has(&Capability::ListStatus) {
            status_items()
        } else {
            Vec::new()
        };
        let command = Command::List {
            reference: String::new(),
            pattern: format!("{}*", self.inner.url.path),
            status,
        };
        let entries = records::mailbox_list(&self.run(command, None).await?)?;
        debug!(account = %self.name(), count = entries.len(), "listed mailboxes");
        Ok(entries)
    }

    /// The listing entry for `mailbox`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the listing has no such mailbox.
    pub async fn mailbox(&self, mailbox: &Mailbox) -> Result<ListEntry> {
        self.mailboxes()
            .await?
            .iter()
            .find(|entry| entry.mailbox == *mailbox)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("mailbox {mailbox}")))
    }

    /// The mailbox carrying a SPECIAL-USE attribute such as `\Sent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no listed mailbox has it.
    pub async fn special_use(&self, attribute: &MailboxAttribute) -> Result<ListEntry> {
        self.mailboxes()
            .await?
            .iter()
            .find(|entry| entry.has_attribute(attribute))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("mailbox with {attribute}")))
    }

    /// Like [`Account::special_use`], falling back to a mailbox named
    /// `fallback` when no mailbox has the attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when neither exists.
    pub async fn special_use_or(
        &self,
        attribute: &MailboxAttribute,
        fallback: &Mailbox,
    ) -> Result<ListEntry> {
        match self.special_use(attribute).await {
            Err(e) if e.kind() == ErrorKind::NotFound => self.mailbox(fallback).await,
            other => other,
        }
    }

    /// Live message counts via STATUS.
    ///
    /// # Errors
    ///
    /// Returns the server's NO when the mailbox does not exist.
    pub async fn status(&self, mailbox: &Mailbox) -> Result<MailboxCounts> {
        let command = Command::Status {
            mailbox: mailbox.clone(),
            items: status_items(),
        };
        let payload = self.run(command, None).await?;
        Ok(records::status(&payload, mailbox)?)
    }

    /// Counts for several mailboxes, requested concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first failure observed.
    pub async fn statuses(&self, mailboxes: &[Mailbox]) -> Result<Vec<MailboxCounts>> {
        let tasks = mailboxes
            .iter()
            .map(|mailbox| {
                let account = self.clone();
                let mailbox = mailbox.clone();
                async move { account.status(&mailbox).await }.boxed()
            })
            .collect();
        task::concurrent(tasks).await
    }

    /// Selects `mailbox` read-write and returns its metadata.
    ///
    /// # Errors
    ///
    /// Returns the server's NO when the mailbox cannot be selected.
    pub async fn select(&self, mailbox: &Mailbox) -> Result<Selection> {
        let result = self
            .execute(Command::Select { mailbox: mailbox.clone() }, None)
            .await?;
        Ok(records::selection(&result.responses, result.code.as_ref())?)
    }

    /// Opens `mailbox` read-only and returns its metadata.
    ///
    /// # Errors
    ///
    /// Returns the server's NO when the mailbox cannot be examined.
    pub async fn examine(&self, mailbox: &Mailbox) -> Result<Selection> {
        let result = self
            .execute(Command::Examine { mailbox: mailbox.clone() }, None)
            .await?;
        Ok(records::selection(&result.responses, result.code.as_ref())?)
    }

    /// Summaries of the newest `count` messages of `mailbox`, oldest first.
    ///
    /// The range comes from the EXISTS count of a fresh SELECT. With
    /// `exclude_newest` the newest message is left out. An empty mailbox
    /// yields nothing without a FETCH.
    ///
    /// # Errors
    ///
    /// Returns the first failing command's error.
    pub async fn fetch_range(
        &self,
        mailbox: &Mailbox,
        count: u32,
        exclude_newest: bool,
    ) -> Result<Vec<FetchRecord>> {
        let selected: Task<Selection, Error> = {
            let account = self.clone();
            let mailbox = mailbox.clone();
            async move { account.select(&mailbox).await }.boxed()
        };
        let account = self.clone();
        let mailbox = mailbox.clone();
        task::sequence(selected, move |selection| async move {
            let Some((start, end)) = message_range(selection.exists, count, exclude_newest) else {
                return Ok(Vec::new());
            };
            let sequence = SequenceSet::range(start, end).ok_or_else(|| {
                mailpipe_imap::Error::Protocol(format!("invalid range {start}:{end}"))
            })?;
            let command = Command::Fetch {
                sequence,
                items: FetchItems::summary(),
                uid: false,
            };
            Ok(records::fetch_records(&account.run(command, Some(mailbox)).await?)?)
        })
        .await
    }

    /// The raw message with UID `uid`, line endings normalized to LF.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the server sends no body for it.
    pub async fn fetch_message(&self, mailbox: &Mailbox, uid: Uid) -> Result<Vec<u8>> {
        let command = Command::Fetch {
            sequence: SequenceSet::from_uids([uid]),
            items: FetchItems::full_body(),
            uid: true,
        };
        let payload = self.run(command, Some(mailbox.clone())).await?;
        let body = records::fetch_records(&payload)?
            .into_iter()
            .filter(|record| record.uid.is_none_or(|u| u == uid))
            .find_map(|record| record.body)
            .ok_or_else(|| Error::NotFound(format!("message {uid} in {mailbox}")))?;
        Ok(normalize_newlines(&body))
    }

    async fn search_command(
        &self,
        mailbox: &Mailbox,
        query: SearchQuery,
        extended: SearchReturn,
    ) -> Result<Vec<Vec<u8>>> {
        let returns = if self.capabilities().await?.has(&Capability::ESearch) {
            vec![extended]
        } else {
            Vec::new()
        };
        let command = Command::Search {
            query,
            charset: Some(SEARCH_CHARSET.to_string()),
            returns,
            uid: true,
        };
        self.run(command, Some(mailbox.clone())).await
    }

    /// UIDs of the messages in `mailbox` matching `query`.
    ///
    /// # Errors
    ///
    /// Returns the connection, status or parse error of the search.
    pub async fn search_uids(&self, mailbox: &Mailbox, query: SearchQuery) -> Result<Vec<Uid>> {
        let payload = self.search_command(mailbox, query, SearchReturn::All).await?;
        Ok(records::search(&payload)?
            .into_iter()
            .filter_map(Uid::new)
            .collect())
    }

    /// Summaries of the messages in `mailbox` matching `query`.
    ///
    /// # Errors
    ///
    /// Returns the first failing command's error.
    pub async fn search(&self, mailbox: &Mailbox, query: SearchQuery) -> Result<Vec<FetchRecord>> {
        let uids = self.search_uids(mailbox, query).await?;
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let command = Command::Fetch {
            sequence: SequenceSet::from_uids(uids),
            items: FetchItems::summary(),
            uid: true,
        };
        Ok(records::fetch_records(&self.run(command, Some(mailbox.clone())).await?)?)
    }

    /// Number of messages in `mailbox` matching `query`.
    ///
    /// # Errors
    ///
    /// Returns the connection, status or parse error of the search.
    pub async fn search_count(&self, mailbox: &Mailbox, query: SearchQuery) -> Result<u32> {
        let payload = self.search_command(mailbox, query, SearchReturn::Count).await?;
        Ok(records::search_count(&payload)?)
    }

    /// Moves messages by UID from `mailbox` to `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capability`] without sending anything when the
    /// server lacks MOVE.
    pub async fn move_messages(
        &self,
        mailbox: &Mailbox,
        uids: &[Uid],
        destination: &Mailbox,
    ) -> Result<()> {
        self.require(Capability::Move).await?;
        if uids.is_empty() {
            return Ok(());
        }
        let command = Command::Move {
            sequence: SequenceSet::from_uids(uids.iter().copied()),
            mailbox: destination.clone(),
            uid: true,
        };
        self.run(command, Some(mailbox.clone())).await?;
        info!(
            account = %self.name(),
            count = uids.len(),
            from = %mailbox,
            to = %destination,
            "moved messages"
        );
        Ok(())
    }

    /// Logs out and drops the connection. The next request reconnects.
    ///
    /// # Errors
    ///
    /// Returns a status error if the server refuses LOGOUT. A connection
    /// that is already gone is not an error.
    pub async fn disconnect(&self) -> Result<()> {
        let Some(conn) = self.take_connection().await else {
            return Ok(());
        };
        if conn.is_closed() {
            return Ok(());
        }
        info!(account = %self.name(), "logging out");
        let logout: Task<(), Error> = async move { Ok(conn.logout().await?) }.boxed();
        task::intercept(logout, |e| match e.kind() {
            ErrorKind::Connection => Ok(()),
            _ => Err(e),
        })
        .await
    }
}
