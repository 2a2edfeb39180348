//! Sans-I/O command pipeline.
//!
//! The pipeline owns everything about one connection that is not the socket:
//! tag generation, the queue of submitted commands, the currently selected
//! mailbox and the payload collected for the command on the wire. The I/O
//! layer feeds it complete frames and writes out whatever
//! [`Pipeline::poll_transmit`] returns.
//!
//! Callers may submit any number of commands, but only one is ever on the
//! wire. A command that targets a mailbox other than the selected one is
//! preceded by a SELECT under its own tag; the command is sent only once
//! that SELECT succeeds.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::command::{Command, TagGenerator};
use crate::parser::records;
use crate::parser::response::{Response, UntaggedResponse};
use crate::types::{Capability, Mailbox, ResponseCode, Status, Tag};
use crate::{Error, Result};

/// Bytes ready to be written to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    /// Raw bytes to send.
    pub data: Vec<u8>,
    /// The bytes carry credentials and must not be logged.
    pub sensitive: bool,
}

/// Outcome of one command: the tagged status plus every untagged response
/// received while it was on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Tagged status.
    pub status: Status,
    /// Response code of the tagged line.
    pub code: Option<ResponseCode>,
    /// Human-readable text of the tagged line.
    pub text: String,
    /// Raw untagged frames, in arrival order.
    pub responses: Vec<Vec<u8>>,
    authenticate: bool,
}

impl CommandResult {
    /// Fails on NO or BAD, otherwise returns the result unchanged.
    pub fn check(self) -> Result<Self> {
        match self.status {
            Status::Ok | Status::PreAuth => Ok(self),
            _ if self.authenticate => Err(Error::Auth(self.text)),
            Status::Bad => Err(Error::Bad(self.text)),
            Status::No | Status::Bye => Err(Error::No(self.text)),
        }
    }

    /// Fails on NO or BAD, otherwise returns the untagged payload.
    pub fn into_result(self) -> Result<Vec<Vec<u8>>> {
        self.check().map(|result| result.responses)
    }
}

/// A submitted command waiting for its turn.
#[derive(Debug)]
struct Entry<R> {
    tag: Tag,
    mailbox: Option<Mailbox>,
    command: Command,
    continuation: Vec<Vec<u8>>,
    reply: R,
}

#[derive(Debug)]
enum Origin<R> {
    /// A command a caller submitted.
    User(Entry<R>),
    /// A SELECT inserted ahead of `waiting`.
    Select { tag: Tag, waiting: Entry<R> },
}

#[derive(Debug)]
struct InFlight<R> {
    origin: Origin<R>,
    payload: Vec<Vec<u8>>,
    /// Command parts still waiting for a `+` continuation.
    pending: VecDeque<Vec<u8>>,
    sensitive: bool,
}

impl<R> InFlight<R> {
    fn tag(&self) -> &Tag {
        match &self.origin {
            Origin::User(entry) => &entry.tag,
            Origin::Select { tag, .. } => tag,
        }
    }
}

/// Pipeline state for one connection. `R` is whatever the caller uses to
/// deliver a result, typically a oneshot sender.
#[derive(Debug)]
pub struct Pipeline<R> {
    tags: TagGenerator,
    selected: Option<Mailbox>,
    queue: VecDeque<Entry<R>>,
    in_flight: Option<InFlight<R>>,
    outbox: VecDeque<Transmit>,
    literal_plus: bool,
}

impl<R> Pipeline<R> {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new(tags: TagGenerator) -> Self {
        Self {
            tags,
            selected: None,
            queue: VecDeque::new(),
            in_flight: None,
            outbox: VecDeque::new(),
            literal_plus: false,
        }
    }

    /// Queues `command`, to run with `mailbox` selected when given.
    ///
    /// The tag is allocated immediately; it identifies the command in logs.
    pub fn submit(&mut self, command: Command, mailbox: Option<Mailbox>, reply: R) -> Tag {
        self.submit_with_continuation(command, mailbox, Vec::new(), reply)
    }

    /// Queues `command` followed by lines sent one per `+` continuation
    /// (SASL responses without SASL-IR).
    pub fn submit_with_continuation(
        &mut self,
        command: Command,
        mailbox: Option<Mailbox>,
        continuation: Vec<Vec<u8>>,
        reply: R,
    ) -> Tag {
        let tag = self.tags.next_tag();
        debug!(tag = %tag, command = command.name(), mailbox = ?mailbox, "queued");
        self.queue.push_back(Entry {
            tag: tag.clone(),
            mailbox,
            command,
            continuation,
            reply,
        });
        tag
    }

    /// Returns the next bytes to write, if any.
    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        if let Some(transmit) = self.outbox.pop_front() {
            return Some(transmit);
        }
        if self.in_flight.is_some() {
            return None;
        }

        let entry = self.queue.pop_front()?;
        let needs_select = entry
            .mailbox
            .as_ref()
            .is_some_and(|target| self.selected.as_ref() != Some(target));

        let (origin, command) = if needs_select {
            let tag = self.tags.next_tag();
            let command = Command::Select {
                mailbox: entry.mailbox.clone().unwrap_or_else(Mailbox::inbox),
            };
            debug!(tag = %tag, for_tag = %entry.tag, "auto-select");
            (Origin::Select { tag, waiting: entry }, command)
        } else {
            let command = entry.command.clone();
            (Origin::User(entry), command)
        };

        let mut in_flight = InFlight {
            payload: Vec::new(),
            pending: VecDeque::new(),
            sensitive: command.is_sensitive(),
            origin,
        };
        let mut parts = command.serialize(in_flight.tag(), self.literal_plus);
        if let Origin::User(entry) = &mut in_flight.origin {
            parts.append(&mut entry.continuation);
        }
        let mut parts = VecDeque::from(parts);
        let first = parts.pop_front().unwrap_or_default();
        in_flight.pending = parts;
        let sensitive = in_flight.sensitive;
        self.in_flight = Some(in_flight);

        Some(Transmit {
            data: first,
            sensitive,
        })
    }

    /// Feeds one complete frame from the server.
    ///
    /// Returns a finished command when the frame completes one. An `Err` is
    /// fatal for the connection: the caller should close it and call
    /// [`Pipeline::fail_all`].
    pub fn handle_frame(&mut self, frame: Vec<u8>) -> Result<Option<(R, Result<CommandResult>)>> {
        match frame.first() {
            Some(b'+') => self.handle_continuation().map(|()| None),
            Some(b'*') => self.handle_untagged(frame).map(|()| None),
            _ => Ok(self.handle_tagged(&frame)),
        }
    }

    fn handle_continuation(&mut self) -> Result<()> {
        let Some(in_flight) = &mut self.in_flight else {
            return Err(Error::Protocol("continuation with no command in flight".into()));
        };
        let Some(data) = in_flight.pending.pop_front() else {
            return Err(Error::Protocol(format!(
                "unexpected continuation for {}",
                in_flight.tag()
            )));
        };
        self.outbox.push_back(Transmit {
            data,
            sensitive: in_flight.sensitive,
        });
        Ok(())
    }

    fn handle_untagged(&mut self, frame: Vec<u8>) -> Result<()> {
        if frame.starts_with(b"* BYE") {
            let logging_out = matches!(
                &self.in_flight,
                Some(InFlight { origin: Origin::User(Entry { command: Command::Logout, .. }), .. })
            );
            if !logging_out {
                let text = match records::parse_response(&frame) {
                    Ok(Response::Untagged(UntaggedResponse::Bye { text, .. })) => text,
                    _ => String::from_utf8_lossy(&frame).trim_end().to_string(),
                };
                return Err(Error::Bye(text));
            }
        }

        match &mut self.in_flight {
            Some(in_flight) => in_flight.payload.push(frame),
            None => debug!(len = frame.len(), "unsolicited response dropped"),
        }
        Ok(())
    }

    fn handle_tagged(&mut self, frame: &[u8]) -> Option<(R, Result<CommandResult>)> {
        let Some(expected) = self.in_flight.as_ref().map(|f| f.tag().clone()) else {
            warn!(line = %String::from_utf8_lossy(frame).trim_end(), "tagged response with nothing in flight");
            return None;
        };
        if !expected.matches_line(frame) {
            warn!(expected = %expected, line = %String::from_utf8_lossy(frame).trim_end(), "unexpected tag");
            return None;
        }
        let in_flight = self.in_flight.take()?;

        let parsed = match records::parse_response(frame) {
            Ok(Response::Tagged {
                status, code, text, ..
            }) => Ok((status, code, text)),
            Ok(other) => Err(Error::Protocol(format!("expected tagged response, got {other:?}"))),
            Err(err) => Err(err),
        };

        match in_flight.origin {
            Origin::Select { tag, waiting } => {
                match parsed {
                    Ok((Status::Ok, _, _)) => {
                        debug!(tag = %tag, mailbox = ?waiting.mailbox, "selected");
                        self.selected.clone_from(&waiting.mailbox);
                        self.queue.push_front(waiting);
                        None
                    }
                    Ok((status, _, text)) => {
                        self.selected = None;
                        let err = if status == Status::Bad {
                            Error::Bad(text)
                        } else {
                            Error::No(text)
                        };
                        Some((waiting.reply, Err(err)))
                    }
                    Err(err) => {
                        self.selected = None;
                        Some((waiting.reply, Err(err)))
                    }
                }
            }
            Origin::User(entry) => {
                let result = parsed.and_then(|(status, code, text)| {
                    self.after_command(&entry, status, code.as_ref(), &in_flight.payload);
                    if let Some(expected) = &entry.mailbox
                        && self.selected.as_ref() != Some(expected)
                    {
                        return Err(Error::InvalidState(format!(
                            "{} completed with {:?} selected, expected {expected}",
                            entry.tag, self.selected
                        )));
                    }
                    Ok(CommandResult {
                        status,
                        code,
                        text,
                        responses: in_flight.payload,
                        authenticate: matches!(entry.command, Command::Authenticate { .. }),
                    })
                });
                Some((entry.reply, result))
            }
        }
    }

    /// Tracks selection changes and LITERAL+ from a finished command.
    fn after_command(
        &mut self,
        entry: &Entry<R>,
        status: Status,
        code: Option<&ResponseCode>,
        payload: &[Vec<u8>],
    ) {
        match &entry.command {
            Command::Select { mailbox } if status == Status::Ok => {
                self.selected = Some(mailbox.clone());
            }
            Command::Select { .. } | Command::Examine { .. } => self.selected = None,
            Command::Capability if status == Status::Ok => {
                if let Ok(caps) = records::capabilities(payload) {
                    self.literal_plus = caps.has(&Capability::LiteralPlus);
                }
            }
            _ => {}
        }
        if let Some(ResponseCode::Capability(caps)) = code {
            self.literal_plus = caps.contains(&Capability::LiteralPlus);
        }
    }

    /// Enables or disables non-synchronizing literals.
    pub const fn set_literal_plus(&mut self, enabled: bool) {
        self.literal_plus = enabled;
    }

    /// Currently selected mailbox.
    #[must_use]
    pub const fn selected(&self) -> Option<&Mailbox> {
        self.selected.as_ref()
    }

    /// Returns true if nothing is queued or on the wire.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }

    /// Number of commands not yet completed, including the one on the wire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len() + usize::from(self.in_flight.is_some())
    }

    /// Removes every outstanding command, returning their reply handles in
    /// submission order.
    pub fn fail_all(&mut self) -> Vec<R> {
        let mut replies = Vec::with_capacity(self.pending());
        if let Some(in_flight) = self.in_flight.take() {
            replies.push(match in_flight.origin {
                Origin::User(entry) | Origin::Select { waiting: entry, .. } => entry.reply,
            });
        }
        replies.extend(self.queue.drain(..).map(|entry| entry.reply));
        self.outbox.clear();
        self.selected = None;
        replies
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::similar_names)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;

    fn pipeline() -> Pipeline<u32> {
        Pipeline::new(TagGenerator::default())
    }

    fn sent(p: &mut Pipeline<u32>) -> String {
        String::from_utf8(p.poll_transmit().unwrap().data).unwrap()
    }

    fn feed(p: &mut Pipeline<u32>, line: &str) -> Option<(u32, Result<CommandResult>)> {
        p.handle_frame(line.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_one_command_on_the_wire() {
        let mut p = pipeline();
        p.submit(Command::Capability, None, 1);
        p.submit(Command::Noop, None, 2);

        assert_eq!(sent(&mut p), "A1 CAPABILITY\r\n");
        assert!(p.poll_transmit().is_none());

        assert!(feed(&mut p, "* CAPABILITY IMAP4rev1 MOVE\r\n").is_none());
        let (reply, result) = feed(&mut p, "A1 OK done\r\n").unwrap();
        assert_eq!(reply, 1);
        let result = result.unwrap();
        assert_eq!(result.responses, vec![b"* CAPABILITY IMAP4rev1 MOVE\r\n".to_vec()]);

        assert_eq!(sent(&mut p), "A2 NOOP\r\n");
    }

    #[test]
    fn test_auto_select_uses_fresh_tag() {
        let mut p = pipeline();
        let tag = p.submit(
            Command::Search {
                query: crate::command::SearchQuery::All,
                charset: None,
                returns: Vec::new(),
                uid: true,
            },
            Some(Mailbox::new("Archive")),
            7,
        );
        assert_eq!(tag.as_str(), "A1");

        assert_eq!(sent(&mut p), "A2 SELECT Archive\r\n");
        assert!(feed(&mut p, "* 4 EXISTS\r\n").is_none());
        assert!(feed(&mut p, "A2 OK [READ-WRITE] done\r\n").is_none());
        assert_eq!(p.selected(), Some(&Mailbox::new("Archive")));

        assert_eq!(sent(&mut p), "A1 UID SEARCH ALL\r\n");
        feed(&mut p, "* SEARCH 3 9\r\n");
        let (reply, result) = feed(&mut p, "A1 OK done\r\n").unwrap();
        assert_eq!(reply, 7);
        assert_eq!(result.unwrap().responses, vec![b"* SEARCH 3 9\r\n".to_vec()]);
    }

    #[test]
    fn test_same_mailbox_is_not_reselected() {
        let mut p = pipeline();
        p.submit(Command::Noop, Some(Mailbox::inbox()), 1);
        p.submit(Command::Noop, Some(Mailbox::inbox()), 2);

        assert_eq!(sent(&mut p), "A3 SELECT INBOX\r\n");
        feed(&mut p, "A3 OK\r\n");
        assert_eq!(sent(&mut p), "A1 NOOP\r\n");
        feed(&mut p, "A1 OK\r\n").unwrap();
        assert_eq!(sent(&mut p), "A2 NOOP\r\n");
    }

    #[test]
    fn test_failed_select_fails_the_command() {
        let mut p = pipeline();
        p.submit(Command::Noop, Some(Mailbox::new("Gone")), 1);

        assert_eq!(sent(&mut p), "A2 SELECT Gone\r\n");
        let (reply, result) = feed(&mut p, "A2 NO [NONEXISTENT] no such mailbox\r\n").unwrap();
        assert_eq!(reply, 1);
        let err = result.unwrap_err();
        assert_eq!(err.status().unwrap(), (Status::No, "no such mailbox"));
        assert!(p.selected().is_none());
        assert!(p.is_idle());
    }

    #[test]
    fn test_examine_deselects() {
        let mut p = pipeline();
        p.submit(Command::Select { mailbox: Mailbox::inbox() }, None, 1);
        sent(&mut p);
        feed(&mut p, "A1 OK\r\n").unwrap().1.unwrap();
        assert_eq!(p.selected(), Some(&Mailbox::inbox()));

        p.submit(Command::Examine { mailbox: Mailbox::inbox() }, None, 2);
        sent(&mut p);
        feed(&mut p, "A2 OK [READ-ONLY]\r\n").unwrap().1.unwrap();
        assert!(p.selected().is_none());
    }

    #[test]
    fn test_no_and_bad_are_errors() {
        let mut p = pipeline();
        p.submit(Command::Noop, None, 1);
        p.submit(Command::Noop, None, 2);
        sent(&mut p);
        let result = feed(&mut p, "A1 NO busy\r\n").unwrap().1.unwrap();
        assert_eq!(result.status, Status::No);
        let err = result.check().unwrap_err();
        assert!(matches!(err, Error::No(ref t) if t == "busy"));
        sent(&mut p);
        let result = feed(&mut p, "A2 BAD syntax\r\n").unwrap().1;
        let err = result.and_then(CommandResult::check).unwrap_err();
        assert!(matches!(err, Error::Bad(ref t) if t == "syntax"));
    }

    #[test]
    fn test_authenticate_failure_is_auth_error() {
        let mut p = pipeline();
        p.submit(
            Command::Authenticate {
                mechanism: "PLAIN".into(),
                initial_response: Some("AHUAcA==".into()),
            },
            None,
            1,
        );
        let transmit = p.poll_transmit().unwrap();
        assert!(transmit.sensitive);
        let result = feed(&mut p, "A1 NO [AUTHENTICATIONFAILED] bad password\r\n")
            .unwrap()
            .1
            .unwrap();
        assert!(result.authenticate);
        let err = result.check().unwrap_err();
        assert!(matches!(err, Error::Auth(ref t) if t == "bad password"));
    }

    #[test]
    fn test_literal_waits_for_continuation() {
        let mut p = pipeline();
        p.submit(Command::Select { mailbox: Mailbox::new("Entwürfe") }, None, 1);

        assert_eq!(sent(&mut p), "A1 SELECT {9}\r\n");
        assert!(p.poll_transmit().is_none());
        assert!(feed(&mut p, "+ go ahead\r\n").is_none());
        assert_eq!(sent(&mut p), "Entwürfe\r\n");
        feed(&mut p, "A1 OK\r\n").unwrap().1.unwrap();
    }

    #[test]
    fn test_literal_plus_after_capability() {
        let mut p = pipeline();
        p.submit(Command::Capability, None, 1);
        sent(&mut p);
        feed(&mut p, "* CAPABILITY IMAP4rev1 LITERAL+\r\n");
        feed(&mut p, "A1 OK\r\n").unwrap();

        p.submit(Command::Select { mailbox: Mailbox::new("Entwürfe") }, None, 2);
        assert_eq!(sent(&mut p), "A2 SELECT {9+}\r\nEntwürfe\r\n");
    }

    #[test]
    fn test_tagged_reply_while_waiting_for_continuation() {
        let mut p = pipeline();
        p.submit(Command::Select { mailbox: Mailbox::new("Entwürfe") }, None, 1);
        p.submit(Command::Noop, None, 2);
        sent(&mut p);

        let (reply, result) = feed(&mut p, "A1 BAD literals not accepted\r\n").unwrap();
        assert_eq!(reply, 1);
        let err = result.and_then(CommandResult::check).unwrap_err();
        assert!(matches!(err, Error::Bad(ref t) if t == "literals not accepted"));
        assert_eq!(sent(&mut p), "A2 NOOP\r\n");
    }

    #[test]
    fn test_sasl_continuation_lines() {
        let mut p = pipeline();
        p.submit_with_continuation(
            Command::Authenticate {
                mechanism: "PLAIN".into(),
                initial_response: None,
            },
            None,
            vec![b"AHUAcA==\r\n".to_vec()],
            1,
        );
        assert_eq!(sent(&mut p), "A1 AUTHENTICATE PLAIN\r\n");
        feed(&mut p, "+ \r\n");
        let transmit = p.poll_transmit().unwrap();
        assert_eq!(transmit.data, b"AHUAcA==\r\n");
        assert!(transmit.sensitive);
        feed(&mut p, "A1 OK [CAPABILITY IMAP4rev1 LITERAL+] welcome\r\n").unwrap().1.unwrap();
        assert!(p.literal_plus);
    }

    #[test]
    fn test_unexpected_continuation_is_fatal() {
        let mut p = pipeline();
        p.submit(Command::Noop, None, 1);
        sent(&mut p);
        assert!(p.handle_frame(b"+ what\r\n".to_vec()).is_err());
    }

    #[test]
    fn test_bye_is_fatal_unless_logging_out() {
        let mut p = pipeline();
        p.submit(Command::Noop, None, 1);
        sent(&mut p);
        let err = p.handle_frame(b"* BYE shutting down\r\n".to_vec()).unwrap_err();
        assert!(matches!(err, Error::Bye(ref t) if t == "shutting down"));
        assert_eq!(p.fail_all(), vec![1]);

        let mut p = pipeline();
        p.submit(Command::Logout, None, 2);
        sent(&mut p);
        assert!(feed(&mut p, "* BYE see you\r\n").is_none());
        let (_, result) = feed(&mut p, "A1 OK\r\n").unwrap();
        assert_eq!(result.unwrap().responses.len(), 1);
    }

    #[test]
    fn test_unknown_tag_is_ignored() {
        let mut p = pipeline();
        p.submit(Command::Noop, None, 1);
        sent(&mut p);
        assert!(feed(&mut p, "A99 OK stray\r\n").is_none());
        assert_eq!(feed(&mut p, "A1 OK\r\n").unwrap().0, 1);
    }

    #[test]
    fn test_unparseable_tagged_line_fails_only_that_command() {
        let mut p = pipeline();
        p.submit(Command::Noop, None, 1);
        p.submit(Command::Noop, None, 2);
        sent(&mut p);
        let (reply, result) = feed(&mut p, "A1 MAYBE\r\n").unwrap();
        assert_eq!(reply, 1);
        assert_eq!(result.unwrap_err().kind(), crate::ErrorKind::Parse);
        assert_eq!(sent(&mut p), "A2 NOOP\r\n");
    }

    #[test]
    fn test_fail_all_returns_every_reply() {
        let mut p = pipeline();
        p.submit(Command::Noop, Some(Mailbox::new("A")), 1);
        p.submit(Command::Noop, None, 2);
        p.submit(Command::Noop, None, 3);
        sent(&mut p);
        assert_eq!(p.pending(), 3);
        assert_eq!(p.fail_all(), vec![1, 2, 3]);
        assert!(p.is_idle());
    }

    proptest! {
        /// Drives a fake server that checks every non-SELECT command runs
        /// with its target mailbox selected.
        #[test]
        fn selection_is_linearized(targets in proptest::collection::vec(proptest::option::of(0u8..3), 1..40)) {
            let mut p: Pipeline<usize> = Pipeline::new(TagGenerator::default());
            let mut expected_target = HashMap::new();
            for (i, target) in targets.iter().enumerate() {
                let mailbox = target.map(|t| Mailbox::new(format!("box{t}")));
                let tag = p.submit(Command::Noop, mailbox.clone(), i);
                expected_target.insert(tag.as_str().to_string(), mailbox);
            }

            let mut server_selected: Option<String> = None;
            let mut selects = 0;
            let mut completed = Vec::new();
            while let Some(transmit) = p.poll_transmit() {
                let line = String::from_utf8(transmit.data).unwrap();
                let (tag, rest) = line.trim_end().split_once(' ').unwrap();
                if let Some(name) = rest.strip_prefix("SELECT ") {
                    selects += 1;
                    server_selected = Some(name.to_string());
                    let completion = p.handle_frame(format!("{tag} OK\r\n").into_bytes()).unwrap();
                    prop_assert!(completion.is_none());
                } else {
                    let target = expected_target[tag].as_ref().map(|m| m.as_str().to_string());
                    if target.is_some() {
                        prop_assert_eq!(&server_selected, &target);
                    }
                    let (reply, result) = p.handle_frame(format!("{tag} OK\r\n").into_bytes()).unwrap().unwrap();
                    prop_assert!(result.is_ok());
                    completed.push(reply);
                }
            }

            let mut changes = 0;
            let mut current = None;
            for target in targets.iter().flatten() {
                if current != Some(*target) {
                    changes += 1;
                    current = Some(*target);
                }
            }
            prop_assert_eq!(selects, changes);
            prop_assert_eq!(completed, (0..targets.len()).collect::<Vec<_>>());
        }
    }
}
