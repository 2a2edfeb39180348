//! IMAP response parser.
//!
//! Parses one complete server response (including any literal payloads)
//! according to the RFC 3501 / RFC 9051 grammar.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_continue)]
#![allow(clippy::match_same_arms)]

mod fetch;
mod helpers;
mod types;

pub use types::{Address, ESearch, Envelope, FetchItem, UntaggedResponse};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{ResponseCode, SeqNum, Status, Tag};
use crate::Result;

use helpers::{
    parse_capability_data, parse_esearch_response, parse_flag_list, parse_list_response,
    parse_response_code, parse_search_response, parse_status_response, read_text_until_crlf,
    unexpected,
};

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Response status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text/data.
        text: Option<String>,
    },
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a complete response.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer),
            Token::Plus => Ok(Self::parse_continuation(&mut lexer)),
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            Token::Number(n) => Self::parse_tagged(&mut lexer, &n.to_string()),
            token => Err(unexpected(&lexer, "*, + or tag", &token)),
        }
    }

    /// Parses a tagged response.
    fn parse_tagged(lexer: &mut Lexer<'_>, tag: &str) -> Result<Response> {
        lexer.expect_space()?;

        let status = Self::parse_status(lexer)?;
        let (code, text) = Self::parse_resp_text(lexer)?;

        Ok(Response::Tagged {
            tag: Tag::new(tag),
            status,
            code,
            text,
        })
    }

    /// Parses an untagged response.
    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.expect_space()?;

        let untagged = match lexer.next_token()? {
            Token::Atom(s) => {
                let upper = s.to_ascii_uppercase();
                match upper.as_str() {
                    "OK" => {
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        UntaggedResponse::Ok { code, text }
                    }
                    "NO" => {
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        UntaggedResponse::No { code, text }
                    }
                    "BAD" => {
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        UntaggedResponse::Bad { code, text }
                    }
                    "PREAUTH" => {
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        UntaggedResponse::PreAuth { code, text }
                    }
                    "BYE" => {
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        UntaggedResponse::Bye { code, text }
                    }
                    "CAPABILITY" => UntaggedResponse::Capability(parse_capability_data(lexer)?),
                    "FLAGS" => {
                        lexer.expect_space()?;
                        UntaggedResponse::Flags(parse_flag_list(lexer)?)
                    }
                    "LIST" | "LSUB" => {
                        lexer.expect_space()?;
                        UntaggedResponse::List(parse_list_response(lexer)?)
                    }
                    "SEARCH" => UntaggedResponse::Search(parse_search_response(lexer)?),
                    "ESEARCH" => UntaggedResponse::ESearch(parse_esearch_response(lexer)?),
                    "STATUS" => {
                        lexer.expect_space()?;
                        let (mailbox, counts) = parse_status_response(lexer)?;
                        UntaggedResponse::Status { mailbox, counts }
                    }
                    _ => {
                        read_text_until_crlf(lexer);
                        UntaggedResponse::Other { name: upper }
                    }
                }
            }
            Token::Number(n) => {
                let n = u32::try_from(n).map_err(|_| lexer.error("Message number too large"))?;
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?.to_ascii_uppercase();

                match keyword.as_str() {
                    "EXISTS" => UntaggedResponse::Exists(n),
                    "RECENT" => UntaggedResponse::Recent(n),
                    "EXPUNGE" => UntaggedResponse::Expunge(Self::seq(lexer, n)?),
                    "FETCH" => {
                        let seq = Self::seq(lexer, n)?;
                        lexer.expect_space()?;
                        let items = fetch::parse_fetch_response(lexer)?;
                        UntaggedResponse::Fetch { seq, items }
                    }
                    _ => {
                        read_text_until_crlf(lexer);
                        UntaggedResponse::Other { name: keyword }
                    }
                }
            }
            token => return Err(unexpected(lexer, "untagged response", &token)),
        };

        Ok(Response::Untagged(untagged))
    }

    fn seq(lexer: &Lexer<'_>, n: u32) -> Result<SeqNum> {
        SeqNum::new(n).ok_or_else(|| lexer.error("Invalid sequence number 0"))
    }

    /// Parses a continuation response.
    fn parse_continuation(lexer: &mut Lexer<'_>) -> Response {
        lexer.eat(b' ');
        let text = read_text_until_crlf(lexer);

        Response::Continuation {
            text: if text.is_empty() { None } else { Some(text) },
        }
    }

    /// Parses a status keyword.
    fn parse_status(lexer: &mut Lexer<'_>) -> Result<Status> {
        let s = lexer.read_atom_string()?;
        match s.to_ascii_uppercase().as_str() {
            "OK" => Ok(Status::Ok),
            "NO" => Ok(Status::No),
            "BAD" => Ok(Status::Bad),
            "PREAUTH" => Ok(Status::PreAuth),
            "BYE" => Ok(Status::Bye),
            _ => Err(lexer.error(&format!("Invalid status: {s}"))),
        }
    }

    /// Parses ` [code] text`. Servers sometimes omit the text entirely.
    fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
        lexer.eat(b' ');

        let code = if lexer.peek() == Some(b'[') {
            Some(parse_response_code(lexer)?)
        } else {
            None
        };

        lexer.eat(b' ');
        let text = read_text_until_crlf(lexer);

        Ok((code, text))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::types::{Capability, Flag, MailboxAttribute};

    use super::*;

    #[test]
    fn test_parse_ok_response() {
        let response = ResponseParser::parse(b"* OK IMAP4rev2 server ready\r\n").unwrap();

        match response {
            Response::Untagged(UntaggedResponse::Ok { code, text }) => {
                assert!(code.is_none());
                assert_eq!(text, "IMAP4rev2 server ready");
            }
            _ => panic!("Expected untagged OK"),
        }
    }

    #[test]
    fn test_parse_tagged_ok() {
        let response = ResponseParser::parse(b"A001 OK LOGIN completed\r\n").unwrap();

        match response {
            Response::Tagged {
                tag,
                status,
                code,
                text,
            } => {
                assert_eq!(tag.as_str(), "A001");
                assert_eq!(status, Status::Ok);
                assert!(code.is_none());
                assert_eq!(text, "LOGIN completed");
            }
            _ => panic!("Expected tagged response"),
        }
    }

    #[test]
    fn test_tagged_without_text() {
        let response = ResponseParser::parse(b"A2 OK\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Tagged { status: Status::Ok, ref text, .. } if text.is_empty()
        ));
    }

    #[test]
    fn test_tagged_read_only_code() {
        let response = ResponseParser::parse(b"A3 OK [READ-ONLY] EXAMINE done\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Tagged { code: Some(ResponseCode::ReadOnly), .. }
        ));
    }

    #[test]
    fn test_parse_capability() {
        let response =
            ResponseParser::parse(b"* CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN\r\n").unwrap();

        match response {
            Response::Untagged(UntaggedResponse::Capability(caps)) => {
                assert!(caps.contains(&Capability::Imap4Rev1));
                assert!(caps.contains(&Capability::Idle));
                assert!(caps.contains(&Capability::Auth("PLAIN".to_string())));
            }
            _ => panic!("Expected capability response"),
        }
    }

    #[test]
    fn test_parse_capability_trailing_space() {
        let response = ResponseParser::parse(b"* CAPABILITY IMAP4rev1 MOVE \r\n").unwrap();
        assert_eq!(
            response,
            Response::Untagged(UntaggedResponse::Capability(vec![
                Capability::Imap4Rev1,
                Capability::Move,
            ]))
        );

        let response =
            ResponseParser::parse(b"A1 OK [CAPABILITY IMAP4rev1 MOVE ] logged in\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Tagged { code: Some(ResponseCode::Capability(ref caps)), .. }
                if caps.contains(&Capability::Move)
        ));
    }

    #[test]
    fn test_parse_exists() {
        let response = ResponseParser::parse(b"* 23 EXISTS\r\n").unwrap();
        assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(23)));
    }

    #[test]
    fn test_parse_flags() {
        let response =
            ResponseParser::parse(b"* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n")
                .unwrap();

        match response {
            Response::Untagged(UntaggedResponse::Flags(flags)) => {
                assert!(flags.contains(&Flag::Seen));
                assert!(flags.contains(&Flag::Draft));
                assert_eq!(flags.len(), 5);
            }
            _ => panic!("Expected FLAGS"),
        }
    }

    #[test]
    fn test_parse_list() {
        let response = ResponseParser::parse(b"* LIST (\\HasNoChildren \\Sent) \"/\" Sent\r\n")
            .unwrap();

        match response {
            Response::Untagged(UntaggedResponse::List(list)) => {
                assert_eq!(list.special_use(), Some(&MailboxAttribute::Sent));
                assert_eq!(list.mailbox.as_str(), "Sent");
            }
            _ => panic!("Expected LIST"),
        }
    }

    #[test]
    fn test_parse_continuation() {
        let response = ResponseParser::parse(b"+ Ready for literal\r\n").unwrap();
        assert_eq!(
            response,
            Response::Continuation {
                text: Some("Ready for literal".to_string())
            }
        );
        assert_eq!(
            ResponseParser::parse(b"+\r\n").unwrap(),
            Response::Continuation { text: None }
        );
    }

    #[test]
    fn test_parse_response_code() {
        let response =
            ResponseParser::parse(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n").unwrap();

        match response {
            Response::Untagged(UntaggedResponse::Ok { code, text }) => {
                let Some(ResponseCode::UidValidity(v)) = code else {
                    panic!("Expected UIDVALIDITY code");
                };
                assert_eq!(v.get(), 3_857_529_045);
                assert_eq!(text, "UIDs valid");
            }
            _ => panic!("Expected untagged OK"),
        }
    }

    #[test]
    fn test_parse_fetch() {
        let response = ResponseParser::parse(b"* 1 FETCH (FLAGS (\\Seen) UID 12345)\r\n").unwrap();

        match response {
            Response::Untagged(UntaggedResponse::Fetch { seq, items }) => {
                assert_eq!(seq.get(), 1);
                assert!(
                    items
                        .iter()
                        .any(|i| matches!(i, FetchItem::Uid(uid) if uid.get() == 12345))
                );
                assert!(
                    items
                        .iter()
                        .any(|i| matches!(i, FetchItem::Flags(f) if f.is_seen()))
                );
            }
            _ => panic!("Expected FETCH"),
        }
    }

    #[test]
    fn test_parse_search() {
        let response = ResponseParser::parse(b"* SEARCH 1 2 3 5 8 13\r\n").unwrap();
        assert_eq!(
            response,
            Response::Untagged(UntaggedResponse::Search(vec![1, 2, 3, 5, 8, 13]))
        );
    }

    #[test]
    fn test_parse_esearch() {
        let response =
            ResponseParser::parse(b"* ESEARCH (TAG \"A5\") UID COUNT 2 ALL 4:5\r\n").unwrap();
        let Response::Untagged(UntaggedResponse::ESearch(es)) = response else {
            panic!("Expected ESEARCH");
        };
        assert_eq!(es.count, Some(2));
        assert_eq!(es.all.unwrap().iter().collect::<Vec<_>>(), vec![4, 5]);
    }

    #[test]
    fn test_parse_status() {
        let response =
            ResponseParser::parse(b"* STATUS INBOX (MESSAGES 3 UNSEEN 1)\r\n").unwrap();
        let Response::Untagged(UntaggedResponse::Status { mailbox, counts }) = response else {
            panic!("Expected STATUS");
        };
        assert_eq!(mailbox.as_str(), "INBOX");
        assert_eq!(counts.messages, Some(3));
        assert_eq!(counts.unseen, Some(1));
    }

    #[test]
    fn test_unknown_responses_are_other() {
        assert_eq!(
            ResponseParser::parse(b"* NAMESPACE ((\"\" \"/\")) NIL NIL\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Other {
                name: "NAMESPACE".to_string()
            })
        );
        assert_eq!(
            ResponseParser::parse(b"* 4 VANISHED\r\n").unwrap(),
            Response::Untagged(UntaggedResponse::Other {
                name: "VANISHED".to_string()
            })
        );
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(ResponseParser::parse(b"(oops\r\n").is_err());
        assert!(ResponseParser::parse(b"* 0 FETCH (UID 1)\r\n").is_err());
    }
}
