//! FETCH response parsing.

use crate::parser::encoded_word;
use crate::parser::lexer::{Lexer, Token};
use crate::types::Uid;
use crate::Result;

use super::helpers::{parse_flag_list, unexpected};
use super::types::{Address, Envelope, FetchItem};

/// Parses the parenthesized item list of a FETCH response.
pub fn parse_fetch_response(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();

    loop {
        let name = match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(name) => name.to_ascii_uppercase(),
            token => return Err(unexpected(lexer, "fetch item", &token)),
        };

        match name.as_str() {
            "FLAGS" => {
                lexer.expect_space()?;
                items.push(FetchItem::Flags(parse_flag_list(lexer)?));
            }
            "UID" => {
                lexer.expect_space()?;
                let n = lexer.read_number()?;
                let uid = Uid::new(n)
                    .ok_or_else(|| lexer.error(&format!("Invalid UID value: {n}")))?;
                items.push(FetchItem::Uid(uid));
            }
            "RFC822.SIZE" => {
                lexer.expect_space()?;
                items.push(FetchItem::Rfc822Size(lexer.read_number()?));
            }
            "INTERNALDATE" => {
                lexer.expect_space()?;
                if let Some(date) = lexer.read_nstring()? {
                    items.push(FetchItem::InternalDate(date));
                }
            }
            "ENVELOPE" => {
                lexer.expect_space()?;
                items.push(FetchItem::Envelope(Box::new(parse_envelope(lexer)?)));
            }
            "BODYSTRUCTURE" => {
                lexer.expect_space()?;
                lexer.skip_value()?;
                items.push(FetchItem::BodyStructure);
            }
            "BODY" if lexer.peek() != Some(b'[') => {
                // Non-extensible BODYSTRUCTURE form.
                lexer.expect_space()?;
                lexer.skip_value()?;
                items.push(FetchItem::BodyStructure);
            }
            "BODY" | "RFC822" | "RFC822.HEADER" | "RFC822.TEXT" => {
                let (section, origin) = parse_section_and_origin(lexer)?;
                let section = match name.as_str() {
                    "RFC822.HEADER" => "HEADER".to_string(),
                    "RFC822.TEXT" => "TEXT".to_string(),
                    _ => section,
                };
                lexer.expect_space()?;
                let data = lexer.read_nstring_bytes()?;
                items.push(FetchItem::Body {
                    section,
                    origin,
                    data,
                });
            }
            _ => {
                parse_section_and_origin(lexer)?;
                lexer.expect_space()?;
                lexer.skip_value()?;
            }
        }
    }

    Ok(items)
}

/// Reads an optional `[section]` and `<origin>` following a body item name.
fn parse_section_and_origin(lexer: &mut Lexer<'_>) -> Result<(String, Option<u32>)> {
    let mut section = String::new();
    let mut origin = None;

    if lexer.eat(b'[') {
        let rest = lexer.remaining();
        let end = rest
            .iter()
            .position(|&b| b == b']')
            .ok_or_else(|| lexer.error("Unterminated section"))?;
        section = String::from_utf8_lossy(&rest[..end]).to_ascii_uppercase();
        lexer.skip(end + 1);
    }

    if lexer.eat(b'<') {
        let rest = lexer.remaining();
        let end = rest
            .iter()
            .position(|&b| b == b'>')
            .ok_or_else(|| lexer.error("Unterminated origin"))?;
        origin = std::str::from_utf8(&rest[..end])
            .ok()
            .and_then(|s| s.parse().ok());
        lexer.skip(end + 1);
    }

    Ok((section, origin))
}

/// Parses an envelope structure.
pub fn parse_envelope(lexer: &mut Lexer<'_>) -> Result<Envelope> {
    lexer.expect(Token::LParen)?;

    let date = lexer.read_nstring()?;
    lexer.expect_space()?;

    let subject = lexer.read_nstring()?.map(|s| encoded_word::decode(&s));
    lexer.expect_space()?;

    let from = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let sender = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let reply_to = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let to = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let cc = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let bcc = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let in_reply_to = lexer.read_nstring()?;
    lexer.expect_space()?;

    let message_id = lexer.read_nstring()?;

    lexer.expect(Token::RParen)?;

    Ok(Envelope {
        date,
        subject,
        from,
        sender,
        reply_to,
        to,
        cc,
        bcc,
        in_reply_to,
        message_id,
    })
}

/// Parses an address list (`NIL` or `((...)(...))`).
pub fn parse_address_list(lexer: &mut Lexer<'_>) -> Result<Vec<Address>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut addresses = Vec::new();

            loop {
                match lexer.peek() {
                    Some(b')') => {
                        lexer.advance();
                        break;
                    }
                    Some(b'(') => addresses.push(parse_address(lexer)?),
                    Some(b' ') => {
                        lexer.advance();
                    }
                    _ => return Err(lexer.error("Unterminated address list")),
                }
            }

            Ok(addresses)
        }
        token => Err(unexpected(lexer, "address list", &token)),
    }
}

/// Parses a single address.
pub fn parse_address(lexer: &mut Lexer<'_>) -> Result<Address> {
    lexer.expect(Token::LParen)?;

    let name = lexer.read_nstring()?.map(|s| encoded_word::decode(&s));
    lexer.expect_space()?;

    let adl = lexer.read_nstring()?;
    lexer.expect_space()?;

    let mailbox = lexer.read_nstring()?;
    lexer.expect_space()?;

    let host = lexer.read_nstring()?;

    lexer.expect(Token::RParen)?;

    Ok(Address {
        name,
        adl,
        mailbox,
        host,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch_uid_valid() {
        let mut lexer = Lexer::new(b"(UID 123 FLAGS (\\Seen))");
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], FetchItem::Uid(uid) if uid.get() == 123));
    }

    #[test]
    fn test_parse_fetch_uid_zero_rejected() {
        let mut lexer = Lexer::new(b"(UID 0)");
        let err = parse_fetch_response(&mut lexer).unwrap_err();
        assert!(err.to_string().contains("UID"));
    }

    #[test]
    fn test_parse_fetch_skips_unrequested_items() {
        let mut lexer = Lexer::new(b"(MODSEQ (90000000000) UID 4 X-GM-MSGID 1278455344230334865)");
        let items = parse_fetch_response(&mut lexer).unwrap();
        assert_eq!(items, vec![FetchItem::Uid(Uid::new(4).unwrap())]);
    }

    #[test]
    fn test_body_literal_with_origin() {
        let mut lexer = Lexer::new(b"(UID 7 BODY[TEXT]<100> {5}\r\nhello)");
        let items = parse_fetch_response(&mut lexer).unwrap();
        assert_eq!(
            items[1],
            FetchItem::Body {
                section: "TEXT".to_string(),
                origin: Some(100),
                data: Some(b"hello".to_vec()),
            }
        );
    }

    #[test]
    fn test_whole_body_containing_parens_and_tags() {
        let mut lexer = Lexer::new(b"(BODY[] {11}\r\n) A1 OK (\r\n UID 9)");
        let items = parse_fetch_response(&mut lexer).unwrap();
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], FetchItem::Body { section, data: Some(d), .. }
            if section.is_empty() && d.len() == 11));
        assert!(matches!(items[1], FetchItem::Uid(uid) if uid.get() == 9));
    }

    #[test]
    fn test_bodystructure_is_consumed() {
        let mut lexer = Lexer::new(
            b"(BODYSTRUCTURE ((\"TEXT\" \"PLAIN\" (\"CHARSET\" \"utf-8\") NIL NIL \"7BIT\" 12 1)(\"TEXT\" \"HTML\" NIL NIL NIL \"7BIT\" 30 2) \"ALTERNATIVE\") UID 4)",
        );
        let items = parse_fetch_response(&mut lexer).unwrap();
        assert_eq!(items[0], FetchItem::BodyStructure);
        assert!(matches!(items[1], FetchItem::Uid(uid) if uid.get() == 4));
    }

    #[test]
    fn test_unknown_items_are_skipped() {
        let mut lexer = Lexer::new(b"(X-GM-LABELS (\\Inbox \"a b\") BINARY[1] {2}\r\nhi UID 3)");
        let items = parse_fetch_response(&mut lexer).unwrap();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], FetchItem::Uid(uid) if uid.get() == 3));
    }

    #[test]
    fn test_parse_envelope_decodes_subject_and_names() {
        let data = b"(\"Wed, 17 Jul 1996 02:23:25 -0700 (PDT)\" \"=?UTF-8?Q?Caf=C3=A9?=\" ((\"=?ISO-8859-1?Q?Andr=E9?=\" NIL \"andre\" \"example.com\")) NIL NIL ((NIL NIL \"bob\" \"example.org\")(\"Eve\" NIL \"eve\" \"example.org\")) NIL NIL NIL \"<1@example.com>\")";
        let mut lexer = Lexer::new(data);
        let envelope = parse_envelope(&mut lexer).unwrap();

        assert_eq!(envelope.subject.as_deref(), Some("Café"));
        assert_eq!(envelope.from[0].name.as_deref(), Some("André"));
        assert_eq!(envelope.from[0].email().as_deref(), Some("andre@example.com"));
        assert_eq!(envelope.to.len(), 2);
        assert_eq!(envelope.to[1].name.as_deref(), Some("Eve"));
        assert_eq!(envelope.message_id.as_deref(), Some("<1@example.com>"));
        assert_eq!(envelope.timestamp(), Some(837_595_405));
    }

    #[test]
    fn test_envelope_subject_as_literal() {
        let data = b"(NIL {6}\r\n(hi)\"x NIL NIL NIL NIL NIL NIL NIL NIL)";
        let mut lexer = Lexer::new(data);
        let envelope = parse_envelope(&mut lexer).unwrap();
        assert_eq!(envelope.subject.as_deref(), Some("(hi)\"x"));
        assert!(envelope.date.is_none());
        assert!(envelope.timestamp().is_none());
    }
}
