//! Parser helper functions.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{
    Capability, Flag, Flags, ListEntry, Mailbox, MailboxAttribute, MailboxCounts, ResponseCode,
    SeqNum, SequenceSet, Uid, UidValidity,
};
use crate::{Error, Result};

use super::types::ESearch;

/// Parses a bracketed response code.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;

    let atom = lexer.read_atom_string()?;
    let code = match atom.to_ascii_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::UidNext(Uid::new(n).ok_or_else(|| lexer.error("Invalid UID 0"))?)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::UidValidity(
                UidValidity::new(n).ok_or_else(|| lexer.error("Invalid UIDVALIDITY 0"))?,
            )
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::Unseen(
                SeqNum::new(n).ok_or_else(|| lexer.error("Invalid sequence number 0"))?,
            )
        }
        "CAPABILITY" => ResponseCode::Capability(parse_capability_data(lexer)?),
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(parse_flag_list(lexer)?)
        }
        _ => ResponseCode::Unknown(atom.to_string()),
    };

    // Unknown codes may carry arbitrary text up to the bracket.
    while lexer.peek().is_some_and(|b| b != b']' && b != b'\r') {
        lexer.advance();
    }
    lexer.expect(Token::RBracket)?;

    Ok(code)
}

/// Parses space-separated capability atoms up to the end of the line or `]`.
pub fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();

    while lexer.eat(b' ') {
        // Trailing space before the line end or `]`.
        if matches!(lexer.peek(), None | Some(b'\r' | b'\n' | b']')) {
            break;
        }
        match lexer.next_token()? {
            Token::Atom(s) => caps.push(Capability::parse(s)),
            token => return Err(lexer.error(&format!("Expected capability, got {token:?}"))),
        }
    }

    Ok(caps)
}

/// Parses a parenthesized flag list, including the `\*` wildcard.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;
    let mut flags = Flags::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom("\\") if lexer.eat(b'*') => flags.insert(Flag::Wildcard),
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            token => {
                return Err(lexer.error(&format!("Unexpected token in flag list: {token:?}")));
            }
        }
    }

    Ok(flags)
}

/// Parses the body of a LIST response.
pub fn parse_list_response(lexer: &mut Lexer<'_>) -> Result<ListEntry> {
    lexer.expect(Token::LParen)?;
    let mut attributes = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(s) => attributes.push(MailboxAttribute::parse(s)),
            token => {
                return Err(lexer.error(&format!("Unexpected token in LIST attributes: {token:?}")));
            }
        }
    }

    lexer.expect_space()?;
    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::QuotedString(s) => s.chars().next(),
        token => return Err(lexer.error(&format!("Expected delimiter, got {token:?}"))),
    };

    lexer.expect_space()?;
    let mailbox = Mailbox::new(lexer.read_astring()?);

    // LIST-EXTENDED data such as ("CHILDINFO" ("SUBSCRIBED")).
    while lexer.eat(b' ') {
        lexer.skip_value()?;
    }

    Ok(ListEntry {
        attributes,
        delimiter,
        mailbox,
        status: None,
    })
}

/// Parses the numbers of a SEARCH response. A trailing `(MODSEQ n)` is ignored.
pub fn parse_search_response(lexer: &mut Lexer<'_>) -> Result<Vec<u32>> {
    let mut nums = Vec::new();

    while lexer.eat(b' ') {
        match lexer.next_token()? {
            Token::Number(n) => {
                nums.push(u32::try_from(n).map_err(|_| lexer.error("Message number too large"))?);
            }
            Token::LParen => {
                while !matches!(lexer.next_token()?, Token::RParen | Token::Eof) {}
            }
            // Trailing space before CRLF.
            Token::Crlf | Token::Eof => break,
            token => return Err(lexer.error(&format!("Expected number, got {token:?}"))),
        }
    }

    Ok(nums)
}

/// Parses the body of an ESEARCH response:
/// `[(TAG "A1")] [UID] *(name SP value)`.
pub fn parse_esearch_response(lexer: &mut Lexer<'_>) -> Result<ESearch> {
    let mut result = ESearch::default();

    while lexer.eat(b' ') {
        if lexer.peek() == Some(b'(') {
            lexer.expect(Token::LParen)?;
            let name = lexer.read_atom_string()?;
            lexer.expect_space()?;
            let value = lexer.read_astring()?;
            lexer.expect(Token::RParen)?;
            if name.eq_ignore_ascii_case("TAG") {
                result.tag = Some(value);
            }
            continue;
        }

        let name = lexer.read_atom_string()?.to_ascii_uppercase();
        if name == "UID" {
            result.uid = true;
            continue;
        }

        lexer.expect_space()?;
        match name.as_str() {
            "MIN" => result.min = Some(lexer.read_number()?),
            "MAX" => result.max = Some(lexer.read_number()?),
            "COUNT" => result.count = Some(lexer.read_number()?),
            "ALL" => {
                let set = match lexer.next_token()? {
                    Token::Atom(s) => SequenceSet::parse(s),
                    Token::Number(n) => u32::try_from(n).ok().and_then(SequenceSet::single),
                    _ => None,
                };
                result.all = Some(set.ok_or_else(|| lexer.error("Invalid ALL sequence set"))?);
            }
            _ => lexer.skip_value()?,
        }
    }

    Ok(result)
}

/// Parses the body of a STATUS response.
pub fn parse_status_response(lexer: &mut Lexer<'_>) -> Result<(Mailbox, MailboxCounts)> {
    let mailbox = Mailbox::new(lexer.read_astring()?);
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    let mut counts = MailboxCounts::default();

    loop {
        let name = match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(name) => name.to_ascii_uppercase(),
            token => return Err(lexer.error(&format!("Unexpected token in STATUS: {token:?}"))),
        };
        lexer.expect_space()?;
        let value = lexer.read_number64()?;
        let small = u32::try_from(value).ok();

        match name.as_str() {
            "MESSAGES" => counts.messages = small,
            "RECENT" => counts.recent = small,
            "UIDNEXT" => counts.uid_next = small.and_then(Uid::new),
            "UIDVALIDITY" => counts.uid_validity = small.and_then(UidValidity::new),
            "UNSEEN" => counts.unseen = small,
            _ => {}
        }
    }

    Ok((mailbox, counts))
}

/// Reads text until CRLF and consumes the CRLF.
pub fn read_text_until_crlf(lexer: &mut Lexer<'_>) -> String {
    let remaining = lexer.remaining();
    let end = remaining
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(remaining.len());

    lexer.skip(end + 2);
    String::from_utf8_lossy(&remaining[..end]).into_owned()
}

/// Builds a parse error for an unexpected token.
pub fn unexpected(lexer: &Lexer<'_>, what: &str, token: &Token<'_>) -> Error {
    lexer.error(&format!("Expected {what}, got {token:?}"))
}
