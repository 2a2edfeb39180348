//! IMAP lexer for tokenizing server responses.
//!
//! The lexer walks an explicit cursor over one complete response. A literal
//! prefix `{n}` is consumed together with its `n` payload bytes, so payload
//! content is never seen as syntax no matter what it contains.

#![allow(clippy::missing_errors_doc)]

mod token;

pub use token::Token;

use crate::{Error, Result};

/// IMAP lexer state.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current position in the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns the whole input.
    #[must_use]
    pub const fn input(&self) -> &'a [u8] {
        self.input
    }

    /// Returns the remaining input.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    /// Returns true if at end of input.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Peeks at the current byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Peeks at the byte at offset from current position.
    #[must_use]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Advances by one byte and returns it.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Skips n bytes.
    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Consumes `byte` if it is next.
    pub fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        match byte {
            b'\r' => {
                if self.peek_at(1) == Some(b'\n') {
                    self.skip(2);
                    Ok(Token::Crlf)
                } else {
                    Err(self.error("Expected LF after CR"))
                }
            }
            b' ' => self.single(Token::Space),
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b'[' => self.single(Token::LBracket),
            b']' => self.single(Token::RBracket),
            b'*' => self.single(Token::Asterisk),
            b'+' => self.single(Token::Plus),
            b'"' => self.read_quoted_string(),
            b'{' => self.read_literal(),
            b'~' if self.peek_at(1) == Some(b'{') => {
                self.advance();
                self.read_literal()
            }
            b'0'..=b'9' => self.read_number_or_atom(),
            _ if is_atom_char(byte) => self.read_atom(),
            _ => Err(self.error(&format!("Unexpected character: {byte:#04x}"))),
        }
    }

    fn single(&mut self, token: Token<'a>) -> Result<Token<'a>> {
        self.advance();
        Ok(token)
    }

    /// Reads a quoted string token, undoing `\"` and `\\` escapes.
    fn read_quoted_string(&mut self) -> Result<Token<'a>> {
        self.advance();
        let mut result = Vec::new();

        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c @ (b'"' | b'\\')) => result.push(c),
                    Some(c) => return Err(self.error(&format!("Invalid escape: \\{}", c as char))),
                    None => return Err(self.error("Unexpected EOF in quoted string")),
                },
                Some(b'\r' | b'\n') => return Err(self.error("Line break in quoted string")),
                Some(c) => result.push(c),
                None => return Err(self.error("Unexpected EOF in quoted string")),
            }
        }

        // Some servers put raw 8-bit text in quoted strings.
        Ok(Token::QuotedString(
            String::from_utf8_lossy(&result).into_owned(),
        ))
    }

    /// Reads `{n}` (or `{n+}`), the CRLF after it and exactly `n` payload bytes.
    fn read_literal(&mut self) -> Result<Token<'a>> {
        self.advance();
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
        }
        let digits = &self.input[start..self.pos];
        self.eat(b'+');

        if !self.eat(b'}') {
            return Err(self.error("Expected } after literal size"));
        }
        let size: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("Invalid literal size"))?;

        if !(self.eat(b'\r') && self.eat(b'\n')) {
            return Err(self.error("Expected CRLF after literal size"));
        }
        if self.remaining().len() < size {
            return Err(self.error("Incomplete literal data"));
        }

        let data = &self.input[self.pos..self.pos + size];
        self.skip(size);
        Ok(Token::Literal(data))
    }

    /// Reads a number, or an atom that merely starts with a digit (`2,10:11`).
    fn read_number_or_atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        while self.peek().is_some_and(is_atom_char) {
            self.advance();
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid UTF-8 in atom"))?;

        if s.bytes().all(|b| b.is_ascii_digit()) {
            let n = s.parse().map_err(|_| self.error("Number too large"))?;
            Ok(Token::Number(n))
        } else {
            Ok(Token::Atom(s))
        }
    }

    /// Reads an atom token.
    fn read_atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        while self.peek().is_some_and(is_atom_char) {
            self.advance();
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid UTF-8 in atom"))?;

        if s.eq_ignore_ascii_case("NIL") {
            Ok(Token::Nil)
        } else {
            Ok(Token::Atom(s))
        }
    }

    /// Creates a parse error at the current position.
    #[must_use]
    pub fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Expects and consumes a specific token kind.
    #[allow(clippy::needless_pass_by_value)]
    pub fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        let token = self.next_token()?;
        if std::mem::discriminant(&token) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("Expected {expected:?}, got {token:?}")))
        }
    }

    /// Expects and consumes a space.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(Token::Space)
    }

    /// Reads an astring (atom, quoted string or literal).
    pub fn read_astring(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::Number(n) => Ok(n.to_string()),
            Token::QuotedString(s) => Ok(s),
            Token::Literal(data) => Ok(String::from_utf8_lossy(data).into_owned()),
            token => Err(self.error(&format!("Expected astring, got {token:?}"))),
        }
    }

    /// Reads an nstring (NIL, quoted string or literal).
    pub fn read_nstring(&mut self) -> Result<Option<String>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::QuotedString(s) => Ok(Some(s)),
            Token::Literal(data) => Ok(Some(String::from_utf8_lossy(data).into_owned())),
            token => Err(self.error(&format!("Expected nstring, got {token:?}"))),
        }
    }

    /// Reads an nstring as raw bytes (message content).
    pub fn read_nstring_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::QuotedString(s) => Ok(Some(s.into_bytes())),
            Token::Literal(data) => Ok(Some(data.to_vec())),
            token => Err(self.error(&format!("Expected nstring, got {token:?}"))),
        }
    }

    /// Reads a 32-bit number.
    pub fn read_number(&mut self) -> Result<u32> {
        let n = self.read_number64()?;
        u32::try_from(n).map_err(|_| self.error(&format!("Number out of range: {n}")))
    }

    /// Reads a 64-bit number.
    pub fn read_number64(&mut self) -> Result<u64> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("Expected number, got {token:?}"))),
        }
    }

    /// Reads an atom.
    pub fn read_atom_string(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            token => Err(self.error(&format!("Expected atom, got {token:?}"))),
        }
    }

    /// Skips one value: an atom, number, string, literal, NIL or a
    /// parenthesized list of values nested to any depth.
    pub fn skip_value(&mut self) -> Result<()> {
        match self.next_token()? {
            Token::LParen => {
                let mut depth = 1usize;
                while depth > 0 {
                    match self.next_token()? {
                        Token::LParen => depth += 1,
                        Token::RParen => depth -= 1,
                        Token::Crlf | Token::Eof => {
                            return Err(self.error("Unbalanced parenthesis"));
                        }
                        _ => {}
                    }
                }
                Ok(())
            }
            Token::Atom(_)
            | Token::Number(_)
            | Token::QuotedString(_)
            | Token::Literal(_)
            | Token::Nil => {
                // `BODY[...]`-style atoms carry a bracketed section.
                if self.peek() == Some(b'[') {
                    self.skip_bracketed()?;
                }
                Ok(())
            }
            token => Err(self.error(&format!("Expected value, got {token:?}"))),
        }
    }

    /// Skips a `[...]` group, which may hold nested lists.
    pub fn skip_bracketed(&mut self) -> Result<()> {
        self.expect(Token::LBracket)?;
        loop {
            match self.next_token()? {
                Token::RBracket => return Ok(()),
                Token::Crlf | Token::Eof => return Err(self.error("Unterminated [")),
                _ => {}
            }
        }
    }
}

/// Returns true if the byte is a valid atom character.
///
/// `\` is accepted so that flags like `\Seen` lex as a single atom, and `]`
/// is excluded so response codes terminate cleanly.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b,
        0x21 |          // !
        0x23..=0x24 |   // # $
        0x26..=0x27 |   // & '
        0x2B..=0x5A |   // + , - . / 0-9 : ; < = > ? @ A-Z
        0x5C |          // \
        0x5E..=0x7A |   // ^ _ ` a-z
        0x7C |          // |
        0x7E            // ~
    )
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_response() {
        let mut lexer = Lexer::new(b"A1 OK done\r\n");

        assert_eq!(lexer.next_token().unwrap(), Token::Atom("A1"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("OK"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("done"));
        assert_eq!(lexer.next_token().unwrap(), Token::Crlf);
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_wide_numbers() {
        let mut lexer = Lexer::new(b"3857529045 90000000000");
        assert_eq!(lexer.read_number().unwrap(), 3_857_529_045);
        lexer.expect_space().unwrap();
        assert_eq!(lexer.read_number64().unwrap(), 90_000_000_000);
        assert!(Lexer::new(b"90000000000").read_number().is_err());
    }

    #[test]
    fn test_digit_atom() {
        let mut lexer = Lexer::new(b"2,10:11");
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("2,10:11"));
    }

    #[test]
    fn test_quoted_string_escaped() {
        let mut lexer = Lexer::new(b"\"say \\\"hi\\\" \\\\o/\"");
        assert_eq!(
            lexer.next_token().unwrap(),
            Token::QuotedString("say \"hi\" \\o/".to_string())
        );
    }

    #[test]
    fn test_nil_any_case() {
        let mut lexer = Lexer::new(b"nil");
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
    }

    #[test]
    fn test_flags_with_wildcard() {
        let mut lexer = Lexer::new(b"(\\Seen \\*)");
        assert_eq!(lexer.next_token().unwrap(), Token::LParen);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\Seen"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\"));
        assert_eq!(lexer.next_token().unwrap(), Token::Asterisk);
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
    }

    #[test]
    fn test_literal_payload_is_opaque() {
        let mut lexer = Lexer::new(b"{11}\r\nA99 OK fake)\r\n");
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(b"A99 OK fake"));
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
        assert_eq!(lexer.next_token().unwrap(), Token::Crlf);
    }

    #[test]
    fn test_non_sync_literal() {
        let mut lexer = Lexer::new(b"{3+}\r\nabc");
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(b"abc"));
    }

    #[test]
    fn test_incomplete_literal() {
        let mut lexer = Lexer::new(b"{10}\r\nshort");
        assert!(matches!(
            lexer.next_token(),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_skip_value_nested_with_literal() {
        let mut lexer = Lexer::new(b"((\"a\" {3}\r\n)(x) NIL) 42");
        lexer.skip_value().unwrap();
        lexer.expect_space().unwrap();
        assert_eq!(lexer.read_number().unwrap(), 42);
    }

    #[test]
    fn test_skip_value_unbalanced() {
        let mut lexer = Lexer::new(b"((a)\r\n");
        assert!(lexer.skip_value().is_err());
    }

    #[test]
    fn test_is_atom_char() {
        assert!(is_atom_char(b'A'));
        assert!(is_atom_char(b':'));
        assert!(is_atom_char(b'\\'));
        assert!(!is_atom_char(b' '));
        assert!(!is_atom_char(b'('));
        assert!(!is_atom_char(b'{'));
        assert!(!is_atom_char(b'"'));
        assert!(!is_atom_char(b'%'));
        assert!(!is_atom_char(b']'));
    }
}
