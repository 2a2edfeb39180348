//! Command serialization helpers.
//!
//! A command is written into one or more parts. Every synchronizing literal
//! ends the current part after its `{n}\r\n` prefix; the next part, which
//! starts with the literal bytes, may only be sent once the server has
//! answered with a `+` continuation. With LITERAL+ the `{n+}` form is used
//! and the command stays in a single part.

use crate::types::Mailbox;

use super::types::{FetchAttribute, FetchItems};

/// Accumulates the wire parts of one command.
#[derive(Debug)]
pub struct Writer {
    parts: Vec<Vec<u8>>,
    buf: Vec<u8>,
    literal_plus: bool,
}

impl Writer {
    /// Creates a writer.
    pub const fn new(literal_plus: bool) -> Self {
        Self {
            parts: Vec::new(),
            buf: Vec::new(),
            literal_plus,
        }
    }

    /// Appends raw protocol bytes.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Appends one byte.
    pub fn push(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Appends a literal.
    pub fn literal(&mut self, data: &[u8]) {
        if self.literal_plus {
            self.raw(format!("{{{}+}}\r\n", data.len()).as_bytes());
        } else {
            self.raw(format!("{{{}}}\r\n", data.len()).as_bytes());
            self.parts.push(std::mem::take(&mut self.buf));
        }
        self.raw(data);
    }

    /// Appends an astring: a bare atom when possible, a quoted string when
    /// the text is plain ASCII, and a literal otherwise.
    pub fn astring(&mut self, s: &str) {
        if needs_literal(s) {
            self.literal(s.as_bytes());
        } else if s.is_empty() || s.bytes().any(needs_quoting) {
            self.quoted(s);
        } else {
            self.raw(s.as_bytes());
        }
    }

    /// Appends a quoted string (or a literal if quoting cannot carry it).
    pub fn string(&mut self, s: &str) {
        if needs_literal(s) {
            self.literal(s.as_bytes());
        } else {
            self.quoted(s);
        }
    }

    fn quoted(&mut self, s: &str) {
        self.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                self.push(b'\\');
            }
            self.push(b);
        }
        self.push(b'"');
    }

    /// Appends a mailbox name.
    pub fn mailbox(&mut self, mailbox: &Mailbox) {
        self.astring(mailbox.as_str());
    }

    /// Finishes the command with CRLF and returns its parts.
    pub fn finish(mut self) -> Vec<Vec<u8>> {
        self.raw(b"\r\n");
        self.parts.push(self.buf);
        self.parts
    }
}

/// Returns true if the byte needs quoting.
const fn needs_quoting(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*' | b']'
    ) || b < 0x20
        || b == 0x7F
}

/// Quoted strings carry 7-bit text without CR or LF.
fn needs_literal(s: &str) -> bool {
    s.bytes().any(|b| b >= 0x80 || b == b'\r' || b == b'\n' || b == 0)
}

/// Writes FETCH items.
pub fn write_fetch_items(w: &mut Writer, items: &FetchItems) {
    match items {
        FetchItems::All => w.raw(b"ALL"),
        FetchItems::Fast => w.raw(b"FAST"),
        FetchItems::Items(attrs) => {
            if let [attr] = attrs.as_slice() {
                write_fetch_attribute(w, attr);
            } else {
                w.push(b'(');
                for (i, attr) in attrs.iter().enumerate() {
                    if i > 0 {
                        w.push(b' ');
                    }
                    write_fetch_attribute(w, attr);
                }
                w.push(b')');
            }
        }
    }
}

/// Writes a single FETCH attribute.
pub fn write_fetch_attribute(w: &mut Writer, attr: &FetchAttribute) {
    match attr {
        FetchAttribute::Flags => w.raw(b"FLAGS"),
        FetchAttribute::InternalDate => w.raw(b"INTERNALDATE"),
        FetchAttribute::Rfc822Size => w.raw(b"RFC822.SIZE"),
        FetchAttribute::Envelope => w.raw(b"ENVELOPE"),
        FetchAttribute::BodyStructure => w.raw(b"BODYSTRUCTURE"),
        FetchAttribute::Uid => w.raw(b"UID"),
        FetchAttribute::Body {
            section,
            peek,
            partial,
        } => {
            w.raw(if *peek { b"BODY.PEEK[".as_slice() } else { b"BODY[".as_slice() });
            if let Some(s) = section {
                w.raw(s.as_bytes());
            }
            w.push(b']');
            if let Some((start, len)) = partial {
                w.raw(format!("<{start}.{len}>").as_bytes());
            }
        }
    }
}
