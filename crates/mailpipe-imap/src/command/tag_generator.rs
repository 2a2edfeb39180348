//! IMAP command tag generator.
//!
//! Tags are used to match commands with their responses.

use crate::types::Tag;

/// Tag generator for IMAP commands.
///
/// Generates increasing tags "A1", "A2", ... behind a fixed prefix. Owned by
/// the one pipeline that sequences a connection, so no synchronization is
/// needed.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { counter: 0, prefix }
    }

    /// Generates the next tag. After `u32::MAX` the counter restarts at 1;
    /// no tag from four billion commands ago is still outstanding.
    pub fn next_tag(&mut self) -> Tag {
        self.counter = self.counter.checked_add(1).unwrap_or(1);
        Tag::new(format!("{}{}", self.prefix, self.counter))
    }

    /// Returns the number of the last tag handed out.
    #[must_use]
    pub const fn current(&self) -> u32 {
        self.counter
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}
