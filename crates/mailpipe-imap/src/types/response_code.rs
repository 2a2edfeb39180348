//! Response codes.

use super::{Capability, Flags, SeqNum, Uid, UidValidity};

/// Bracketed code in a status response, e.g. `[UIDNEXT 4392]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: text that must be shown to the user.
    Alert,
    /// CAPABILITY list sent with a greeting or a completion.
    Capability(Vec<Capability>),
    /// PERMANENTFLAGS: flags that can be changed permanently.
    PermanentFlags(Flags),
    /// READ-ONLY: mailbox selected read-only.
    ReadOnly,
    /// READ-WRITE: mailbox selected read-write.
    ReadWrite,
    /// TRYCREATE: target mailbox does not exist.
    TryCreate,
    /// UIDNEXT: next UID to be assigned.
    UidNext(Uid),
    /// UIDVALIDITY of the selected mailbox.
    UidValidity(UidValidity),
    /// UNSEEN: first unseen message sequence number.
    Unseen(SeqNum),
    /// Any other code, by name.
    Unknown(String),
}
