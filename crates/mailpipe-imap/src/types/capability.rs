//! Server capabilities and response status.

/// Response status from a tagged or untagged status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Returns true if this is a successful status.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }

    /// Returns the wire keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
            Self::PreAuth => "PREAUTH",
            Self::Bye => "BYE",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server capability.
///
/// Plain tokens the engine acts on get their own variant; `AUTH=` mechanisms
/// keep their mechanism name and any other `key=value` token is split into
/// [`Capability::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// IDLE command support (RFC 2177)
    Idle,
    /// MOVE extension (RFC 6851)
    Move,
    /// LITERAL+ extension (RFC 7888)
    LiteralPlus,
    /// STARTTLS support
    StartTls,
    /// LOGIN disabled
    LoginDisabled,
    /// SASL initial response (RFC 4959)
    SaslIr,
    /// LIST-STATUS (RFC 5819)
    ListStatus,
    /// ESEARCH (RFC 4731)
    ESearch,
    /// SPECIAL-USE mailboxes (RFC 6154)
    SpecialUse,
    /// UIDPLUS extension (RFC 4315)
    UidPlus,
    /// CONDSTORE (RFC 7162)
    CondStore,
    /// AUTH mechanism
    Auth(String),
    /// Any other token, split at the first `=`.
    Other {
        /// Token name (before `=`).
        name: String,
        /// Value after `=`, if any.
        value: Option<String>,
    },
}

impl Capability {
    /// Parses a capability string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "IDLE" => Self::Idle,
            "MOVE" => Self::Move,
            "LITERAL+" => Self::LiteralPlus,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "SASL-IR" => Self::SaslIr,
            "LIST-STATUS" => Self::ListStatus,
            "ESEARCH" => Self::ESearch,
            "SPECIAL-USE" => Self::SpecialUse,
            "UIDPLUS" => Self::UidPlus,
            "CONDSTORE" => Self::CondStore,
            _ if upper.starts_with("AUTH=") => Self::Auth(upper[5..].to_string()),
            _ => match s.split_once('=') {
                Some((name, value)) => Self::Other {
                    name: name.to_ascii_uppercase(),
                    value: Some(value.to_string()),
                },
                None => Self::Other {
                    name: upper,
                    value: None,
                },
            },
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => f.write_str("IMAP4rev1"),
            Self::Imap4Rev2 => f.write_str("IMAP4rev2"),
            Self::Idle => f.write_str("IDLE"),
            Self::Move => f.write_str("MOVE"),
            Self::LiteralPlus => f.write_str("LITERAL+"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::LoginDisabled => f.write_str("LOGINDISABLED"),
            Self::SaslIr => f.write_str("SASL-IR"),
            Self::ListStatus => f.write_str("LIST-STATUS"),
            Self::ESearch => f.write_str("ESEARCH"),
            Self::SpecialUse => f.write_str("SPECIAL-USE"),
            Self::UidPlus => f.write_str("UIDPLUS"),
            Self::CondStore => f.write_str("CONDSTORE"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Other { name, value: None } => f.write_str(name),
            Self::Other {
                name,
                value: Some(value),
            } => write!(f, "{name}={value}"),
        }
    }
}

/// The set of capabilities a server advertised, in advertised order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(Vec<Capability>);

impl Capabilities {
    /// Creates a set from parsed capabilities, dropping duplicates.
    #[must_use]
    pub fn new(caps: impl IntoIterator<Item = Capability>) -> Self {
        let mut out: Vec<Capability> = Vec::new();
        for cap in caps {
            if !out.contains(&cap) {
                out.push(cap);
            }
        }
        Self(out)
    }

    /// Returns true if the capability was advertised.
    #[must_use]
    pub fn has(&self, cap: &Capability) -> bool {
        self.0.contains(cap)
    }

    /// Returns true if the SASL mechanism was advertised.
    #[must_use]
    pub fn has_auth(&self, mechanism: &str) -> bool {
        self.0
            .iter()
            .any(|c| matches!(c, Capability::Auth(m) if m.eq_ignore_ascii_case(mechanism)))
    }

    /// Looks up the value of a `key=value` capability.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.0.iter().find_map(|c| match c {
            Capability::Other {
                name: n,
                value: Some(v),
            } if n.eq_ignore_ascii_case(name) => Some(v.as_str()),
            _ => None,
        })
    }

    /// Iterates over the advertised capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }

    /// Number of distinct capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing was advertised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod status_tests {
        use super::*;

        #[test]
        fn ok_and_preauth_are_success() {
            assert!(Status::Ok.is_ok());
            assert!(Status::PreAuth.is_ok());
            assert!(!Status::No.is_ok());
            assert!(!Status::Bad.is_ok());
            assert!(!Status::Bye.is_ok());
        }

        #[test]
        fn display_uses_wire_keyword() {
            assert_eq!(Status::No.to_string(), "NO");
        }
    }

    mod capability_tests {
        use super::*;

        #[test]
        fn parse_known_tokens_case_insensitively() {
            assert_eq!(Capability::parse("imap4rev1"), Capability::Imap4Rev1);
            assert_eq!(Capability::parse("Move"), Capability::Move);
            assert_eq!(Capability::parse("LIST-STATUS"), Capability::ListStatus);
            assert_eq!(Capability::parse("ESEARCH"), Capability::ESearch);
        }

        #[test]
        fn parse_auth_mechanism() {
            assert_eq!(
                Capability::parse("AUTH=plain"),
                Capability::Auth("PLAIN".to_string())
            );
        }

        #[test]
        fn parse_key_value_token() {
            assert_eq!(
                Capability::parse("APPENDLIMIT=35651584"),
                Capability::Other {
                    name: "APPENDLIMIT".to_string(),
                    value: Some("35651584".to_string()),
                }
            );
            assert_eq!(
                Capability::parse("XLIST").to_string(),
                "XLIST".to_string()
            );
        }
    }

    mod set_tests {
        use super::*;

        #[test]
        fn lookups() {
            let caps: Capabilities = ["IMAP4rev1", "MOVE", "AUTH=PLAIN", "APPENDLIMIT=100", "MOVE"]
                .into_iter()
                .map(Capability::parse)
                .collect();
            assert_eq!(caps.len(), 4);
            assert!(caps.has(&Capability::Move));
            assert!(!caps.has(&Capability::ESearch));
            assert!(caps.has_auth("plain"));
            assert!(!caps.has_auth("XOAUTH2"));
            assert_eq!(caps.value("appendlimit"), Some("100"));
        }
    }
}
