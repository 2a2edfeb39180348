//! SASL mechanisms used to authenticate a connection.
//!
//! - PLAIN (RFC 4616): `\0<user>\0<password>`, base64 encoded
//! - ANONYMOUS (RFC 4505): an optional trace string, base64 encoded

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::command::Command;
use crate::types::Capabilities;
use crate::types::Capability;

/// Login credentials for one connection.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// AUTHENTICATE PLAIN.
    Plain {
        /// Authentication identity.
        user: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE ANONYMOUS.
    Anonymous,
}

impl Credentials {
    /// PLAIN credentials, or ANONYMOUS when `user` is empty.
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        let user = user.into();
        if user.is_empty() {
            Self::Anonymous
        } else {
            Self::Plain {
                user,
                password: password.into(),
            }
        }
    }

    /// The SASL mechanism name.
    #[must_use]
    pub const fn mechanism(&self) -> &'static str {
        match self {
            Self::Plain { .. } => "PLAIN",
            Self::Anonymous => "ANONYMOUS",
        }
    }

    /// Base64 initial client response.
    #[must_use]
    pub fn initial_response(&self) -> String {
        match self {
            Self::Plain { user, password } => plain_response(user, password),
            Self::Anonymous => anonymous_response(""),
        }
    }

    /// Builds the AUTHENTICATE command plus any lines to send after `+`.
    ///
    /// With SASL-IR the response rides on the command line; otherwise the
    /// server asks for it with a continuation.
    #[must_use]
    pub fn authenticate(&self, capabilities: &Capabilities) -> (Command, Vec<Vec<u8>>) {
        let response = self.initial_response();
        let response = if response.is_empty() {
            "=".to_string()
        } else {
            response
        };

        if capabilities.has(&Capability::SaslIr) {
            let command = Command::Authenticate {
                mechanism: self.mechanism().to_string(),
                initial_response: Some(response),
            };
            (command, Vec::new())
        } else {
            let command = Command::Authenticate {
                mechanism: self.mechanism().to_string(),
                initial_response: None,
            };
            let line = if response == "=" {
                b"\r\n".to_vec()
            } else {
                format!("{response}\r\n").into_bytes()
            };
            (command, vec![line])
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain { user, .. } => f
                .debug_struct("Plain")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
            Self::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// Generates the PLAIN initial response.
#[must_use]
pub fn plain_response(user: &str, password: &str) -> String {
    // Empty authorization identity: act as the authenticated user.
    STANDARD.encode(format!("\0{user}\0{password}"))
}

/// Generates the ANONYMOUS initial response.
#[must_use]
pub fn anonymous_response(trace: &str) -> String {
    STANDARD.encode(trace)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Tag;

    #[test]
    fn test_plain_response() {
        let response = plain_response("user", "pass");
        let decoded = STANDARD.decode(response).unwrap();
        assert_eq!(decoded, b"\0user\0pass");
    }

    #[test]
    fn test_empty_user_is_anonymous() {
        assert_eq!(Credentials::new("", "ignored"), Credentials::Anonymous);
        assert_eq!(Credentials::new("", "").mechanism(), "ANONYMOUS");
        assert_eq!(Credentials::new("u", "p").mechanism(), "PLAIN");
    }

    #[test]
    fn test_debug_redacts_password() {
        let debug = format!("{:?}", Credentials::new("alice", "hunter2"));
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_sasl_ir() {
        let caps = Capabilities::new([Capability::SaslIr]);
        let (command, rest) = Credentials::new("user", "pass").authenticate(&caps);
        assert!(rest.is_empty());
        assert_eq!(
            command.serialize(&Tag::new("A1"), false).concat(),
            b"A1 AUTHENTICATE PLAIN AHVzZXIAcGFzcw==\r\n"
        );
    }

    #[test]
    fn test_without_sasl_ir() {
        let (command, rest) = Credentials::new("user", "pass").authenticate(&Capabilities::default());
        assert_eq!(
            command.serialize(&Tag::new("A1"), false).concat(),
            b"A1 AUTHENTICATE PLAIN\r\n"
        );
        assert_eq!(rest, vec![b"AHVzZXIAcGFzcw==\r\n".to_vec()]);
    }

    #[test]
    fn test_anonymous_empty_response() {
        let caps = Capabilities::new([Capability::SaslIr]);
        let (command, _) = Credentials::Anonymous.authenticate(&caps);
        assert_eq!(
            command.serialize(&Tag::new("A1"), false).concat(),
            b"A1 AUTHENTICATE ANONYMOUS =\r\n"
        );
        let (_, rest) = Credentials::Anonymous.authenticate(&Capabilities::default());
        assert_eq!(rest, vec![b"\r\n".to_vec()]);
    }
}
