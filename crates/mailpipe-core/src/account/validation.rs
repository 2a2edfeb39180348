//! Account validation.

use super::model::{AccountConfig, ServerUrl};

/// Validation error for account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Account name is empty.
    EmptyName,
    /// Incoming server URL is empty.
    EmptyIncoming,
    /// Incoming server URL does not parse.
    InvalidIncoming,
    /// Incoming server URL is not imap or imaps.
    UnsupportedIncomingScheme,
    /// Outgoing server URL does not parse.
    InvalidOutgoing,
    /// Outgoing server URL is not smtp or smtps.
    UnsupportedOutgoingScheme,
    /// Email address format is invalid.
    InvalidEmail,
    /// Idle timeout is zero.
    InvalidIdleTimeout,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyName => "Account name is required",
            Self::EmptyIncoming => "Incoming server URL is required",
            Self::InvalidIncoming => "Incoming server URL is invalid",
            Self::UnsupportedIncomingScheme => "Incoming server must use imap:// or imaps://",
            Self::InvalidOutgoing => "Outgoing server URL is invalid",
            Self::UnsupportedOutgoingScheme => "Outgoing server must use smtp:// or smtps://",
            Self::InvalidEmail => "Invalid email address format",
            Self::InvalidIdleTimeout => "Idle timeout must be at least one second",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyName => "name",
            Self::EmptyIncoming | Self::InvalidIncoming | Self::UnsupportedIncomingScheme => {
                "incoming"
            }
            Self::InvalidOutgoing | Self::UnsupportedOutgoingScheme => "outgoing",
            Self::InvalidEmail => "address",
            Self::InvalidIdleTimeout => "idle_timeout_secs",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an account.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate an account configuration.
///
/// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all errors.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_account(account: &AccountConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if account.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }

    if account.incoming.trim().is_empty() {
        errors.push(ValidationError::EmptyIncoming);
    } else {
        match ServerUrl::parse(&account.incoming) {
            Ok(url) if !url.scheme.is_incoming() => {
                errors.push(ValidationError::UnsupportedIncomingScheme);
            }
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::InvalidIncoming),
        }
    }

    if let Some(outgoing) = &account.outgoing {
        match ServerUrl::parse(outgoing) {
            Ok(url) if url.scheme.is_incoming() => {
                errors.push(ValidationError::UnsupportedOutgoingScheme);
            }
            Ok(_) => {}
            Err(_) => errors.push(ValidationError::InvalidOutgoing),
        }
    }

    if let Some(address) = &account.address {
        if !is_valid_email(bare_address(address)) {
            errors.push(ValidationError::InvalidEmail);
        }
    }

    if account.idle_timeout_secs == Some(0) {
        errors.push(ValidationError::InvalidIdleTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// The `addr-spec` of `Name <addr-spec>`, or the input unchanged.
fn bare_address(address: &str) -> &str {
    match (address.rfind('<'), address.rfind('>')) {
        (Some(start), Some(end)) if start < end => &address[start + 1..end],
        _ => address,
    }
}

/// Basic email validation.
fn is_valid_email(email: &str) -> bool {
    let email = email.trim();

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.contains('@') {
        return false;
    }

    // Domain must contain at least one dot and no empty labels
    domain.contains('.') && domain.split('.').all(|p| !p.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user.name@example.com"));
        assert!(is_valid_email("user@sub.example.com"));
    }

    #[test]
    fn test_invalid_email() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("user"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@example..com"));
    }

    #[test]
    fn test_bare_address() {
        assert_eq!(bare_address("Jo <jo@example.com>"), "jo@example.com");
        assert_eq!(bare_address("jo@example.com"), "jo@example.com");
    }

    #[test]
    fn test_validate_valid_account() {
        let account = AccountConfig::new("Work", "imaps://jo@imap.example.com")
            .with_outgoing("smtps://smtp.example.com")
            .with_address("Jo <jo@example.com>");
        assert!(validate_account(&account).is_ok());
    }

    #[test]
    fn test_validate_empty_account() {
        let errors = validate_account(&AccountConfig::new("  ", "")).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::EmptyName, ValidationError::EmptyIncoming]
        );
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut account = AccountConfig::new("Work", "smtps://smtp.example.com")
            .with_outgoing("ftp://files.example.com")
            .with_address("not an address");
        account.idle_timeout_secs = Some(0);

        let errors = validate_account(&account).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::UnsupportedIncomingScheme,
                ValidationError::InvalidOutgoing,
                ValidationError::InvalidEmail,
                ValidationError::InvalidIdleTimeout,
            ]
        );
        assert_eq!(errors[1].field(), "outgoing");
    }
}
