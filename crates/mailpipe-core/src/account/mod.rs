//! Account management module.
//!
//! Provides account configuration, server URLs, password resolution and
//! validation.

pub mod credentials;
mod model;
mod validation;

pub use credentials::{
    CredentialError, CredentialResult, KeyringResolver, PasswordResolver, StaticResolver,
    resolve_credentials,
};
pub use model::{AccountConfig, Scheme, ServerUrl};
pub use validation::{ValidationError, ValidationResult, validate_account};
