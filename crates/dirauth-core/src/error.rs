//! Error types for Dirauth
//!
//! Every failure that leaves the authentication client is one of these six
//! kinds. Transport diagnostics are folded into the message of the kind they
//! belong to and never surface as a separate variant.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The directory service could not be reached
    #[error("Failed to connect to directory service: {0}")]
    Connection(String),

    /// The administrative (service account) bind was rejected
    #[error("Administrative bind failed: {0}")]
    Bind(String),

    /// Unknown user, wrong password, or a failed user bind
    #[error("Invalid credentials for user \"{user}\"")]
    InvalidCredentials { user: String },

    /// Provisioning collided with an existing entry
    #[error("User already exists in directory: {user}")]
    DuplicateUser { user: String },

    /// Provisioning failed for any other reason
    #[error("Failed to create user in directory: {0}")]
    Provision(String),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub fn invalid_credentials(user: impl Into<String>) -> Self {
        Error::InvalidCredentials { user: user.into() }
    }

    pub fn duplicate_user(user: impl Into<String>) -> Self {
        Error::DuplicateUser { user: user.into() }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::Connection(_) => "ConnectionError",
            Error::Bind(_) => "BindError",
            Error::InvalidCredentials { .. } => "InvalidCredentialsError",
            Error::DuplicateUser { .. } => "DuplicateUserError",
            Error::Provision(_) => "ProvisionError",
            Error::Configuration(_) => "ConfigurationError",
        }
    }

    /// Username the failure is attributed to, if any
    pub fn user(&self) -> Option<&str> {
        match self {
            Error::InvalidCredentials { user } | Error::DuplicateUser { user } => Some(user),
            _ => None,
        }
    }

    /// Whether the failure is the caller's fault rather than the service's
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidCredentials { .. } | Error::DuplicateUser { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_credentials_message() {
        let err = Error::invalid_credentials("bob");
        assert_eq!(err.to_string(), "Invalid credentials for user \"bob\"");
        assert_eq!(err.code(), "InvalidCredentialsError");
        assert_eq!(err.user(), Some("bob"));
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            Error::Connection("x".into()),
            Error::Bind("x".into()),
            Error::invalid_credentials("x"),
            Error::duplicate_user("x"),
            Error::Provision("x".into()),
            Error::Configuration("x".into()),
        ];

        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_client_errors() {
        assert!(Error::duplicate_user("alice").is_client_error());
        assert!(!Error::Bind("denied".into()).is_client_error());
        assert_eq!(Error::Provision("boom".into()).user(), None);
    }
}
