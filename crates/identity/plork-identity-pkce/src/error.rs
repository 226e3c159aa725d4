//! OAuth2 error types.

use thiserror::Error;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

const INVALID_ATTEMPT_MESSAGE: &str = "Invalid login attempt, please try again.";

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("HTTP request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("State parameter does not match the pending login attempt")]
    StateMismatch,

    #[error("Authorization denied by provider: {0}")]
    AuthorizationDenied(String),

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Profile request failed: {0}")]
    ProfileFetchFailed(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Identity error: {0}")]
    IdentityError(#[from] plork_identity_core::IdentityError),
}

impl OAuth2Error {
    /// Whether the login attempt that produced this error can no longer complete.
    ///
    /// Authorization codes are single-use, so none of these may be retried with the
    /// same code; the user has to start a new login.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OAuth2Error::StateMismatch
                | OAuth2Error::AuthorizationDenied(_)
                | OAuth2Error::TokenExchangeFailed(_)
                | OAuth2Error::NetworkError(_)
        )
    }

    /// Message suitable for showing to the person logging in.
    pub fn user_message(&self) -> &'static str {
        match self {
            OAuth2Error::StateMismatch
            | OAuth2Error::AuthorizationDenied(_)
            | OAuth2Error::TokenExchangeFailed(_) => INVALID_ATTEMPT_MESSAGE,
            OAuth2Error::ProfileFetchFailed(_) => "Logged in, but your profile is unavailable.",
            OAuth2Error::NetworkError(_) => {
                "Could not reach Discord. Check your connection and log in again."
            }
            OAuth2Error::ConfigError(_) | OAuth2Error::UrlError(_) => {
                "Login is misconfigured. Please contact the store owner."
            }
            OAuth2Error::StorageError(_)
            | OAuth2Error::SerializationError(_)
            | OAuth2Error::IdentityError(_) => "Something went wrong while saving your login.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors_share_user_message() {
        let errors = [
            OAuth2Error::StateMismatch,
            OAuth2Error::AuthorizationDenied("access_denied".to_string()),
            OAuth2Error::TokenExchangeFailed("invalid_grant".to_string()),
        ];

        for error in errors {
            assert!(error.is_terminal());
            assert_eq!(error.user_message(), INVALID_ATTEMPT_MESSAGE);
        }
    }

    #[test]
    fn test_profile_failure_is_not_terminal() {
        let error = OAuth2Error::ProfileFetchFailed("401".to_string());
        assert!(!error.is_terminal());
        assert_ne!(error.user_message(), INVALID_ATTEMPT_MESSAGE);
    }
}
