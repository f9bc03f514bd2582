//! Error types for the `identity-auth` crate.
//!
//! Follows the same pattern as the other workspace crates with a root Error struct and error kind enums.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for identity-auth crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in identity-auth.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Token(TokenErrorKind),
    Provider(ProviderErrorKind),
    State(StateErrorKind),
    Http(HttpErrorKind),
    /// A required setting (client id, secret, signing key) is not configured.
    Config,
}

/// Errors from access token retrieval.
#[derive(Debug, PartialEq)]
pub enum TokenErrorKind {
    /// No token (or an empty token) was available for the login.
    Missing,
    /// The token source failed or timed out.
    Unavailable,
}

/// Errors from provider dispatch and user-info normalization.
#[derive(Debug, PartialEq)]
pub enum ProviderErrorKind {
    /// No normalizer is registered under the requested provider name.
    Unsupported,
    /// Transport failure or non-2xx response, with the HTTP status when one was received.
    Unavailable(Option<u16>),
    /// The provider answered with a body that does not match its documented shape.
    ResponseInvalid,
}

/// Errors from OAuth state handling.
#[derive(Debug, PartialEq)]
pub enum StateErrorKind {
    Invalid,
    Expired,
    RedirectNotAllowed,
}

/// Errors from HTTP client construction.
#[derive(Debug, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    InvalidHeader,
}

impl Error {
    /// Returns true for errors caused by the provider or its token rather than by us.
    pub fn is_provider_side(&self) -> bool {
        matches!(
            self.error_kind,
            ErrorKind::Provider(ProviderErrorKind::Unavailable(_))
                | ErrorKind::Provider(ProviderErrorKind::ResponseInvalid)
                | ErrorKind::Token(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Token(kind) => write!(f, "Token error: {:?}", kind),
            ErrorKind::Provider(kind) => write!(f, "Provider error: {:?}", kind),
            ErrorKind::State(kind) => write!(f, "State error: {:?}", kind),
            ErrorKind::Http(kind) => write!(f, "HTTP error: {:?}", kind),
            ErrorKind::Config => write!(f, "Configuration error"),
        }?;
        if let Some(source) = &self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Http(HttpErrorKind::BuilderFailed)
        } else if err.is_decode() {
            ErrorKind::Provider(ProviderErrorKind::ResponseInvalid)
        } else {
            ErrorKind::Provider(ProviderErrorKind::Unavailable(
                err.status().map(|s| s.as_u16()),
            ))
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

/// Helper function to create token errors.
pub fn token_error(kind: TokenErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Token(kind),
    }
}

/// Helper function to create provider errors.
pub fn provider_error(kind: ProviderErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Provider(kind),
    }
}

/// Helper function to create state errors.
pub fn state_error(kind: StateErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::State(kind),
    }
}

/// Helper function to create configuration errors.
pub fn config_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Config,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_detail() {
        let err = provider_error(ProviderErrorKind::Unavailable(Some(401)), "unauthorized");
        assert_eq!(
            err.to_string(),
            "Provider error: Unavailable(Some(401)) (unauthorized)"
        );
    }

    #[test]
    fn test_provider_side_classification() {
        assert!(token_error(TokenErrorKind::Missing, "none").is_provider_side());
        assert!(provider_error(ProviderErrorKind::ResponseInvalid, "bad").is_provider_side());
        assert!(!provider_error(ProviderErrorKind::Unsupported, "x").is_provider_side());
        assert!(!state_error(StateErrorKind::Invalid, "x").is_provider_side());
        assert!(!config_error("x").is_provider_side());
    }
}
