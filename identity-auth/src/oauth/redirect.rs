//! Post-login redirect allow-list.

use tracing::warn;
use url::{Origin, Url};

use crate::error::{state_error, Error, StateErrorKind};

/// Decides which post-login redirect targets are acceptable.
///
/// Same-site absolute paths are always allowed. Absolute URLs are allowed
/// only when their origin is on the configured list.
#[derive(Debug, Clone, Default)]
pub struct RedirectPolicy {
    allowed_origins: Vec<Origin>,
}

impl RedirectPolicy {
    /// Build a policy from origins such as `https://app.example.com`.
    ///
    /// Entries that do not parse as URLs are skipped.
    pub fn new<S: AsRef<str>>(allowed_origins: &[S]) -> Self {
        let allowed_origins = allowed_origins
            .iter()
            .filter_map(|origin| match Url::parse(origin.as_ref().trim()) {
                Ok(url) => Some(url.origin()),
                Err(e) => {
                    warn!("Ignoring invalid redirect origin {:?}: {}", origin.as_ref(), e);
                    None
                }
            })
            .collect();

        Self { allowed_origins }
    }

    /// Return the redirect target to use, `/` when none was given.
    pub fn validate(&self, redirect_url: &str) -> Result<String, Error> {
        let redirect_url = redirect_url.trim();

        if redirect_url.is_empty() {
            return Ok("/".to_string());
        }

        if redirect_url.chars().any(|c| c.is_control() || c == '\\') {
            return Err(Self::not_allowed(redirect_url));
        }

        if redirect_url.starts_with('/') {
            // "//host/path" is a scheme-relative URL pointing off-site.
            if redirect_url.starts_with("//") {
                return Err(Self::not_allowed(redirect_url));
            }
            return Ok(redirect_url.to_string());
        }

        let url = Url::parse(redirect_url).map_err(|_| Self::not_allowed(redirect_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Self::not_allowed(redirect_url));
        }
        if self.allowed_origins.contains(&url.origin()) {
            Ok(url.to_string())
        } else {
            Err(Self::not_allowed(redirect_url))
        }
    }

    fn not_allowed(redirect_url: &str) -> Error {
        state_error(
            StateErrorKind::RedirectNotAllowed,
            &format!("redirect target {:?} is not allowed", redirect_url),
        )
    }
}
