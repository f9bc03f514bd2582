//! OAuth identity provider trait and types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use service::config::Config;

use super::client::OAuthClientConfig;
use super::token::Tokens;
use crate::error::{provider_error, Error, ProviderErrorKind};
use crate::principal::Groups;

/// Identity fields mapped from a provider's native user-info payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Provider's unique subject identifier.
    pub id: String,
    /// Human-facing handle (email for Google and Azure, login for GitHub).
    pub login: String,
    /// Display name.
    pub name: String,
    /// Primary email address.
    pub email: String,
    /// Group membership, or the reason there is none.
    pub groups: Groups,
}

impl Identity {
    /// Reject identities with an empty subject, login or email; an empty
    /// display name falls back to the login.
    pub fn validated(mut self, provider: &str) -> Result<Self, Error> {
        for (field, value) in [("id", &self.id), ("login", &self.login), ("email", &self.email)] {
            if value.trim().is_empty() {
                return Err(provider_error(
                    ProviderErrorKind::ResponseInvalid,
                    &format!("{} user info is missing `{}`", provider, field),
                ));
            }
        }
        if self.name.trim().is_empty() {
            self.name = self.login.clone();
        }
        Ok(self)
    }
}

/// Trait for OAuth 2.0 identity providers.
///
/// Implementations handle provider-specific details:
/// - OAuth client settings (endpoints, scopes, secrets)
/// - User info retrieval and mapping into an [`Identity`]
/// - Whether group membership can be resolved at all
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry key and `{provider}` path segment, e.g. `"google"`.
    fn name(&self) -> &'static str;

    /// Returns true if this provider can resolve group membership.
    ///
    /// Providers returning false must report [`Groups::Unsupported`].
    fn supports_groups(&self) -> bool {
        false
    }

    /// Build the OAuth client settings for this provider.
    ///
    /// # Arguments
    ///
    /// * `config` - Application configuration holding the client id and secret
    /// * `groups_enabled` - Whether the login requested group membership (may widen scopes)
    fn client_config(&self, config: &Config, groups_enabled: bool)
        -> Result<OAuthClientConfig, Error>;

    /// Fetch the user's profile with `tokens` and map it into an [`Identity`].
    ///
    /// # Arguments
    ///
    /// * `tokens` - Access token already bound to this provider
    /// * `groups_requested` - Whether the caller wants group membership
    ///
    /// # Errors
    ///
    /// `MissingToken` for a blank token, `ProviderUnavailable` for transport
    /// failures and non-2xx responses, `ProviderResponseInvalid` for bodies
    /// that do not decode or lack required fields.
    async fn normalize(&self, tokens: &Tokens, groups_requested: bool) -> Result<Identity, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn identity() -> Identity {
        Identity {
            id: "1".to_string(),
            login: "octocat".to_string(),
            name: String::new(),
            email: "octo@example.com".to_string(),
            groups: Groups::Unsupported,
        }
    }

    #[test]
    fn test_validated_falls_back_to_login_for_name() {
        let identity = identity().validated("github").unwrap();
        assert_eq!(identity.name, "octocat");
    }

    #[test]
    fn test_validated_rejects_missing_email() {
        let result = Identity {
            email: " ".to_string(),
            ..identity()
        }
        .validated("github");

        assert_eq!(
            result.unwrap_err().error_kind,
            ErrorKind::Provider(ProviderErrorKind::ResponseInvalid)
        );
    }
}
