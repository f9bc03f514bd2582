//! The unified, provider-agnostic identity record.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{provider_error, token_error, Error, ErrorKind, ProviderErrorKind, TokenErrorKind};
use crate::oauth::provider::Identity;
use crate::oauth::token::TokenSource;
use crate::oauth::ProviderRegistry;

/// Group membership of a principal.
///
/// "Supported but empty" (`Resolved` with an empty set) and "the provider
/// cannot tell" (`Unsupported`) are distinct and must never be conflated.
///
/// `NotRequested` is neither: the provider could resolve groups but this
/// login did not ask, so no membership claim is made either way. Treat it as
/// "unknown, ask again with groups enabled", never as `Unsupported`. Once
/// groups are requested the value is always `Resolved` or `Unsupported`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "groups", rename_all = "snake_case")]
pub enum Groups {
    /// The provider can resolve groups but the login did not ask for them.
    #[default]
    NotRequested,
    /// The provider has no group resolution.
    Unsupported,
    /// Group identifiers reported by the provider.
    Resolved(BTreeSet<String>),
}

impl Groups {
    pub fn resolved<I: IntoIterator<Item = String>>(groups: I) -> Self {
        Groups::Resolved(groups.into_iter().collect())
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Groups::Resolved(groups) => Some(groups),
            _ => None,
        }
    }

    pub fn contains(&self, group: &str) -> bool {
        self.as_set().is_some_and(|groups| groups.contains(group))
    }
}

/// Authenticated end-user identity.
///
/// Created empty when a callback starts and populated by exactly one call to
/// [`SecurityPrincipal::update_from_provider`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityPrincipal {
    /// Provider-qualified subject identifier.
    pub id: String,
    pub login: String,
    pub name: String,
    pub email: String,
    pub groups: Groups,
    /// Name of the provider that produced this record.
    pub auth_provider: String,
}

impl SecurityPrincipal {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once an update from a provider has succeeded.
    pub fn is_resolved(&self) -> bool {
        !self.id.is_empty()
    }

    /// Resolve this principal from `provider_name`.
    ///
    /// Selects the provider from `registry`, retrieves the token from
    /// `token_source` and runs the provider's normalizer. Token retrieval and
    /// the provider call are each bounded by `timeout`.
    ///
    /// On success every identity field is replaced at once. On error the
    /// principal is left exactly as it was.
    ///
    /// # Errors
    ///
    /// - `ProviderErrorKind::Unsupported` for an unregistered provider (nothing is fetched)
    /// - `TokenErrorKind::Unavailable` if the token source fails or times out, or the token has expired
    /// - `TokenErrorKind::Missing` if there is no token
    /// - any error from the provider's normalizer; a timeout maps to `ProviderErrorKind::Unavailable`
    pub async fn update_from_provider(
        &mut self,
        provider_name: &str,
        groups_requested: bool,
        registry: &ProviderRegistry,
        token_source: &dyn TokenSource,
        timeout: Duration,
    ) -> Result<(), Error> {
        let provider = registry.get(provider_name).ok_or_else(|| {
            provider_error(
                ProviderErrorKind::Unsupported,
                &format!("provider {:?} is not registered", provider_name),
            )
        })?;

        let tokens = match tokio::time::timeout(timeout, token_source.get_token()).await {
            Err(_) => {
                return Err(token_error(
                    TokenErrorKind::Unavailable,
                    "token retrieval timed out",
                ))
            }
            Ok(Err(e)) => {
                warn!("Token retrieval for {} failed: {}", provider_name, e);
                return Err(Error {
                    source: Some(Box::new(e)),
                    error_kind: ErrorKind::Token(TokenErrorKind::Unavailable),
                });
            }
            Ok(Ok(None)) => {
                return Err(token_error(
                    TokenErrorKind::Missing,
                    &format!("{} OAuth token is not set", provider_name),
                ))
            }
            Ok(Ok(Some(tokens))) => tokens,
        };

        if tokens.is_blank() {
            return Err(token_error(
                TokenErrorKind::Missing,
                &format!("{} OAuth token is empty", provider_name),
            ));
        }
        if tokens.is_expired() {
            return Err(token_error(
                TokenErrorKind::Unavailable,
                &format!("{} OAuth token has expired", provider_name),
            ));
        }

        debug!("Resolving principal from {}", provider_name);

        let mut identity =
            tokio::time::timeout(timeout, provider.normalize(&tokens, groups_requested))
                .await
                .map_err(|_| {
                    provider_error(
                        ProviderErrorKind::Unavailable(None),
                        &format!("{} user info request timed out", provider_name),
                    )
                })??
                .validated(provider.name())?;

        if !provider.supports_groups() {
            identity.groups = Groups::Unsupported;
        }

        self.replace_with(identity, provider.name());

        info!(
            "Resolved principal {} ({}) from {}",
            self.login, self.id, self.auth_provider
        );
        Ok(())
    }

    fn replace_with(&mut self, identity: Identity, auth_provider: &str) {
        *self = SecurityPrincipal {
            id: identity.id,
            login: identity.login,
            name: identity.name,
            email: identity.email,
            groups: identity.groups,
            auth_provider: auth_provider.to_string(),
        };
    }
}
