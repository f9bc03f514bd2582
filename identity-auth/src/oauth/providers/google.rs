//! Google OAuth provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use service::config::Config;
use tracing::debug;

use crate::error::{token_error, Error, TokenErrorKind};
use crate::http::{get_object, AuthenticatedClientBuilder};
use crate::oauth::token::Tokens;
use crate::oauth::{Identity, OAuthClientConfig};
use crate::principal::Groups;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

/// User info as returned by the OpenID Connect userinfo endpoint.
#[derive(Debug, Deserialize)]
struct GoogleUser {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Google OAuth provider.
///
/// Google has no group resolution, so principals from this provider always
/// carry [`Groups::Unsupported`].
pub struct Provider {
    userinfo_url: String,
    timeout: Duration,
}

impl Provider {
    /// Create a provider using Google's public userinfo endpoint.
    pub fn new() -> Self {
        Self {
            userinfo_url: USERINFO_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Override the userinfo endpoint.
    pub fn with_userinfo_url(mut self, userinfo_url: impl Into<String>) -> Self {
        self.userinfo_url = userinfo_url.into();
        self
    }

    /// Set the timeout of the userinfo request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::oauth::Provider for Provider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn client_config(
        &self,
        config: &Config,
        _groups_enabled: bool,
    ) -> Result<OAuthClientConfig, Error> {
        OAuthClientConfig::new(
            self.name(),
            config.google_client_id(),
            config.google_client_secret(),
            AUTH_URL.to_string(),
            TOKEN_URL.to_string(),
            config.oauth_redirect_base_url(),
            vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
        )
    }

    async fn normalize(&self, tokens: &Tokens, _groups_requested: bool) -> Result<Identity, Error> {
        if tokens.is_blank() {
            return Err(token_error(
                TokenErrorKind::Missing,
                "google OAuth token is not set",
            ));
        }

        let client = AuthenticatedClientBuilder::new()
            .with_bearer_token(tokens.access_token.clone())
            .with_timeout(self.timeout)
            .build()?;

        let user: GoogleUser = get_object(&client, &self.userinfo_url).await?;
        debug!("Fetched Google user info for subject {}", user.sub);

        let email = user.email.unwrap_or_default();
        Identity {
            id: user.sub,
            login: email.clone(),
            name: user.name.unwrap_or_default(),
            email,
            groups: Groups::Unsupported,
        }
        .validated(self.name())
    }
}
