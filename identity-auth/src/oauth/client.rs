//! Per-provider OAuth client settings and the authorization-code exchange.

use chrono::Utc;
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::token::Tokens;
use crate::error::{config_error, Error, ErrorKind, TokenErrorKind};

/// OAuth client settings for one provider, built from configuration.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    /// Provider name the settings belong to.
    pub provider: &'static str,
    pub client_id: String,
    pub client_secret: SecretString,
    pub auth_url: String,
    pub token_url: String,
    /// Callback URL registered with the provider.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl OAuthClientConfig {
    /// Assemble client settings, failing when the client id or secret is not configured.
    ///
    /// The redirect URI is `{redirect_base_url}/api/oauth/{provider}`.
    pub fn new(
        provider: &'static str,
        client_id: Option<String>,
        client_secret: Option<String>,
        auth_url: String,
        token_url: String,
        redirect_base_url: &str,
        scopes: Vec<String>,
    ) -> Result<Self, Error> {
        let client_id = client_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| config_error(&format!("{} client id is not configured", provider)))?;
        let client_secret = client_secret
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| {
                config_error(&format!("{} client secret is not configured", provider))
            })?;

        Ok(Self {
            provider,
            client_id,
            client_secret: SecretString::new(client_secret),
            auth_url,
            token_url,
            redirect_uri: format!(
                "{}/api/oauth/{}",
                redirect_base_url.trim_end_matches('/'),
                provider
            ),
            scopes,
        })
    }

    /// Provider authorization URL carrying `state` and the configured scopes.
    pub fn authorize_url(&self, state: &str) -> Result<String, Error> {
        let state = state.to_string();
        let (url, _) = self
            .oauth2_client()?
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .url();

        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens.
    ///
    /// Any failure of the exchange means no token is available for this login
    /// and maps to `TokenErrorKind::Unavailable`.
    pub async fn exchange_code(&self, code: &str) -> Result<Tokens, Error> {
        debug!("Exchanging {} authorization code for tokens", self.provider);

        let response = self
            .oauth2_client()?
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                warn!("{} code exchange failed: {:?}", self.provider, e);
                Error {
                    source: Some(Box::new(e)),
                    error_kind: ErrorKind::Token(TokenErrorKind::Unavailable),
                }
            })?;

        Ok(Tokens {
            access_token: SecretString::new(response.access_token().secret().clone()),
            refresh_token: response
                .refresh_token()
                .map(|t| SecretString::new(t.secret().clone())),
            expires_at: response
                .expires_in()
                .and_then(|d| chrono::Duration::from_std(d).ok())
                .and_then(|d| Utc::now().checked_add_signed(d)),
            token_type: response.token_type().as_ref().to_string(),
            scopes: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.as_str().to_string()).collect())
                .unwrap_or_default(),
        })
    }

    fn oauth2_client(&self) -> Result<BasicClient, Error> {
        let invalid_url = |e: oauth2::url::ParseError| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Config,
        };

        Ok(BasicClient::new(
            ClientId::new(self.client_id.clone()),
            Some(ClientSecret::new(self.client_secret.expose_secret().clone())),
            AuthUrl::new(self.auth_url.clone()).map_err(invalid_url)?,
            Some(TokenUrl::new(self.token_url.clone()).map_err(invalid_url)?),
        )
        .set_redirect_uri(RedirectUrl::new(self.redirect_uri.clone()).map_err(invalid_url)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn client_config(token_url: String) -> OAuthClientConfig {
        OAuthClientConfig::new(
            "github",
            Some("client-123".to_string()),
            Some("secret-456".to_string()),
            "https://github.com/login/oauth/authorize".to_string(),
            token_url,
            "https://app.example.com/",
            vec!["read:user".to_string(), "user:email".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_missing_client_id_is_config_error() {
        let result = OAuthClientConfig::new(
            "google",
            None,
            Some("secret".to_string()),
            "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            "https://oauth2.googleapis.com/token".to_string(),
            "http://localhost:5000",
            vec![],
        );
        assert_eq!(result.unwrap_err().error_kind, ErrorKind::Config);
    }

    #[test]
    fn test_empty_client_secret_is_config_error() {
        let result = OAuthClientConfig::new(
            "google",
            Some("id".to_string()),
            Some(String::new()),
            "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            "https://oauth2.googleapis.com/token".to_string(),
            "http://localhost:5000",
            vec![],
        );
        assert_eq!(result.unwrap_err().error_kind, ErrorKind::Config);
    }

    #[test]
    fn test_redirect_uri_is_provider_callback() {
        let config = client_config("https://github.com/login/oauth/access_token".to_string());
        assert_eq!(
            config.redirect_uri,
            "https://app.example.com/api/oauth/github"
        );
    }

    #[test]
    fn test_authorize_url_carries_state_and_scopes() {
        let config = client_config("https://github.com/login/oauth/access_token".to_string());
        let url = Url::parse(&config.authorize_url("signed.state").unwrap()).unwrap();

        assert_eq!(url.host_str(), Some("github.com"));
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("state").map(String::as_str), Some("signed.state"));
        assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-123"));
        assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(
            pairs.get("scope").map(String::as_str),
            Some("read:user user:email")
        );
        assert_eq!(
            pairs.get("redirect_uri").map(String::as_str),
            Some("https://app.example.com/api/oauth/github")
        );
    }

    #[tokio::test]
    async fn test_exchange_code_returns_tokens() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"gho_abc","token_type":"bearer","expires_in":3600,"scope":"read:user"}"#,
            )
            .create_async()
            .await;

        let config = client_config(format!("{}/token", server.url()));
        let tokens = config.exchange_code("the-code").await.unwrap();

        assert_eq!(tokens.access_token.expose_secret(), "gho_abc");
        assert!(tokens.expires_at.is_some());
        assert_eq!(tokens.scopes, vec!["read:user".to_string()]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exchange_code_with_absurd_expiry_has_no_deadline() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"gho_abc","token_type":"bearer","expires_in":1125899906842624}"#,
            )
            .create_async()
            .await;

        let config = client_config(format!("{}/token", server.url()));
        let tokens = config.exchange_code("the-code").await.unwrap();

        assert_eq!(tokens.access_token.expose_secret(), "gho_abc");
        assert_eq!(tokens.expires_at, None);
    }

    #[tokio::test]
    async fn test_exchange_code_failure_is_token_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let config = client_config(format!("{}/token", server.url()));
        let result = config.exchange_code("stale-code").await;

        assert_eq!(
            result.unwrap_err().error_kind,
            ErrorKind::Token(TokenErrorKind::Unavailable)
        );
    }
}
