//! GitHub OAuth provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use service::config::Config;
use tracing::{debug, warn};

use crate::error::{provider_error, token_error, Error, ProviderErrorKind, TokenErrorKind};
use crate::http::{get_object, get_page, AuthenticatedClient, AuthenticatedClientBuilder};
use crate::oauth::token::Tokens;
use crate::oauth::{Identity, OAuthClientConfig};
use crate::principal::Groups;

const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const API_BASE_URL: &str = "https://api.github.com";
/// Upper bound on `/user/teams` pages followed for one login.
const MAX_TEAM_PAGES: usize = 10;

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    #[serde(default)]
    name: Option<String>,
    /// Only present when the user made an address public.
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct GitHubTeam {
    slug: String,
    organization: GitHubOrganization,
}

#[derive(Debug, Deserialize)]
struct GitHubOrganization {
    login: String,
}

/// GitHub OAuth provider.
///
/// Groups are the user's team memberships, written as `{org}/{team-slug}`.
pub struct Provider {
    api_base_url: String,
    timeout: Duration,
}

impl Provider {
    /// Create a provider using the public GitHub API.
    pub fn new() -> Self {
        Self {
            api_base_url: API_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Override the API base URL (GitHub Enterprise, tests).
    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the timeout of each API request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn primary_email(&self, client: &AuthenticatedClient) -> Result<String, Error> {
        let emails: Vec<GitHubEmail> =
            get_object(client, &format!("{}/user/emails", self.api_base_url)).await?;

        emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email)
            .ok_or_else(|| {
                warn!("GitHub account has no primary verified email");
                provider_error(
                    ProviderErrorKind::ResponseInvalid,
                    "github account has no primary verified email",
                )
            })
    }

    async fn teams(&self, client: &AuthenticatedClient) -> Result<Groups, Error> {
        let mut groups = Vec::new();
        let mut next = Some(format!("{}/user/teams?per_page=100", self.api_base_url));
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages == MAX_TEAM_PAGES {
                warn!("Stopped following GitHub teams after {} pages", MAX_TEAM_PAGES);
                break;
            }
            pages += 1;

            let (teams, next_url): (Vec<GitHubTeam>, _) = get_page(client, &url).await?;
            groups.extend(
                teams
                    .into_iter()
                    .map(|team| format!("{}/{}", team.organization.login, team.slug)),
            );
            next = next_url;
        }

        Ok(Groups::resolved(groups))
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
        "github"
    }

    fn supports_groups(&self) -> bool {
        true
    }

    fn client_config(
        &self,
        config: &Config,
        groups_enabled: bool,
    ) -> Result<OAuthClientConfig, Error> {
        let mut scopes = vec!["read:user".to_string(), "user:email".to_string()];
        if groups_enabled {
            scopes.push("read:org".to_string());
        }

        OAuthClientConfig::new(
            self.name(),
            config.github_client_id(),
            config.github_client_secret(),
            AUTH_URL.to_string(),
            TOKEN_URL.to_string(),
            config.oauth_redirect_base_url(),
            scopes,
        )
    }

    async fn normalize(&self, tokens: &Tokens, groups_requested: bool) -> Result<Identity, Error> {
        if tokens.is_blank() {
            return Err(token_error(
                TokenErrorKind::Missing,
                "github OAuth token is not set",
            ));
        }

        let client = AuthenticatedClientBuilder::new()
            .with_bearer_token(tokens.access_token.clone())
            .with_timeout(self.timeout)
            .build()?;

        let user: GitHubUser = get_object(&client, &format!("{}/user", self.api_base_url)).await?;
        debug!("Fetched GitHub user {} ({})", user.login, user.id);

        let email = match user.email.filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => self.primary_email(&client).await?,
        };

        let groups = if groups_requested {
            self.teams(&client).await?
        } else {
            Groups::NotRequested
        };

        Identity {
            id: user.id.to_string(),
            login: user.login,
            name: user.name.unwrap_or_default(),
            email,
            groups,
        }
        .validated(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::oauth::Provider as _;
    use clap::Parser;

    const USER_WITH_EMAIL: &str =
        r#"{"id":583231,"login":"octocat","name":"The Octocat","email":"octo@example.com"}"#;
    const USER_WITHOUT_EMAIL: &str =
        r#"{"id":583231,"login":"octocat","name":null,"email":null}"#;

    fn provider_for(server: &mockito::ServerGuard) -> Provider {
        Provider::new().with_api_base_url(server.url())
    }

    #[tokio::test]
    async fn test_normalize_public_email_single_request() {
        let mut server = mockito::Server::new_async().await;
        let user = server
            .mock("GET", "/user")
            .match_header("authorization", "Bearer gho_token")
            .with_status(200)
            .with_body(USER_WITH_EMAIL)
            .expect(1)
            .create_async()
            .await;
        let emails = server
            .mock("GET", "/user/emails")
            .expect(0)
            .create_async()
            .await;

        let identity = provider_for(&server)
            .normalize(&Tokens::bearer("gho_token"), false)
            .await
            .unwrap();

        assert_eq!(identity.id, "583231");
        assert_eq!(identity.login, "octocat");
        assert_eq!(identity.name, "The Octocat");
        assert_eq!(identity.email, "octo@example.com");
        assert_eq!(identity.groups, Groups::NotRequested);
        user.assert_async().await;
        emails.assert_async().await;
    }

    #[tokio::test]
    async fn test_normalize_falls_back_to_primary_verified_email() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(200)
            .with_body(USER_WITHOUT_EMAIL)
            .create_async()
            .await;
        server
            .mock("GET", "/user/emails")
            .with_status(200)
            .with_body(
                r#"[
                    {"email":"old@example.com","primary":false,"verified":true,"visibility":null},
                    {"email":"main@example.com","primary":true,"verified":true,"visibility":"private"}
                ]"#,
            )
            .create_async()
            .await;

        let identity = provider_for(&server)
            .normalize(&Tokens::bearer("gho_token"), false)
            .await
            .unwrap();

        assert_eq!(identity.email, "main@example.com");
        assert_eq!(identity.name, "octocat");
    }

    #[tokio::test]
    async fn test_normalize_without_verified_email_is_response_invalid() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(200)
            .with_body(USER_WITHOUT_EMAIL)
            .create_async()
            .await;
        server
            .mock("GET", "/user/emails")
            .with_status(200)
            .with_body(r#"[{"email":"new@example.com","primary":true,"verified":false}]"#)
            .create_async()
            .await;

        let result = provider_for(&server)
            .normalize(&Tokens::bearer("gho_token"), false)
            .await;

        assert_eq!(
            result.unwrap_err().error_kind,
            ErrorKind::Provider(ProviderErrorKind::ResponseInvalid)
        );
    }

    #[tokio::test]
    async fn test_normalize_resolves_teams_when_requested() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(200)
            .with_body(USER_WITH_EMAIL)
            .create_async()
            .await;
        server
            .mock("GET", "/user/teams?per_page=100")
            .with_status(200)
            .with_body(
                r#"[
                    {"slug":"devs","name":"Devs","organization":{"login":"acme"}},
                    {"slug":"ops","name":"Ops","organization":{"login":"acme"}}
                ]"#,
            )
            .create_async()
            .await;

        let identity = provider_for(&server)
            .normalize(&Tokens::bearer("gho_token"), true)
            .await
            .unwrap();

        assert!(identity.groups.contains("acme/devs"));
        assert!(identity.groups.contains("acme/ops"));
    }

    #[tokio::test]
    async fn test_normalize_no_teams_is_resolved_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(200)
            .with_body(USER_WITH_EMAIL)
            .create_async()
            .await;
        server
            .mock("GET", "/user/teams?per_page=100")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let identity = provider_for(&server)
            .normalize(&Tokens::bearer("gho_token"), true)
            .await
            .unwrap();

        assert_eq!(identity.groups, Groups::resolved(Vec::new()));
    }

    #[tokio::test]
    async fn test_normalize_follows_team_pages() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(200)
            .with_body(USER_WITH_EMAIL)
            .create_async()
            .await;

        let first_page: Vec<serde_json::Value> = (0..100)
            .map(|i| serde_json::json!({"slug": format!("team-{i}"), "organization": {"login": "acme"}}))
            .collect();
        let first = server
            .mock("GET", "/user/teams?per_page=100")
            .with_status(200)
            .with_header(
                "link",
                &format!(
                    r#"<{}/user/teams?per_page=100&page=2>; rel="next", <{}/user/teams?per_page=100&page=2>; rel="last""#,
                    server.url(),
                    server.url()
                ),
            )
            .with_body(serde_json::Value::Array(first_page).to_string())
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/user/teams?per_page=100&page=2")
            .with_status(200)
            .with_body(r#"[{"slug":"admins","organization":{"login":"acme"}}]"#)
            .expect(1)
            .create_async()
            .await;

        let identity = provider_for(&server)
            .normalize(&Tokens::bearer("gho_token"), true)
            .await
            .unwrap();

        assert_eq!(identity.groups.as_set().map(|set| set.len()), Some(101));
        assert!(identity.groups.contains("acme/team-0"));
        assert!(identity.groups.contains("acme/admins"));
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_normalize_unauthorized_is_provider_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(401)
            .with_body(r#"{"message":"Bad credentials"}"#)
            .create_async()
            .await;

        let result = provider_for(&server)
            .normalize(&Tokens::bearer("revoked"), false)
            .await;

        assert_eq!(
            result.unwrap_err().error_kind,
            ErrorKind::Provider(ProviderErrorKind::Unavailable(Some(401)))
        );
    }

    #[test]
    fn test_scopes_widen_with_groups() {
        let config = Config::try_parse_from([
            "test",
            "--github-client-id",
            "id",
            "--github-client-secret",
            "secret",
        ])
        .unwrap();
        let provider = Provider::new();

        assert_eq!(
            provider.client_config(&config, false).unwrap().scopes,
            vec!["read:user", "user:email"]
        );
        assert_eq!(
            provider.client_config(&config, true).unwrap().scopes,
            vec!["read:user", "user:email", "read:org"]
        );
    }
}
