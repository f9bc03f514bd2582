//! Azure AD (Microsoft Entra ID) OAuth provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use service::config::Config;
use tracing::{debug, warn};

use crate::error::{token_error, Error, TokenErrorKind};
use crate::http::{get_object, AuthenticatedClient, AuthenticatedClientBuilder};
use crate::oauth::token::Tokens;
use crate::oauth::{Identity, OAuthClientConfig};
use crate::principal::Groups;

const LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";
const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const GROUP_ODATA_TYPE: &str = "#microsoft.graph.group";
/// Upper bound on `memberOf` pages followed for one login.
const MAX_MEMBER_OF_PAGES: usize = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    #[serde(default)]
    user_principal_name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    mail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryObject {
    #[serde(rename = "@odata.type", default)]
    odata_type: String,
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MemberOfPage {
    #[serde(default)]
    value: Vec<DirectoryObject>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

/// Azure AD OAuth provider.
///
/// Groups are the display names of the security and Microsoft 365 groups the
/// user is a direct member of.
pub struct Provider {
    graph_base_url: String,
    timeout: Duration,
}

impl Provider {
    /// Create a provider using the global Microsoft Graph endpoint.
    pub fn new() -> Self {
        Self {
            graph_base_url: GRAPH_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Override the Graph base URL (national clouds, tests).
    pub fn with_api_base_url(mut self, graph_base_url: impl Into<String>) -> Self {
        self.graph_base_url = graph_base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the timeout of each Graph request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn member_of(&self, client: &AuthenticatedClient) -> Result<Groups, Error> {
        let mut groups = Vec::new();
        let mut next = Some(format!(
            "{}/me/memberOf?$select=displayName",
            self.graph_base_url
        ));
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages == MAX_MEMBER_OF_PAGES {
                warn!(
                    "Stopped following memberOf after {} pages",
                    MAX_MEMBER_OF_PAGES
                );
                break;
            }
            pages += 1;

            let page: MemberOfPage = get_object(client, &url).await?;
            groups.extend(
                page.value
                    .into_iter()
                    .filter(|object| object.odata_type == GROUP_ODATA_TYPE)
                    .filter_map(|object| object.display_name),
            );
            next = page.next_link;
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
        "azure"
    }

    fn supports_groups(&self) -> bool {
        true
    }

    fn client_config(
        &self,
        config: &Config,
        groups_enabled: bool,
    ) -> Result<OAuthClientConfig, Error> {
        let mut scopes = vec![
            "openid".to_string(),
            "profile".to_string(),
            "email".to_string(),
            "User.Read".to_string(),
        ];
        if groups_enabled {
            scopes.push("GroupMember.Read.All".to_string());
        }

        let tenant = config.azure_tenant();
        OAuthClientConfig::new(
            self.name(),
            config.azure_client_id(),
            config.azure_client_secret(),
            format!("{}/{}/oauth2/v2.0/authorize", LOGIN_BASE_URL, tenant),
            format!("{}/{}/oauth2/v2.0/token", LOGIN_BASE_URL, tenant),
            config.oauth_redirect_base_url(),
            scopes,
        )
    }

    async fn normalize(&self, tokens: &Tokens, groups_requested: bool) -> Result<Identity, Error> {
        if tokens.is_blank() {
            return Err(token_error(
                TokenErrorKind::Missing,
                "azure OAuth token is not set",
            ));
        }

        let client = AuthenticatedClientBuilder::new()
            .with_bearer_token(tokens.access_token.clone())
            .with_timeout(self.timeout)
            .build()?;

        let user: GraphUser = get_object(&client, &format!("{}/me", self.graph_base_url)).await?;
        debug!("Fetched Azure AD user {}", user.id);

        let login = user.user_principal_name.unwrap_or_default();
        let email = user
            .mail
            .filter(|mail| !mail.is_empty())
            .unwrap_or_else(|| login.clone());

        let groups = if groups_requested {
            self.member_of(&client).await?
        } else {
            Groups::NotRequested
        };

        Identity {
            id: user.id,
            login,
            name: user.display_name.unwrap_or_default(),
            email,
            groups,
        }
        .validated(self.name())
    }
}
