//! Provider-scoped HTTP client builder and the JSON GET helper.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, LINK};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{provider_error, Error, ErrorKind, HttpErrorKind, ProviderErrorKind};

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("identity-auth/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Authenticated HTTP client.
pub type AuthenticatedClient = reqwest::Client;

/// Builder for creating provider-scoped HTTP clients.
///
/// Every request made by the built client carries the bearer token in a
/// sensitive `Authorization` header. There is no retry layer: a failed
/// provider call is terminal for the login attempt.
pub struct AuthenticatedClientBuilder {
    config: HttpClientConfig,
    bearer_token: Option<SecretString>,
}

impl AuthenticatedClientBuilder {
    /// Create a new client builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: HttpClientConfig::default(),
            bearer_token: None,
        }
    }

    /// Authenticate every request with `Authorization: Bearer <token>`.
    pub fn with_bearer_token(mut self, token: SecretString) -> Self {
        self.bearer_token = Some(token);
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Build the configured HTTP client.
    pub fn build(self) -> Result<AuthenticatedClient, Error> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &self.bearer_token {
            let auth_value = format!("Bearer {}", token.expose_secret());
            let mut header_value = HeaderValue::from_str(&auth_value).map_err(|e| Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::Http(HttpErrorKind::InvalidHeader),
            })?;
            header_value.set_sensitive(true);
            headers.insert(AUTHORIZATION, header_value);
        }

        let client = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .user_agent(self.config.user_agent)
            .default_headers(headers)
            .build()?;

        Ok(client)
    }
}

impl Default for AuthenticatedClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// GET `url` and decode the JSON body into `T`.
///
/// Transport failures and non-2xx statuses map to `ProviderErrorKind::Unavailable`
/// (with the status when one was received); a body that does not decode maps
/// to `ProviderErrorKind::ResponseInvalid`.
pub async fn get_object<T: DeserializeOwned>(
    client: &AuthenticatedClient,
    url: &str,
) -> Result<T, Error> {
    get_page(client, url).await.map(|(object, _)| object)
}

/// Like [`get_object`], also returning the `rel="next"` target of the
/// response's `Link` header, if any.
pub async fn get_page<T: DeserializeOwned>(
    client: &AuthenticatedClient,
    url: &str,
) -> Result<(T, Option<String>), Error> {
    debug!("GET {}", url);

    let response = client.get(url).send().await.map_err(|e| {
        warn!("Request to {} failed: {:?}", url, e);
        Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Provider(ProviderErrorKind::Unavailable(None)),
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        warn!("{} responded with {}: {}", url, status, error_text);
        return Err(provider_error(
            ProviderErrorKind::Unavailable(Some(status.as_u16())),
            &format!("{} {}", status, error_text),
        ));
    }

    let next = response
        .headers()
        .get(LINK)
        .and_then(|value| value.to_str().ok())
        .and_then(next_link);

    let body = response.bytes().await.map_err(|e| Error {
        source: Some(Box::new(e)),
        error_kind: ErrorKind::Provider(ProviderErrorKind::Unavailable(Some(status.as_u16()))),
    })?;

    let object = serde_json::from_slice(&body).map_err(|e| {
        warn!("Failed to decode response from {}: {:?}", url, e);
        Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Provider(ProviderErrorKind::ResponseInvalid),
        }
    })?;

    Ok((object, next))
}

/// Extract the `rel="next"` URL from an RFC 8288 `Link` header value.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim().strip_prefix('<')?.strip_suffix('>')?;
        parts
            .any(|param| param.trim() == r#"rel="next""#)
            .then(|| target.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Thing {
        name: String,
    }

    #[test]
    fn test_builder_default() {
        let builder = AuthenticatedClientBuilder::new();
        assert_eq!(builder.config.timeout, Duration::from_secs(30));
        assert!(builder.bearer_token.is_none());
    }

    #[test]
    fn test_builder_with_timeout() {
        let builder = AuthenticatedClientBuilder::new().with_timeout(Duration::from_secs(5));
        assert_eq!(builder.config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_build_rejects_token_with_newline() {
        let result = AuthenticatedClientBuilder::new()
            .with_bearer_token(SecretString::new("bad\ntoken".to_string()))
            .build();
        assert!(matches!(
            result,
            Err(Error {
                error_kind: ErrorKind::Http(HttpErrorKind::InvalidHeader),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_get_object_sends_bearer_and_decodes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/thing")
            .match_header("authorization", "Bearer abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"widget"}"#)
            .create_async()
            .await;

        let client = AuthenticatedClientBuilder::new()
            .with_bearer_token(SecretString::new("abc".to_string()))
            .build()
            .unwrap();

        let thing: Thing = get_object(&client, &format!("{}/thing", server.url()))
            .await
            .unwrap();

        assert_eq!(thing.name, "widget");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_object_non_success_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/thing")
            .with_status(503)
            .create_async()
            .await;

        let client = AuthenticatedClientBuilder::new().build().unwrap();
        let result: Result<Thing, Error> =
            get_object(&client, &format!("{}/thing", server.url())).await;

        assert_eq!(
            result.unwrap_err().error_kind,
            ErrorKind::Provider(ProviderErrorKind::Unavailable(Some(503)))
        );
    }

    #[tokio::test]
    async fn test_get_object_malformed_body_is_response_invalid() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/thing")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = AuthenticatedClientBuilder::new().build().unwrap();
        let result: Result<Thing, Error> =
            get_object(&client, &format!("{}/thing", server.url())).await;

        assert_eq!(
            result.unwrap_err().error_kind,
            ErrorKind::Provider(ProviderErrorKind::ResponseInvalid)
        );
    }

    #[test]
    fn test_next_link_from_link_header() {
        let header = r#"<https://api.github.com/user/teams?page=2>; rel="next", <https://api.github.com/user/teams?page=4>; rel="last""#;
        assert_eq!(
            next_link(header),
            Some("https://api.github.com/user/teams?page=2".to_string())
        );
        assert_eq!(
            next_link(r#"<https://api.github.com/user/teams?page=1>; rel="prev""#),
            None
        );
    }

    #[tokio::test]
    async fn test_get_object_connection_refused_is_unavailable() {
        // Bind then drop a listener so the port is known to be closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = AuthenticatedClientBuilder::new().build().unwrap();
        let result: Result<Thing, Error> = get_object(&client, &format!("http://{addr}/thing")).await;

        assert_eq!(
            result.unwrap_err().error_kind,
            ErrorKind::Provider(ProviderErrorKind::Unavailable(None))
        );
    }
}
