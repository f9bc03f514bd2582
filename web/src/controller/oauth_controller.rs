//! Controller for OAuth login flows.
//!
//! A single endpoint serves both legs of the authorization-code flow: without
//! a `code` it starts a login, with one it completes it.

use crate::error::{Result, WebErrorKind};
use crate::{AppState, Error};

use axum::extract::{Path, Query, State};
use axum::http::header::SET_COOKIE;
use axum::response::{IntoResponse, Redirect, Response};
use identity_auth::error::{provider_error, state_error, ProviderErrorKind, StateErrorKind};
use identity_auth::oauth::{self, token::ExchangedTokens};
use identity_auth::session::SessionTicket;
use identity_auth::SecurityPrincipal;
use log::*;
use serde::Deserialize;
use service::config::Config;

/// Query parameters accepted by `GET /api/oauth/{provider}`.
#[derive(Debug, Default, Deserialize)]
pub struct OAuthParams {
    /// Authorization code, present on the provider callback.
    pub code: Option<String>,
    /// Signed state, present on the provider callback.
    pub state: Option<String>,
    /// Provider-reported failure such as `access_denied`.
    pub error: Option<String>,
    /// Where to send the browser after login.
    pub redirect_url: Option<String>,
    /// `1` or `true` to request group membership.
    pub groups: Option<String>,
    /// `1` or `true` to keep the session across browser restarts.
    pub persist: Option<String>,
}

/// GET /api/oauth/{provider}
pub async fn login(
    State(app_state): State<AppState>,
    Path(provider_name): Path<String>,
    Query(params): Query<OAuthParams>,
) -> Result<Response> {
    if let Some(error) = &params.error {
        warn!("{provider_name} reported a login error: {error}");
        return Err(Error::Web(WebErrorKind::LoginDenied));
    }

    match params.code.as_deref() {
        Some(code) => callback(&app_state, &provider_name, code, params.state.as_deref()).await,
        None => start(&app_state, &provider_name, &params),
    }
}

fn start(app_state: &AppState, provider_name: &str, params: &OAuthParams) -> Result<Response> {
    let provider = app_state
        .providers
        .get(provider_name)
        .ok_or(Error::Web(WebErrorKind::NotFound))?;

    let redirect_url = app_state
        .redirect_policy
        .validate(params.redirect_url.as_deref().unwrap_or_default())
        .map_err(|e| {
            warn!("Rejected login start for {provider_name}: {e}");
            Error::Web(WebErrorKind::Input)
        })?;

    let groups_enabled = is_flag_set(params.groups.as_deref());
    let persist_login = is_flag_set(params.persist.as_deref());

    let client_config = provider
        .client_config(&app_state.config, groups_enabled)
        .map_err(|e| {
            warn!("Login with {provider_name} is not configured: {e}");
            Error::Web(WebErrorKind::NotFound)
        })?;

    let state = oauth::State::new(provider.name(), &redirect_url, groups_enabled, persist_login);
    let authorize_url = app_state
        .state_codec
        .encode(&state)
        .and_then(|encoded| client_config.authorize_url(&encoded))
        .map_err(|e| {
            error!("Failed to build {provider_name} authorize URL: {e}");
            Error::Web(WebErrorKind::Internal)
        })?;

    debug!("Starting {provider_name} login, state {}", state.id);
    Ok(Redirect::temporary(&authorize_url).into_response())
}

async fn callback(
    app_state: &AppState,
    provider_name: &str,
    code: &str,
    encoded_state: Option<&str>,
) -> Result<Response> {
    let encoded_state = encoded_state.ok_or(Error::Web(WebErrorKind::Input))?;
    let state = app_state.state_codec.decode(encoded_state)?;

    if state.auth_provider != provider_name {
        return Err(state_error(
            StateErrorKind::Invalid,
            &format!(
                "state minted for {} used on {} callback",
                state.auth_provider, provider_name
            ),
        )
        .into());
    }

    let provider = app_state.providers.get(provider_name).ok_or_else(|| {
        provider_error(
            ProviderErrorKind::Unsupported,
            &format!("provider {provider_name:?} is not registered"),
        )
    })?;

    if !app_state
        .consumed_states
        .consume(&state.id, app_state.state_codec.ttl())
    {
        return Err(state_error(StateErrorKind::Invalid, "state was already used").into());
    }

    // The redirect is only integrity-protected by the state, so check it again.
    let redirect_url = app_state.redirect_policy.validate(&state.redirect_url)?;

    let tokens = provider
        .client_config(&app_state.config, state.groups_enabled)?
        .exchange_code(code)
        .await?;

    let mut principal = SecurityPrincipal::new();
    principal
        .update_from_provider(
            provider_name,
            state.groups_enabled,
            &app_state.providers,
            &ExchangedTokens::new(tokens),
            app_state.config.provider_timeout(),
        )
        .await?;

    let ticket = app_state
        .sessions
        .establish(principal, state.persist_login)
        .await?;

    Ok((
        [(SET_COOKIE, session_cookie(&app_state.config, &ticket))],
        Redirect::temporary(&redirect_url),
    )
        .into_response())
}

fn session_cookie(config: &Config, ticket: &SessionTicket) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        config.cookie_name, ticket.session_id
    );
    if config.force_ssl || config.is_production() {
        cookie.push_str("; Secure");
    }
    if let Some(max_age) = ticket.max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age.as_secs()));
    }
    cookie
}

fn is_flag_set(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use std::time::Duration;

    #[test]
    fn test_flag_values() {
        assert!(is_flag_set(Some("1")));
        assert!(is_flag_set(Some("true")));
        assert!(!is_flag_set(Some("0")));
        assert!(!is_flag_set(Some("yes")));
        assert!(!is_flag_set(None));
    }

    #[test]
    fn test_browser_session_cookie() {
        let config = test_support::config(&[]);
        let ticket = SessionTicket {
            session_id: "abc".to_string(),
            max_age: None,
        };

        assert_eq!(
            session_cookie(&config, &ticket),
            "identity=abc; Path=/; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn test_persistent_secure_cookie() {
        let config = test_support::config(&["--cookie-name", "sid", "--force-ssl", "true"]);
        let ticket = SessionTicket {
            session_id: "abc".to_string(),
            max_age: Some(Duration::from_secs(3600)),
        };

        assert_eq!(
            session_cookie(&config, &ticket),
            "sid=abc; Path=/; HttpOnly; SameSite=Lax; Secure; Max-Age=3600"
        );
    }
}
