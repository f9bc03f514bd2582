use std::sync::Arc;
use std::time::Duration;

use identity_auth::error::config_error;
use identity_auth::oauth::{ConsumedStates, ProviderRegistry, RedirectPolicy, StateCodec};
use identity_auth::session::{InMemorySessions, SessionHandoff};
use log::{info, warn};
use service::config::Config;
use tokio::net::TcpListener;

mod controller;
mod error;
pub mod router;

pub use error::{Error, WebErrorKind};

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);
/// How often consumed OAuth states and expired sessions are dropped.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub providers: Arc<ProviderRegistry>,
    pub state_codec: StateCodec,
    pub redirect_policy: Arc<RedirectPolicy>,
    pub consumed_states: Arc<ConsumedStates>,
    pub sessions: Arc<dyn SessionHandoff>,
}

impl AppState {
    /// Build the login state from configuration, registering the built-in providers.
    ///
    /// Fails when no state signing secret is configured.
    pub fn new(config: Config) -> Result<Self, identity_auth::Error> {
        let providers = ProviderRegistry::with_defaults(config.provider_timeout());
        Self::with_providers(config, providers)
    }

    /// Build the login state with an explicit provider registry.
    pub fn with_providers(
        config: Config,
        providers: ProviderRegistry,
    ) -> Result<Self, identity_auth::Error> {
        let secret = config
            .state_signing_secret()
            .ok_or_else(|| config_error("MASTER_SECRET_KEY is not set"))?;
        let state_codec = StateCodec::new(secret)?.with_ttl(config.oauth_state_ttl());

        // The server's own origin is always an acceptable redirect target.
        let mut origins = config.allowed_redirect_origins.clone();
        origins.push(config.oauth_redirect_base_url().to_string());

        Ok(Self {
            providers: Arc::new(providers),
            state_codec,
            redirect_policy: Arc::new(RedirectPolicy::new(origins.as_slice())),
            consumed_states: Arc::new(ConsumedStates::new()),
            sessions: Arc::new(InMemorySessions::new(config.session_expiry())),
            config,
        })
    }
}

/// Bind the configured interface and port and serve until Ctrl-C or SIGTERM.
///
/// After the signal, in-flight requests get a short grace period before the
/// server is dropped.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let interface = app_state.config.interface.as_deref().unwrap_or("127.0.0.1");
    let host = format!("{}:{}", interface, app_state.config.port);

    info!(
        "Login providers available: {}",
        app_state.providers.names().join(", ")
    );
    spawn_purge_task(&app_state);

    let listener = TcpListener::bind(&host).await?;
    info!("Server starting... listening for connections on http://{host}");

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let notified = Arc::clone(&shutdown);
    let router = router::define_routes(app_state);

    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { notified.notified().await })
            .await
    });

    tokio::select! {
        result = &mut server => return result.map_err(std::io::Error::other)?,
        _ = shutdown_signal() => {}
    }

    info!("Shutting down server...");
    shutdown.notify_one();

    match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, server).await {
        Ok(result) => result.map_err(std::io::Error::other)?,
        Err(_) => {
            warn!(
                "Server did not stop within {:?}, dropping open connections",
                SHUTDOWN_GRACE_PERIOD
            );
            Ok(())
        }
    }
}

fn spawn_purge_task(app_state: &AppState) {
    let consumed_states = Arc::clone(&app_state.consumed_states);
    let sessions = Arc::clone(&app_state.sessions);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            consumed_states.purge_expired();
            sessions.purge_expired();
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_missing_signing_secret_is_config_error() {
        let config = Config::try_parse_from(["test"]).unwrap();
        let result = AppState::new(config);
        assert_eq!(
            result.err().map(|e| e.error_kind),
            Some(identity_auth::ErrorKind::Config)
        );
    }

    #[test]
    fn test_app_state_registers_default_providers() {
        let app_state = AppState::new(test_support::config(&[])).unwrap();
        assert_eq!(
            app_state.providers.names(),
            vec!["azure", "github", "google"]
        );
    }

    #[test]
    fn test_own_origin_is_allowed_redirect() {
        let app_state = test_support::app_state(ProviderRegistry::new());
        assert!(app_state
            .redirect_policy
            .validate("http://localhost:5000/dashboard")
            .is_ok());
        assert!(app_state
            .redirect_policy
            .validate("https://elsewhere.example.com/")
            .is_err());
    }
}
