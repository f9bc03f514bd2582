//! Handing a resolved principal over to the session layer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use tracing::info;

use crate::error::Error;
use crate::principal::SecurityPrincipal;

/// Session created for a resolved principal.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTicket {
    /// Opaque session identifier, sent to the browser as a cookie.
    pub session_id: String,
    /// Cookie lifetime. `None` means a browser-session cookie.
    pub max_age: Option<Duration>,
}

/// Takes ownership of a resolved principal for the life of a session.
#[async_trait]
pub trait SessionHandoff: Send + Sync {
    /// Establish a session for `principal`.
    ///
    /// `persist_login` asks for a session that survives browser restarts.
    async fn establish(
        &self,
        principal: SecurityPrincipal,
        persist_login: bool,
    ) -> Result<SessionTicket, Error>;

    /// Drop sessions that have expired. The default does nothing.
    fn purge_expired(&self) {}
}

struct SessionEntry {
    principal: SecurityPrincipal,
    expires_at: DateTime<Utc>,
}

/// Process-local session store.
pub struct InMemorySessions {
    sessions: DashMap<String, SessionEntry>,
    lifetime: Duration,
}

impl InMemorySessions {
    /// Sessions expire `lifetime` after they are established.
    pub fn new(lifetime: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            lifetime,
        }
    }

    /// Principal of a live session.
    pub fn get(&self, session_id: &str) -> Option<SecurityPrincipal> {
        self.sessions
            .get(session_id)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.principal.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn generate_session_id() -> String {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        hex::encode(random_bytes)
    }
}

#[async_trait]
impl SessionHandoff for InMemorySessions {
    async fn establish(
        &self,
        principal: SecurityPrincipal,
        persist_login: bool,
    ) -> Result<SessionTicket, Error> {
        let session_id = Self::generate_session_id();
        let expires_at = chrono::Duration::from_std(self.lifetime)
            .ok()
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        info!(
            "Established session for {} via {} (persistent: {})",
            principal.login, principal.auth_provider, persist_login
        );
        self.sessions.insert(
            session_id.clone(),
            SessionEntry {
                principal,
                expires_at,
            },
        );

        Ok(SessionTicket {
            session_id,
            max_age: persist_login.then_some(self.lifetime),
        })
    }

    fn purge_expired(&self) {
        let now = Utc::now();
        self.sessions.retain(|_, entry| entry.expires_at > now);
    }
}
