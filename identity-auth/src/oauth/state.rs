//! Signed OAuth state carried across the provider redirect.
//!
//! The encoded form is `base64url(json) "." base64url(hmac_sha256(json))`.
//! The JSON payload holds the [`State`] fields plus the issue time, so a
//! client can neither forge the provider or login flags nor keep a state
//! alive past its validity window.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::error::{config_error, state_error, Error, StateErrorKind};

type HmacSha256 = Hmac<Sha256>;

/// Login context carried through the OAuth redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    /// Unguessable correlation id.
    pub id: String,
    /// Post-login destination. Integrity-protected only; validate before use.
    pub redirect_url: String,
    /// Provider this state was minted for.
    pub auth_provider: String,
    /// Whether the login asked for group membership.
    pub groups_enabled: bool,
    /// Whether the session should outlive the browser session.
    pub persist_login: bool,
}

impl State {
    /// Mint a state with a fresh random id.
    pub fn new(
        auth_provider: &str,
        redirect_url: &str,
        groups_enabled: bool,
        persist_login: bool,
    ) -> Self {
        Self {
            id: Self::generate_id(),
            redirect_url: redirect_url.to_string(),
            auth_provider: auth_provider.to_string(),
            groups_enabled,
            persist_login,
        }
    }

    /// Generate a cryptographically random state id.
    fn generate_id() -> String {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        hex::encode(random_bytes)
    }
}

#[derive(Serialize, Deserialize)]
struct SignedPayload {
    #[serde(flatten)]
    state: State,
    /// Issue time, unix seconds.
    iat: i64,
}

/// Encodes and decodes tamper-evident [`State`] values.
#[derive(Clone)]
pub struct StateCodec {
    secret: SecretString,
    ttl: Duration,
}

impl StateCodec {
    /// Create a codec with the default validity window of 10 minutes.
    ///
    /// Fails with a configuration error when `secret` is empty.
    pub fn new(secret: &str) -> Result<Self, Error> {
        if secret.is_empty() {
            return Err(config_error("state signing secret is empty"));
        }
        Ok(Self {
            secret: SecretString::new(secret.to_string()),
            ttl: Duration::minutes(10),
        })
    }

    /// Replace the validity window. Windows too large to represent are ignored.
    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        if let Ok(ttl) = Duration::from_std(ttl) {
            self.ttl = ttl;
        }
        self
    }

    /// How long an encoded state stays valid.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign `state` into its opaque string form.
    pub fn encode(&self, state: &State) -> Result<String, Error> {
        self.encode_at(state, Utc::now())
    }

    /// Verify and unpack an encoded state.
    ///
    /// # Errors
    ///
    /// `StateErrorKind::Invalid` when the value is malformed or its signature
    /// does not match, `StateErrorKind::Expired` when it is older than the
    /// validity window.
    pub fn decode(&self, encoded: &str) -> Result<State, Error> {
        self.decode_at(encoded, Utc::now())
    }

    fn encode_at(&self, state: &State, issued_at: DateTime<Utc>) -> Result<String, Error> {
        let payload = SignedPayload {
            state: state.clone(),
            iat: issued_at.timestamp(),
        };
        let json = serde_json::to_vec(&payload).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: crate::ErrorKind::State(StateErrorKind::Invalid),
        })?;

        let mut mac = self.mac()?;
        mac.update(&json);
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(json),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    fn decode_at(&self, encoded: &str, now: DateTime<Utc>) -> Result<State, Error> {
        let (payload_b64, signature_b64) = encoded
            .split_once('.')
            .ok_or_else(|| state_error(StateErrorKind::Invalid, "state is not signed"))?;

        let json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| state_error(StateErrorKind::Invalid, "state payload is not base64url"))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| state_error(StateErrorKind::Invalid, "state signature is not base64url"))?;

        let mut mac = self.mac()?;
        mac.update(&json);
        mac.verify_slice(&signature)
            .map_err(|_| state_error(StateErrorKind::Invalid, "state signature mismatch"))?;

        let payload: SignedPayload = serde_json::from_slice(&json)
            .map_err(|_| state_error(StateErrorKind::Invalid, "state payload is malformed"))?;

        let issued_at = DateTime::<Utc>::from_timestamp(payload.iat, 0)
            .ok_or_else(|| state_error(StateErrorKind::Invalid, "state issue time is invalid"))?;
        if now - issued_at > self.ttl {
            debug!("State {} expired (issued {})", payload.state.id, issued_at);
            return Err(state_error(StateErrorKind::Expired, "state has expired"));
        }

        Ok(payload.state)
    }

    fn mac(&self) -> Result<HmacSha256, Error> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| config_error("invalid state signing key"))
    }
}

/// Tracks state ids that already completed a callback.
///
/// Ids are remembered for the validity window of the state they belong to,
/// after which the codec rejects the state on its own.
#[derive(Default)]
pub struct ConsumedStates {
    ids: DashMap<String, DateTime<Utc>>,
}

impl ConsumedStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `state_id` as used.
    ///
    /// Returns `false` if it was already used and is still inside its window.
    pub fn consume(&self, state_id: &str, ttl: Duration) -> bool {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        match self.ids.entry(state_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    false
                } else {
                    entry.insert(expires_at);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                true
            }
        }
    }

    /// Forget ids whose window has passed.
    ///
    /// Should be called periodically to bound memory.
    pub fn purge_expired(&self) {
        let now = Utc::now();
        self.ids.retain(|_, expires_at| *expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
