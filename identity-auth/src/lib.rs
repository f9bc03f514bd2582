//! # identity-auth
//!
//! Resolves an authenticated end-user identity from a third-party OAuth 2.0
//! identity provider and normalizes it into a single [`SecurityPrincipal`]:
//! - Provider normalizers (Google, GitHub, Azure AD) behind one trait
//! - Signed, short-lived OAuth state carried across the provider redirect
//! - Redirect allow-listing and single-use state tracking
//! - Per-provider OAuth client settings and the authorization-code exchange
//!
//! ## Architecture
//!
//! The `web` crate drives a login through this crate:
//! 1. `oauth::State` is minted, signed by `oauth::StateCodec` and sent to the provider
//! 2. On callback the state is decoded, the code exchanged via `oauth::OAuthClientConfig`
//! 3. `SecurityPrincipal::update_from_provider` dispatches to the registered normalizer
//! 4. The resolved principal is passed to a `session::SessionHandoff`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use identity_auth::{
//!     oauth::{ProviderRegistry, State, StateCodec},
//!     principal::SecurityPrincipal,
//! };
//! ```

pub mod error;
pub mod http;
pub mod oauth;
pub mod principal;
pub mod session;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
pub use principal::{Groups, SecurityPrincipal};
