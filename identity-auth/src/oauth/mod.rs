//! OAuth 2.0 login plumbing.
//!
//! Provides the provider normalizers and their registry, the signed state
//! carried through the provider redirect, and the redirect allow-list.

pub(crate) mod client;
pub(crate) mod provider;
mod redirect;
mod registry;
mod state;

pub mod providers;
pub mod token;

pub use client::OAuthClientConfig;
pub use provider::{Identity, Provider};
pub use redirect::RedirectPolicy;
pub use registry::ProviderRegistry;
pub use state::{ConsumedStates, State, StateCodec};
