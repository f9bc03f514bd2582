//! HTTP client building for provider API calls.

mod client;

pub use client::{get_object, get_page, AuthenticatedClient, AuthenticatedClientBuilder, HttpClientConfig};
