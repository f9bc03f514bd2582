//! Provider registry keyed on provider name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::provider::Provider;
use super::providers::{azure, github, google};

/// Set of normalizers available to the login flow.
///
/// Adding a provider means implementing [`Provider`] and registering it here;
/// existing providers are never touched.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with Google, GitHub and Azure AD using their public endpoints.
    pub fn with_defaults(timeout: Duration) -> Self {
        let mut registry = Self::new();
        registry.register(google::Provider::new().with_timeout(timeout));
        registry.register(github::Provider::new().with_timeout(timeout));
        registry.register(azure::Provider::new().with_timeout(timeout));
        registry
    }

    /// Register a provider under its name, replacing any previous registration.
    pub fn register<P: Provider + 'static>(&mut self, provider: P) -> &mut Self {
        self.providers.insert(provider.name(), Arc::new(provider));
        self
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.providers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
