//! Registry of named, initialized provider instances.
//!
//! The registry is an explicit value owned by the host (no global state):
//! independent registries coexist, and each one is constructed, shared with
//! resolution runs, and torn down explicitly. Registration initializes the
//! provider and records any failure for diagnostics; a provider disabled by
//! configuration is skipped without aborting the rest of the setup.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::RefsmithError;
use crate::provider::Provider;
use crate::reference::Reference;

/// A registered provider with its lifecycle bookkeeping.
struct Registration {
    name: String,
    provider: Arc<dyn Provider>,
    initialized: bool,
    init_error: Option<String>,
}

/// Status of one registered provider, as reported to hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatus {
    /// Registry name of the provider.
    pub name: String,

    /// Whether the provider is enabled (disabled ones are never registered,
    /// but are still reported).
    pub enabled: bool,

    /// Whether initialization succeeded.
    pub available: bool,

    /// Whether the provider holds an authenticated session.
    pub authenticated: bool,
}

/// Holds named provider instances for the lifetime of a session.
#[derive(Default)]
pub struct ProviderRegistry {
    registrations: Vec<Registration>,
    disabled: HashSet<String>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that skips the given provider names at registration.
    pub fn with_disabled(disabled: impl IntoIterator<Item = String>) -> Self {
        Self {
            registrations: Vec::new(),
            disabled: disabled.into_iter().collect(),
        }
    }

    /// Register a provider under its own name and initialize it.
    ///
    /// Rejects empty and duplicate names. A provider disabled by
    /// configuration is skipped without error. Initialization failure does
    /// not reject the registration; the reason is kept for diagnostics and
    /// the provider is reported unavailable.
    pub async fn register(&mut self, provider: Arc<dyn Provider>) -> Result<(), RefsmithError> {
        let name = provider.name().to_string();
        if name.is_empty() {
            return Err(RefsmithError::Registration {
                message: "provider name must not be empty".to_string(),
            });
        }
        if self.registrations.iter().any(|r| r.name == name) {
            return Err(RefsmithError::Registration {
                message: format!("provider '{}' is already registered", name),
            });
        }
        if self.disabled.contains(&name) {
            info!(provider = %name, "skipping disabled provider");
            return Ok(());
        }

        let (initialized, init_error) = match provider.initialize().await {
            Ok(()) => {
                debug!(provider = %name, "provider initialized");
                (true, None)
            }
            Err(e) => {
                warn!(provider = %name, error = %e, "provider failed to initialize");
                (false, Some(e.to_string()))
            }
        };

        self.registrations.push(Registration {
            name,
            provider,
            initialized,
            init_error,
        });
        Ok(())
    }

    /// Find the first registered provider that claims the reference.
    ///
    /// Iteration order across distinct namespaces is unspecified.
    pub fn find_provider(&self, reference: &Reference) -> Option<Arc<dyn Provider>> {
        self.registrations
            .iter()
            .find(|r| r.provider.can_handle(reference))
            .map(|r| Arc::clone(&r.provider))
    }

    /// Look a provider up by its registry name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.registrations
            .iter()
            .find(|r| r.name == name)
            .map(|r| Arc::clone(&r.provider))
    }

    /// Remove a provider, clearing its cache on the way out.
    ///
    /// Returns whether a provider with that name was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| {
            if r.name == name {
                if let Some(cache) = r.provider.cache() {
                    cache.clear();
                }
                false
            } else {
                true
            }
        });
        before != self.registrations.len()
    }

    /// Tear every provider down: clear caches and drop registrations.
    pub fn cleanup(&mut self) {
        for registration in &self.registrations {
            if let Some(cache) = registration.provider.cache() {
                cache.clear();
            }
        }
        debug!(count = self.registrations.len(), "registry cleaned up");
        self.registrations.clear();
    }

    /// Re-run initialization for every registered provider.
    ///
    /// Used after configuration files change mid-session.
    pub async fn reinitialize_all(&mut self) {
        for registration in &mut self.registrations {
            match registration.provider.initialize().await {
                Ok(()) => {
                    registration.initialized = true;
                    registration.init_error = None;
                }
                Err(e) => {
                    warn!(provider = %registration.name, error = %e, "reinitialize failed");
                    registration.initialized = false;
                    registration.init_error = Some(e.to_string());
                }
            }
        }
    }

    /// The init failure reason for a provider, if it failed.
    pub fn init_error(&self, name: &str) -> Option<&str> {
        self.registrations
            .iter()
            .find(|r| r.name == name)
            .and_then(|r| r.init_error.as_deref())
    }

    /// Per-provider status, disabled providers included.
    pub fn status(&self) -> Vec<ProviderStatus> {
        let mut statuses: Vec<ProviderStatus> = self
            .registrations
            .iter()
            .map(|r| ProviderStatus {
                name: r.name.clone(),
                enabled: true,
                available: r.initialized,
                authenticated: r.provider.is_authenticated(),
            })
            .collect();

        for name in &self.disabled {
            statuses.push(ProviderStatus {
                name: name.clone(),
                enabled: false,
                available: false,
                authenticated: false,
            });
        }

        statuses
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
