//! The provider contract and the built-in provider implementations.
//!
//! This module provides:
//! - [`Provider`] - The capability set every provider implements
//! - [`env::EnvProvider`] - dotenv file + OS environment lookup
//! - [`vault::VaultProvider`] - external secret-store CLI wrapper
//! - [`oauth::OAuthProvider`] - OAuth client-credentials token acquisition
//! - [`refs::RefsProvider`] - alias indirection
//!
//! Providers are selected by namespace through [`can_handle`](Provider::can_handle)
//! and compose only through the resolution queue's partial-resolution step:
//! a provider that returns text containing further `{{...}}` placeholders
//! never knows which provider expands them.

use async_trait::async_trait;

use crate::cache::TtlCache;
use crate::error::ProviderError;
use crate::reference::Reference;
use crate::secret::Secret;

pub mod env;
pub mod oauth;
pub mod refs;
pub mod vault;

/// The capability set every provider implements.
///
/// `can_handle` and `resolve` are required; the prototype-table "override or
/// fail registration" contract of ad hoc plugin systems becomes a
/// compile-time obligation here. The optional capabilities carry explicit
/// default bodies: no configuration needed, always authenticated, no cache.
///
/// A provider must never panic across the queue boundary. Failures are
/// returned as [`ProviderError`] values and recorded per reference.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The registry name of this provider (conventionally its namespace).
    fn name(&self) -> &str;

    /// Whether this provider claims the given reference.
    fn can_handle(&self, reference: &Reference) -> bool;

    /// Resolve an identifier (the text after the namespace's first `:`)
    /// to a value.
    async fn resolve(&self, identifier: &str) -> Result<Secret, ProviderError>;

    /// Load or reload configuration. Default: nothing to load.
    async fn load_config(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Initialize the provider. Idempotent; loads configuration first.
    async fn initialize(&self) -> Result<(), ProviderError> {
        self.load_config().await
    }

    /// Establish an authenticated session. Default: nothing to do.
    async fn authenticate(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Whether the provider currently holds an authenticated session.
    fn is_authenticated(&self) -> bool {
        true
    }

    /// The provider's value cache, when it keeps one.
    fn cache(&self) -> Option<&TtlCache> {
        None
    }
}

/// Convenience: whether a provider reference targets the given namespace.
pub(crate) fn matches_namespace(reference: &Reference, namespace: &str) -> bool {
    reference.namespace() == Some(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::classify;

    struct FixedProvider;

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn can_handle(&self, reference: &Reference) -> bool {
            matches_namespace(reference, "fixed")
        }

        async fn resolve(&self, identifier: &str) -> Result<Secret, ProviderError> {
            Ok(Secret::new(format!("value-of-{}", identifier)))
        }
    }

    #[tokio::test]
    async fn test_default_capabilities() {
        let provider = FixedProvider;
        provider.load_config().await.unwrap();
        provider.initialize().await.unwrap();
        provider.authenticate().await.unwrap();
        assert!(provider.is_authenticated());
        assert!(provider.cache().is_none());
    }

    #[tokio::test]
    async fn test_namespace_matching() {
        let provider = FixedProvider;
        assert!(provider.can_handle(&classify("{{fixed:thing}}")));
        assert!(!provider.can_handle(&classify("{{other:thing}}")));
        assert!(!provider.can_handle(&classify("{{TRADITIONAL}}")));
    }
}
