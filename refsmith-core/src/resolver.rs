//! Host-facing facade over the registry and the resolution queue.
//!
//! A `Resolver` is initialized once at startup, registers the built-in
//! providers from configuration, and then serves any number of resolution
//! runs. It owns the registry; each run builds its own queue state.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::error::RefsmithError;
use crate::provider::env::EnvProvider;
use crate::provider::oauth::OAuthProvider;
use crate::provider::refs::RefsProvider;
use crate::provider::vault::VaultProvider;
use crate::queue::{ResolutionQueue, RunResult};
use crate::reference::{extract_references, Reference};
use crate::registry::{ProviderRegistry, ProviderStatus};

pub struct Resolver {
    config: Config,
    registry: ProviderRegistry,
}

impl Resolver {
    /// Build a resolver from configuration and register the built-in
    /// providers: env, vault, oauth, refs.
    ///
    /// Providers named in `disabled_providers` are skipped; a provider
    /// whose initialization fails stays registered and is reported
    /// unavailable, it does not abort startup.
    pub async fn initialize(config: Config) -> Result<Self, RefsmithError> {
        let mut registry =
            ProviderRegistry::with_disabled(config.disabled_providers.iter().cloned());

        registry
            .register(Arc::new(EnvProvider::new(&config.env)))
            .await?;
        registry
            .register(Arc::new(VaultProvider::new(&config.vault)))
            .await?;
        registry
            .register(Arc::new(OAuthProvider::new(&config.oauth)))
            .await?;
        registry
            .register(Arc::new(RefsProvider::new(&config.refs.aliases_file)))
            .await?;

        info!(providers = registry.len(), "resolver initialized");
        Ok(Self { config, registry })
    }

    /// Resolve every placeholder in `text`.
    ///
    /// `traditional_sources` are consulted in order (first hit wins) for
    /// placeholders no provider resolves. The run never fails as a whole;
    /// per-reference failures are reported in the result's error list and
    /// the corresponding placeholders are left verbatim.
    pub async fn resolve(
        &self,
        text: &str,
        traditional_sources: &[HashMap<String, String>],
    ) -> RunResult {
        let queue = ResolutionQueue::new(&self.registry, &self.config);
        queue.run(text, traditional_sources).await
    }

    /// Explain how `text` would resolve: classification of each placeholder,
    /// then a dry run against the live registry with no traditional sources,
    /// rendered from the redacted audit trail.
    pub async fn debug_explain(&self, text: &str) -> String {
        let references = extract_references(text);
        let mut out = String::new();

        let _ = writeln!(out, "references: {}", references.len());
        for reference in &references {
            match reference {
                Reference::Provider {
                    namespace,
                    path,
                    field,
                    raw,
                } => {
                    let _ = write!(out, "  {} -> provider ns={} path={}", raw, namespace, path);
                    if let Some(field) = field {
                        let _ = write!(out, " field={}", field);
                    }
                    out.push('\n');
                }
                Reference::Traditional { name, raw } => {
                    let _ = writeln!(out, "  {} -> traditional name={}", raw, name);
                }
            }
        }

        if references.is_empty() {
            return out;
        }

        let result = self.resolve(text, &[]).await;
        out.push('\n');
        out.push_str(&result.audit.summary());
        for reference in &references {
            let chain = result.audit.render_chain(reference.raw());
            if !chain.is_empty() {
                out.push('\n');
                out.push_str(&chain);
            }
        }
        out
    }

    /// Per-provider status, disabled providers included.
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        self.registry.status()
    }

    /// Re-run provider initialization, picking up config-file changes.
    pub async fn reload(&mut self) {
        self.registry.reinitialize_all().await;
    }

    /// Clear provider caches and drop all registrations.
    pub fn shutdown(&mut self) {
        info!("resolver shutting down");
        self.registry.cleanup();
    }

    /// The configuration this resolver was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }
}
