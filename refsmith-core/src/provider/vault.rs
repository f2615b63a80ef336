//! Vault provider: wraps an external secret-store CLI.
//!
//! Every lookup shells out to the configured binary with a per-invocation
//! timeout and classifies the outcome (`auth_failure`, `network_timeout`,
//! `secret_not_found`, or a wrapped generic error). Values are deliberately
//! never cached: each resolve fetches fresh from the store.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::VaultConfig;
use crate::error::{ErrorKind, ProviderError};
use crate::reference::Reference;
use crate::secret::Secret;

use super::{matches_namespace, Provider};

/// Probe state established at initialization.
#[derive(Debug, Default, Clone, Copy)]
struct ProbeState {
    binary_available: bool,
    authenticated: bool,
}

/// Resolves `{{vault:path#field}}` references through a secret-store CLI.
pub struct VaultProvider {
    binary: String,
    timeout: Duration,
    probes: Mutex<ProbeState>,
}

impl VaultProvider {
    /// Create a vault provider from its config section.
    pub fn new(config: &VaultConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            probes: Mutex::new(ProbeState::default()),
        }
    }

    /// Run the CLI with the given arguments, bounded by the process timeout.
    async fn run_cli(&self, args: &[&str]) -> Result<std::process::Output, ProviderError> {
        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ProviderError::other(format!(
                "failed to invoke '{}': {}",
                self.binary, e
            ))),
            Err(_) => Err(ProviderError::new(
                ErrorKind::NetworkTimeout,
                format!(
                    "'{} {}' exceeded the {}s process timeout",
                    self.binary,
                    args.join(" "),
                    self.timeout.as_secs()
                ),
            )),
        }
    }

    /// Classify a non-zero CLI exit into a failure kind.
    fn classify_failure(&self, identifier: &str, stderr: &str) -> ProviderError {
        let lowered = stderr.to_lowercase();

        if lowered.contains("permission denied")
            || lowered.contains("missing client token")
            || lowered.contains("invalid token")
            || lowered.contains("code: 403")
        {
            return ProviderError::new(
                ErrorKind::AuthFailure,
                format!("secret store rejected the session for '{}'", identifier),
            );
        }
        if lowered.contains("timeout") || lowered.contains("timed out") {
            return ProviderError::new(
                ErrorKind::NetworkTimeout,
                format!("secret store timed out for '{}'", identifier),
            );
        }
        if lowered.contains("no value found")
            || lowered.contains("not found")
            || lowered.contains("code: 404")
        {
            return ProviderError::new(
                ErrorKind::SecretNotFound,
                format!("no secret at '{}'", identifier),
            );
        }

        ProviderError::other(format!(
            "secret store failed for '{}': {}",
            identifier,
            stderr.trim()
        ))
    }
}

#[async_trait]
impl Provider for VaultProvider {
    fn name(&self) -> &str {
        "vault"
    }

    fn can_handle(&self, reference: &Reference) -> bool {
        matches_namespace(reference, "vault")
    }

    /// `identifier` must be a `path#field` pair with exactly one `#`.
    async fn resolve(&self, identifier: &str) -> Result<Secret, ProviderError> {
        let mut parts = identifier.splitn(3, '#');
        let path = parts.next().unwrap_or_default();
        let field = parts.next().unwrap_or_default();
        if path.is_empty() || field.is_empty() || parts.next().is_some() {
            return Err(ProviderError::new(
                ErrorKind::InvalidIdentifier,
                format!(
                    "vault identifier '{}' must be 'path#field' with exactly one '#'",
                    identifier
                ),
            ));
        }

        debug!(path, field, "fetching secret from store");
        let field_arg = format!("-field={}", field);
        let output = self.run_cli(&["kv", "get", &field_arg, path]).await?;

        if output.status.success() {
            let value = String::from_utf8_lossy(&output.stdout);
            Ok(Secret::new(value.trim_end_matches('\n').to_string()))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(path, field, "secret store lookup failed");
            Err(self.classify_failure(identifier, &stderr))
        }
    }

    /// Probe binary availability and authentication state.
    async fn initialize(&self) -> Result<(), ProviderError> {
        let version = self.run_cli(&["--version"]).await;
        let binary_available = matches!(&version, Ok(output) if output.status.success());
        if !binary_available {
            self.probes.lock().binary_available = false;
            return Err(ProviderError::other(format!(
                "secret store binary '{}' is not available",
                self.binary
            )));
        }

        let authenticated = match self.run_cli(&["token", "lookup"]).await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        };

        let mut probes = self.probes.lock();
        probes.binary_available = true;
        probes.authenticated = authenticated;
        debug!(binary = %self.binary, authenticated, "secret store probes complete");
        Ok(())
    }

    async fn authenticate(&self) -> Result<(), ProviderError> {
        let output = self.run_cli(&["token", "lookup"]).await?;
        let ok = output.status.success();
        self.probes.lock().authenticated = ok;
        if ok {
            Ok(())
        } else {
            Err(ProviderError::new(
                ErrorKind::AuthFailure,
                format!("'{}' holds no valid session token", self.binary),
            ))
        }
    }

    fn is_authenticated(&self) -> bool {
        self.probes.lock().authenticated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// A stub CLI script standing in for the real secret-store binary.
    fn stub_binary(script: &str) -> (tempfile::TempDir, VaultConfig) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{}", script).unwrap();
        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();

        let config = VaultConfig {
            binary: path.to_string_lossy().into_owned(),
            timeout_secs: 2,
        };
        (dir, config)
    }

    #[tokio::test]
    async fn test_invalid_identifier_shapes() {
        let (_dir, config) = stub_binary("exit 0");
        let provider = VaultProvider::new(&config);

        for identifier in ["nopair", "a#b#c", "#field", "path#"] {
            let err = provider.resolve(identifier).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::InvalidIdentifier, "{}", identifier);
        }
    }

    #[tokio::test]
    async fn test_resolve_success_trims_trailing_newline() {
        let (_dir, config) = stub_binary(r#"echo "topsecret""#);
        let provider = VaultProvider::new(&config);

        let value = provider.resolve("secret/app#key").await.unwrap();
        assert_eq!(value.expose(), "topsecret");
    }

    #[tokio::test]
    async fn test_secret_not_found_classification() {
        let (_dir, config) = stub_binary(r#"echo "No value found at secret/app" >&2; exit 2"#);
        let provider = VaultProvider::new(&config);

        let err = provider.resolve("secret/app#key").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::SecretNotFound);
    }

    #[tokio::test]
    async fn test_auth_failure_classification() {
        let (_dir, config) = stub_binary(r#"echo "permission denied (code: 403)" >&2; exit 2"#);
        let provider = VaultProvider::new(&config);

        let err = provider.resolve("secret/app#key").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthFailure);
    }

    #[tokio::test]
    async fn test_process_timeout() {
        let (_dir, config) = stub_binary("sleep 10");
        let provider = VaultProvider::new(&config);

        let err = provider.resolve("secret/app#key").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NetworkTimeout);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let config = VaultConfig {
            binary: "/nonexistent/refsmith-vault".to_string(),
            timeout_secs: 2,
        };
        let provider = VaultProvider::new(&config);

        assert!(provider.initialize().await.is_err());
        assert!(!provider.is_authenticated());
    }

    #[tokio::test]
    async fn test_initialize_probes_auth() {
        let (_dir, config) = stub_binary("exit 0");
        let provider = VaultProvider::new(&config);

        provider.initialize().await.unwrap();
        assert!(provider.is_authenticated());
    }

    #[tokio::test]
    async fn test_no_value_caching() {
        let (_dir, config) = stub_binary(r#"echo "fresh""#);
        let provider = VaultProvider::new(&config);

        provider.resolve("secret/app#key").await.unwrap();
        // Always fetches fresh; the contract exposes no cache.
        assert!(provider.cache().is_none());
    }
}
