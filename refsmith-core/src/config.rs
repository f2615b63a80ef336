//! Configuration loading and merging.
//!
//! Precedence, lowest to highest: built-in defaults, the TOML config file
//! (explicit path, else the platform config directory), then `REFSMITH_*`
//! environment overrides. A missing file is not an error.

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the resolution engine and its providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wall-clock budget for a single resolution run, in seconds.
    pub run_timeout_secs: u64,

    /// Maximum reference chain depth before `max_depth_exceeded`.
    pub max_depth: u32,

    /// Whether circular references are detected (on by default).
    pub cycle_detection: bool,

    /// Audit trail retention cap; oldest entries are trimmed past this.
    pub audit_max_entries: usize,

    /// Provider names the registry skips at registration time.
    pub disabled_providers: Vec<String>,

    /// Environment provider settings.
    pub env: EnvConfig,

    /// Vault provider settings.
    pub vault: VaultConfig,

    /// OAuth provider settings.
    pub oauth: OAuthConfig,

    /// Refs provider settings.
    pub refs: RefsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_timeout_secs: 30,
            max_depth: 10,
            cycle_detection: true,
            audit_max_entries: 1000,
            disabled_providers: Vec::new(),
            env: EnvConfig::default(),
            vault: VaultConfig::default(),
            oauth: OAuthConfig::default(),
            refs: RefsConfig::default(),
        }
    }
}

/// Settings for the environment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Path to the dotenv file, reloaded on modification-time change.
    pub file: PathBuf,

    /// Cache TTL for resolved values, in seconds.
    pub cache_ttl_secs: u64,

    /// Best-effort case-insensitive fallback over both sources.
    pub case_insensitive: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from(".env"),
            cache_ttl_secs: 300,
            case_insensitive: false,
        }
    }
}

/// Settings for the vault provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// The secret-store CLI binary to invoke.
    pub binary: String,

    /// Per-invocation subprocess timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            binary: "vault".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Settings for the OAuth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Path to the per-service TOML file, reloaded on modification-time change.
    pub services_file: PathBuf,

    /// Seconds before real expiry at which a token counts as stale.
    pub expiry_buffer_secs: u64,

    /// HTTP timeout for token requests, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            services_file: PathBuf::from("oauth.toml"),
            expiry_buffer_secs: 300,
            request_timeout_secs: 10,
        }
    }
}

/// Settings for the refs provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefsConfig {
    /// Path to the alias file, reloaded on modification-time change.
    pub aliases_file: PathBuf,
}

impl Default for RefsConfig {
    fn default() -> Self {
        Self {
            aliases_file: PathBuf::from("refs.env"),
        }
    }
}

impl Config {
    /// Load configuration, merging defaults, file, and environment overrides.
    ///
    /// With `path = None` the platform config directory is consulted; an
    /// absent file yields the defaults.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        let mut config = match config_path {
            Some(ref p) if p.exists() => {
                let contents = std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config from {:?}", p))?;
                toml::from_str(&contents)
                    .with_context(|| format!("failed to parse config from {:?}", p))?
            }
            _ => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `REFSMITH_*` environment variable overrides in place.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<u64>("REFSMITH_RUN_TIMEOUT_SECS") {
            self.run_timeout_secs = v;
        }
        if let Some(v) = env_parse::<u32>("REFSMITH_MAX_DEPTH") {
            self.max_depth = v;
        }
        if let Some(v) = env_parse::<bool>("REFSMITH_CYCLE_DETECTION") {
            self.cycle_detection = v;
        }
        if let Some(v) = env_parse::<usize>("REFSMITH_AUDIT_MAX_ENTRIES") {
            self.audit_max_entries = v;
        }
        if let Ok(v) = std::env::var("REFSMITH_DISABLED_PROVIDERS") {
            self.disabled_providers = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(v) = std::env::var("REFSMITH_ENV_FILE") {
            self.env.file = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("REFSMITH_VAULT_BINARY") {
            self.vault.binary = v;
        }
        if let Some(v) = env_parse::<u64>("REFSMITH_VAULT_TIMEOUT_SECS") {
            self.vault.timeout_secs = v;
        }
        if let Ok(v) = std::env::var("REFSMITH_OAUTH_SERVICES_FILE") {
            self.oauth.services_file = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("REFSMITH_REFS_FILE") {
            self.refs.aliases_file = PathBuf::from(v);
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "refsmith", "refsmith")
        .map(|dirs| dirs.config_dir().join("refsmith.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.run_timeout_secs, 30);
        assert_eq!(config.max_depth, 10);
        assert!(config.cycle_detection);
        assert_eq!(config.env.cache_ttl_secs, 300);
        assert_eq!(config.vault.binary, "vault");
        assert_eq!(config.vault.timeout_secs, 10);
        assert_eq!(config.oauth.expiry_buffer_secs, 300);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
run_timeout_secs = 5
max_depth = 3
disabled_providers = ["vault"]

[env]
file = "custom.env"

[vault]
binary = "/opt/bin/vault"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.run_timeout_secs, 5);
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.disabled_providers, vec!["vault"]);
        assert_eq!(config.env.file, PathBuf::from("custom.env"));
        assert_eq!(config.vault.binary, "/opt/bin/vault");
        // Unset sections keep their defaults.
        assert_eq!(config.oauth.expiry_buffer_secs, 300);
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let config = Config::load(Some(std::path::Path::new("/nonexistent/refsmith.toml"))).unwrap();
        assert_eq!(config.run_timeout_secs, 30);
    }

    #[test]
    fn test_load_malformed_file_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "run_timeout_secs = \"not a number\"").unwrap();
        assert!(Config::load(Some(file.path())).is_err());
    }
}
