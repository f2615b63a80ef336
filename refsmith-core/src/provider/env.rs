//! Environment provider: dotenv file plus OS process environment.
//!
//! Lookup order: the dotenv file (reloaded when its modification time
//! changes), then the process environment. An optional case-insensitive
//! fallback scans both sources; it is best-effort only, since environment
//! key case semantics differ across platforms.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::config::EnvConfig;
use crate::error::ProviderError;
use crate::reference::Reference;
use crate::secret::Secret;

use super::{matches_namespace, Provider};

/// Parsed dotenv file contents keyed to a modification time.
#[derive(Debug, Default)]
struct DotenvState {
    mtime: Option<SystemTime>,
    vars: HashMap<String, String>,
}

/// Resolves `{{env:KEY}}` references from a dotenv file and the OS environment.
pub struct EnvProvider {
    file: PathBuf,
    cache_ttl: Duration,
    case_insensitive: bool,
    dotenv: Mutex<DotenvState>,
    cache: TtlCache,
}

impl EnvProvider {
    /// Create an environment provider from its config section.
    pub fn new(config: &EnvConfig) -> Self {
        Self {
            file: config.file.clone(),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            case_insensitive: config.case_insensitive,
            dotenv: Mutex::new(DotenvState::default()),
            cache: TtlCache::new(),
        }
    }

    /// Reload the dotenv file if it appeared, vanished, or changed on disk.
    fn refresh_dotenv(&self) {
        let mut state = self.dotenv.lock();
        let mtime = std::fs::metadata(&self.file)
            .and_then(|m| m.modified())
            .ok();

        if mtime.is_some() && mtime == state.mtime {
            return;
        }

        state.mtime = mtime;
        state.vars = match std::fs::read_to_string(&self.file) {
            Ok(contents) => {
                let vars = parse_dotenv(&contents);
                debug!(file = %self.file.display(), keys = vars.len(), "reloaded dotenv file");
                vars
            }
            Err(_) => {
                // Absence is not an error; the OS environment still applies.
                HashMap::new()
            }
        };
    }

    /// Look a key up in the dotenv map, then the process environment.
    fn lookup(&self, key: &str) -> Option<String> {
        {
            let state = self.dotenv.lock();
            if let Some(value) = state.vars.get(key) {
                return Some(value.clone());
            }
        }

        if let Ok(value) = std::env::var(key) {
            return Some(value);
        }

        if self.case_insensitive {
            self.lookup_case_insensitive(key)
        } else {
            None
        }
    }

    /// Best-effort case-insensitive scan of both sources.
    fn lookup_case_insensitive(&self, key: &str) -> Option<String> {
        {
            let state = self.dotenv.lock();
            if let Some((_, value)) = state
                .vars
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
            {
                return Some(value.clone());
            }
        }

        std::env::vars()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }
}

#[async_trait]
impl Provider for EnvProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn can_handle(&self, reference: &Reference) -> bool {
        matches_namespace(reference, "env")
    }

    async fn resolve(&self, identifier: &str) -> Result<Secret, ProviderError> {
        // Accept both a bare key and a namespace-prefixed one.
        let key = identifier.strip_prefix("env:").unwrap_or(identifier).trim();
        if key.is_empty() {
            return Err(ProviderError::new(
                crate::error::ErrorKind::InvalidVariableFormat,
                "empty environment variable name",
            ));
        }

        if let Some(hit) = self.cache.get(key) {
            debug!(key, "env cache hit");
            return Ok(hit);
        }

        self.refresh_dotenv();

        match self.lookup(key) {
            Some(value) => {
                let secret = Secret::new(value);
                self.cache.set(key, secret.clone(), self.cache_ttl);
                Ok(secret)
            }
            None => {
                warn!(key, "environment variable not found");
                Err(ProviderError::not_found(format!(
                    "environment variable '{}' not set in {} or the process environment",
                    key,
                    self.file.display()
                )))
            }
        }
    }

    async fn load_config(&self) -> Result<(), ProviderError> {
        self.refresh_dotenv();
        Ok(())
    }

    fn cache(&self) -> Option<&TtlCache> {
        Some(&self.cache)
    }
}

/// Parse dotenv-style `KEY=VALUE` lines.
///
/// `#` comments and blank lines are ignored; surrounding single or double
/// quotes around the value are stripped.
fn parse_dotenv(contents: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = strip_quotes(value.trim());
        vars.insert(key.to_string(), value.to_string());
    }

    vars
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}
