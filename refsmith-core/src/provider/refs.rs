//! Refs provider: alias indirection over other providers.
//!
//! Aliases live in a line-oriented `ALIAS = target` file, reloaded when its
//! modification time changes. A target must embed at least one provider
//! reference; lines that don't are rejected at load. `resolve` returns the
//! alias's raw target text unresolved; the queue's partial-resolution step
//! expands whatever references it embeds, which is how providers compose
//! without knowing about each other.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::reference::{extract_references, Reference};
use crate::secret::Secret;

use super::{matches_namespace, Provider};

/// Parsed alias file contents keyed to a modification time.
#[derive(Debug, Default)]
struct AliasState {
    mtime: Option<SystemTime>,
    aliases: HashMap<String, String>,
}

/// Resolves `{{refs:ALIAS}}` references to their raw target text.
pub struct RefsProvider {
    file: PathBuf,
    state: Mutex<AliasState>,
}

impl RefsProvider {
    /// Create a refs provider reading aliases from the given file.
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            state: Mutex::new(AliasState::default()),
        }
    }

    /// Reload the alias file if it changed on disk.
    fn refresh(&self) {
        let mut state = self.state.lock();
        let mtime = std::fs::metadata(&self.file)
            .and_then(|m| m.modified())
            .ok();

        if mtime.is_some() && mtime == state.mtime {
            return;
        }

        state.mtime = mtime;
        state.aliases = match std::fs::read_to_string(&self.file) {
            Ok(contents) => {
                let aliases = parse_aliases(&contents);
                debug!(file = %self.file.display(), aliases = aliases.len(), "reloaded alias file");
                aliases
            }
            Err(_) => HashMap::new(),
        };
    }
}

#[async_trait]
impl Provider for RefsProvider {
    fn name(&self) -> &str {
        "refs"
    }

    fn can_handle(&self, reference: &Reference) -> bool {
        matches_namespace(reference, "refs")
    }

    async fn resolve(&self, identifier: &str) -> Result<Secret, ProviderError> {
        self.refresh();

        let state = self.state.lock();
        match state.aliases.get(identifier.trim()) {
            Some(target) => Ok(Secret::new(target.clone())),
            None => Err(ProviderError::not_found(format!(
                "no alias '{}' in {}",
                identifier,
                self.file.display()
            ))),
        }
    }

    async fn load_config(&self) -> Result<(), ProviderError> {
        self.refresh();
        Ok(())
    }
}

/// Parse `ALIAS = target` lines, rejecting targets with no embedded
/// provider reference.
fn parse_aliases(contents: &str) -> HashMap<String, String> {
    let mut aliases = HashMap::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((alias, target)) = line.split_once('=') else {
            warn!(line, "skipping alias line without '='");
            continue;
        };
        let (alias, target) = (alias.trim(), target.trim());
        if alias.is_empty() || target.is_empty() {
            warn!(line, "skipping alias line with empty alias or target");
            continue;
        }

        let has_provider_ref = extract_references(target)
            .iter()
            .any(Reference::is_provider);
        if !has_provider_ref {
            warn!(
                alias,
                "rejecting alias: target embeds no provider reference"
            );
            continue;
        }

        aliases.insert(alias.to_string(), target.to_string());
    }

    aliases
}
