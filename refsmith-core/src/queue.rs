//! The resolution queue: one run over one text block.
//!
//! The queue scans the input for placeholders, repeatedly pops items,
//! routes each to a provider through the registry, records the outcome in
//! the audit trail, and re-enqueues any placeholders discovered inside a
//! partially-resolved value. Depth, cycle, and timeout guards degrade to
//! per-item failures; a run never fails atomically because of one bad
//! reference.
//!
//! Execution is sequential: items resolve one at a time in FIFO order, and
//! a parent is always fully processed before any child discovered inside
//! its value. Run state lives for exactly one call to [`ResolutionQueue::run`].

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::audit::{AuditStatus, AuditTrail, RedactedMeta};
use crate::config::Config;
use crate::error::ErrorKind;
use crate::reference::{extract_references, Reference};
use crate::registry::ProviderRegistry;
use crate::secret::Secret;

/// One failed reference in a run's error list.
#[derive(Debug, Clone)]
pub struct Failure {
    /// The raw placeholder text.
    pub reference: String,

    /// The classified failure kind.
    pub kind: ErrorKind,

    /// The provider that failed, when one was selected.
    pub provider: Option<String>,
}

/// The outcome of one resolution run.
#[derive(Debug)]
pub struct RunResult {
    /// The compiled text: resolved placeholders substituted, unresolved
    /// ones left verbatim.
    pub text: String,

    /// Every reference that failed, sorted by placeholder text.
    pub failures: Vec<Failure>,

    /// The redacted audit trail for the run.
    pub audit: AuditTrail,
}

impl RunResult {
    /// Whether every placeholder resolved.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A pending reference awaiting resolution.
#[derive(Debug, Clone)]
struct QueueItem {
    reference: Reference,
    depth: u32,
    parent: Option<String>,
}

/// Orchestrates a single resolution run against a provider registry.
pub struct ResolutionQueue<'a> {
    registry: &'a ProviderRegistry,
    run_timeout: Duration,
    max_depth: u32,
    cycle_detection: bool,
    audit_max_entries: usize,
}

/// Mutable state for one run.
struct RunState {
    pending: VecDeque<QueueItem>,
    completed: HashMap<String, Secret>,
    completed_provider: HashMap<String, String>,
    failed: HashMap<String, Failure>,
    parents: HashMap<String, Option<String>>,
    audit: AuditTrail,
}

impl RunState {
    fn is_resolved(&self, raw: &str) -> bool {
        self.completed.contains_key(raw) || self.failed.contains_key(raw)
    }

    /// The ancestor chain of an item, oldest first, walked through
    /// parent links. This is the resolution stack used for cycle checks.
    fn ancestor_chain(&self, parent: Option<&str>) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = parent.map(str::to_string);
        while let Some(raw) = current {
            current = self.parents.get(&raw).cloned().flatten();
            chain.push(raw);
            if chain.len() > 64 {
                break;
            }
        }
        chain.reverse();
        chain
    }

    fn fail(&mut self, raw: &str, kind: ErrorKind, provider: Option<&str>) {
        self.completed.remove(raw);
        self.completed_provider.remove(raw);
        self.failed.insert(
            raw.to_string(),
            Failure {
                reference: raw.to_string(),
                kind,
                provider: provider.map(str::to_string),
            },
        );
    }
}

impl<'a> ResolutionQueue<'a> {
    /// Create a queue over the given registry with the configured limits.
    pub fn new(registry: &'a ProviderRegistry, config: &Config) -> Self {
        Self {
            registry,
            run_timeout: Duration::from_secs(config.run_timeout_secs),
            max_depth: config.max_depth,
            cycle_detection: config.cycle_detection,
            audit_max_entries: config.audit_max_entries,
        }
    }

    /// Resolve every placeholder in `text`, consulting `traditional_sources`
    /// (in precedence order, first source wins) for anything providers
    /// leave unresolved.
    pub async fn run(
        &self,
        text: &str,
        traditional_sources: &[HashMap<String, String>],
    ) -> RunResult {
        let started = Instant::now();
        let mut state = RunState {
            pending: VecDeque::new(),
            completed: HashMap::new(),
            completed_provider: HashMap::new(),
            failed: HashMap::new(),
            parents: HashMap::new(),
            audit: AuditTrail::new(),
        };

        // Scan: one queue item per distinct raw placeholder.
        for reference in extract_references(text) {
            let raw = reference.raw().to_string();
            if state.parents.contains_key(&raw) {
                continue;
            }
            state.parents.insert(raw, None);
            state.pending.push_back(QueueItem {
                reference,
                depth: 1,
                parent: None,
            });
        }
        debug!(
            run_id = %state.audit.run_id,
            pending = state.pending.len(),
            "resolution run started"
        );

        while let Some(item) = state.pending.pop_front() {
            if started.elapsed() > self.run_timeout {
                self.fail_remaining(&mut state, item);
                break;
            }
            self.process_item(&mut state, item, started).await;
        }

        let text = self.compile(&mut state, text, traditional_sources);

        let mut failures: Vec<Failure> = state.failed.into_values().collect();
        failures.sort_by(|a, b| a.reference.cmp(&b.reference));

        let mut audit = state.audit;
        audit.cleanup(self.audit_max_entries);

        debug!(
            run_id = %audit.run_id,
            failures = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "resolution run finished"
        );

        RunResult {
            text,
            failures,
            audit,
        }
    }

    /// Handle one popped item: guards first, then the provider call.
    async fn process_item(&self, state: &mut RunState, item: QueueItem, started: Instant) {
        let raw = item.reference.raw().to_string();
        let chain = state.ancestor_chain(item.parent.as_deref());

        // Cycle check runs before the already-resolved skip so a
        // rediscovered ancestor surfaces as a cycle rather than being
        // silently skipped; every chain member is demoted so nothing
        // half-substitutes.
        if self.cycle_detection && chain.iter().any(|ancestor| ancestor == &raw) {
            warn!(reference = %raw, length = chain.len(), "circular reference detected");
            let kind = ErrorKind::CircularReference {
                chain: chain.clone(),
            };
            for member in &chain {
                let provider = state.completed_provider.get(member).cloned();
                state.fail(member, kind.clone(), provider.as_deref());
            }
            state.audit.record(
                &raw,
                item.parent.as_deref(),
                None,
                AuditStatus::Failed,
                None,
                Some(kind.to_string()),
                0,
            );
            return;
        }

        if state.is_resolved(&raw) {
            state.audit.record(
                &raw,
                item.parent.as_deref(),
                None,
                AuditStatus::Skipped,
                None,
                None,
                0,
            );
            return;
        }

        if item.depth > self.max_depth {
            state.fail(&raw, ErrorKind::MaxDepthExceeded, None);
            state.audit.record(
                &raw,
                item.parent.as_deref(),
                None,
                AuditStatus::Failed,
                None,
                Some(ErrorKind::MaxDepthExceeded.to_string()),
                0,
            );
            return;
        }

        // Traditional references are the compile phase's job.
        if !item.reference.is_provider() {
            state.audit.record(
                &raw,
                item.parent.as_deref(),
                None,
                AuditStatus::Skipped,
                None,
                None,
                0,
            );
            return;
        }

        let Some(provider) = self.registry.find_provider(&item.reference) else {
            state.fail(&raw, ErrorKind::NoProviderAvailable, None);
            state.audit.record(
                &raw,
                item.parent.as_deref(),
                None,
                AuditStatus::Failed,
                None,
                Some(ErrorKind::NoProviderAvailable.to_string()),
                0,
            );
            return;
        };
        let provider_name = provider.name().to_string();

        let identifier = item.reference.identifier().unwrap_or_default().to_string();
        let call_start = Instant::now();

        // The provider's own timeout applies inside; the remaining run
        // budget is the backstop.
        let remaining = self.run_timeout.saturating_sub(started.elapsed());
        let result = match tokio::time::timeout(remaining, provider.resolve(&identifier)).await {
            Ok(result) => result,
            Err(_) => Err(crate::error::ProviderError::new(
                ErrorKind::ResolutionTimeout,
                format!("run budget exhausted while resolving '{}'", identifier),
            )),
        };
        let duration_ms = call_start.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                let children = extract_references(value.expose());
                let meta = RedactedMeta::from_value(value.expose());
                let status = if children.is_empty() {
                    AuditStatus::Completed
                } else {
                    AuditStatus::Partial
                };

                state.completed.insert(raw.clone(), value);
                state
                    .completed_provider
                    .insert(raw.clone(), provider_name.clone());
                state.audit.record(
                    &raw,
                    item.parent.as_deref(),
                    Some(&provider_name),
                    status,
                    Some(meta),
                    None,
                    duration_ms,
                );

                // Partial resolution: discovered references go back on the
                // queue one level deeper. This is the only way providers
                // compose.
                for child in children {
                    let child_raw = child.raw().to_string();
                    state
                        .parents
                        .entry(child_raw)
                        .or_insert_with(|| Some(raw.clone()));
                    state.pending.push_back(QueueItem {
                        reference: child,
                        depth: item.depth + 1,
                        parent: Some(raw.clone()),
                    });
                }
            }
            Err(e) => {
                debug!(reference = %raw, provider = %provider_name, error = %e, "provider failed");
                state.fail(&raw, e.kind.clone(), Some(&provider_name));
                state.audit.record(
                    &raw,
                    item.parent.as_deref(),
                    Some(&provider_name),
                    AuditStatus::Failed,
                    None,
                    Some(e.to_string()),
                    duration_ms,
                );
            }
        }
    }

    /// Fail the popped item and everything still pending with
    /// `resolution_timeout`.
    fn fail_remaining(&self, state: &mut RunState, first: QueueItem) {
        warn!(
            run_id = %state.audit.run_id,
            remaining = state.pending.len() + 1,
            "run timeout exceeded"
        );
        let mut items = vec![first];
        items.extend(state.pending.drain(..));

        for item in items {
            let raw = item.reference.raw().to_string();
            if state.is_resolved(&raw) {
                continue;
            }
            state.fail(&raw, ErrorKind::ResolutionTimeout, None);
            state.audit.record(
                &raw,
                item.parent.as_deref(),
                None,
                AuditStatus::Failed,
                None,
                Some(ErrorKind::ResolutionTimeout.to_string()),
                0,
            );
        }
    }

    /// Compile phase: substitute completed values to a fixed point, then
    /// consult traditional sources, leaving anything still unresolved
    /// verbatim.
    fn compile(
        &self,
        state: &mut RunState,
        input: &str,
        traditional_sources: &[HashMap<String, String>],
    ) -> String {
        let mut output = input.to_string();

        // Values introduced by a parent may themselves contain completed
        // placeholders; iterate to a fixed point. The pass count is bounded
        // because substitution with cycle detection is acyclic, and capped
        // by depth as a guard when detection is off.
        for _ in 0..=self.max_depth {
            let mut changed = false;
            for (raw, value) in &state.completed {
                if output.contains(raw.as_str()) {
                    output = output.replace(raw.as_str(), value.expose());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // Traditional lookup for whatever providers left behind, first
        // source wins. A hit clears any recorded failure for the reference.
        for reference in extract_references(&output) {
            let raw = reference.raw().to_string();
            let key = match &reference {
                Reference::Traditional { name, .. } => name.clone(),
                Reference::Provider { .. } => reference.inner().trim().to_string(),
            };
            let hit = traditional_sources
                .iter()
                .find_map(|source| source.get(&key));
            if let Some(value) = hit {
                output = output.replace(&raw, value);
                state.failed.remove(&raw);
            }
        }

        output
    }
}
