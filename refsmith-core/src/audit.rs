//! Per-run, append-only, redacted audit trail.
//!
//! The trail never stores raw resolved values. Each entry carries only the
//! value length, a flag for "still contains unresolved placeholders", and a
//! redacted preview. It renders per-reference resolution chains
//! (ancestor-first), a human-readable run summary, and aggregate statistics,
//! and trims itself under a retention cap.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::reference::has_references;
use crate::secret::redacted_preview;

/// Outcome marker for one audit step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    /// Resolved to a final value.
    Completed,

    /// Resolved to a value that still embeds placeholders.
    Partial,

    /// Failed with a classified error kind.
    Failed,

    /// Skipped because the reference was already resolved this run.
    Skipped,
}

impl AuditStatus {
    fn marker(self) -> &'static str {
        match self {
            Self::Completed => "ok",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Redacted description of a resolved value.
#[derive(Debug, Clone)]
pub struct RedactedMeta {
    /// Character length of the value.
    pub value_len: usize,

    /// Whether the value still contains `{{...}}` placeholders.
    pub has_unresolved: bool,

    /// Masked preview (short values whole, long ones first 4 chars + mask).
    pub preview: String,
}

impl RedactedMeta {
    /// Build redacted metadata from a raw value without retaining it.
    pub fn from_value(value: &str) -> Self {
        Self {
            value_len: value.chars().count(),
            has_unresolved: has_references(value),
            preview: redacted_preview(value),
        }
    }
}

/// One append-only record of a resolution step.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    /// Monotonic step number within the run.
    pub step: usize,

    /// The raw placeholder text this step concerns.
    pub reference: String,

    /// Parent reference that discovered this one, if any.
    pub parent: Option<String>,

    /// The provider that handled the step, when one was found.
    pub provider: Option<String>,

    /// Outcome marker.
    pub status: AuditStatus,

    /// Redacted value description for successful steps.
    pub meta: Option<RedactedMeta>,

    /// Error rendering for failed steps (kind + message, never values).
    pub error: Option<String>,

    /// Wall-clock duration of the provider call.
    pub duration_ms: u64,
}

/// Aggregate call statistics for one provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
    /// Number of resolution calls routed to the provider.
    pub calls: usize,

    /// Number of those calls that succeeded.
    pub successes: usize,

    /// Total latency across calls, for the mean.
    pub total_ms: u64,
}

impl ProviderStats {
    /// Mean call latency in milliseconds.
    pub fn mean_ms(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.calls as f64
        }
    }

    /// Fraction of calls that succeeded.
    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.successes as f64 / self.calls as f64
        }
    }
}

/// Aggregate statistics over a whole run.
#[derive(Debug, Clone, Default)]
pub struct AuditStats {
    /// Per-provider call statistics.
    pub providers: HashMap<String, ProviderStats>,

    /// Count of failures per error kind wire name.
    pub error_kinds: HashMap<String, usize>,
}

/// Append-only, redacted log of one resolution run.
#[derive(Debug)]
pub struct AuditTrail {
    /// Unique identifier for the run.
    pub run_id: Uuid,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    entries: Vec<AuditEntry>,
    next_step: usize,
}

impl AuditTrail {
    /// Start a fresh trail for one run.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            entries: Vec::new(),
            next_step: 1,
        }
    }

    /// Append an entry, assigning it the next step number.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        reference: &str,
        parent: Option<&str>,
        provider: Option<&str>,
        status: AuditStatus,
        meta: Option<RedactedMeta>,
        error: Option<String>,
        duration_ms: u64,
    ) {
        let entry = AuditEntry {
            step: self.next_step,
            reference: reference.to_string(),
            parent: parent.map(str::to_string),
            provider: provider.map(str::to_string),
            status,
            meta,
            error,
            duration_ms,
        };
        self.next_step += 1;
        self.entries.push(entry);
    }

    /// The recorded entries, oldest first.
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest entry for a reference, if any.
    fn latest_for(&self, reference: &str) -> Option<&AuditEntry> {
        self.entries.iter().rev().find(|e| e.reference == reference)
    }

    /// Render the resolution chain for one reference, ancestor-first.
    ///
    /// Each line shows the step's outcome marker and timing; indentation
    /// follows chain depth.
    pub fn render_chain(&self, reference: &str) -> String {
        let mut chain = Vec::new();
        let mut current = Some(reference.to_string());
        while let Some(raw) = current {
            match self.latest_for(&raw) {
                Some(entry) => {
                    current = entry.parent.clone();
                    chain.push(entry);
                }
                None => break,
            }
        }
        chain.reverse();

        if chain.is_empty() {
            return format!("{}: no resolution recorded", reference);
        }

        let mut out = String::new();
        for (depth, entry) in chain.iter().enumerate() {
            let indent = "  ".repeat(depth);
            let provider = entry.provider.as_deref().unwrap_or("-");
            out.push_str(&format!(
                "{}{} [{}] via {} ({}ms)",
                indent,
                entry.reference,
                entry.status.marker(),
                provider,
                entry.duration_ms
            ));
            if let Some(error) = &entry.error {
                out.push_str(&format!(": {}", error));
            }
            out.push('\n');
        }
        out
    }

    /// Aggregate per-provider statistics and the error-kind histogram.
    pub fn stats(&self) -> AuditStats {
        let mut stats = AuditStats::default();

        for entry in &self.entries {
            if let Some(provider) = &entry.provider {
                let provider_stats = stats.providers.entry(provider.clone()).or_default();
                provider_stats.calls += 1;
                provider_stats.total_ms += entry.duration_ms;
                if matches!(entry.status, AuditStatus::Completed | AuditStatus::Partial) {
                    provider_stats.successes += 1;
                }
            }
            if entry.status == AuditStatus::Failed {
                if let Some(error) = &entry.error {
                    let kind = error
                        .split([':', ' '])
                        .next()
                        .unwrap_or("unknown")
                        .to_string();
                    *stats.error_kinds.entry(kind).or_default() += 1;
                }
            }
        }

        stats
    }

    /// Full human-readable run summary.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "resolution run {} started {}\n",
            self.run_id,
            self.started_at.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        );

        let completed = self
            .entries
            .iter()
            .filter(|e| e.status == AuditStatus::Completed)
            .count();
        let partial = self
            .entries
            .iter()
            .filter(|e| e.status == AuditStatus::Partial)
            .count();
        let failed = self
            .entries
            .iter()
            .filter(|e| e.status == AuditStatus::Failed)
            .count();
        out.push_str(&format!(
            "{} steps: {} completed, {} partial, {} failed\n",
            self.entries.len(),
            completed,
            partial,
            failed
        ));

        for entry in &self.entries {
            let provider = entry.provider.as_deref().unwrap_or("-");
            out.push_str(&format!(
                "  #{} {} [{}] via {} ({}ms)",
                entry.step,
                entry.reference,
                entry.status.marker(),
                provider,
                entry.duration_ms
            ));
            if let Some(meta) = &entry.meta {
                out.push_str(&format!(
                    " value: len={} preview={}{}",
                    meta.value_len,
                    meta.preview,
                    if meta.has_unresolved {
                        " (contains placeholders)"
                    } else {
                        ""
                    }
                ));
            }
            if let Some(error) = &entry.error {
                out.push_str(&format!(" error: {}", error));
            }
            out.push('\n');
        }

        let stats = self.stats();
        if !stats.providers.is_empty() {
            out.push_str("providers:\n");
            let mut names: Vec<_> = stats.providers.keys().collect();
            names.sort();
            for name in names {
                let p = &stats.providers[name];
                out.push_str(&format!(
                    "  {}: {} calls, {:.1}ms mean, {:.0}% success\n",
                    name,
                    p.calls,
                    p.mean_ms(),
                    p.success_rate() * 100.0
                ));
            }
        }
        if !stats.error_kinds.is_empty() {
            out.push_str("errors:\n");
            let mut kinds: Vec<_> = stats.error_kinds.iter().collect();
            kinds.sort();
            for (kind, count) in kinds {
                out.push_str(&format!("  {}: {}\n", kind, count));
            }
        }

        out
    }

    /// Trim oldest entries once the count exceeds the cap, retaining the
    /// most recent ~80% of it.
    pub fn cleanup(&mut self, max_entries: usize) {
        if self.entries.len() <= max_entries {
            return;
        }
        let keep = (max_entries * 4) / 5;
        let drop = self.entries.len() - keep;
        self.entries.drain(..drop);
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}
