//! Per-run accumulation of reconciliation warnings.
//!
//! Every warning is logged as it occurs (missing principals only on first
//! sight) and reported once, aggregated, when the run ends.

use crate::progress::{Operation, ProgressEvent, ProgressSink};
use snapdeploy_store::Endpoint;
use std::collections::BTreeMap;
use tracing::warn;

/// Failed relationship creations of one relationship type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationshipFailures {
    /// Source node or record did not exist.
    pub source_missing: u64,
    /// Target node or record did not exist.
    pub target_missing: u64,
}

impl RelationshipFailures {
    /// Total failures.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.source_missing + self.target_missing
    }
}

/// One aggregated warning as published at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Short title.
    pub title: String,
    /// Details.
    pub message: String,
}

/// Aggregated warnings of one finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarningSummary {
    /// The flushed entries in report order.
    pub entries: Vec<LedgerEntry>,
}

impl WarningSummary {
    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the run had no warnings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if any entry has the given title.
    #[must_use]
    pub fn has(&self, title: &str) -> bool {
        self.entries.iter().any(|e| e.title == title)
    }
}

/// Reconciliation warnings of the running operation.
#[derive(Debug, Clone, Default)]
pub struct WarningLedger {
    missing_principals: BTreeMap<String, u64>,
    ambiguous_principals: BTreeMap<String, u64>,
    missing_files: Vec<String>,
    file_problems: Vec<String>,
    broken_links: Vec<String>,
    relationship_failures: BTreeMap<String, RelationshipFailures>,
    item_failures: BTreeMap<String, u64>,
    unreachable_grants: Vec<String>,
    notices: Vec<String>,
}

impl WarningLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a principal name without match.
    ///
    /// Returns true on the first occurrence of `name` in this run.
    pub fn missing_principal(&mut self, name: &str) -> bool {
        let count = self.missing_principals.entry(name.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            warn!("No principal named '{name}' found, dropping the reference");
            true
        } else {
            false
        }
    }

    /// Counts a principal name with more than one match.
    pub fn ambiguous_principal(&mut self, name: &str, matches: usize) {
        let count = self.ambiguous_principals.entry(name.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            warn!("{matches} principals named '{name}' found, dropping the reference");
        }
    }

    /// Records a side-car or source file that was expected but absent.
    pub fn missing_source_file(&mut self, path: impl Into<String>) {
        let path = path.into();
        warn!("Missing source file: {path}");
        self.missing_files.push(path);
    }

    /// Records a per-file I/O or content problem.
    pub fn file_problem(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.file_problems.push(message);
    }

    /// Records a deferred link whose target was never found.
    pub fn broken_link(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.broken_links.push(message);
    }

    /// Counts a relationship that could not be created.
    pub fn relationship_failure(&mut self, rel_type: &str, endpoint: Endpoint) {
        let failures = self
            .relationship_failures
            .entry(rel_type.to_string())
            .or_default();
        match endpoint {
            Endpoint::Source => failures.source_missing += 1,
            Endpoint::Target => failures.target_missing += 1,
        }
    }

    /// Counts an item of a type that could not be transferred.
    pub fn item_failure(&mut self, type_name: &str, reason: &str) {
        warn!("Skipping {type_name} item: {reason}");
        *self.item_failures.entry(type_name.to_string()).or_insert(0) += 1;
    }

    /// Records a permission grant whose principal cannot be reached.
    pub fn unreachable_grant(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.unreachable_grants.push(message);
    }

    /// Records a free-text notice.
    pub fn notice(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.notices.push(message);
    }

    /// How often `name` could not be resolved.
    #[must_use]
    pub fn missing_principal_count(&self, name: &str) -> u64 {
        self.missing_principals.get(name).copied().unwrap_or(0)
    }

    /// How often `name` resolved to several principals.
    #[must_use]
    pub fn ambiguous_principal_count(&self, name: &str) -> u64 {
        self.ambiguous_principals.get(name).copied().unwrap_or(0)
    }

    /// Relationship failures of one type.
    #[must_use]
    pub fn relationship_failures(&self, rel_type: &str) -> RelationshipFailures {
        self.relationship_failures
            .get(rel_type)
            .copied()
            .unwrap_or_default()
    }

    /// Item failures of one type.
    #[must_use]
    pub fn item_failures(&self, type_name: &str) -> u64 {
        self.item_failures.get(type_name).copied().unwrap_or(0)
    }

    /// Missing source files recorded so far.
    #[must_use]
    pub fn missing_files(&self) -> &[String] {
        &self.missing_files
    }

    /// Per-file problems recorded so far.
    #[must_use]
    pub fn file_problems(&self) -> &[String] {
        &self.file_problems
    }

    /// Broken links recorded so far.
    #[must_use]
    pub fn broken_links(&self) -> &[String] {
        &self.broken_links
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.summarize().is_empty()
    }

    /// Drops everything recorded so far.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Builds the aggregated report without clearing.
    #[must_use]
    pub fn summarize(&self) -> WarningSummary {
        let mut entries = Vec::new();
        let mut push = |title: &str, message: String| {
            entries.push(LedgerEntry {
                title: title.to_string(),
                message,
            });
        };

        if !self.missing_principals.is_empty() {
            push(
                "Missing principals",
                format_counts(&self.missing_principals, "reference(s) dropped"),
            );
        }
        if !self.ambiguous_principals.is_empty() {
            push(
                "Ambiguous principals",
                format_counts(&self.ambiguous_principals, "reference(s) dropped"),
            );
        }
        if !self.missing_files.is_empty() {
            push("Missing source files", self.missing_files.join("\n"));
        }
        if !self.file_problems.is_empty() {
            push("File import problems", self.file_problems.join("\n"));
        }
        if !self.broken_links.is_empty() {
            push("Broken links", self.broken_links.join("\n"));
        }
        for (rel_type, failures) in &self.relationship_failures {
            push(
                "Relationship import problems",
                format!(
                    "{rel_type}: {} with missing source, {} with missing target",
                    failures.source_missing, failures.target_missing
                ),
            );
        }
        if !self.item_failures.is_empty() {
            push(
                "Skipped items",
                format_counts(&self.item_failures, "item(s) skipped"),
            );
        }
        if !self.unreachable_grants.is_empty() {
            push("Unreachable grants", self.unreachable_grants.join("\n"));
        }
        for notice in &self.notices {
            push("Notice", notice.clone());
        }

        WarningSummary { entries }
    }

    /// Publishes the aggregated report once and clears the ledger.
    pub fn flush(&mut self, operation: Operation, sink: &dyn ProgressSink) -> WarningSummary {
        let summary = self.summarize();
        for entry in &summary.entries {
            sink.publish(&ProgressEvent::Warning {
                operation,
                title: entry.title.clone(),
                message: entry.message.clone(),
            });
        }
        self.clear();
        summary
    }
}

fn format_counts(counts: &BTreeMap<String, u64>, what: &str) -> String {
    counts
        .iter()
        .map(|(name, count)| format!("{name}: {count} {what}"))
        .collect::<Vec<_>>()
        .join("\n")
}
