//! Per-record outcomes for best-effort sweeps.
//!
//! Reconciliation and import apply many independent corrections in one
//! pass. A failing record is logged and skipped, so a single boolean result
//! would hide partial success; each action instead carries a tagged outcome
//! and the pass returns the aggregated report.

use serde::Serialize;

/// What happened to one group/user/record correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ApplyOutcome {
    /// The correction was applied.
    Applied,
    /// The record was already in the desired state.
    SkippedAlreadyExists,
    /// The underlying command failed; the sweep continued without it.
    Failed(String),
}

/// One action attempted during a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    /// The group, user or record acted on.
    pub subject: String,
    /// Human-readable description of the attempted change.
    pub action: String,
    pub outcome: ApplyOutcome,
}

/// Aggregated outcomes of one reconciliation or import pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub actions: Vec<ActionRecord>,
}

impl Report {
    pub fn record(&mut self, subject: impl Into<String>, action: impl Into<String>, outcome: ApplyOutcome) {
        self.actions.push(ActionRecord {
            subject: subject.into(),
            action: action.into(),
            outcome,
        });
    }

    pub fn extend(&mut self, other: Report) {
        self.actions.extend(other.actions);
    }

    /// Number of corrections actually applied.
    pub fn applied_count(&self) -> usize {
        self.actions.iter().filter(|a| a.outcome == ApplyOutcome::Applied).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.outcome == ApplyOutcome::SkippedAlreadyExists)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a.outcome, ApplyOutcome::Failed(_)))
            .count()
    }

    /// True when nothing had to change and nothing failed.
    pub fn is_converged(&self) -> bool {
        self.applied_count() == 0 && self.failed_count() == 0
    }

    /// Print the report to stdout.
    pub fn print(&self, title: &str) {
        println!("=== {} ===\n", title);

        for action in &self.actions {
            let (icon, status) = match &action.outcome {
                ApplyOutcome::Applied => ("+", "APPLIED".to_string()),
                ApplyOutcome::SkippedAlreadyExists => ("=", "EXISTS".to_string()),
                ApplyOutcome::Failed(reason) => ("!", format!("FAILED: {}", reason)),
            };
            println!("  {} {} {} [{}]", icon, action.subject, action.action, status);
        }

        println!();
        println!(
            "Summary: {} applied, {} already in place, {} failed",
            self.applied_count(),
            self.skipped_count(),
            self.failed_count()
        );
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("report serialization cannot fail")
    }
}
