//! Result aggregation. Every action attempt and every finished company is
//! recorded here; nothing is dropped from the tally.

use crate::action::ActionKind;
use crate::outcome::{ExecutionResult, ItemPhase};
use serde::Serialize;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// KindTally
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct KindTally {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub would_succeed: usize,
}

impl KindTally {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.skipped + self.failed + self.would_succeed
    }
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub companies_processed: usize,
    pub companies_succeeded: usize,
    pub companies_failed: usize,
    pub companies_unprocessable: usize,
    pub per_kind: BTreeMap<ActionKind, KindTally>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn actions_attempted(&self) -> usize {
        self.per_kind.values().map(KindTally::attempted).sum()
    }

    /// `configured + skipped + failed (+ previewed) == actions attempted`,
    /// and the company buckets cover every processed company.
    pub fn is_balanced(&self) -> bool {
        let companies = self.companies_succeeded + self.companies_failed + self.companies_unprocessable;
        companies == self.companies_processed
    }

    /// Rendered summary block, shared by every subcommand.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.interrupted {
            lines.push("run interrupted: partial tally".to_string());
        }
        lines.push(format!("companies processed: {}", self.companies_processed));
        lines.push(format!("companies succeeded: {}", self.companies_succeeded));
        lines.push(format!("companies failed:    {}", self.companies_failed));
        if self.companies_unprocessable > 0 {
            lines.push(format!(
                "companies unprocessable: {}",
                self.companies_unprocessable
            ));
        }
        for (kind, tally) in &self.per_kind {
            let mut parts = Vec::new();
            if tally.would_succeed > 0 {
                parts.push(format!("{} previewed", tally.would_succeed));
            }
            if tally.succeeded > 0 {
                parts.push(format!("{} configured", tally.succeeded));
            }
            if tally.skipped > 0 {
                parts.push(format!("{} skipped", tally.skipped));
            }
            if tally.failed > 0 {
                parts.push(format!("{} failed", tally.failed));
            }
            lines.push(format!("  {kind}: {}", parts.join(", ")));
        }
        lines
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Reporter {
    summary: RunSummary,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_action(&mut self, kind: ActionKind, result: &ExecutionResult) {
        let tally = self.summary.per_kind.entry(kind).or_default();
        match result {
            ExecutionResult::Succeeded => tally.succeeded += 1,
            ExecutionResult::Skipped => tally.skipped += 1,
            ExecutionResult::WouldSucceed => tally.would_succeed += 1,
            ExecutionResult::Failed(_) => tally.failed += 1,
        }
    }

    /// Record a company reaching a terminal phase.
    pub fn record_company(&mut self, phase: ItemPhase) {
        debug_assert!(phase.is_terminal());
        self.summary.companies_processed += 1;
        match phase {
            ItemPhase::Completed | ItemPhase::SkipAll => self.summary.companies_succeeded += 1,
            ItemPhase::GenerationFailed => self.summary.companies_unprocessable += 1,
            _ => self.summary.companies_failed += 1,
        }
    }

    pub fn mark_interrupted(&mut self) {
        self.summary.interrupted = true;
    }

    pub fn finish(self) -> RunSummary {
        self.summary
    }
}
