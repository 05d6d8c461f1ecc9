use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Outcome of attempting one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum ExecutionResult {
    /// The mutating call was issued and accepted.
    Succeeded,
    /// The desired state already held; no mutating call was issued.
    Skipped,
    /// Dry-run: the action was previewed, not issued.
    WouldSucceed,
    Failed(String),
}

impl ExecutionResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionResult::Failed(_))
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionResult::Succeeded => f.write_str("ok"),
            ExecutionResult::Skipped => f.write_str("skipped"),
            ExecutionResult::WouldSucceed => f.write_str("would succeed"),
            ExecutionResult::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// CheckState
// ---------------------------------------------------------------------------

/// Tri-state answer from the idempotency probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    Absent,
    PresentMatching,
    PresentConflicting,
}

// ---------------------------------------------------------------------------
// ItemPhase
// ---------------------------------------------------------------------------

/// Per-company lifecycle within one run. Terminal phases admit no further
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemPhase {
    Pending,
    Generating,
    Generated,
    GenerationFailed,
    Checking,
    SkipAll,
    Executing,
    Completed,
    PartiallyFailed,
    Failed,
}

impl ItemPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemPhase::Pending => "pending",
            ItemPhase::Generating => "generating",
            ItemPhase::Generated => "generated",
            ItemPhase::GenerationFailed => "generation-failed",
            ItemPhase::Checking => "checking",
            ItemPhase::SkipAll => "skip-all",
            ItemPhase::Executing => "executing",
            ItemPhase::Completed => "completed",
            ItemPhase::PartiallyFailed => "partially-failed",
            ItemPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemPhase::Completed
                | ItemPhase::PartiallyFailed
                | ItemPhase::Failed
                | ItemPhase::GenerationFailed
                | ItemPhase::SkipAll
        )
    }

    /// Enforce legal transitions; anything else is a programming error
    /// surfaced as `InvalidTransition`.
    pub fn advance(self, next: ItemPhase) -> Result<ItemPhase> {
        let ok = matches!(
            (self, next),
            (ItemPhase::Pending, ItemPhase::Generating)
                | (ItemPhase::Generating, ItemPhase::Generated)
                | (ItemPhase::Generating, ItemPhase::GenerationFailed)
                | (ItemPhase::Generated, ItemPhase::Checking)
                | (ItemPhase::Checking, ItemPhase::SkipAll)
                | (ItemPhase::Checking, ItemPhase::Executing)
                | (ItemPhase::Executing, ItemPhase::Completed)
                | (ItemPhase::Executing, ItemPhase::PartiallyFailed)
                | (ItemPhase::Executing, ItemPhase::Failed)
        );
        if ok {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for ItemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let phase = ItemPhase::Pending
            .advance(ItemPhase::Generating)
            .and_then(|p| p.advance(ItemPhase::Generated))
            .and_then(|p| p.advance(ItemPhase::Checking))
            .and_then(|p| p.advance(ItemPhase::Executing))
            .and_then(|p| p.advance(ItemPhase::Completed))
            .unwrap();
        assert!(phase.is_terminal());
    }

    #[test]
    fn generation_failure_is_terminal() {
        let phase = ItemPhase::Generating
            .advance(ItemPhase::GenerationFailed)
            .unwrap();
        assert!(phase.is_terminal());
        assert!(phase.advance(ItemPhase::Checking).is_err());
    }

    #[test]
    fn cannot_skip_generation() {
        assert!(ItemPhase::Pending.advance(ItemPhase::Executing).is_err());
    }

    #[test]
    fn terminal_phases_reject_everything() {
        for terminal in [
            ItemPhase::Completed,
            ItemPhase::PartiallyFailed,
            ItemPhase::Failed,
            ItemPhase::GenerationFailed,
            ItemPhase::SkipAll,
        ] {
            assert!(terminal.advance(ItemPhase::Pending).is_err());
            assert!(terminal.advance(ItemPhase::Executing).is_err());
        }
    }

    #[test]
    fn result_display() {
        assert_eq!(ExecutionResult::Skipped.to_string(), "skipped");
        assert_eq!(
            ExecutionResult::Failed("boom".into()).to_string(),
            "failed: boom"
        );
    }
}
