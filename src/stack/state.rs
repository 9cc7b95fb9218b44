use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a rebase sandbox.
///
/// Transitions run forward only; the only way back is tearing the sandbox
/// down entirely. `Applied` is terminal and never observable by a later
/// query because apply tears the sandbox down in the same operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StackState {
    /// Sandbox created, rebase not yet attempted
    Created,
    /// Rebase is being attempted
    InProgress,
    /// Rebase stopped on conflicts awaiting resolution
    Conflicted,
    /// Rebase finished cleanly (or all conflicts resolved)
    Resolved,
    /// Validation run passed
    Tested,
    /// Real branch reconciled to the sandbox result
    Applied,
    /// Rebase or validation failed
    Failed,
}

impl StackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackState::Created => "created",
            StackState::InProgress => "in_progress",
            StackState::Conflicted => "conflicted",
            StackState::Resolved => "resolved",
            StackState::Tested => "tested",
            StackState::Applied => "applied",
            StackState::Failed => "failed",
        }
    }

    /// Parse a persisted state string. Unrecognized values fall back to
    /// `Created` so stale metadata from other versions stays readable.
    pub fn parse(s: &str) -> StackState {
        match s {
            "created" => StackState::Created,
            "in_progress" => StackState::InProgress,
            "conflicted" => StackState::Conflicted,
            "resolved" => StackState::Resolved,
            "tested" => StackState::Tested,
            "applied" => StackState::Applied,
            "failed" => StackState::Failed,
            _ => StackState::Created,
        }
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Same-state updates are allowed (a repeated checkpoint is harmless).
    pub fn can_transition_to(&self, next: StackState) -> bool {
        use StackState::*;

        if *self == next {
            return true;
        }

        matches!(
            (*self, next),
            (Created, InProgress)
                | (InProgress, Conflicted)
                | (InProgress, Resolved)
                | (InProgress, Failed)
                | (Conflicted, Resolved)
                | (Conflicted, Failed)
                | (Resolved, Tested)
                | (Resolved, Applied)
                | (Resolved, Failed)
                | (Tested, Applied)
                | (Tested, Failed)
                | (Failed, Tested)
                | (Failed, Applied)
        )
    }

    /// Terminal states cannot be left
    pub fn is_terminal(&self) -> bool {
        matches!(self, StackState::Applied)
    }
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for StackState {
    fn from(s: String) -> Self {
        StackState::parse(&s)
    }
}

impl From<StackState> for String {
    fn from(state: StackState) -> Self {
        state.as_str().to_string()
    }
}
