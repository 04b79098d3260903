//! Debate phase tracker — strictly forward phases with a transition log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Debate created, nothing run yet.
    Idle,
    /// Every participant reports role confidence.
    RoleSelection,
    /// Solvers answer independently.
    InitialSolve,
    /// Solvers critique each other's answers.
    PeerReview,
    /// Solvers revise using feedback aimed at them.
    Refinement,
    /// The judge picks a winner.
    Judgment,
    /// Debate finished (with or without a verdict).
    Complete,
    /// A phase failed terminally.
    Failed,
}

impl DebatePhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Idle => &[Self::RoleSelection, Self::Failed],
            Self::RoleSelection => &[Self::InitialSolve, Self::Failed],
            Self::InitialSolve => &[Self::PeerReview, Self::Failed],
            Self::PeerReview => &[Self::Refinement, Self::Failed],
            Self::Refinement => &[Self::Judgment, Self::Failed],
            Self::Judgment => &[Self::Complete, Self::Failed],
            Self::Complete | Self::Failed => &[],
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::RoleSelection => write!(f, "role_selection"),
            Self::InitialSolve => write!(f, "initial_solve"),
            Self::PeerReview => write!(f, "peer_review"),
            Self::Refinement => write!(f, "refinement"),
            Self::Judgment => write!(f, "judgment"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid phase transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: DebatePhase,
    pub to: DebatePhase,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} → {} (allowed: {:?})",
            self.from,
            self.to,
            self.from.valid_transitions()
        )
    }
}

impl std::error::Error for TransitionError {}

/// Tracks the current phase of one debate and its history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTracker {
    pub debate_id: String,
    pub phase: DebatePhase,
    pub transitions: Vec<PhaseTransition>,
    pub created_at: DateTime<Utc>,
}

impl PhaseTracker {
    pub fn new(debate_id: impl Into<String>) -> Self {
        Self {
            debate_id: debate_id.into(),
            phase: DebatePhase::Idle,
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Move to `to`, rejecting anything but the next phase or `Failed`.
    pub fn advance(&mut self, to: DebatePhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
            });
        }
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Mark the debate failed. No-op if already terminal.
    pub fn fail(&mut self, reason: &str) {
        if !self.phase.is_terminal() {
            // Failed is reachable from every non-terminal phase.
            let _ = self.advance(DebatePhase::Failed, reason);
        }
    }

    /// The phase that was running when the debate failed.
    pub fn failed_in(&self) -> Option<DebatePhase> {
        match self.transitions.last() {
            Some(t) if t.to == DebatePhase::Failed => Some(t.from),
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Phases visited, in order, starting from `Idle`.
    pub fn history(&self) -> Vec<DebatePhase> {
        std::iter::once(DebatePhase::Idle)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }
}
