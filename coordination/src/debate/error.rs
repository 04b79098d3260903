//! Debate error taxonomy.
//!
//! | Variant                | Class        | Effect                              |
//! |------------------------|--------------|-------------------------------------|
//! | `NoParticipants`       | Fatal-Setup  | aborts before any phase runs        |
//! | `DuplicateParticipant` | Fatal-Setup  | aborts before any phase runs        |
//! | `PhaseFailed`          | Fatal-Phase  | aborts the debate for this question |
//! | `TaskPanicked`         | Fatal-Phase  | aborts the debate for this question |
//! | `Transition`           | internal bug | aborts the debate for this question |
//!
//! A missing judge is not an error; see [`super::types::Judgment::NoJudge`].

use thiserror::Error;

use super::state::{DebatePhase, TransitionError};
use crate::session::SessionError;

#[derive(Debug, Clone, Error)]
pub enum DebateError {
    /// Role allocation needs at least one participant.
    #[error("cannot assign roles: no participants")]
    NoParticipants,

    /// Two participants share a name, so results could not be told apart.
    #[error("duplicate participant name: {0}")]
    DuplicateParticipant(String),

    /// A participant's task failed terminally; the whole phase fails with it.
    #[error("{phase} failed for {participant}: {source}")]
    PhaseFailed {
        phase: DebatePhase,
        participant: String,
        source: SessionError,
    },

    /// A phase task panicked or was cancelled by the runtime.
    #[error("{phase} task for {participant} did not complete: {detail}")]
    TaskPanicked {
        phase: DebatePhase,
        participant: String,
        detail: String,
    },

    /// The phase tracker refused a transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl DebateError {
    /// Phase the error belongs to, if it happened inside one.
    pub fn phase(&self) -> Option<DebatePhase> {
        match self {
            Self::PhaseFailed { phase, .. } | Self::TaskPanicked { phase, .. } => Some(*phase),
            Self::NoParticipants | Self::DuplicateParticipant(_) | Self::Transition(_) => None,
        }
    }

    /// Whether the failure happened before any phase ran.
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Self::NoParticipants | Self::DuplicateParticipant(_))
    }

    /// The session error behind a phase failure, if any.
    pub fn session_error(&self) -> Option<&SessionError> {
        match self {
            Self::PhaseFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
