//! Debate orchestration — role selection, solving, peer review, refinement
//! and judgment among several model backends.
//!
//! # Debate Flow
//!
//! ```text
//! Idle → RoleSelection → InitialSolve → PeerReview → Refinement → Judgment → Complete
//!   │          │               │             │            │            │
//!   └──────────┴───────────────┴─────────────┴────────────┴────────────┴──▶ Failed
//! ```
//!
//! - [`roles`]: exactly one Judge (highest judge confidence), everyone else Solver
//! - [`phase`]: bounded concurrent fan-out with results kept in submission order
//! - [`router`]: each solver only sees feedback that targets it
//! - [`orchestrator`]: sequences the phases and threads outputs forward

pub mod error;
pub mod orchestrator;
pub mod phase;
pub mod prompts;
pub mod roles;
pub mod router;
pub mod state;
pub mod types;

pub use error::DebateError;
pub use orchestrator::{DebateConfig, DebateOrchestrator, DebateOutcome, Participant};
pub use phase::{PhaseResult, PhaseRunner, PhaseTask};
pub use prompts::{PromptBuilder, TriviaPrompts};
pub use roles::{RoleAllocator, RoleAssignment, RoleEntry};
pub use router::route;
pub use state::{DebatePhase, PhaseTracker, PhaseTransition, TransitionError};
pub use types::{
    ChangeResponse, DebateRecord, Evaluation, FeedbackBundle, FeedbackItem, FeedbackList,
    Judgment, RefinedSolution, Refinement, ReviewError, Role, RoleConfidence,
    RolePreferenceReply, RoleScore, RoutedFeedback, Solution, SolverAnswer, Verdict,
};
