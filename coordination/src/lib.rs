//! Multi-model debate coordination.
//!
//! This library provides:
//! - A backend seam for independently hosted language models ([`backend`])
//! - Resilient per-participant sessions with retry, backoff and typed replies ([`session`])
//! - The debate orchestrator: role allocation, phased fan-out, feedback routing
//!   and judgment ([`debate`])
//! - A scripted in-memory backend for dry runs and tests ([`scripted`])
//!
//! # Usage
//!
//! ```ignore
//! let participants = vec![
//!     Participant::connect("gpt-4o", &openai, "gpt-4o", SessionConfig::default()).await?,
//!     Participant::connect("gemini", &gemini, "gemini-2.0-flash", SessionConfig::default()).await?,
//! ];
//! let outcome = DebateOrchestrator::default().run(question, &participants).await?;
//! println!("{}", outcome.summary_line());
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod backend;
pub mod debate;
pub mod retry;
pub mod scripted;
pub mod session;

// Re-export key backend types
pub use backend::{Backend, BackendError, Conversation, ReplySchema, Turn};

// Re-export session types
pub use retry::RetryPolicy;
pub use session::{BackendSession, SessionConfig, SessionError, SharedSession, StructuredReply};

// Re-export key debate types
pub use debate::{
    DebateConfig, DebateError, DebateOrchestrator, DebateOutcome, DebatePhase, DebateRecord,
    Judgment, Participant, Role, RoleAllocator, RoleAssignment, Verdict,
};
