//! Model backend seam — the opaque "answer oracle" behind every participant.
//!
//! A [`Backend`] is a provider handle (OpenAI-compatible endpoint, Gemini,
//! an in-memory script, ...) that opens [`Conversation`]s for a model id.
//! A conversation owns whatever context the provider needs between turns;
//! the orchestrator never looks inside it.
//!
//! Every failure is a [`BackendError`], classified as transient (retried by
//! the session layer) or fatal (propagated immediately).

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON schema a structured turn asks the backend to conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplySchema {
    /// Short schema name (providers such as OpenAI require one).
    pub name: String,
    /// The JSON schema document.
    pub schema: serde_json::Value,
}

impl ReplySchema {
    /// Build the schema for a reply type from its `JsonSchema` derive.
    pub fn of<T: JsonSchema>() -> Self {
        let root = schemars::schema_for!(T);
        Self {
            name: T::schema_name(),
            schema: serde_json::to_value(root).unwrap_or_default(),
        }
    }
}

/// One outbound turn of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// Prompt text for this turn.
    pub text: String,
    /// Expected reply shape, if the caller wants structured output.
    pub schema: Option<ReplySchema>,
}

impl Turn {
    /// A free-text turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            schema: None,
        }
    }

    /// A turn that demands a reply matching `T`'s schema.
    pub fn structured<T: JsonSchema>(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            schema: Some(ReplySchema::of::<T>()),
        }
    }

    pub fn is_structured(&self) -> bool {
        self.schema.is_some()
    }
}

/// Failure reported by a backend conversation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Provider throttled the request (HTTP 429 or equivalent).
    #[error("rate limited by {backend}: {message}")]
    RateLimited {
        backend: String,
        message: String,
        /// Server hint for when to retry, if one was given.
        retry_after: Option<Duration>,
    },

    /// Provider temporarily unable to serve (5xx, overload, dropped connection).
    #[error("{backend} temporarily unavailable: {message}")]
    Unavailable { backend: String, message: String },

    /// The call did not complete in time.
    #[error("{backend} timed out after {elapsed:?}")]
    Timeout { backend: String, elapsed: Duration },

    /// Anything retrying will not fix: auth, bad request, unknown model.
    #[error("{backend} failed: {message}")]
    Fatal { backend: String, message: String },
}

impl BackendError {
    pub fn rate_limited(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RateLimited {
            backend: backend.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn fatal(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fatal {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Whether the session layer may retry after this error.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Fatal { .. })
    }

    /// Server-provided retry delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Name of the backend that produced the error.
    pub fn backend(&self) -> &str {
        match self {
            Self::RateLimited { backend, .. }
            | Self::Unavailable { backend, .. }
            | Self::Timeout { backend, .. }
            | Self::Fatal { backend, .. } => backend,
        }
    }
}

/// A stateful conversation with one model.
#[async_trait]
pub trait Conversation: Send {
    /// Send one turn and return the raw reply text.
    ///
    /// A failed call must leave the conversation as it was before the call,
    /// so the session layer can retry the same turn.
    async fn send(&mut self, turn: &Turn) -> Result<String, BackendError>;
}

/// A model provider that can open conversations.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Provider name for logs and errors (e.g. `"openai"`).
    fn provider(&self) -> &str;

    /// Open a fresh conversation with `model_id`.
    async fn new_session(&self, model_id: &str) -> Result<Box<dyn Conversation>, BackendError>;
}
