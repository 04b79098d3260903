//! Backend session — one participant's resilient conversational handle.
//!
//! Wraps a [`Conversation`] with:
//! - retry on transient failures (exponential backoff + jitter, bounded)
//! - an optional per-call timeout, counted as a transient failure
//! - typed structured replies: the reply schema is sent with the turn and the
//!   raw text is parsed and validated into the caller's type
//!
//! A schema violation is never retried. Re-asking the same turn would not fix
//! a malformed reply without re-prompting, which this layer does not do.

use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::{BackendError, Conversation, Turn};
use crate::retry::RetryPolicy;

/// A reply type the backend must produce as JSON.
pub trait StructuredReply: DeserializeOwned + JsonSchema + Send {
    /// Check and coerce a freshly parsed reply.
    ///
    /// Returns a description of the problem when the reply parses but does
    /// not honour the contract (e.g. an empty answer).
    fn validate(self) -> Result<Self, String> {
        Ok(self)
    }
}

/// Session-level retry and timeout settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Backoff policy for transient failures.
    pub retry: RetryPolicy,
    /// Per-call timeout in seconds (`None` waits indefinitely).
    pub call_timeout_secs: Option<u64>,
}

impl SessionConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }
}

/// Terminal failure of a session call.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Transient failures outlasted the retry budget.
    #[error("{provider}/{model} still failing after {attempts} attempts: {last}")]
    RetriesExhausted {
        provider: String,
        model: String,
        attempts: u32,
        #[source]
        last: BackendError,
    },

    /// Structured reply did not parse or validate.
    #[error("{provider}/{model} reply does not match {expected}: {detail}")]
    SchemaViolation {
        provider: String,
        model: String,
        expected: &'static str,
        detail: String,
    },

    /// Non-transient backend failure, not retried.
    #[error("{provider}/{model} call failed: {source}")]
    Upstream {
        provider: String,
        model: String,
        source: BackendError,
    },
}

impl SessionError {
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, Self::SchemaViolation { .. })
    }

    /// Number of backend calls made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::RetriesExhausted { attempts, .. } => *attempts,
            _ => 1,
        }
    }
}

/// A session that one participant owns exclusively across phases.
pub type SharedSession = Arc<Mutex<BackendSession>>;

/// Resilient handle to one model conversation.
pub struct BackendSession {
    provider: String,
    model: String,
    conversation: Box<dyn Conversation>,
    config: SessionConfig,
    turns: u32,
}

impl BackendSession {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        conversation: Box<dyn Conversation>,
        config: SessionConfig,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            conversation,
            config,
            turns: 0,
        }
    }

    /// Wrap into the shared handle used by phase tasks.
    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Successful turns so far.
    pub fn turns(&self) -> u32 {
        self.turns
    }

    /// Send a free-text turn and return the raw reply.
    pub async fn send_text(&mut self, text: &str) -> Result<String, SessionError> {
        self.send(&Turn::text(text)).await
    }

    /// Send a turn demanding a `T`-shaped reply, and parse it.
    pub async fn send_structured<T: StructuredReply>(
        &mut self,
        text: &str,
    ) -> Result<T, SessionError> {
        let raw = self.send(&Turn::structured::<T>(text)).await?;
        parse_reply::<T>(&raw).map_err(|detail| SessionError::SchemaViolation {
            provider: self.provider.clone(),
            model: self.model.clone(),
            expected: short_type_name::<T>(),
            detail,
        })
    }

    /// Send a turn, retrying transient failures per the retry policy.
    pub async fn send(&mut self, turn: &Turn) -> Result<String, SessionError> {
        let policy = self.config.retry.clone();
        let timeout = self.config.call_timeout();
        let mut retries: u32 = 0;

        loop {
            let attempt = retries + 1;
            let result = match timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, self.conversation.send(turn)).await {
                        Ok(result) => result,
                        Err(_) => Err(BackendError::Timeout {
                            backend: self.provider.clone(),
                            elapsed: limit,
                        }),
                    }
                }
                None => self.conversation.send(turn).await,
            };

            match result {
                Ok(raw) => {
                    self.turns += 1;
                    debug!(
                        provider = %self.provider,
                        model = %self.model,
                        attempt,
                        bytes = raw.len(),
                        "backend reply received"
                    );
                    return Ok(raw);
                }
                Err(err) if err.is_transient() && policy.should_retry(retries) => {
                    retries += 1;
                    let delay = policy.delay(retries, err.retry_after(), &mut rand::thread_rng());
                    warn!(
                        provider = %self.provider,
                        model = %self.model,
                        attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient backend failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    return Err(SessionError::RetriesExhausted {
                        provider: self.provider.clone(),
                        model: self.model.clone(),
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    return Err(SessionError::Upstream {
                        provider: self.provider.clone(),
                        model: self.model.clone(),
                        source: err,
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for BackendSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSession")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("turns", &self.turns)
            .finish_non_exhaustive()
    }
}

/// Parse and validate a structured reply from raw backend text.
///
/// Tolerates markdown code fences and prose around a single JSON object.
pub fn parse_reply<T: StructuredReply>(raw: &str) -> Result<T, String> {
    let json = extract_json_object(raw);
    let parsed: T = serde_json::from_str(json).map_err(|e| format!("{e} (raw: {raw})"))?;
    parsed.validate()
}

fn extract_json_object(raw: &str) -> &str {
    let stripped = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match (stripped.find('{'), stripped.rfind('}')) {
        (Some(start), Some(end)) if start < end => &stripped[start..=end],
        _ => stripped,
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ScriptedConversation, ScriptedReply};

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Answer {
        answer: String,
    }

    impl StructuredReply for Answer {
        fn validate(self) -> Result<Self, String> {
            if self.answer.trim().is_empty() {
                return Err("empty answer".to_string());
            }
            Ok(self)
        }
    }

    fn session(replies: Vec<ScriptedReply>, max_retries: u32) -> BackendSession {
        let config = SessionConfig {
            retry: RetryPolicy {
                max_retries,
                base_delay_ms: 100,
                ..RetryPolicy::default()
            },
            call_timeout_secs: None,
        };
        BackendSession::new(
            "scripted",
            "test-model",
            Box::new(ScriptedConversation::new("scripted", replies)),
            config,
        )
    }

    fn rate_limited() -> ScriptedReply {
        ScriptedReply::Fail(BackendError::rate_limited("scripted", "429"))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_fewer_than_max_transient_failures() {
        let max = 3;
        let mut replies: Vec<_> = (0..max - 1).map(|_| rate_limited()).collect();
        replies.push(ScriptedReply::text("attempt-3"));
        let mut s = session(replies, max);

        let reply = s.send_text("hi").await.unwrap();
        assert_eq!(reply, "attempt-3");
        assert_eq!(s.turns(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_last_permitted_attempt() {
        let max = 3;
        let mut replies: Vec<_> = (0..max).map(|_| rate_limited()).collect();
        replies.push(ScriptedReply::text("attempt-4"));
        let mut s = session(replies, max);

        assert_eq!(s.send_text("hi").await.unwrap(), "attempt-4");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_plus_one_transient_failures() {
        let max = 3;
        let mut replies: Vec<_> = (0..=max).map(|_| rate_limited()).collect();
        replies.push(ScriptedReply::text("never reached"));
        let mut s = session(replies, max);

        let err = s.send_text("hi").await.unwrap_err();
        match &err {
            SessionError::RetriesExhausted {
                provider, attempts, ..
            } => {
                assert_eq!(provider, "scripted");
                assert_eq!(*attempts, max + 1);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert!(err.to_string().contains("4 attempts"));
        assert_eq!(s.turns(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_is_not_retried() {
        let replies = vec![
            ScriptedReply::Fail(BackendError::fatal("scripted", "401")),
            ScriptedReply::text("unused"),
        ];
        let mut s = session(replies, 5);
        let err = s.send_text("hi").await.unwrap_err();
        assert!(matches!(err, SessionError::Upstream { .. }));
        assert_eq!(err.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn schema_violation_is_not_retried() {
        let replies = vec![
            ScriptedReply::text("not json at all"),
            ScriptedReply::text(r#"{"answer": "4"}"#),
        ];
        let mut s = session(replies, 5);
        let err = s.send_structured::<Answer>("2+2?").await.unwrap_err();
        assert!(err.is_schema_violation());
        match err {
            SessionError::SchemaViolation { expected, .. } => assert_eq!(expected, "Answer"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn validation_failure_is_schema_violation() {
        let mut s = session(vec![ScriptedReply::text(r#"{"answer": "  "}"#)], 2);
        let err = s.send_structured::<Answer>("2+2?").await.unwrap_err();
        assert!(err.to_string().contains("empty answer"));
    }

    #[tokio::test(start_paused = true)]
    async fn call_timeout_counts_as_transient() {
        let replies = vec![
            ScriptedReply::delayed(Duration::from_secs(60), r#"{"answer": "late"}"#),
            ScriptedReply::text(r#"{"answer": "4"}"#),
        ];
        let mut s = session(replies, 1);
        s.config.call_timeout_secs = Some(5);
        let reply = s.send_structured::<Answer>("2+2?").await.unwrap();
        assert_eq!(reply.answer, "4");
    }

    #[tokio::test]
    async fn structured_turn_sends_schema() {
        let conversation = ScriptedConversation::new(
            "scripted",
            vec![ScriptedReply::text("```json\n{\"answer\": \"4\"}\n```")],
        );
        let log = conversation.turn_log();
        let mut s = BackendSession::new(
            "scripted",
            "m",
            Box::new(conversation),
            SessionConfig::default(),
        );
        let reply = s.send_structured::<Answer>("2+2?").await.unwrap();
        assert_eq!(reply.answer, "4");

        let turns = log.lock().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "2+2?");
        assert_eq!(turns[0].schema.as_ref().unwrap().name, "Answer");
    }

    #[test]
    fn extract_json_object_handles_prose() {
        assert_eq!(
            extract_json_object("Sure! {\"a\": 1} hope that helps"),
            "{\"a\": 1}"
        );
        assert_eq!(extract_json_object("no braces"), "no braces");
    }
}
