//! In-memory scripted backend.
//!
//! Replays a fixed queue of replies per model, optionally after a delay.
//! Used by dry runs and by tests to simulate flaky or slow providers and
//! out-of-order completion without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{Backend, BackendError, Conversation, Turn};

/// One scripted response.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Reply with this text after the given delay.
    Text { body: String, delay: Duration },
    /// Fail the call.
    Fail(BackendError),
}

impl ScriptedReply {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text {
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(delay: Duration, body: impl Into<String>) -> Self {
        Self::Text {
            body: body.into(),
            delay,
        }
    }

    /// Serialize `value` as the reply body.
    pub fn json<T: serde::Serialize>(value: &T) -> Self {
        Self::text(serde_json::to_string(value).unwrap_or_default())
    }
}

/// Log of every turn a scripted conversation received.
pub type TurnLog = Arc<Mutex<Vec<Turn>>>;

/// A conversation that pops replies from a queue.
pub struct ScriptedConversation {
    backend: String,
    replies: VecDeque<ScriptedReply>,
    log: TurnLog,
}

impl ScriptedConversation {
    pub fn new(backend: impl Into<String>, replies: Vec<ScriptedReply>) -> Self {
        Self {
            backend: backend.into(),
            replies: replies.into(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_log(mut self, log: TurnLog) -> Self {
        self.log = log;
        self
    }

    /// Handle on the received-turn log.
    pub fn turn_log(&self) -> TurnLog {
        self.log.clone()
    }
}

#[async_trait]
impl Conversation for ScriptedConversation {
    async fn send(&mut self, turn: &Turn) -> Result<String, BackendError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(turn.clone());
        }
        let next = self.replies.pop_front().ok_or_else(|| {
            BackendError::fatal(self.backend.clone(), "script exhausted: no reply queued")
        })?;
        match next {
            ScriptedReply::Text { body, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(body)
            }
            ScriptedReply::Fail(err) => Err(err),
        }
    }
}

/// Backend serving pre-registered scripts keyed by model id.
///
/// Each `new_session` call for a model takes that model's next script, so a
/// driver opening fresh sessions per question consumes one script each time.
#[derive(Default)]
pub struct ScriptedBackend {
    name: String,
    scripts: Mutex<HashMap<String, VecDeque<Vec<ScriptedReply>>>>,
    logs: Mutex<HashMap<String, TurnLog>>,
}

impl ScriptedBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Queue a script for the next session opened on `model_id`.
    pub fn script(self, model_id: &str, replies: Vec<ScriptedReply>) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts
                .entry(model_id.to_string())
                .or_default()
                .push_back(replies);
        }
        self
    }

    /// Turns received by all sessions of `model_id` so far.
    pub fn turns(&self, model_id: &str) -> Vec<Turn> {
        let logs = match self.logs.lock() {
            Ok(logs) => logs,
            Err(_) => return Vec::new(),
        };
        let turns = logs
            .get(model_id)
            .and_then(|log| log.lock().ok().map(|turns| turns.to_vec()))
            .unwrap_or_default();
        turns
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn provider(&self) -> &str {
        &self.name
    }

    async fn new_session(&self, model_id: &str) -> Result<Box<dyn Conversation>, BackendError> {
        let replies = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.get_mut(model_id).and_then(VecDeque::pop_front))
            .ok_or_else(|| {
                BackendError::fatal(self.name.clone(), format!("no script for model {model_id}"))
            })?;

        let log = match self.logs.lock() {
            Ok(mut logs) => logs.entry(model_id.to_string()).or_default().clone(),
            Err(_) => TurnLog::default(),
        };
        Ok(Box::new(
            ScriptedConversation::new(self.name.clone(), replies).with_log(log),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_exhausts() {
        let mut conv = ScriptedConversation::new(
            "s",
            vec![
                ScriptedReply::text("one"),
                ScriptedReply::Fail(BackendError::unavailable("s", "503")),
            ],
        );
        assert_eq!(conv.send(&Turn::text("a")).await.unwrap(), "one");
        assert!(conv.send(&Turn::text("b")).await.unwrap_err().is_transient());
        let err = conv.send(&Turn::text("c")).await.unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(conv.turn_log().lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn backend_hands_out_one_script_per_session() {
        let backend = ScriptedBackend::new("scripted")
            .script("m", vec![ScriptedReply::text("first")])
            .script("m", vec![ScriptedReply::text("second")]);

        let mut a = backend.new_session("m").await.unwrap();
        let mut b = backend.new_session("m").await.unwrap();
        assert_eq!(a.send(&Turn::text("q")).await.unwrap(), "first");
        assert_eq!(b.send(&Turn::text("q")).await.unwrap(), "second");
        assert!(backend.new_session("m").await.is_err());
        assert_eq!(backend.turns("m").len(), 2);
        assert!(backend.new_session("other").await.is_err());
    }
}
