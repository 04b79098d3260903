//! OpenAI-compatible chat completions backend.
//!
//! The API is stateless, so the conversation keeps the message history
//! client-side and replays it on every turn. Structured turns ask for
//! `response_format: json_schema`.

use async_trait::async_trait;
use coordination::{Backend, BackendError, Conversation, Turn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{classify_status, classify_transport};

const PROVIDER: &str = "openai";

/// Backend for `/chat/completions` endpoints.
pub struct OpenAiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl OpenAiBackend {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(client: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn new_session(&self, model_id: &str) -> Result<Box<dyn Conversation>, BackendError> {
        Ok(Box::new(OpenAiConversation {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            model: model_id.to_string(),
            history: Vec::new(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// One chat with one model.
pub struct OpenAiConversation {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    history: Vec<ChatMessage>,
}

impl OpenAiConversation {
    fn request_body(&self, turn: &Turn) -> serde_json::Value {
        let mut messages = self.history.clone();
        messages.push(ChatMessage::new("user", &turn.text));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(schema) = &turn.schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                },
            });
        }
        body
    }
}

#[async_trait]
impl Conversation for OpenAiConversation {
    async fn send(&mut self, turn: &Turn) -> Result<String, BackendError> {
        let body = self.request_body(turn);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(PROVIDER, status, &headers, &text));
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| classify_transport(PROVIDER, &e))?;
        let content = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| BackendError::fatal(PROVIDER, "response has no message content"))?
            .to_string();

        debug!(model = %self.model, history = self.history.len(), "openai turn complete");
        self.history.push(ChatMessage::new("user", &turn.text));
        self.history.push(ChatMessage::new("assistant", &content));
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> OpenAiConversation {
        OpenAiConversation {
            client: reqwest::Client::new(),
            endpoint: "http://localhost/v1/chat/completions".into(),
            api_key: "k".into(),
            model: "gpt-4o".into(),
            history: vec![
                ChatMessage::new("user", "hi"),
                ChatMessage::new("assistant", "hello"),
            ],
        }
    }

    #[test]
    fn test_plain_turn_replays_history() {
        let body = conversation().request_body(&Turn::text("2+2?"));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2]["content"], "2+2?");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_structured_turn_requests_json_schema() {
        #[derive(serde::Deserialize, schemars::JsonSchema)]
        struct Guess {
            #[allow(dead_code)]
            answer: String,
        }
        let body = conversation().request_body(&Turn::structured::<Guess>("2+2?"));
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "Guess");
        let schema = &body["response_format"]["json_schema"]["schema"];
        assert!(schema["properties"]["answer"].is_object());
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let backend = OpenAiBackend::new(reqwest::Client::new(), "http://host/v1/", "k");
        assert_eq!(backend.endpoint, "http://host/v1/chat/completions");
    }
}
