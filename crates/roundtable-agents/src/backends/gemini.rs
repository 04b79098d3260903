//! Google Gemini `generateContent` backend.
//!
//! History is kept as alternating `user`/`model` contents. Structured turns
//! set `responseMimeType: application/json` and pass the reply schema.

use async_trait::async_trait;
use coordination::{Backend, BackendError, Conversation, Turn};
use serde_json::json;
use tracing::debug;

use super::{classify_status, classify_transport};

const PROVIDER: &str = "gemini";

/// Backend for the Gemini REST API.
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiBackend {
    /// `base_url` is the API root, e.g. `https://generativelanguage.googleapis.com/v1beta`.
    pub fn new(client: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn new_session(&self, model_id: &str) -> Result<Box<dyn Conversation>, BackendError> {
        Ok(Box::new(GeminiConversation {
            client: self.client.clone(),
            url: format!("{}/models/{}:generateContent", self.base_url, model_id),
            api_key: self.api_key.clone(),
            model: model_id.to_string(),
            contents: Vec::new(),
        }))
    }
}

/// One chat with one Gemini model.
pub struct GeminiConversation {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    contents: Vec<serde_json::Value>,
}

fn content(role: &str, text: &str) -> serde_json::Value {
    json!({ "role": role, "parts": [{ "text": text }] })
}

impl GeminiConversation {
    fn request_body(&self, turn: &Turn) -> serde_json::Value {
        let mut contents = self.contents.clone();
        contents.push(content("user", &turn.text));

        let mut body = json!({ "contents": contents });
        if let Some(schema) = &turn.schema {
            body["generationConfig"] = json!({
                "responseMimeType": "application/json",
                "responseJsonSchema": schema.schema,
            });
        }
        body
    }
}

#[async_trait]
impl Conversation for GeminiConversation {
    async fn send(&mut self, turn: &Turn) -> Result<String, BackendError> {
        let body = self.request_body(turn);
        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
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
        let text = reply_text(&resp_json).ok_or_else(|| {
            let reason = resp_json["candidates"][0]["finishReason"]
                .as_str()
                .or_else(|| resp_json["promptFeedback"]["blockReason"].as_str())
                .unwrap_or("no candidates");
            BackendError::fatal(PROVIDER, format!("response has no text ({reason})"))
        })?;

        debug!(model = %self.model, history = self.contents.len(), "gemini turn complete");
        self.contents.push(content("user", &turn.text));
        self.contents.push(content("model", &text));
        Ok(text)
    }
}

/// Concatenated text parts of the first candidate.
fn reply_text(resp_json: &serde_json::Value) -> Option<String> {
    let parts = resp_json["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_text_joins_parts() {
        let resp = json!({
            "candidates": [{ "content": { "role": "model", "parts": [
                { "text": "{\"answer\": " }, { "text": "\"4\"}" }
            ]}}]
        });
        assert_eq!(reply_text(&resp).unwrap(), "{\"answer\": \"4\"}");
        assert!(reply_text(&json!({ "candidates": [] })).is_none());
    }

    #[test]
    fn test_structured_turn_sets_json_mime_type() {
        #[derive(serde::Deserialize, schemars::JsonSchema)]
        struct Guess {
            #[allow(dead_code)]
            answer: String,
        }
        let conversation = GeminiConversation {
            client: reqwest::Client::new(),
            url: String::new(),
            api_key: "k".into(),
            model: "gemini-2.0-flash".into(),
            contents: vec![content("user", "hi"), content("model", "hello")],
        };
        let body = conversation.request_body(&Turn::structured::<Guess>("2+2?"));
        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert!(body["generationConfig"]["responseJsonSchema"]["properties"]["answer"].is_object());

        let plain = conversation.request_body(&Turn::text("hi"));
        assert!(plain.get("generationConfig").is_none());
    }
}
