//! OpenAI-compatible request and response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ModelDescriptor;

pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: Option<String>,
    pub messages: Vec<IncomingMessage>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    #[serde(default)]
    pub content: ChatMessageContent,
}

#[cfg(test)]
impl IncomingMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: ChatMessageContent::Text(content.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatMessageContent {
    Text(String),
    Parts(Vec<ChatMessagePart>),
}

impl Default for ChatMessageContent {
    fn default() -> Self {
        ChatMessageContent::Text(String::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessagePart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
}

impl ChatMessageContent {
    /// Plain text of the message. Non-text parts are skipped.
    pub fn render(&self) -> String {
        match self {
            ChatMessageContent::Text(text) => text.clone(),
            ChatMessageContent::Parts(parts) => parts
                .iter()
                .filter(|part| part.kind == "text")
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Entry of `GET /v1/models`: registry metadata merged with live availability.
#[derive(Clone, Debug, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub owned_by: &'static str,
    pub permission: Vec<Value>,
    pub root: String,
    pub parent: Option<String>,
    pub available: bool,
    pub description: String,
    pub context_length: u32,
}

impl ModelEntry {
    pub fn new(descriptor: &ModelDescriptor, available: bool, created: u64) -> Self {
        Self {
            id: descriptor.id.to_owned(),
            object: "model",
            created,
            owned_by: "local",
            permission: Vec::new(),
            root: descriptor.id.to_owned(),
            parent: None,
            available,
            description: descriptor.description.to_owned(),
            context_length: descriptor.context_length,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

impl ModelList {
    pub fn new(data: Vec<ModelEntry>) -> Self {
        Self {
            object: "list",
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_defaults_apply() {
        let request: ChatCompletionRequest = serde_json::from_value(json!({
            "messages": [{ "role": "user", "content": "hi" }]
        }))
        .unwrap();
        assert!(request.model.is_none());
        assert_eq!(request.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(!request.stream);
    }

    #[test]
    fn content_parts_keep_only_text() {
        let message: IncomingMessage = serde_json::from_value(json!({
            "role": "user",
            "content": [
                { "type": "text", "text": "first" },
                { "type": "image_url", "image_url": { "url": "http://x" } },
                { "type": "text", "text": "second" }
            ]
        }))
        .unwrap();
        assert_eq!(message.content.render(), "first\nsecond");
    }

    #[test]
    fn text_content_is_verbatim() {
        let message = IncomingMessage::new("user", "  spaced  ");
        assert_eq!(message.content.render(), "  spaced  ");
    }

    #[test]
    fn model_entry_shape() {
        let descriptor = ModelDescriptor {
            id: "phi:latest",
            context_length: 2048,
            description: "Phi",
        };
        let value = serde_json::to_value(ModelEntry::new(&descriptor, true, 42)).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "phi:latest",
                "object": "model",
                "created": 42,
                "owned_by": "local",
                "permission": [],
                "root": "phi:latest",
                "parent": null,
                "available": true,
                "description": "Phi",
                "context_length": 2048
            })
        );
    }
}
