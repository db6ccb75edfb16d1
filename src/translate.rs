//! Conversion between the OpenAI chat envelope and the backend's
//! single-prompt generation API.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::model::backend::{GenerateOptions, GenerateRequest, GenerateResponse};
use crate::model::openai::{
    AssistantMessage, ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse,
    IncomingMessage, Usage,
};

/// Cue that makes the backend continue as the assistant.
const ASSISTANT_CUE: &str = "Assistant: ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "Human",
            Role::Assistant => "Assistant",
        }
    }
}

/// Flatten a conversation into `"<Label>: <content>\n"` lines followed by
/// the assistant cue. Messages with unrecognised roles produce no line.
pub fn render_prompt(messages: &[IncomingMessage]) -> String {
    let mut prompt = String::new();
    for (index, message) in messages.iter().enumerate() {
        let Some(role) = Role::parse(&message.role) else {
            tracing::warn!(
                index,
                role = %message.role,
                "dropping message with unsupported role from prompt"
            );
            continue;
        };
        prompt.push_str(role.label());
        prompt.push_str(": ");
        prompt.push_str(&message.content.render());
        prompt.push('\n');
    }
    prompt.push_str(ASSISTANT_CUE);
    prompt
}

/// Backend request for `model`. Always non-streaming.
pub fn build_generate_request(model: &str, request: &ChatCompletionRequest) -> GenerateRequest {
    GenerateRequest {
        model: model.to_owned(),
        prompt: render_prompt(&request.messages),
        options: GenerateOptions {
            temperature: request.temperature,
            num_predict: request.max_tokens,
        },
        stream: false,
    }
}

pub fn into_chat_completion(model: &str, reply: GenerateResponse) -> ChatCompletionResponse {
    let prompt_tokens = reply.prompt_eval_count.unwrap_or(0);
    let completion_tokens = reply.eval_count.unwrap_or(0);

    ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4()),
        object: "chat.completion".to_owned(),
        created: current_unix_time(),
        model: model.to_owned(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: AssistantMessage {
                role: "assistant".to_owned(),
                content: reply.response,
            },
            finish_reason: "stop".to_owned(),
        }],
        usage: Some(Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }),
    }
}

pub fn current_unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
