//! Payloads exchanged with the local model backend (`/api/tags`, `/api/generate`).

use serde::{Deserialize, Serialize};

/// Body of `GET /api/tags`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<TagEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub name: String,
}

impl TagsResponse {
    pub fn into_names(self) -> Vec<String> {
        self.models.into_iter().map(|entry| entry.name).collect()
    }
}

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub options: GenerateOptions,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub temperature: f64,
    pub num_predict: u32,
}

/// Non-streaming reply to `POST /api/generate`. Token counts may be absent.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
}
