//! Model registry and wire data transfer objects.

pub mod backend;
pub mod openai;

use clap::builder::PossibleValuesParser;
use serde::Serialize;

/// Static description of a model the gateway advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub id: &'static str,
    pub context_length: u32,
    pub description: &'static str,
}

pub const MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "llama2:7b",
        context_length: 4096,
        description: "Llama 2 7B - general purpose and fast",
    },
    ModelDescriptor {
        id: "llama2:13b",
        context_length: 4096,
        description: "Llama 2 13B - more accurate, slower",
    },
    ModelDescriptor {
        id: "mistral:7b",
        context_length: 8192,
        description: "Mistral 7B - strong at code",
    },
    ModelDescriptor {
        id: "codellama:7b",
        context_length: 4096,
        description: "Code Llama - programming specialist",
    },
    ModelDescriptor {
        id: "phi:latest",
        context_length: 2048,
        description: "Phi - small but capable",
    },
    ModelDescriptor {
        id: "neural-chat:7b",
        context_length: 4096,
        description: "Neural Chat - tuned for conversation",
    },
];

pub const DEFAULT_MODEL_ID: &str = "llama2:7b";

/// Build a Clap value parser that restricts input to the known model identifiers.
pub fn model_value_parser() -> PossibleValuesParser {
    let values: Vec<&'static str> = MODELS.iter().map(|model| model.id).collect();
    PossibleValuesParser::new(values)
}

/// Read-only lookup over a fixed model table. Iteration follows table order.
#[derive(Debug, Clone, Copy)]
pub struct ModelRegistry {
    models: &'static [ModelDescriptor],
}

impl ModelRegistry {
    pub const fn new(models: &'static [ModelDescriptor]) -> Self {
        Self { models }
    }

    pub const fn builtin() -> Self {
        Self::new(MODELS)
    }

    pub fn describe(&self, id: &str) -> Option<&'static ModelDescriptor> {
        self.models.iter().find(|model| model.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.describe(id).is_some()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &'static str> {
        self.models.iter().map(|model| model.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static ModelDescriptor> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }
}
