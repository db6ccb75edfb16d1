use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as AnyhowContext, Result};
use clap::{ArgAction, Parser};
use reqwest::Url;

use crate::cache::DEFAULT_TTL;
use crate::health::DEFAULT_ACCELERATOR_MARKER;
use crate::model;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_BACKEND_URL: &str = "http://localhost:11434";

/// Command-line options for the gateway.
#[derive(Debug, Clone, Parser)]
#[command(
    author,
    version,
    about = "OpenAI-compatible gateway in front of a local model backend",
    long_about = None
)]
pub struct CliArgs {
    /// Listen address for the OpenAI-compatible HTTP server.
    #[arg(long = "listen", env = "GATEWAY_LISTEN", value_name = "ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: String,

    /// Base URL of the model backend.
    #[arg(long = "backend-url", env = "OLLAMA_URL", value_name = "URL", default_value = DEFAULT_BACKEND_URL)]
    backend_url: String,

    /// Timeout (seconds) for model listing and health checks.
    #[arg(long = "list-timeout", env = "GATEWAY_LIST_TIMEOUT", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=300))]
    list_timeout_secs: u64,

    /// Timeout (seconds) for a single generation call.
    #[arg(long = "generate-timeout", env = "GATEWAY_GENERATE_TIMEOUT", default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..=3600))]
    generate_timeout_secs: u64,

    /// Seconds a model availability reading stays fresh.
    #[arg(long = "cache-ttl", env = "GATEWAY_CACHE_TTL", default_value_t = DEFAULT_TTL.as_secs())]
    cache_ttl_secs: u64,

    /// Seconds to wait after startup before the first availability check.
    #[arg(long = "warmup-delay", env = "GATEWAY_WARMUP_DELAY", default_value_t = 10)]
    warmup_delay_secs: u64,

    /// Model used when a chat request does not name one.
    #[arg(
        long = "default-model",
        env = "GATEWAY_DEFAULT_MODEL",
        default_value = model::DEFAULT_MODEL_ID,
        value_parser = model::model_value_parser()
    )]
    pub default_model: String,

    /// Reject `stream: true` requests instead of answering them without streaming.
    #[arg(long = "reject-streaming", env = "GATEWAY_REJECT_STREAMING", action = ArgAction::SetTrue)]
    pub reject_streaming: bool,

    /// File whose presence indicates an accelerator is installed.
    #[arg(long = "accelerator-marker", env = "GATEWAY_ACCELERATOR_MARKER", value_name = "PATH", default_value = DEFAULT_ACCELERATOR_MARKER)]
    pub accelerator_marker: PathBuf,
}

impl CliArgs {
    pub fn backend_url(&self) -> Result<Url> {
        Url::parse(&self.backend_url)
            .with_context(|| format!("parsing backend url `{}`", self.backend_url))
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn warmup_delay(&self) -> Duration {
        Duration::from_secs(self.warmup_delay_secs)
    }
}
