//! Externally visible operations, independent of the HTTP transport.

use std::path::PathBuf;
use std::time::Duration;

use crate::backend::BackendClient;
use crate::cache::AvailabilityCache;
use crate::error::GatewayError;
use crate::health::{self, HealthReport, ServiceStatus};
use crate::model::openai::{ChatCompletionRequest, ChatCompletionResponse, ModelEntry, ModelList};
use crate::model::ModelRegistry;
use crate::translate;

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub default_model: String,
    pub reject_streaming: bool,
    pub accelerator_marker: PathBuf,
}

pub struct Gateway {
    registry: ModelRegistry,
    backend: BackendClient,
    cache: AvailabilityCache,
    settings: GatewaySettings,
}

impl Gateway {
    pub fn new(
        registry: ModelRegistry,
        backend: BackendClient,
        cache_ttl: Duration,
        settings: GatewaySettings,
    ) -> Self {
        let cache = AvailabilityCache::new(registry, backend.clone(), cache_ttl);
        Self {
            registry,
            backend,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &AvailabilityCache {
        &self.cache
    }

    /// Validate the model against the registry and the availability view,
    /// then run one generation on the backend.
    pub async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, GatewayError> {
        if request.stream {
            if self.settings.reject_streaming {
                return Err(GatewayError::StreamingUnsupported);
            }
            tracing::warn!("stream=true requested; serving a non-streaming completion");
        }

        let model_id = request
            .model
            .clone()
            .unwrap_or_else(|| self.settings.default_model.clone());

        if !self.registry.contains(&model_id) {
            return Err(GatewayError::UnknownModel {
                model: model_id,
                supported: self.registry.identifiers().map(str::to_owned).collect(),
            });
        }

        if !self.cache.snapshot().await.is_available(&model_id) {
            return Err(GatewayError::ModelUnavailable(model_id));
        }

        let generate = translate::build_generate_request(&model_id, &request);
        tracing::debug!(
            model = %model_id,
            messages = request.messages.len(),
            prompt_len = generate.prompt.len(),
            "forwarding chat completion to backend"
        );

        let reply = self.backend.generate(&generate).await?;
        Ok(translate::into_chat_completion(&model_id, reply))
    }

    /// One entry per registered model, in registry order.
    pub async fn list_models(&self) -> ModelList {
        let snapshot = self.cache.snapshot().await;
        let created = translate::current_unix_time();
        let data = self
            .registry
            .iter()
            .map(|descriptor| {
                ModelEntry::new(descriptor, snapshot.is_available(descriptor.id), created)
            })
            .collect();
        ModelList::new(data)
    }

    pub async fn describe_model(&self, id: &str) -> Option<ModelEntry> {
        let descriptor = self.registry.describe(id)?;
        let snapshot = self.cache.snapshot().await;
        Some(ModelEntry::new(
            descriptor,
            snapshot.is_available(descriptor.id),
            translate::current_unix_time(),
        ))
    }

    /// Never fails: backend check errors are reported as an unhealthy backend.
    pub async fn health(&self) -> HealthReport {
        let (reachable, snapshot) = tokio::join!(self.backend.ping(), self.cache.snapshot());
        let backend = match reachable {
            Ok(_) => ServiceStatus::Healthy,
            Err(err) => {
                tracing::warn!("backend health check failed: {err}");
                ServiceStatus::Unhealthy
            }
        };

        HealthReport::compose(
            backend,
            &self.registry,
            &snapshot,
            health::accelerator_present(&self.settings.accelerator_marker),
            translate::current_unix_time(),
        )
    }
}
