use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, ClientBuilder, Response, Url};

use crate::error::{BackendError, Result};
use crate::model::backend::{GenerateRequest, GenerateResponse, TagsResponse};

/// Connection settings for the local model backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    pub list_timeout: Duration,
    pub generate_timeout: Duration,
}

impl BackendConfig {
    pub fn new(base_url: Url, list_timeout: Duration, generate_timeout: Duration) -> Self {
        Self {
            base_url,
            list_timeout,
            generate_timeout,
        }
    }
}

/// HTTP client for the backend's listing and generation endpoints.
///
/// Every call is a single attempt bounded by its own timeout.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    tags_url: Url,
    generate_url: Url,
    list_timeout: Duration,
    generate_timeout: Duration,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .context("building backend HTTP client")?;

        let mut base = config.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            client,
            tags_url: base.join("api/tags").context("invalid tags url")?,
            generate_url: base.join("api/generate").context("invalid generate url")?,
            list_timeout: config.list_timeout,
            generate_timeout: config.generate_timeout,
        })
    }

    /// Names of the models the backend currently has loaded or pulled.
    pub async fn list_models(&self) -> std::result::Result<Vec<String>, BackendError> {
        let response = self
            .client
            .get(self.tags_url.clone())
            .header("Accept", "application/json")
            .timeout(self.list_timeout)
            .send()
            .await?;
        let tags: TagsResponse = ensure_success(response).await?.json().await?;
        Ok(tags.into_names())
    }

    /// Reachability check against the listing endpoint. Only the status is
    /// inspected; the body is not decoded.
    pub async fn ping(&self) -> std::result::Result<(), BackendError> {
        let response = self
            .client
            .get(self.tags_url.clone())
            .timeout(self.list_timeout)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> std::result::Result<GenerateResponse, BackendError> {
        let response = self
            .client
            .post(self.generate_url.clone())
            .json(request)
            .timeout(self.generate_timeout)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

async fn ensure_success(response: Response) -> std::result::Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::BadStatus {
        status: status.as_u16(),
        body: body.chars().take(2000).collect(),
    })
}
