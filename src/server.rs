use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context as AnyhowContext;
use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, Path, State},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    backend::{BackendClient, BackendConfig},
    cli::CliArgs,
    error::{GatewayError, Result},
    gateway::{Gateway, GatewaySettings},
    model::{openai::ChatCompletionRequest, ModelRegistry},
};

/// Seconds a client should wait before retrying an unavailable model.
const UNAVAILABLE_RETRY_AFTER_SECS: u64 = 30;

#[derive(Clone)]
struct ServerState {
    gateway: Arc<Gateway>,
}

pub async fn run_openai_server(args: &CliArgs) -> Result<()> {
    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("parsing listen address `{}`", args.listen))?;

    let backend_config = BackendConfig::new(
        args.backend_url()?,
        args.list_timeout(),
        args.generate_timeout(),
    );
    let backend = BackendClient::new(&backend_config)?;
    let gateway = Arc::new(Gateway::new(
        ModelRegistry::builtin(),
        backend,
        args.cache_ttl(),
        GatewaySettings {
            default_model: args.default_model.clone(),
            reject_streaming: args.reject_streaming,
            accelerator_marker: args.accelerator_marker.clone(),
        },
    ));

    let listener = TcpListener::bind(addr)
        .await
        .context("binding OpenAI-compatible server address")?;
    tracing::info!(
        backend = %backend_config.base_url,
        "OpenAI-compatible gateway listening on http://{}",
        listener.local_addr().unwrap_or(addr)
    );

    spawn_warmup(Arc::clone(&gateway), args.warmup_delay());

    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::warn!("failed to listen for shutdown signal: {err:?}");
            }
            tracing::info!("shutdown signal received; stopping server");
        })
        .await
        .context("running OpenAI-compatible server")?;

    Ok(())
}

pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/v1/models", get(list_models))
        .route("/v1/models/:model_id", get(get_model))
        .route("/v1/chat/completions", post(chat_completions))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ServerState { gateway })
}

/// Populate the availability cache once the backend has had time to start.
fn spawn_warmup(gateway: Arc<Gateway>, delay: Duration) {
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match gateway.cache().refresh().await {
            Ok(_) => tracing::info!("gateway ready"),
            Err(err) => tracing::warn!("initial model availability check failed: {err}"),
        }
    });
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Serialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
    param: Option<String>,
    code: Option<String>,
}

struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
    retry_after: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, error_type: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiErrorBody {
                error: ApiErrorDetail {
                    message: message.into(),
                    error_type: error_type.to_string(),
                    param: None,
                    code: None,
                },
            },
            retry_after: None,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request_error", message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found_error", message)
    }

    fn unavailable(error_type: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, error_type, message)
    }

    fn with_param(mut self, param: &str) -> Self {
        self.body.error.param = Some(param.to_owned());
        self
    }

    fn with_code(mut self, code: &str) -> Self {
        self.body.error.code = Some(code.to_owned());
        self
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let message = err.to_string();
        match err {
            GatewayError::UnknownModel { .. } => ApiError::bad_request(message)
                .with_param("model")
                .with_code("model_not_found"),
            GatewayError::StreamingUnsupported => ApiError::bad_request(message)
                .with_param("stream")
                .with_code("unsupported_parameter"),
            GatewayError::ModelUnavailable(_) => {
                let mut api = ApiError::unavailable("service_unavailable", message)
                    .with_code("model_unavailable");
                api.retry_after = Some(UNAVAILABLE_RETRY_AFTER_SECS);
                api
            }
            GatewayError::Backend(_) => {
                tracing::warn!("backend call failed: {message}");
                ApiError::unavailable("upstream_error", message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

async fn index() -> Response {
    Json(json!({
        "message": "Local LLM gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "chat": "/v1/chat/completions",
            "models": "/v1/models",
            "health": "/health",
        },
    }))
    .into_response()
}

async fn health(State(state): State<ServerState>) -> Response {
    Json(state.gateway.health().await).into_response()
}

async fn list_models(State(state): State<ServerState>) -> Response {
    Json(state.gateway.list_models().await).into_response()
}

async fn get_model(State(state): State<ServerState>, Path(model_id): Path<String>) -> Response {
    match state.gateway.describe_model(&model_id).await {
        Some(entry) => Json(entry).into_response(),
        None => ApiError::not_found(format!("Unknown model `{model_id}`")).into_response(),
    }
}

#[debug_handler]
async fn chat_completions(
    State(state): State<ServerState>,
    payload: std::result::Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return ApiError::bad_request(rejection.body_text()).into_response(),
    };

    match state.gateway.chat_completion(request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::tests::{gateway_for, mock_tags};
    use axum::body::{to_bytes, Body};
    use axum::http::{header::CONTENT_TYPE, Method, Request};
    use httpmock::prelude::*;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Response) {
        let response = router.oneshot(request).await.unwrap();
        (response.status(), response)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_chat(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/v1/chat/completions")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn index_lists_endpoints() {
        let app = router(Arc::new(gateway_for("http://127.0.0.1:1", false)));
        let (status, response) = send(app, get_request("/")).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["endpoints"]["chat"], "/v1/chat/completions");
        assert_eq!(body["endpoints"]["models"], "/v1/models");
        assert_eq!(body["endpoints"]["health"], "/health");
    }

    #[tokio::test]
    async fn unknown_model_is_bad_request_listing_supported_ids() {
        let app = router(Arc::new(gateway_for("http://127.0.0.1:1", false)));
        let (status, response) = send(
            app,
            post_chat(json!({
                "model": "gpt-4",
                "messages": [{ "role": "user", "content": "hi" }]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("gpt-4"));
        assert!(message.contains("mistral:7b"));
        assert!(message.contains("phi:latest"));
        assert_eq!(body["error"]["code"], "model_not_found");
    }

    #[tokio::test]
    async fn unavailable_model_is_service_unavailable() {
        let server = MockServer::start_async().await;
        mock_tags(&server, &[]).await;
        let app = router(Arc::new(gateway_for(&server.base_url(), false)));

        let (status, response) = send(
            app,
            post_chat(json!({
                "model": "phi:latest",
                "messages": [{ "role": "user", "content": "hi" }]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(RETRY_AFTER));
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "model_unavailable");
    }

    #[tokio::test]
    async fn backend_failure_is_service_unavailable() {
        let server = MockServer::start_async().await;
        mock_tags(&server, &["phi:latest"]).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("out of memory");
            })
            .await;
        let app = router(Arc::new(gateway_for(&server.base_url(), false)));

        let (status, response) = send(
            app,
            post_chat(json!({
                "model": "phi:latest",
                "messages": [{ "role": "user", "content": "hi" }]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"]["type"], "upstream_error");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("out of memory"));
    }

    #[tokio::test]
    async fn successful_completion_envelope() {
        let server = MockServer::start_async().await;
        mock_tags(&server, &["mistral:7b"]).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .json_body(json!({ "response": "hello", "prompt_eval_count": 5, "eval_count": 2 }));
            })
            .await;
        let app = router(Arc::new(gateway_for(&server.base_url(), false)));

        let (status, response) = send(
            app,
            post_chat(json!({
                "model": "mistral:7b",
                "messages": [{ "role": "user", "content": "hi" }],
                "stream": true
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["object"], "chat.completion");
        assert_eq!(body["model"], "mistral:7b");
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
        assert_eq!(body["choices"][0]["message"]["role"], "assistant");
        assert_eq!(body["choices"][0]["message"]["content"], "hello");
        assert_eq!(
            body["usage"],
            json!({ "prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7 })
        );
    }

    #[tokio::test]
    async fn rejected_stream_is_bad_request() {
        let app = router(Arc::new(gateway_for("http://127.0.0.1:1", true)));
        let (status, response) = send(
            app,
            post_chat(json!({
                "model": "mistral:7b",
                "messages": [{ "role": "user", "content": "hi" }],
                "stream": true
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["param"], "stream");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = router(Arc::new(gateway_for("http://127.0.0.1:1", false)));
        let (status, response) = send(app, post_chat(json!({ "model": "mistral:7b" }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn models_listing_shape() {
        let server = MockServer::start_async().await;
        mock_tags(&server, &["phi:latest"]).await;
        let app = router(Arc::new(gateway_for(&server.base_url(), false)));

        let (status, response) = send(app, get_request("/v1/models")).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["object"], "list");
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data[1]["id"], "phi:latest");
        assert_eq!(data[1]["available"], true);
        assert_eq!(data[0]["available"], false);
        assert_eq!(data[0]["owned_by"], "local");
        assert!(data[0]["parent"].is_null());
    }

    #[tokio::test]
    async fn single_model_lookup() {
        let server = MockServer::start_async().await;
        mock_tags(&server, &["phi:latest"]).await;
        let gateway = Arc::new(gateway_for(&server.base_url(), false));

        let (status, response) = send(router(Arc::clone(&gateway)), get_request("/v1/models/phi:latest")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(response).await["context_length"], 2048);

        let (status, _) = send(router(gateway), get_request("/v1/models/unknown")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_never_fails() {
        let app = router(Arc::new(gateway_for("http://127.0.0.1:1", false)));
        let (status, response) = send(app, get_request("/health")).await;

        assert_eq!(status, StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["services"]["backend"], "unhealthy");
        assert_eq!(body["services"]["api"], "healthy");
        assert_eq!(body["models"]["total"], 3);
    }
}
