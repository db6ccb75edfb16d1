use thiserror::Error;

pub type Result<T> = anyhow::Result<T>;

/// Failure of a single call to the model backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("backend request timed out")]
    Timeout,

    #[error("backend returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("backend response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else if err.is_decode() {
            BackendError::Decode(err)
        } else {
            BackendError::Unreachable(err)
        }
    }
}

/// Reasons a gateway operation is refused or fails.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("model `{model}` is not supported. Available: {}", .supported.join(", "))]
    UnknownModel {
        model: String,
        supported: Vec<String>,
    },

    #[error("model `{0}` is not available on the backend; pull it and retry later")]
    ModelUnavailable(String),

    #[error("streaming responses are not supported; send `stream: false`")]
    StreamingUnsupported,

    #[error("LLM service unavailable: {0}")]
    Backend(#[from] BackendError),
}
