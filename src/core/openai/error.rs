use axum::http::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Errors returned by the OpenAI REST clients.
#[derive(Debug, Error)]
pub enum OpenAIError {
    /// Transport-level failure (DNS, TLS, connection reset, timeout)
    #[error("OpenAI request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx response from the provider
    #[error("OpenAI API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        /// Provider error body, passed back to clients unchanged
        details: Value,
    },

    /// 2xx response whose body did not have the expected shape
    #[error("Unexpected OpenAI response: {0}")]
    InvalidResponse(String),

    /// Assistant run ended in a terminal non-success state
    #[error("Assistant run {run_id} ended with status '{status}'")]
    RunFailed { run_id: String, status: String },

    /// Assistant run did not finish within the polling budget
    #[error("Assistant run {0} did not complete in time")]
    RunTimeout(String),
}

/// Result type for OpenAI REST operations.
pub type OpenAIResult<T> = Result<T, OpenAIError>;

impl OpenAIError {
    /// HTTP status to surface to local callers.
    ///
    /// Provider 4xx/5xx statuses are kept; transport and shape failures map to 502.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OpenAIError::Api { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            OpenAIError::RunTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn details(&self) -> Option<&Value> {
        match self {
            OpenAIError::Api { details, .. } => Some(details),
            _ => None,
        }
    }

    /// Build an API error from a status and raw response body.
    pub(crate) fn from_body(status: u16, body: &str) -> Self {
        let details: Value =
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()));

        let message = details
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body.to_string()
                }
            });

        OpenAIError::Api {
            status,
            message,
            details,
        }
    }
}
