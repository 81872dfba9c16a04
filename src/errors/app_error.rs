//! HTTP-facing application error.
//!
//! Every handler returns `AppResult<T>`; failures are logged once here and
//! rendered as a JSON body of the form:
//!
//! ```json
//! { "error": "short message", "message": "short message", "details": { ... } }
//! ```
//!
//! `details` carries the provider's own error body when one is available so
//! browser clients can surface `details.error.message`.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::ConfigError;
use crate::core::openai::OpenAIError;
use crate::telephony::TwilioError;

/// Result alias used by HTTP handlers.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Server configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    OpenAI(#[from] OpenAIError),

    #[error(transparent)]
    Twilio(#[from] TwilioError),

    /// Failure with a caller-chosen public message; the source is only logged.
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(message.into())
    }

    /// Replace the public message of an upstream failure while keeping its status.
    pub fn with_message(
        status: StatusCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Upstream {
            status,
            message: message.into(),
            source: Box::new(source),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::OpenAI(e) => e.status_code(),
            AppError::Twilio(e) => e.status_code(),
            AppError::Upstream { status, .. } => *status,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::OpenAI(e) => e.details().cloned(),
            AppError::Twilio(e) => e.details(),
            _ => None,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if status.is_server_error() {
            match &self {
                AppError::Upstream { source, .. } => {
                    tracing::error!(status = %status, error = %source, "{}", message)
                }
                _ => tracing::error!(status = %status, "{}", message),
            }
        } else {
            tracing::warn!(status = %status, "{}", message);
        }

        let mut body = json!({
            "error": message,
            "message": message,
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}
