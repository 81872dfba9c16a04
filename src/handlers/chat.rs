use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};

use crate::core::openai::ChatMessage;
use crate::errors::{AppError, AppResult};
use crate::handlers::extract::ApiJson;
use crate::state::AppState;

const CHAT_FAILURE: &str = "Failed to get chat response";

/// Either a single `message` or a full `messages` history.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ChatRequest {
    fn into_messages(self) -> Option<Vec<ChatMessage>> {
        match (self.messages, self.message) {
            (Some(messages), _) if !messages.is_empty() => Some(messages),
            (_, Some(message)) if !message.trim().is_empty() => Some(vec![ChatMessage::user(message)]),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub message: String,
    pub content: String,
}

/// `POST /chat`
pub async fn chat(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> AppResult<Json<ChatReply>> {
    let model = request
        .model
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.config.chat_model.clone());
    let messages = request
        .into_messages()
        .ok_or_else(|| AppError::bad_request("message is required"))?;

    let openai = state
        .openai()
        .map_err(|e| AppError::with_message(StatusCode::INTERNAL_SERVER_ERROR, CHAT_FAILURE, e))?;

    let content = openai
        .chat_completion(&model, &messages)
        .await
        .map_err(|e| AppError::with_message(StatusCode::INTERNAL_SERVER_ERROR, CHAT_FAILURE, e))?;

    Ok(Json(ChatReply {
        message: content.clone(),
        content,
    }))
}
