//! Assistant and speech relays.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::core::openai::{Assistant, AssistantRequest, RunPolling};
use crate::errors::{AppError, AppResult};
use crate::handlers::extract::ApiJson;
use crate::state::AppState;

/// `POST /assistants`
pub async fn create_assistant(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<AssistantRequest>,
) -> AppResult<Json<Assistant>> {
    let assistant = state.openai()?.create_assistant(request).await?;
    Ok(Json(assistant))
}

/// `POST /assistants/{assistant_id}`
pub async fn update_assistant(
    State(state): State<Arc<AppState>>,
    Path(assistant_id): Path<String>,
    ApiJson(request): ApiJson<AssistantRequest>,
) -> AppResult<Json<Assistant>> {
    let assistant = state
        .openai()?
        .update_assistant(&assistant_id, &request)
        .await?;
    Ok(Json(assistant))
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct AssistantReply {
    pub response: String,
}

/// `POST /assistants/{assistant_id}/messages`
pub async fn process_message(
    State(state): State<Arc<AppState>>,
    Path(assistant_id): Path<String>,
    ApiJson(message): ApiJson<AssistantMessage>,
) -> AppResult<Json<AssistantReply>> {
    if message.content.trim().is_empty() {
        return Err(AppError::bad_request("content is required"));
    }

    let response = state
        .openai()?
        .process_message(&assistant_id, &message.content, RunPolling::default())
        .await?;
    Ok(Json(AssistantReply { response }))
}

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
}

/// `POST /speech` returns `audio/mpeg`.
pub async fn speech(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SpeechRequest>,
) -> AppResult<Response> {
    if request.text.trim().is_empty() {
        return Err(AppError::bad_request("text is required"));
    }

    let audio = state
        .openai()?
        .synthesize_speech(&request.text, request.voice.as_deref())
        .await?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}
