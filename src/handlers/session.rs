//! Realtime session endpoints for browser clients.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use crate::core::openai::{RealtimeSession, SessionSettings};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

/// `POST /create-session`
///
/// Body is a [`SessionSettings`] document; an empty body uses the defaults.
/// Returns the provider's session descriptor unchanged.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<RealtimeSession>> {
    let settings = if body.iter().all(u8::is_ascii_whitespace) {
        SessionSettings::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("Invalid session settings: {e}")))?
    };

    let session = state.openai()?.create_realtime_session(&settings).await?;
    Ok(Json(session))
}

/// `GET /api/realtime-session` with the server's configured model and voice.
pub async fn realtime_session(State(state): State<Arc<AppState>>) -> AppResult<Json<RealtimeSession>> {
    let settings = SessionSettings {
        model: state.config.realtime_model.clone(),
        voice: state.config.realtime_voice.clone(),
        ..SessionSettings::default()
    };

    let session = state.openai()?.create_realtime_session(&settings).await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct SdpQuery {
    pub model: Option<String>,
}

/// `POST /sdp?model=..`
///
/// Takes an SDP offer, obtains a session token server-side and returns the
/// provider's SDP answer.
pub async fn sdp_exchange(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SdpQuery>,
    offer: String,
) -> AppResult<Response> {
    if offer.trim().is_empty() {
        return Err(AppError::bad_request("SDP offer is required"));
    }

    let settings = SessionSettings {
        model: query
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| state.config.realtime_model.clone()),
        voice: state.config.realtime_voice.clone(),
        ..SessionSettings::default()
    };

    let openai = state.openai()?;
    let session = openai.create_realtime_session(&settings).await?;
    let answer = openai
        .sdp_exchange()
        .exchange(session.token(), &settings.model, &offer)
        .await?;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "application/sdp")], answer).into_response())
}
