use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::errors::AppResult;
use crate::state::AppState;
use crate::telephony::voice_webhook_document;

/// `POST /voice`: TwiML that streams the answered call to `/stream`.
pub async fn voice_webhook(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let stream_url = state.config.stream_url()?;
    tracing::info!(%stream_url, "Serving voice webhook");

    Ok((
        [(header::CONTENT_TYPE, "text/xml")],
        voice_webhook_document(&stream_url),
    )
        .into_response())
}
