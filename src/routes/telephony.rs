//! Twilio-facing routes: call placement and webhooks.

use axum::{Router, routing::post};
use tower_http::trace::TraceLayer;

use crate::handlers::{calls, voice};
use crate::state::AppState;
use std::sync::Arc;

/// Create the telephony router
///
/// - `POST /voice` - TwiML webhook for answered calls
/// - `POST /callback` - place a call bridged through `/stream`
/// - `POST /api/twilio/call` - place a call streamed directly to the provider
/// - `POST /call-status`, `POST /api/twilio/status` - status callbacks
pub fn create_telephony_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/voice", post(voice::voice_webhook))
        .route("/callback", post(calls::callback))
        .route("/api/twilio/call", post(calls::provider_call))
        .route("/call-status", post(calls::call_status))
        .route("/api/twilio/status", post(calls::call_status))
        .layer(TraceLayer::new_for_http())
}
