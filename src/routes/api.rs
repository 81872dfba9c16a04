use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{assistants, chat, session};
use crate::state::AppState;
use std::sync::Arc;

/// Create the REST API router used by browser clients
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Realtime sessions
        .route("/create-session", post(session::create_session))
        .route("/api/realtime-session", get(session::realtime_session))
        .route("/sdp", post(session::sdp_exchange))
        // Text relays
        .route("/chat", post(chat::chat))
        .route("/assistants", post(assistants::create_assistant))
        .route("/assistants/{assistant_id}", post(assistants::update_assistant))
        .route(
            "/assistants/{assistant_id}/messages",
            post(assistants::process_message),
        )
        .route("/speech", post(assistants::speech))
        .layer(TraceLayer::new_for_http())
}
