//! Media stream WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::stream::stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media stream router
///
/// # Endpoint
///
/// `GET /stream` - WebSocket upgrade for a Twilio Media Stream
///
/// # Protocol
///
/// The carrier sends JSON `connected`, `start`, `media` (base64 μ-law 8 kHz)
/// and `stop` events; the server answers with `media` events carrying the
/// provider's audio in the same format.
///
/// Connection limits are applied by the caller.
pub fn create_stream_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stream", get(stream_handler))
        .layer(TraceLayer::new_for_http())
}
