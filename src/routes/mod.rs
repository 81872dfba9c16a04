pub mod api;
pub mod stream;
pub mod telephony;

use std::sync::Arc;

use axum::{Router, middleware, routing::get};

use crate::handlers::api::health_check;
use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// All routes with state applied. Transport layers (CORS, rate limiting,
/// security headers) are added by the binary.
///
/// The stream route needs `ConnectInfo<SocketAddr>`, so serve with
/// `into_make_service_with_connect_info`.
pub fn create_app(state: Arc<AppState>) -> Router {
    let stream_routes = stream::create_stream_router().layer(middleware::from_fn_with_state(
        state.clone(),
        connection_limit_middleware,
    ));

    Router::new()
        .route("/", get(health_check))
        .merge(api::create_api_router())
        .merge(telephony::create_telephony_router())
        .merge(stream_routes)
        .with_state(state)
}
