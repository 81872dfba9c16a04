//! Connection limit middleware for WebSocket connections
//!
//! Enforces a global maximum of WebSocket connections and a per-IP limit.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use callbridge_gateway::middleware::connection_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/stream", get(stream_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::state::{AppState, ConnectionLimitError};

/// Client IP of an accepted WebSocket upgrade. The handler turns it into a
/// [`ConnectionGuard`](crate::state::ConnectionGuard) that frees the slot.
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

/// Reserve a connection slot for WebSocket upgrade requests.
///
/// - 503 Service Unavailable when the global limit is reached
/// - 429 Too Many Requests when the per-IP limit is reached
///
/// Non-upgrade requests pass through. If the handler does not switch
/// protocols, the slot is released again here.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    let client_ip = addr.ip();

    match state.try_acquire_connection(client_ip) {
        Ok(()) => {
            request.extensions_mut().insert(ClientIp(client_ip));
            let response = next.run(request).await;
            if response.status() != StatusCode::SWITCHING_PROTOCOLS {
                state.release_connection(client_ip);
            }
            response
        }
        Err(ConnectionLimitError::GlobalLimitReached) => {
            tracing::warn!(ip = %client_ip, "Rejecting connection: global limit reached");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
        Err(ConnectionLimitError::PerIpLimitReached) => {
            tracing::warn!(ip = %client_ip, "Rejecting connection: per-IP limit reached");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many connections from your IP address.",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::{Router, routing::get};
    use std::net::Ipv4Addr;
    use tower::ServiceExt;

    fn limited_config(global: Option<usize>, per_ip: u32) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.max_websocket_connections = global;
        config.max_connections_per_ip = per_ip;
        config
    }

    #[tokio::test]
    async fn test_per_ip_limit() {
        let state = AppState::new(limited_config(Some(10), 3)).await;
        let ip: IpAddr = Ipv4Addr::new(192, 168, 1, 100).into();

        assert_eq!(state.ws_connection_count(), 0);
        for expected in 1..=3 {
            assert!(state.try_acquire_connection(ip).is_ok());
            assert_eq!(state.ip_connection_count(&ip), expected);
        }

        assert_eq!(
            state.try_acquire_connection(ip),
            Err(ConnectionLimitError::PerIpLimitReached)
        );
        assert_eq!(state.ws_connection_count(), 3);

        state.release_connection(ip);
        assert_eq!(state.ws_connection_count(), 2);
        assert!(state.try_acquire_connection(ip).is_ok());
    }

    #[tokio::test]
    async fn test_global_limit() {
        let state = AppState::new(limited_config(Some(5), 10)).await;
        let ips: Vec<IpAddr> = (1..=6).map(|i| Ipv4Addr::new(192, 168, 1, i).into()).collect();

        for ip in &ips[0..5] {
            assert!(state.try_acquire_connection(*ip).is_ok());
        }
        assert_eq!(
            state.try_acquire_connection(ips[5]),
            Err(ConnectionLimitError::GlobalLimitReached)
        );

        state.release_connection(ips[0]);
        assert!(state.try_acquire_connection(ips[5]).is_ok());
    }

    fn upgrade_request() -> Request<Body> {
        let mut request = Request::builder()
            .uri("/stream")
            .header("upgrade", "websocket")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4000))));
        request
    }

    #[tokio::test]
    async fn test_rejected_upgrade_releases_slot() {
        let state = AppState::new(limited_config(Some(1), 1)).await;
        let app = Router::new()
            .route("/stream", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                connection_limit_middleware,
            ))
            .with_state(state.clone());

        let response = app.clone().oneshot(upgrade_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(state.ws_connection_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_response() {
        let state = AppState::new(limited_config(Some(1), 5)).await;
        state.try_acquire_connection(Ipv4Addr::new(1, 1, 1, 1).into()).unwrap();

        let app = Router::new()
            .route("/stream", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                connection_limit_middleware,
            ))
            .with_state(state.clone());

        let response = app.oneshot(upgrade_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
