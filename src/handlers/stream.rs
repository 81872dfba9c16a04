//! Carrier media stream WebSocket.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use tracing::info;

use crate::errors::AppResult;
use crate::middleware::ClientIp;
use crate::state::{AppState, ConnectionGuard};
use crate::telephony::{BridgeConfig, ProviderFactory, run_bridge};

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// `GET /stream`
///
/// Upgrades the carrier's media stream and bridges it to a fresh provider
/// session. Fails before the upgrade when the provider is not configured.
pub async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
) -> AppResult<Response> {
    let factory: Arc<dyn ProviderFactory> = Arc::new(state.provider_factory()?);
    let config = state.bridge_config();
    let guard = client_ip.map(|Extension(ClientIp(ip))| ConnectionGuard::new(state.clone(), ip));

    info!("Media stream connection upgrade requested");

    Ok(ws
        .max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_stream_socket(socket, factory, config, guard)))
}

async fn handle_stream_socket(
    socket: WebSocket,
    factory: Arc<dyn ProviderFactory>,
    config: BridgeConfig,
    _guard: Option<ConnectionGuard>,
) {
    info!("Media stream connected");
    run_bridge(socket, factory, config).await;
}
