//! OpenAI Realtime API client implementation.
//!
//! - Endpoint: `{OPENAI_REALTIME_URL}?model=<model>` (overridable for tests)
//! - Protocol: WebSocket with JSON events
//! - Audio: PCM 16-bit, 24kHz, mono, little-endian, base64 encoded
//! - Auth: `Authorization: Bearer <session token>` plus `OpenAI-Beta: realtime=v1`

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::config::{OPENAI_REALTIME_SAMPLE_RATE, OpenAIRealtimeVoice, realtime_ws_url};
use super::messages::{ClientEvent, ServerEvent, SessionConfig};
use crate::core::realtime::base::{
    AudioOutputCallback, BaseRealtime, ConnectionState, RealtimeAudioData, RealtimeConfig,
    RealtimeError, RealtimeErrorCallback, RealtimeResult, ReconnectionCallback,
    ReconnectionConfig, ReconnectionEvent, TextDeltaCallback, TokenRefresher,
};

/// Channel capacity for WebSocket message sending.
const WS_CHANNEL_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Registered event callbacks, shared with the connection task.
#[derive(Clone, Default)]
struct EventCallbacks {
    audio: Arc<Mutex<Option<AudioOutputCallback>>>,
    text_delta: Arc<Mutex<Option<TextDeltaCallback>>>,
    error: Arc<Mutex<Option<RealtimeErrorCallback>>>,
    reconnection: Arc<Mutex<Option<ReconnectionCallback>>>,
}

impl EventCallbacks {
    async fn emit_error(&self, error: RealtimeError) {
        if let Some(cb) = self.error.lock().await.as_ref() {
            cb(error).await;
        }
    }
}

/// Register a callback without blocking; falls back to a task if the slot is busy.
fn set_callback<T: Send + 'static>(slot: &Arc<Mutex<Option<T>>>, callback: T) {
    if let Ok(mut guard) = slot.try_lock() {
        *guard = Some(callback);
    } else {
        let slot = slot.clone();
        tokio::spawn(async move {
            *slot.lock().await = Some(callback);
        });
    }
}

// =============================================================================
// OpenAI Realtime Client
// =============================================================================

/// OpenAI Realtime WebSocket client.
///
/// All mutable state lives behind `Arc` so the spawned connection task and
/// the owner see the same values. When the socket drops unexpectedly the
/// task reconnects with exponential backoff until the [`ReconnectionConfig`]
/// budget is spent, replaying the last `session.update` after each
/// successful reconnect.
pub struct OpenAIRealtime {
    config: RealtimeConfig,
    voice: OpenAIRealtimeVoice,
    state: Arc<RwLock<ConnectionState>>,
    connected: Arc<AtomicBool>,
    session_id: Arc<RwLock<Option<String>>>,
    ws_sender: Arc<Mutex<Option<mpsc::Sender<ClientEvent>>>>,
    callbacks: EventCallbacks,
    connection_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Suppresses reconnection after `disconnect()`
    intentional_disconnect: Arc<AtomicBool>,
    last_session_config: Arc<RwLock<Option<SessionConfig>>>,
}

impl OpenAIRealtime {
    pub fn new(config: RealtimeConfig) -> RealtimeResult<Self> {
        if config.token.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "session token is required".to_string(),
            ));
        }

        let voice = OpenAIRealtimeVoice::from_name(&config.settings.voice);

        Ok(Self {
            config,
            voice,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connected: Arc::new(AtomicBool::new(false)),
            session_id: Arc::new(RwLock::new(None)),
            ws_sender: Arc::new(Mutex::new(None)),
            callbacks: EventCallbacks::default(),
            connection_handle: Arc::new(Mutex::new(None)),
            intentional_disconnect: Arc::new(AtomicBool::new(false)),
            last_session_config: Arc::new(RwLock::new(None)),
        })
    }

    pub fn voice(&self) -> OpenAIRealtimeVoice {
        self.voice
    }

    pub fn reconnection_config(&self) -> &ReconnectionConfig {
        &self.config.reconnection
    }

    /// Provider session id from `session.created`, if received.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    fn build_ws_url(&self) -> String {
        realtime_ws_url(&self.config.url, &self.config.settings.model)
    }

    fn build_session_config(&self) -> SessionConfig {
        let mut session = SessionConfig::from(&self.config.settings);
        session.voice = Some(self.voice.as_str().to_string());
        session
    }

    async fn send_event(&self, event: ClientEvent) -> RealtimeResult<()> {
        if let Some(sender) = self.ws_sender.lock().await.as_ref() {
            sender
                .send(event)
                .await
                .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
        } else {
            Err(RealtimeError::NotConnected)
        }
    }

    /// Send a session update and keep it for replay after reconnection.
    async fn send_session_update(&self, session: SessionConfig) -> RealtimeResult<()> {
        *self.last_session_config.write().await = Some(session.clone());
        self.send_event(ClientEvent::SessionUpdate { session }).await
    }
}

/// Open an authenticated socket to the realtime endpoint.
async fn open_socket(url: &str, token: &str) -> RealtimeResult<WsStream> {
    let mut request = url
        .into_client_request()
        .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

    let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| RealtimeError::AuthenticationFailed(e.to_string()))?;
    let headers = request.headers_mut();
    headers.insert("Authorization", bearer);
    headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

    Ok(ws_stream)
}

/// State the connection task needs after `connect()` returns.
struct ConnectionTask {
    url: String,
    token: String,
    token_refresher: Option<TokenRefresher>,
    reconnection: ReconnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    connected: Arc<AtomicBool>,
    session_id: Arc<RwLock<Option<String>>>,
    ws_sender: Arc<Mutex<Option<mpsc::Sender<ClientEvent>>>>,
    callbacks: EventCallbacks,
    intentional_disconnect: Arc<AtomicBool>,
    last_session_config: Arc<RwLock<Option<SessionConfig>>>,
}

/// Why a socket's message loop ended.
enum LoopExit {
    /// The owner dropped the sender; nothing more to do.
    SenderClosed,
    /// The socket closed or failed.
    SocketLost,
}

impl ConnectionTask {
    async fn run(mut self, ws_stream: WsStream, mut rx: mpsc::Receiver<ClientEvent>) {
        let (mut sink, mut stream) = ws_stream.split();
        // Counts reconnects over the whole session.
        let mut reconnect_attempt: u32 = 0;

        loop {
            let exit = self.pump(&mut sink, &mut stream, &mut rx).await;
            self.connected.store(false, Ordering::SeqCst);

            if matches!(exit, LoopExit::SenderClosed)
                || self.intentional_disconnect.load(Ordering::SeqCst)
            {
                tracing::info!("OpenAI Realtime connection closed");
                *self.state.write().await = ConnectionState::Disconnected;
                break;
            }

            match self.reconnect(&mut reconnect_attempt).await {
                Some((new_sink, new_stream)) => {
                    sink = new_sink;
                    stream = new_stream;
                }
                None => break,
            }
        }

        *self.ws_sender.lock().await = None;
        tracing::info!("OpenAI Realtime connection task ended");
    }

    async fn pump(
        &self,
        sink: &mut WsSink,
        stream: &mut WsSource,
        rx: &mut mpsc::Receiver<ClientEvent>,
    ) -> LoopExit {
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else {
                        let _ = sink.send(Message::Close(None)).await;
                        return LoopExit::SenderClosed;
                    };
                    let json = match serde_json::to_string(&event) {
                        Ok(j) => j,
                        Err(e) => {
                            tracing::error!("Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(json.into())).await {
                        tracing::error!("Failed to send WebSocket message: {}", e);
                        return LoopExit::SocketLost;
                    }
                }

                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerEvent>(&text) {
                                Ok(event) => self.handle_server_event(event).await,
                                Err(e) => tracing::warn!("Failed to parse server event: {} - {}", e, text),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                tracing::error!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("WebSocket closed by server");
                            return LoopExit::SocketLost;
                        }
                        Some(Err(e)) => {
                            tracing::error!("WebSocket error: {}", e);
                            return LoopExit::SocketLost;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    /// Reconnect with backoff. `None` when the budget is spent or the owner disconnected.
    async fn reconnect(&mut self, attempt: &mut u32) -> Option<(WsSink, WsSource)> {
        loop {
            if !self.reconnection.allows_attempt(*attempt) {
                tracing::warn!(
                    "Reconnection disabled or max attempts ({}) reached",
                    self.reconnection.max_attempts
                );
                *self.state.write().await = ConnectionState::Failed;
                self.callbacks
                    .emit_error(RealtimeError::ConnectionFailed(format!(
                        "Connection lost after {} reconnection attempts",
                        attempt
                    )))
                    .await;
                return None;
            }

            *attempt += 1;
            *self.state.write().await = ConnectionState::Reconnecting;

            let delay = self.reconnection.delay_for(*attempt);
            tracing::info!(
                "Attempting reconnection {}/{} in {:?}",
                attempt,
                self.reconnection.max_attempts,
                delay
            );
            tokio::time::sleep(delay).await;

            if self.intentional_disconnect.load(Ordering::SeqCst) {
                tracing::info!("Disconnect requested during reconnection delay");
                *self.state.write().await = ConnectionState::Disconnected;
                return None;
            }

            if let Err(e) = self.refresh_token().await {
                tracing::error!("Reconnection attempt {} could not refresh token: {}", attempt, e);
                self.notify_reconnection(*attempt, false, Some(e.to_string()))
                    .await;
                continue;
            }

            let ws_stream = match open_socket(&self.url, &self.token).await {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::error!("Reconnection attempt {} failed: {}", attempt, e);
                    self.notify_reconnection(*attempt, false, Some(e.to_string()))
                        .await;
                    continue;
                }
            };

            tracing::info!("Reconnected to OpenAI Realtime API");
            let (mut sink, stream) = ws_stream.split();
            *self.session_id.write().await = None;

            if let Some(saved) = self.last_session_config.read().await.clone() {
                let event = ClientEvent::SessionUpdate { session: saved };
                if let Ok(json) = serde_json::to_string(&event)
                    && let Err(e) = sink.send(Message::Text(json.into())).await
                {
                    tracing::error!("Failed to restore session config after reconnection: {}", e);
                }
            }

            self.connected.store(true, Ordering::SeqCst);
            *self.state.write().await = ConnectionState::Connected;
            self.notify_reconnection(*attempt, true, None).await;
            return Some((sink, stream));
        }
    }

    /// Session tokens are short-lived; fetch a new one when a refresher is set.
    async fn refresh_token(&mut self) -> RealtimeResult<()> {
        let Some(refresh) = self.token_refresher.as_ref() else {
            return Ok(());
        };
        let token = refresh().await?;
        if token.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "refreshed session token is empty".to_string(),
            ));
        }
        self.token = token;
        Ok(())
    }

    async fn notify_reconnection(&self, attempt: u32, success: bool, error: Option<String>) {
        if let Some(cb) = self.callbacks.reconnection.lock().await.as_ref() {
            cb(ReconnectionEvent {
                attempt,
                success,
                error,
            })
            .await;
        }
    }

    async fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::SessionCreated { session } => {
                tracing::info!("OpenAI Realtime session created: {}", session.id);
                *self.session_id.write().await = Some(session.id);
            }

            ServerEvent::SessionUpdated { session } => {
                tracing::debug!("OpenAI Realtime session updated: {}", session.id);
            }

            ServerEvent::Error { error } => {
                tracing::error!(
                    "OpenAI Realtime error: {} - {}",
                    error.error_type,
                    error.message
                );
                self.callbacks
                    .emit_error(RealtimeError::ProviderError(format!(
                        "{}: {}",
                        error.error_type, error.message
                    )))
                    .await;
            }

            ServerEvent::TextDelta { delta, .. } => {
                if let Some(cb) = self.callbacks.text_delta.lock().await.as_ref() {
                    cb(delta).await;
                }
            }

            ServerEvent::AudioDelta {
                delta,
                item_id,
                response_id,
            } => {
                let Some(cb) = self.callbacks.audio.lock().await.clone() else {
                    return;
                };
                match ServerEvent::decode_audio_delta(&delta) {
                    Ok(audio_bytes) => {
                        cb(RealtimeAudioData {
                            data: Bytes::from(audio_bytes),
                            sample_rate: OPENAI_REALTIME_SAMPLE_RATE,
                            item_id,
                            response_id,
                        })
                        .await;
                    }
                    Err(e) => tracing::error!("Failed to decode audio delta: {}", e),
                }
            }

            ServerEvent::ResponseDone { .. } => {
                tracing::debug!("Response done");
            }

            ServerEvent::Other => {
                tracing::trace!("Unhandled server event");
            }
        }
    }
}

#[async_trait]
impl BaseRealtime for OpenAIRealtime {
    async fn connect(&mut self) -> RealtimeResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.intentional_disconnect.store(false, Ordering::SeqCst);
        *self.state.write().await = ConnectionState::Connecting;

        let url = self.build_ws_url();
        let ws_stream = match open_socket(&url, &self.config.token).await {
            Ok(ws) => ws,
            Err(e) => {
                *self.state.write().await = ConnectionState::Failed;
                return Err(e);
            }
        };

        tracing::info!("Connected to OpenAI Realtime API");

        let (tx, rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        *self.ws_sender.lock().await = Some(tx);

        let task = ConnectionTask {
            url,
            token: self.config.token.clone(),
            token_refresher: self.config.token_refresher.clone(),
            reconnection: self.config.reconnection.clone(),
            state: self.state.clone(),
            connected: self.connected.clone(),
            session_id: self.session_id.clone(),
            ws_sender: self.ws_sender.clone(),
            callbacks: self.callbacks.clone(),
            intentional_disconnect: self.intentional_disconnect.clone(),
            last_session_config: self.last_session_config.clone(),
        };

        self.connected.store(true, Ordering::SeqCst);
        *self.state.write().await = ConnectionState::Connected;

        let handle = tokio::spawn(task.run(ws_stream, rx));
        *self.connection_handle.lock().await = Some(handle);

        let session_config = self.build_session_config();
        self.send_session_update(session_config).await
    }

    async fn disconnect(&mut self) -> RealtimeResult<()> {
        self.intentional_disconnect.store(true, Ordering::SeqCst);

        // Dropping the sender makes the task send a close frame and exit.
        *self.ws_sender.lock().await = None;

        if let Some(mut handle) = self.connection_handle.lock().await.take()
            && tokio::time::timeout(std::time::Duration::from_secs(1), &mut handle)
                .await
                .is_err()
        {
            tracing::debug!("Connection task did not stop in time, aborting");
            handle.abort();
        }

        self.connected.store(false, Ordering::SeqCst);
        *self.state.write().await = ConnectionState::Disconnected;
        *self.session_id.write().await = None;

        tracing::info!("Disconnected from OpenAI Realtime API");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn get_connection_state(&self) -> ConnectionState {
        self.state
            .try_read()
            .map(|state| *state)
            .unwrap_or(if self.is_ready() {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            })
    }

    async fn send_audio(&mut self, audio_data: Bytes) -> RealtimeResult<()> {
        if !self.is_ready() {
            return Err(RealtimeError::NotConnected);
        }

        self.send_event(ClientEvent::audio_append(&audio_data)).await
    }

    fn on_audio(&mut self, callback: AudioOutputCallback) -> RealtimeResult<()> {
        set_callback(&self.callbacks.audio, callback);
        Ok(())
    }

    fn on_text_delta(&mut self, callback: TextDeltaCallback) -> RealtimeResult<()> {
        set_callback(&self.callbacks.text_delta, callback);
        Ok(())
    }

    fn on_error(&mut self, callback: RealtimeErrorCallback) -> RealtimeResult<()> {
        set_callback(&self.callbacks.error, callback);
        Ok(())
    }

    fn on_reconnection(&mut self, callback: ReconnectionCallback) -> RealtimeResult<()> {
        set_callback(&self.callbacks.reconnection, callback);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::openai::SessionSettings;
    use crate::core::realtime::openai::OPENAI_REALTIME_URL;

    fn config(token: &str) -> RealtimeConfig {
        RealtimeConfig {
            token: token.to_string(),
            url: OPENAI_REALTIME_URL.to_string(),
            settings: SessionSettings::for_telephony("gpt-4o-realtime-preview", "shimmer"),
            reconnection: ReconnectionConfig::default(),
            token_refresher: None,
        }
    }

    #[test]
    fn test_token_required() {
        match OpenAIRealtime::new(config("")) {
            Err(RealtimeError::AuthenticationFailed(_)) => {}
            _ => panic!("Expected AuthenticationFailed error"),
        }
    }

    #[tokio::test]
    async fn test_creation() {
        let realtime = OpenAIRealtime::new(config("ek_test")).unwrap();
        assert!(!realtime.is_ready());
        assert_eq!(realtime.get_connection_state(), ConnectionState::Disconnected);
        assert_eq!(realtime.voice(), OpenAIRealtimeVoice::Shimmer);
        assert_eq!(realtime.reconnection_config().max_attempts, 3);
        assert!(realtime.session_id().await.is_none());
    }

    #[tokio::test]
    async fn test_send_audio_requires_connection() {
        let mut realtime = OpenAIRealtime::new(config("ek_test")).unwrap();
        let result = realtime.send_audio(Bytes::from(vec![0u8; 100])).await;
        assert!(matches!(result, Err(RealtimeError::NotConnected)));
    }

    #[test]
    fn test_build_ws_url() {
        let realtime = OpenAIRealtime::new(config("ek_test")).unwrap();
        assert_eq!(
            realtime.build_ws_url(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview"
        );
    }

    #[test]
    fn test_session_config_uses_parsed_voice() {
        let mut cfg = config("ek_test");
        cfg.settings.voice = "unknown".to_string();
        let realtime = OpenAIRealtime::new(cfg).unwrap();
        let session = realtime.build_session_config();
        assert_eq!(session.voice.as_deref(), Some("alloy"));
        assert_eq!(session.input_audio_format.as_deref(), Some("pcm16"));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_endpoint_fails() {
        let mut cfg = config("ek_test");
        cfg.url = "ws://127.0.0.1:1/realtime".to_string();
        let mut realtime = OpenAIRealtime::new(cfg).unwrap();

        let result = realtime.connect().await;
        assert!(matches!(result, Err(RealtimeError::ConnectionFailed(_))));
        assert_eq!(realtime.get_connection_state(), ConnectionState::Failed);
    }
}
