//! Phone call bridge.
//!
//! One [`run_bridge`] call serves one carrier media stream. The carrier
//! socket is split into a reader loop and a sender task fed by an mpsc
//! channel; the provider is connected in the background so carrier audio
//! arriving before it is ready is buffered and flushed first, in order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::media::{InboundMessage, OutboundMessage};
use crate::core::audio::{carrier_to_provider, provider_to_carrier};
use crate::core::openai::{OpenAIClient, OpenAIError, SessionSettings};
use crate::core::realtime::{
    BoxedRealtime, OpenAIRealtime, RealtimeAudioData, RealtimeConfig, RealtimeError,
    ReconnectionConfig, ReconnectionEvent, TokenRefresher,
};

/// Capacity of the carrier outbound channel.
const CHANNEL_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to create provider session: {0}")]
    Session(#[from] OpenAIError),

    #[error(transparent)]
    Realtime(#[from] RealtimeError),
}

/// Builds a fresh provider connection for each call.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create(&self) -> Result<BoxedRealtime, BridgeError>;
}

/// Creates an OpenAI realtime session per call and connects with its token.
#[derive(Debug, Clone)]
pub struct OpenAIProviderFactory {
    openai: OpenAIClient,
    settings: SessionSettings,
    realtime_url: String,
    reconnection: ReconnectionConfig,
}

impl OpenAIProviderFactory {
    pub fn new(
        openai: OpenAIClient,
        settings: SessionSettings,
        realtime_url: impl Into<String>,
        reconnection: ReconnectionConfig,
    ) -> Self {
        Self {
            openai,
            settings,
            realtime_url: realtime_url.into(),
            reconnection,
        }
    }
}

impl OpenAIProviderFactory {
    /// Creates a new provider session for each reconnect, since session
    /// tokens expire within minutes.
    fn token_refresher(&self) -> TokenRefresher {
        let openai = self.openai.clone();
        let settings = self.settings.clone();
        Arc::new(move || {
            let openai = openai.clone();
            let settings = settings.clone();
            Box::pin(async move {
                let token: Result<String, RealtimeError> = openai
                    .create_realtime_session(&settings)
                    .await
                    .map(|session| session.token().to_string())
                    .map_err(|e| RealtimeError::AuthenticationFailed(e.to_string()));
                debug!(ok = token.is_ok(), "Fetched session token for reconnection");
                token
            })
        })
    }
}

#[async_trait]
impl ProviderFactory for OpenAIProviderFactory {
    async fn create(&self) -> Result<BoxedRealtime, BridgeError> {
        let session = self.openai.create_realtime_session(&self.settings).await?;

        let provider = OpenAIRealtime::new(RealtimeConfig {
            token: session.token().to_string(),
            url: self.realtime_url.clone(),
            settings: self.settings.clone(),
            reconnection: self.reconnection.clone(),
            token_refresher: Some(self.token_refresher()),
        })?;

        Ok(Box::new(provider))
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Interval between carrier pings. A ping still unanswered at the next
    /// tick ends the call.
    pub keepalive_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(5),
        }
    }
}

/// Messages routed to the carrier sender task.
enum CarrierRoute {
    Json(OutboundMessage),
    Binary(Bytes),
    Ping,
    Close,
}

/// Provider callbacks, flattened into the bridge loop.
enum ProviderEvent {
    Audio(Bytes),
    Error(RealtimeError),
    Reconnected,
}

/// Per-call state owned by the reader loop.
struct CallLeg {
    stream_sid: Option<String>,
    call_sid: Option<String>,
    /// Carrier sends bare μ-law binary frames instead of JSON `media` events.
    raw_audio: bool,
    provider: Option<BoxedRealtime>,
    /// Provider-format audio waiting for the provider to become ready.
    pending: VecDeque<Bytes>,
    awaiting_pong: bool,
    frames_in: u64,
    frames_out: u64,
}

impl CallLeg {
    fn new() -> Self {
        Self {
            stream_sid: None,
            call_sid: None,
            raw_audio: false,
            provider: None,
            pending: VecDeque::new(),
            awaiting_pong: false,
            frames_in: 0,
            frames_out: 0,
        }
    }

    /// Send provider-format audio, buffering it while the provider is not ready.
    async fn forward_audio(&mut self, audio: Bytes) {
        self.frames_in += 1;
        self.pending.push_back(audio);
        self.flush_pending().await;
    }

    /// Drain the buffer in order; stops at the first chunk the provider can't take yet.
    async fn flush_pending(&mut self) {
        let Some(provider) = self.provider.as_mut() else {
            return;
        };

        while let Some(chunk) = self.pending.front().cloned() {
            if !provider.is_ready() {
                break;
            }
            match provider.send_audio(chunk).await {
                Ok(()) => {
                    self.pending.pop_front();
                }
                Err(RealtimeError::NotConnected) => break,
                Err(e) => {
                    warn!(error = %e, "Dropping audio chunk the provider rejected");
                    self.pending.pop_front();
                }
            }
        }

        if !self.pending.is_empty() {
            debug!(buffered = self.pending.len(), "Buffering audio until provider is ready");
        }
    }

    fn carrier_audio(&mut self, pcm: &[u8]) -> CarrierRoute {
        self.frames_out += 1;
        let ulaw = provider_to_carrier(pcm);
        if self.raw_audio {
            CarrierRoute::Binary(Bytes::from(ulaw))
        } else {
            CarrierRoute::Json(OutboundMessage::media(
                self.stream_sid.clone(),
                BASE64.encode(ulaw),
            ))
        }
    }

    /// Handle one carrier message. Returns `false` when the call is over.
    async fn handle_carrier_message(&mut self, msg: Message) -> bool {
        match msg {
            Message::Text(text) => {
                let event = match serde_json::from_str::<InboundMessage>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Failed to parse carrier message");
                        return true;
                    }
                };
                self.handle_inbound(event).await
            }
            Message::Binary(data) => {
                if !self.raw_audio {
                    debug!("Carrier is sending raw binary audio");
                    self.raw_audio = true;
                }
                self.forward_audio(Bytes::from(carrier_to_provider(&data))).await;
                true
            }
            Message::Pong(_) => {
                self.awaiting_pong = false;
                true
            }
            Message::Ping(_) => true,
            Message::Close(frame) => {
                info!(?frame, "Carrier closed the media stream");
                false
            }
        }
    }

    async fn handle_inbound(&mut self, event: InboundMessage) -> bool {
        match event {
            InboundMessage::Connected { protocol } => {
                info!(?protocol, "Media stream connected");
            }
            InboundMessage::Start { stream_sid, start } => {
                self.stream_sid = stream_sid.or(start.stream_sid);
                self.call_sid = start.call_sid;
                info!(
                    stream_sid = ?self.stream_sid,
                    call_sid = ?self.call_sid,
                    "Media stream started"
                );
            }
            InboundMessage::Media { media } => match BASE64.decode(media.payload.as_bytes()) {
                Ok(ulaw) => self.forward_audio(Bytes::from(carrier_to_provider(&ulaw))).await,
                Err(e) => warn!(error = %e, "Invalid media payload"),
            },
            InboundMessage::Mark { mark } => debug!(name = %mark.name, "Mark received"),
            InboundMessage::Dtmf { dtmf } => info!(digit = %dtmf.digit, "DTMF received"),
            InboundMessage::Stop => {
                info!(call_sid = ?self.call_sid, "Media stream stopped");
                return false;
            }
            InboundMessage::Unknown => debug!("Ignoring unknown media stream event"),
        }
        true
    }
}

/// Create the provider, wire its callbacks into `events`, and connect.
async fn connect_provider(
    factory: Arc<dyn ProviderFactory>,
    events: mpsc::UnboundedSender<ProviderEvent>,
) -> Result<BoxedRealtime, BridgeError> {
    let mut provider = factory.create().await?;

    let audio_tx = events.clone();
    provider.on_audio(Arc::new(move |audio: RealtimeAudioData| {
        let tx = audio_tx.clone();
        Box::pin(async move {
            let _ = tx.send(ProviderEvent::Audio(audio.data));
        })
    }))?;

    let error_tx = events.clone();
    provider.on_error(Arc::new(move |e: RealtimeError| {
        let tx = error_tx.clone();
        Box::pin(async move {
            let _ = tx.send(ProviderEvent::Error(e));
        })
    }))?;

    provider.on_reconnection(Arc::new(move |event: ReconnectionEvent| {
        let tx = events.clone();
        Box::pin(async move {
            if event.success {
                let _ = tx.send(ProviderEvent::Reconnected);
            } else {
                warn!(attempt = event.attempt, error = ?event.error, "Provider reconnection attempt failed");
            }
        })
    }))?;

    provider.connect().await?;
    Ok(provider)
}

/// Relay one carrier media stream to a provider until either side ends.
pub async fn run_bridge(socket: WebSocket, factory: Arc<dyn ProviderFactory>, config: BridgeConfig) {
    let bridge_id = uuid::Uuid::new_v4().to_string();
    info!(%bridge_id, "Call bridge started");

    let (mut sender, mut receiver) = socket.split();
    let (carrier_tx, mut carrier_rx) = mpsc::channel::<CarrierRoute>(CHANNEL_BUFFER_SIZE);

    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = carrier_rx.recv().await {
            let should_close = matches!(route, CarrierRoute::Close);

            let result = match route {
                CarrierRoute::Json(message) => match serde_json::to_string(&message) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to serialize carrier message: {}", e);
                        continue;
                    }
                },
                CarrierRoute::Binary(data) => sender.send(Message::Binary(data)).await,
                CarrierRoute::Ping => sender.send(Message::Ping(Bytes::new())).await,
                CarrierRoute::Close => sender.send(Message::Close(None)).await,
            };

            if let Err(e) = result {
                debug!("Failed to send to carrier: {}", e);
                break;
            }
            if should_close {
                break;
            }
        }
    });

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ProviderEvent>();
    let (provider_tx, mut provider_rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = provider_tx.send(connect_provider(factory, events_tx).await);
    });
    let mut provider_pending = true;

    let mut keepalive = tokio::time::interval_at(
        Instant::now() + config.keepalive_interval,
        config.keepalive_interval,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut leg = CallLeg::new();

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(msg)) => {
                    if !leg.handle_carrier_message(msg).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("Carrier WebSocket error: {}", e);
                    break;
                }
                None => {
                    info!("Carrier WebSocket closed");
                    break;
                }
            },

            result = &mut provider_rx, if provider_pending => {
                provider_pending = false;
                match result {
                    Ok(Ok(provider)) => {
                        info!(buffered = leg.pending.len(), "Provider connected");
                        leg.provider = Some(provider);
                        leg.flush_pending().await;
                    }
                    Ok(Err(e)) => {
                        error!(error = %e, "Failed to connect provider");
                        break;
                    }
                    Err(_) => {
                        error!("Provider connection task ended unexpectedly");
                        break;
                    }
                }
            }

            Some(event) = events_rx.recv() => match event {
                ProviderEvent::Audio(pcm) => {
                    let route = leg.carrier_audio(&pcm);
                    if carrier_tx.send(route).await.is_err() {
                        break;
                    }
                }
                ProviderEvent::Error(e) if e.is_terminal() => {
                    error!(error = %e, "Provider connection lost");
                    break;
                }
                ProviderEvent::Error(e) => warn!(error = %e, "Provider error"),
                ProviderEvent::Reconnected => {
                    info!(buffered = leg.pending.len(), "Provider reconnected");
                    leg.flush_pending().await;
                }
            },

            _ = keepalive.tick() => {
                if leg.awaiting_pong {
                    warn!(call_sid = ?leg.call_sid, "Carrier missed keepalive, terminating");
                    break;
                }
                leg.awaiting_pong = true;
                if carrier_tx.send(CarrierRoute::Ping).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(mut provider) = leg.provider.take() {
        if let Err(e) = provider.disconnect().await {
            warn!(error = %e, "Failed to disconnect provider");
        }
    } else if provider_pending {
        // Connection still in flight; close it once it lands.
        tokio::spawn(async move {
            if let Ok(Ok(mut provider)) = provider_rx.await {
                let _ = provider.disconnect().await;
            }
        });
    }

    let _ = carrier_tx.send(CarrierRoute::Close).await;
    drop(carrier_tx);
    if tokio::time::timeout(Duration::from_secs(1), &mut sender_task)
        .await
        .is_err()
    {
        sender_task.abort();
    }

    info!(
        %bridge_id,
        call_sid = ?leg.call_sid,
        frames_in = leg.frames_in,
        frames_out = leg.frames_out,
        dropped = leg.pending.len(),
        "Call bridge closed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::{
        AudioOutputCallback, BaseRealtime, ConnectionState, RealtimeErrorCallback,
        ReconnectionCallback, TextDeltaCallback,
    };
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingProvider {
        ready: Arc<AtomicBool>,
        sent: Arc<parking_lot::Mutex<Vec<Bytes>>>,
    }

    #[async_trait]
    impl BaseRealtime for RecordingProvider {
        async fn connect(&mut self) -> Result<(), RealtimeError> {
            self.ready.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn disconnect(&mut self) -> Result<(), RealtimeError> {
            self.ready.store(false, Ordering::SeqCst);
            Ok(())
        }
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }
        fn get_connection_state(&self) -> ConnectionState {
            ConnectionState::Connected
        }
        async fn send_audio(&mut self, audio_data: Bytes) -> Result<(), RealtimeError> {
            if !self.is_ready() {
                return Err(RealtimeError::NotConnected);
            }
            self.sent.lock().push(audio_data);
            Ok(())
        }
        fn on_audio(&mut self, _: AudioOutputCallback) -> Result<(), RealtimeError> {
            Ok(())
        }
        fn on_text_delta(&mut self, _: TextDeltaCallback) -> Result<(), RealtimeError> {
            Ok(())
        }
        fn on_error(&mut self, _: RealtimeErrorCallback) -> Result<(), RealtimeError> {
            Ok(())
        }
        fn on_reconnection(&mut self, _: ReconnectionCallback) -> Result<(), RealtimeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_audio_buffered_until_provider_and_flushed_in_order() {
        let provider = RecordingProvider::default();
        let ready = provider.ready.clone();
        let sent = provider.sent.clone();

        let mut leg = CallLeg::new();
        leg.forward_audio(Bytes::from_static(b"one")).await;
        leg.forward_audio(Bytes::from_static(b"two")).await;
        assert_eq!(leg.pending.len(), 2);

        let mut boxed: BoxedRealtime = Box::new(provider);
        boxed.connect().await.unwrap();
        leg.provider = Some(boxed);
        leg.flush_pending().await;
        leg.forward_audio(Bytes::from_static(b"three")).await;

        assert!(ready.load(Ordering::SeqCst));
        assert!(leg.pending.is_empty());
        assert_eq!(
            *sent.lock(),
            vec![
                Bytes::from_static(b"one"),
                Bytes::from_static(b"two"),
                Bytes::from_static(b"three"),
            ]
        );
    }

    #[tokio::test]
    async fn test_audio_rebuffered_while_provider_reconnecting() {
        let provider = RecordingProvider::default();
        let ready = provider.ready.clone();
        let sent = provider.sent.clone();

        let mut leg = CallLeg::new();
        leg.provider = Some(Box::new(provider));
        ready.store(true, Ordering::SeqCst);
        leg.forward_audio(Bytes::from_static(b"a")).await;

        ready.store(false, Ordering::SeqCst);
        leg.forward_audio(Bytes::from_static(b"b")).await;
        assert_eq!(leg.pending.len(), 1);

        ready.store(true, Ordering::SeqCst);
        leg.flush_pending().await;
        assert_eq!(sent.lock().len(), 2);
        assert_eq!(sent.lock()[1], Bytes::from_static(b"b"));
    }

    #[tokio::test]
    async fn test_start_and_stop_events() {
        let mut leg = CallLeg::new();
        let start = r#"{"event":"start","streamSid":"MZ9","start":{"callSid":"CA9","tracks":["inbound"]}}"#;
        assert!(leg.handle_carrier_message(Message::Text(start.into())).await);
        assert_eq!(leg.stream_sid.as_deref(), Some("MZ9"));
        assert_eq!(leg.call_sid.as_deref(), Some("CA9"));

        assert!(leg.handle_carrier_message(Message::Text("garbage".into())).await);
        assert!(!leg.handle_carrier_message(Message::Text(r#"{"event":"stop"}"#.into())).await);
    }

    #[tokio::test]
    async fn test_pong_clears_keepalive_flag() {
        let mut leg = CallLeg::new();
        leg.awaiting_pong = true;
        assert!(leg.handle_carrier_message(Message::Pong(Bytes::new())).await);
        assert!(!leg.awaiting_pong);
    }

    #[test]
    fn test_provider_audio_routed_by_carrier_mode() {
        let mut leg = CallLeg::new();
        leg.stream_sid = Some("MZ1".to_string());
        let pcm = vec![0u8; 960];

        match leg.carrier_audio(&pcm) {
            CarrierRoute::Json(OutboundMessage::Media { stream_sid, media }) => {
                assert_eq!(stream_sid.as_deref(), Some("MZ1"));
                assert_eq!(BASE64.decode(media.payload).unwrap().len(), 160);
            }
            _ => panic!("expected JSON media"),
        }

        leg.raw_audio = true;
        match leg.carrier_audio(&pcm) {
            CarrierRoute::Binary(data) => assert_eq!(data.len(), 160),
            _ => panic!("expected binary audio"),
        }
    }
}
