//! Realtime session handshake.
//!
//! [`negotiate`] drives the sequence a WebRTC client runs to reach the
//! realtime provider directly:
//!
//! 1. obtain a session descriptor and its short-lived token
//! 2. attach local audio
//! 3. open the ordered `events` data channel
//! 4. create the local offer and wait for ICE gathering (bounded)
//! 5. POST the offer SDP with the session token
//! 6. apply the remote answer
//!
//! The WebRTC stack sits behind [`PeerTransport`]; any failure after the
//! token is obtained closes the transport exactly once.

mod conversation;
mod status;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::openai::{OpenAIClient, OpenAIError, RealtimeSession, SdpExchange, SessionSettings};

pub use conversation::{ConversationLog, DataChannelEvent, ErrorBody, LogEntry, Speaker};
pub use status::{PeerState, SessionStatus};

/// Label of the side channel carrying JSON events.
pub const EVENTS_CHANNEL: &str = "events";

/// Default bound on ICE gathering.
pub const DEFAULT_ICE_GATHERING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("Failed to create session: {0}")]
    Session(String),

    #[error("Session descriptor did not include a client secret")]
    MissingToken,

    #[error("Failed to access microphone: {0}")]
    LocalAudio(String),

    #[error("Peer connection error: {0}")]
    Transport(String),

    #[error("ICE gathering timed out after {0:?}")]
    IceGatheringTimeout(Duration),

    #[error("Failed to connect to OpenAI: {0}")]
    SdpExchange(#[from] OpenAIError),
}

/// Error reported by a [`PeerTransport`] implementation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Local side of a WebRTC peer connection.
#[async_trait]
pub trait PeerTransport: Send {
    /// Acquire the microphone and add its track to the connection.
    async fn attach_local_audio(&mut self) -> Result<(), TransportError>;

    async fn open_data_channel(&mut self, label: &str, ordered: bool) -> Result<(), TransportError>;

    /// Create an offer and set it as the local description. Returns the offer SDP.
    async fn create_offer(&mut self) -> Result<String, TransportError>;

    /// Resolve once ICE gathering is complete (immediately if it already is).
    async fn ice_gathering_complete(&mut self) -> Result<(), TransportError>;

    /// Current local description, including gathered candidates.
    fn local_description(&self) -> Option<String>;

    async fn set_remote_answer(&mut self, sdp: &str) -> Result<(), TransportError>;

    /// Release audio tracks, the connection and the playback sink.
    async fn close(&mut self);
}

/// Where session descriptors come from.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn create_session(&self, settings: &SessionSettings) -> Result<RealtimeSession, NegotiationError>;
}

/// Server-side source: asks the provider directly with the account key.
#[async_trait]
impl TokenSource for OpenAIClient {
    async fn create_session(&self, settings: &SessionSettings) -> Result<RealtimeSession, NegotiationError> {
        self.create_realtime_session(settings)
            .await
            .map_err(|e| NegotiationError::Session(e.to_string()))
    }
}

/// Client-side source: asks a gateway's `POST /create-session` endpoint.
#[derive(Debug, Clone)]
pub struct GatewayTokenSource {
    http: reqwest::Client,
    endpoint: String,
}

impl GatewayTokenSource {
    pub fn new(http: reqwest::Client, gateway_url: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/create-session", gateway_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl TokenSource for GatewayTokenSource {
    async fn create_session(&self, settings: &SessionSettings) -> Result<RealtimeSession, NegotiationError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(settings)
            .send()
            .await
            .map_err(|e| NegotiationError::Session(e.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NegotiationError::Session(format!("Failed to parse session response: {e}")))?;

        if !status.is_success() {
            let message = body
                .pointer("/details/error/message")
                .or_else(|| body.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("Failed to create session");
            return Err(NegotiationError::Session(message.to_string()));
        }

        serde_json::from_value(body).map_err(|_| NegotiationError::MissingToken)
    }
}

#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    pub sdp: SdpExchange,
    pub ice_gathering_timeout: Duration,
}

/// Result of a successful handshake.
#[derive(Debug, Clone)]
pub struct NegotiatedSession {
    pub session: RealtimeSession,
    pub answer_sdp: String,
}

/// Run the handshake. On failure the transport has been closed.
pub async fn negotiate<T, S>(
    settings: &SessionSettings,
    token_source: &S,
    transport: &mut T,
    config: &NegotiationConfig,
) -> Result<NegotiatedSession, NegotiationError>
where
    T: PeerTransport + ?Sized,
    S: TokenSource + ?Sized,
{
    let session = token_source.create_session(settings).await?;
    if session.token().is_empty() {
        return Err(NegotiationError::MissingToken);
    }

    match connect_peer(settings, session.token(), transport, config).await {
        Ok(answer_sdp) => {
            tracing::info!(model = %settings.model, "Realtime peer connection negotiated");
            Ok(NegotiatedSession { session, answer_sdp })
        }
        Err(e) => {
            tracing::warn!(error = %e, "Negotiation failed, closing peer connection");
            transport.close().await;
            Err(e)
        }
    }
}

async fn connect_peer<T: PeerTransport + ?Sized>(
    settings: &SessionSettings,
    token: &str,
    transport: &mut T,
    config: &NegotiationConfig,
) -> Result<String, NegotiationError> {
    transport
        .attach_local_audio()
        .await
        .map_err(|e| NegotiationError::LocalAudio(e.0))?;

    transport
        .open_data_channel(EVENTS_CHANNEL, true)
        .await
        .map_err(|e| NegotiationError::Transport(e.0))?;

    let offer = transport
        .create_offer()
        .await
        .map_err(|e| NegotiationError::Transport(e.0))?;

    tokio::time::timeout(config.ice_gathering_timeout, transport.ice_gathering_complete())
        .await
        .map_err(|_| NegotiationError::IceGatheringTimeout(config.ice_gathering_timeout))?
        .map_err(|e| NegotiationError::Transport(e.0))?;

    let local_sdp = transport.local_description().unwrap_or(offer);
    let answer = config.sdp.exchange(token, &settings.model, &local_sdp).await?;

    transport
        .set_remote_answer(&answer)
        .await
        .map_err(|e| NegotiationError::Transport(e.0))?;

    Ok(answer)
}
