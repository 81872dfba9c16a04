//! Base traits and types for realtime audio-to-audio providers.
//!
//! A realtime provider accepts PCM16 audio over a long-lived WebSocket and
//! streams synthesized audio and text back through registered callbacks.
//! The telephony bridge drives providers through [`BaseRealtime`] only.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::core::openai::SessionSettings;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed or was lost for good
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No session token was supplied
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Error event reported by the provider
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Not connected")]
    NotConnected,
}

impl RealtimeError {
    /// Whether the provider connection is gone and will not come back.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RealtimeError::ConnectionFailed(_))
    }
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Automatic reconnection behavior after the provider socket drops.
///
/// The attempt counter covers the whole session: a socket that drops,
/// reconnects and drops again keeps counting from where it left off.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectionConfig {
    pub enabled: bool,
    /// Attempts allowed per session. Zero means no limit.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Spread each delay by up to a quarter in either direction.
    pub jitter: bool,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectionConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Default backoff with a fixed attempt budget. Zero disables reconnection.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        if max_attempts == 0 {
            return Self::disabled();
        }
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Whether another attempt may follow `attempts_made` earlier ones.
    pub fn allows_attempt(&self, attempts_made: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempts_made < self.max_attempts)
    }

    /// Wait before the given attempt (1-based), capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());

        let secs = if self.jitter {
            capped * (1.0 + jitter_factor() * 0.25)
        } else {
            capped
        };
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Value in `-1.0..1.0` derived from the clock's sub-second nanos.
fn jitter_factor() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default() as u64;
    let mixed = nanos.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407) >> 33;
    (mixed as f64 / (1u64 << 31) as f64) * 2.0 - 1.0
}

/// Produces a fresh bearer credential for a reconnection attempt.
pub type TokenRefresher =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = RealtimeResult<String>> + Send>> + Send + Sync>;

/// Connection parameters for a realtime provider.
#[derive(Clone)]
pub struct RealtimeConfig {
    /// Bearer credential: a short-lived session token or the account key.
    pub token: String,
    /// WebSocket endpoint without the `model` query parameter.
    pub url: String,
    /// Session settings sent as the initial `session.update`.
    pub settings: SessionSettings,
    pub reconnection: ReconnectionConfig,
    /// Called before every reconnection attempt. Without one, reconnects
    /// reuse `token`, which only works for long-lived keys.
    pub token_refresher: Option<TokenRefresher>,
}

impl fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .field("settings", &self.settings)
            .field("reconnection", &self.reconnection)
            .field("token_refresher", &self.token_refresher.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Connection State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Callback Types
// =============================================================================

/// Audio chunk from the provider.
#[derive(Debug, Clone)]
pub struct RealtimeAudioData {
    /// Raw audio bytes (PCM 16-bit, 24kHz, mono, little-endian)
    pub data: Bytes,
    pub sample_rate: u32,
    pub item_id: Option<String>,
    pub response_id: Option<String>,
}

/// Reconnection event details.
#[derive(Debug, Clone)]
pub struct ReconnectionEvent {
    pub attempt: u32,
    pub success: bool,
    pub error: Option<String>,
}

pub type AudioOutputCallback =
    Arc<dyn Fn(RealtimeAudioData) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Called with each `response.text.delta` fragment.
pub type TextDeltaCallback =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub type RealtimeErrorCallback =
    Arc<dyn Fn(RealtimeError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub type ReconnectionCallback =
    Arc<dyn Fn(ReconnectionEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

// =============================================================================
// Base Trait
// =============================================================================

/// Bidirectional audio streaming with a realtime model.
///
/// Input and output audio is PCM 16-bit signed little-endian at 24kHz.
/// Callbacks should be registered before [`connect`](Self::connect) so no
/// early provider event is dropped.
#[async_trait]
pub trait BaseRealtime: Send + Sync {
    /// Open the provider socket and send the initial session configuration.
    async fn connect(&mut self) -> RealtimeResult<()>;

    /// Close the provider socket without triggering reconnection.
    async fn disconnect(&mut self) -> RealtimeResult<()>;

    fn is_ready(&self) -> bool;

    fn get_connection_state(&self) -> ConnectionState;

    /// Append audio to the provider's input buffer.
    async fn send_audio(&mut self, audio_data: Bytes) -> RealtimeResult<()>;

    fn on_audio(&mut self, callback: AudioOutputCallback) -> RealtimeResult<()>;

    fn on_text_delta(&mut self, callback: TextDeltaCallback) -> RealtimeResult<()>;

    /// Error callback. A [`RealtimeError::is_terminal`] error means the
    /// reconnection budget is spent and the session is over.
    fn on_error(&mut self, callback: RealtimeErrorCallback) -> RealtimeResult<()>;

    fn on_reconnection(&mut self, callback: ReconnectionCallback) -> RealtimeResult<()>;
}

/// Boxed trait object for realtime providers.
pub type BoxedRealtime = Box<dyn BaseRealtime>;
