//! OpenAI Realtime API over WebSocket.
//!
//! Audio in both directions is PCM 16-bit signed little-endian at 24kHz,
//! base64 encoded inside JSON events.

mod client;
mod config;
mod messages;

pub use client::OpenAIRealtime;
pub use config::{
    OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL, OpenAIRealtimeVoice, realtime_ws_url,
};
pub use messages::{ApiError, ClientEvent, ServerEvent, SessionConfig, SessionInfo};
