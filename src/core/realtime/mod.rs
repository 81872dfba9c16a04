//! Realtime audio-to-audio provider module.
//!
//! - `BaseRealtime` trait for provider abstraction
//! - Callback-based event handling
//! - OpenAI Realtime API client over `tokio-tungstenite`
//!
//! Providers exchange PCM 16-bit signed little-endian audio at 24kHz.

mod base;
pub mod openai;

pub use base::{
    AudioOutputCallback, BaseRealtime, BoxedRealtime, ConnectionState, RealtimeAudioData,
    RealtimeConfig, RealtimeError, RealtimeErrorCallback, RealtimeResult, ReconnectionCallback,
    ReconnectionConfig, ReconnectionEvent, TextDeltaCallback, TokenRefresher,
};
pub use openai::{
    OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL, OpenAIRealtime, OpenAIRealtimeVoice,
};
