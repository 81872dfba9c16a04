//! OpenAI REST clients: realtime sessions, SDP exchange, chat, assistants, speech.

mod assistants;
mod chat;
mod client;
mod error;
mod sdp;
mod sessions;
mod speech;

pub use assistants::{
    Assistant, AssistantRequest, AssistantTool, NO_RESPONSE, RunPolling, UNSUPPORTED_RESPONSE,
};
pub use chat::ChatMessage;
pub use client::OpenAIClient;
pub use error::{OpenAIError, OpenAIResult};
pub use sdp::SdpExchange;
pub use sessions::{ClientSecret, RealtimeSession, ServerVadParams, SessionSettings, TurnDetectionMode};
pub use speech::{SPEECH_MODEL, SPEECH_VOICES};
