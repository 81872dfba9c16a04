//! OpenAI Realtime API WebSocket events.
//!
//! Client events sent by the gateway:
//! - session.update
//! - input_audio_buffer.append
//!
//! Server events the gateway reacts to:
//! - error
//! - session.created / session.updated
//! - response.text.delta
//! - response.audio.delta
//! - response.done
//!
//! Any other server event type deserializes to [`ServerEvent::Other`].

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::openai::{SessionSettings, TurnDetectionMode};

// =============================================================================
// Session Configuration
// =============================================================================

/// Body of a `session.update` event.
#[derive(Debug, Clone, Serialize)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,
    /// `null` disables turn detection on the provider.
    pub turn_detection: TurnDetectionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl From<&SessionSettings> for SessionConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            modalities: Some(settings.modalities.clone()),
            instructions: settings.instructions.clone(),
            voice: Some(settings.voice.clone()),
            input_audio_format: settings.input_audio_format.clone(),
            output_audio_format: settings.output_audio_format.clone(),
            turn_detection: settings.turn_detection,
            temperature: settings.temperature,
        }
    }
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },

    /// Append audio to input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio data
        audio: String,
    },
}

impl ClientEvent {
    /// Create an audio append event from raw bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error { error: ApiError },

    #[serde(rename = "session.created")]
    SessionCreated { session: SessionInfo },

    #[serde(rename = "session.updated")]
    SessionUpdated { session: SessionInfo },

    #[serde(rename = "response.text.delta")]
    TextDelta {
        #[serde(default)]
        response_id: Option<String>,
        delta: String,
    },

    /// Base64 PCM16 chunk
    #[serde(rename = "response.audio.delta")]
    AudioDelta {
        #[serde(default)]
        response_id: Option<String>,
        #[serde(default)]
        item_id: Option<String>,
        delta: String,
    },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: Option<serde_json::Value>,
    },

    #[serde(other)]
    Other,
}

impl ServerEvent {
    /// Decode base64 audio from an AudioDelta event.
    pub fn decode_audio_delta(delta: &str) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64_STANDARD.decode(delta)
    }
}

/// API error information.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
}
