//! Realtime session creation.
//!
//! `POST {base}/realtime/sessions` exchanges the server's secret key for a
//! short-lived session descriptor. The descriptor's `client_secret.value` is
//! the token a browser (or the telephony bridge) uses to talk to the realtime
//! endpoint directly.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::client::{OpenAIClient, REALTIME_BETA_HEADER, send_json};
use super::error::OpenAIResult;
use crate::config::DEFAULT_REALTIME_MODEL;

fn default_model() -> String {
    DEFAULT_REALTIME_MODEL.to_string()
}

fn default_modalities() -> Vec<String> {
    vec!["audio".to_string(), "text".to_string()]
}

fn default_voice() -> String {
    "alloy".to_string()
}

/// Voice-activity parameters used when server-side turn detection is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServerVadParams {
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
    pub create_response: bool,
}

impl Default for ServerVadParams {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
            create_response: true,
        }
    }
}

/// Turn detection choice for a session.
///
/// On the wire, `ServerVad` is `{"type": "server_vad", ...}` and `Disabled`
/// is `null`. Any other `type` value sent by a client (the browser UI sends
/// `"disabled"`) is read as `Disabled`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TurnDetectionMode {
    ServerVad(ServerVadParams),
    Disabled,
}

impl Default for TurnDetectionMode {
    fn default() -> Self {
        TurnDetectionMode::ServerVad(ServerVadParams::default())
    }
}

impl TurnDetectionMode {
    /// Map the UI radio choice to a mode: `voice-activity` enables server VAD.
    pub fn from_ui_choice(choice: &str, params: ServerVadParams) -> Self {
        if choice == "voice-activity" {
            TurnDetectionMode::ServerVad(params)
        } else {
            TurnDetectionMode::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, TurnDetectionMode::ServerVad(_))
    }
}

#[derive(Serialize, Deserialize)]
struct RawTurnDetection {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prefix_padding_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    silence_duration_ms: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    create_response: Option<bool>,
}

impl Serialize for TurnDetectionMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TurnDetectionMode::Disabled => serializer.serialize_none(),
            TurnDetectionMode::ServerVad(p) => RawTurnDetection {
                kind: Some("server_vad".to_string()),
                threshold: Some(p.threshold),
                prefix_padding_ms: Some(p.prefix_padding_ms),
                silence_duration_ms: Some(p.silence_duration_ms),
                create_response: Some(p.create_response),
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for TurnDetectionMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<RawTurnDetection>::deserialize(deserializer)?;
        Ok(match raw {
            Some(raw) if raw.kind.as_deref() == Some("server_vad") => {
                let defaults = ServerVadParams::default();
                TurnDetectionMode::ServerVad(ServerVadParams {
                    threshold: raw.threshold.unwrap_or(defaults.threshold),
                    prefix_padding_ms: raw.prefix_padding_ms.unwrap_or(defaults.prefix_padding_ms),
                    silence_duration_ms: raw
                        .silence_duration_ms
                        .unwrap_or(defaults.silence_duration_ms),
                    create_response: raw.create_response.unwrap_or(defaults.create_response),
                })
            }
            _ => TurnDetectionMode::Disabled,
        })
    }
}

/// User-chosen settings for a realtime session. Also the request body of
/// `POST /create-session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_modalities")]
    pub modalities: Vec<String>,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<String>,
    #[serde(default)]
    pub turn_detection: TurnDetectionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            modalities: default_modalities(),
            voice: default_voice(),
            instructions: None,
            input_audio_format: None,
            output_audio_format: None,
            turn_detection: TurnDetectionMode::default(),
            temperature: None,
        }
    }
}

impl SessionSettings {
    /// Settings used for phone calls: audio only, PCM16 both ways.
    pub fn for_telephony(model: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            modalities: vec!["audio".to_string()],
            voice: voice.into(),
            input_audio_format: Some("pcm16".to_string()),
            output_audio_format: Some("pcm16".to_string()),
            ..Self::default()
        }
    }
}

/// Short-lived credential inside a session descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSecret {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// Provider session descriptor. Unknown fields are kept and passed back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub client_secret: ClientSecret,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RealtimeSession {
    pub fn token(&self) -> &str {
        &self.client_secret.value
    }
}

impl OpenAIClient {
    /// Create a realtime session and return the provider's descriptor.
    pub async fn create_realtime_session(
        &self,
        settings: &SessionSettings,
    ) -> OpenAIResult<RealtimeSession> {
        tracing::debug!(model = %settings.model, voice = %settings.voice, "Creating realtime session");

        let request = self
            .post("realtime/sessions")
            .header(REALTIME_BETA_HEADER.0, REALTIME_BETA_HEADER.1)
            .json(settings);

        let session: RealtimeSession = send_json(request).await?;

        if session.client_secret.value.is_empty() {
            return Err(super::OpenAIError::InvalidResponse(
                "session descriptor has an empty client_secret".to_string(),
            ));
        }

        tracing::info!(session_id = ?session.id, "Realtime session created");
        Ok(session)
    }
}
