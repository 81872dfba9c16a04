use bytes::Bytes;
use serde::Serialize;

use super::client::OpenAIClient;
use super::error::{OpenAIError, OpenAIResult};

/// Speech model used for text-to-speech replies.
pub const SPEECH_MODEL: &str = "tts-1";

/// Voices accepted by the speech endpoint.
pub const SPEECH_VOICES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

impl OpenAIClient {
    /// Synthesize `text` and return MP3 bytes.
    ///
    /// Unknown voices fall back to `alloy`.
    pub async fn synthesize_speech(&self, text: &str, voice: Option<&str>) -> OpenAIResult<Bytes> {
        let voice = voice
            .filter(|v| SPEECH_VOICES.contains(v))
            .unwrap_or("alloy");

        let response = self
            .post("audio/speech")
            .json(&SpeechRequest {
                model: SPEECH_MODEL,
                voice,
                input: text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenAIError::from_body(status.as_u16(), &body));
        }

        let audio = response.bytes().await?;
        tracing::debug!(voice, bytes = audio.len(), "Speech synthesized");
        Ok(audio)
    }
}
