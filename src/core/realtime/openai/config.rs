//! OpenAI Realtime API endpoint, voices and audio formats.

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Sample rate of `pcm16` audio on the Realtime API.
pub const OPENAI_REALTIME_SAMPLE_RATE: u32 = 24000;

/// Append the `model` query parameter to a realtime endpoint.
pub fn realtime_ws_url(base: &str, model: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}model={model}")
}

/// Voices accepted by the Realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenAIRealtimeVoice {
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
}

const VOICE_NAMES: [(OpenAIRealtimeVoice, &str); 8] = [
    (OpenAIRealtimeVoice::Alloy, "alloy"),
    (OpenAIRealtimeVoice::Ash, "ash"),
    (OpenAIRealtimeVoice::Ballad, "ballad"),
    (OpenAIRealtimeVoice::Coral, "coral"),
    (OpenAIRealtimeVoice::Echo, "echo"),
    (OpenAIRealtimeVoice::Sage, "sage"),
    (OpenAIRealtimeVoice::Shimmer, "shimmer"),
    (OpenAIRealtimeVoice::Verse, "verse"),
];

impl OpenAIRealtimeVoice {
    pub fn as_str(&self) -> &'static str {
        VOICE_NAMES
            .iter()
            .find(|(voice, _)| voice == self)
            .map(|(_, name)| *name)
            .unwrap_or("alloy")
    }

    /// Case-insensitive lookup; unknown names fall back to `alloy`.
    pub fn from_name(name: &str) -> Self {
        VOICE_NAMES
            .iter()
            .find(|(_, known)| known.eq_ignore_ascii_case(name.trim()))
            .map(|(voice, _)| *voice)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for OpenAIRealtimeVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
