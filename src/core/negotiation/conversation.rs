//! Conversation display model fed by data-channel events.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub speaker: Speaker,
    pub text: String,
    /// A user transcript still being spoken.
    pub partial: bool,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Events carried on the `events` data channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum DataChannelEvent {
    #[serde(rename = "transcript.partial")]
    TranscriptPartial {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "transcript.final")]
    TranscriptFinal {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "response.text.start")]
    ResponseTextStart,
    #[serde(rename = "response.text.delta")]
    ResponseTextDelta {
        #[serde(default)]
        delta: String,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<ErrorBody>,
    },
    #[serde(other)]
    Unknown,
}

/// Ordered conversation lines.
#[derive(Debug, Default, Clone)]
pub struct ConversationLog {
    entries: Vec<LogEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn push_system(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.push(Speaker::System, text, false);
    }

    /// Parse and apply a raw data-channel message. On a parse error the log is unchanged.
    pub fn apply_json(&mut self, raw: &str) -> Result<(), serde_json::Error> {
        match serde_json::from_str::<DataChannelEvent>(raw) {
            Ok(event) => {
                self.apply(event);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse data channel message");
                Err(e)
            }
        }
    }

    pub fn apply(&mut self, event: DataChannelEvent) {
        match event {
            DataChannelEvent::TranscriptPartial { text } => match self.partial_mut() {
                Some(entry) => entry.text = text,
                None => self.push(Speaker::User, text, true),
            },
            DataChannelEvent::TranscriptFinal { text } => match self.partial_mut() {
                Some(entry) => {
                    entry.text = text;
                    entry.partial = false;
                }
                None => self.push(Speaker::User, text, false),
            },
            DataChannelEvent::ResponseTextStart => self.push(Speaker::Assistant, String::new(), false),
            DataChannelEvent::ResponseTextDelta { delta } => {
                // Only extends a reply that is still the newest line.
                if let Some(entry) = self.entries.last_mut()
                    && entry.speaker == Speaker::Assistant
                {
                    entry.text.push_str(&delta);
                }
            }
            DataChannelEvent::Error { message, error } => {
                let message = message
                    .or_else(|| error.and_then(|e| e.message))
                    .unwrap_or_default();
                self.push_system(format!("Error: {message}"));
            }
            DataChannelEvent::Unknown => {}
        }
    }

    fn partial_mut(&mut self) -> Option<&mut LogEntry> {
        self.entries
            .iter_mut()
            .rev()
            .find(|e| e.speaker == Speaker::User && e.partial)
    }

    fn push(&mut self, speaker: Speaker, text: String, partial: bool) {
        self.entries.push(LogEntry {
            speaker,
            text,
            partial,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(log: &ConversationLog) -> Vec<(Speaker, &str, bool)> {
        log.entries()
            .iter()
            .map(|e| (e.speaker, e.text.as_str(), e.partial))
            .collect()
    }

    #[test]
    fn test_partial_then_final_keeps_single_line() {
        let mut log = ConversationLog::new();
        log.apply_json(r#"{"type":"transcript.partial","text":"hel"}"#).unwrap();
        log.apply_json(r#"{"type":"transcript.partial","text":"hello th"}"#).unwrap();
        assert_eq!(texts(&log), vec![(Speaker::User, "hello th", true)]);

        log.apply_json(r#"{"type":"transcript.final","text":"hello there"}"#).unwrap();
        assert_eq!(texts(&log), vec![(Speaker::User, "hello there", false)]);

        log.apply_json(r#"{"type":"transcript.partial","text":"next"}"#).unwrap();
        assert_eq!(log.entries().len(), 2);
    }

    #[test]
    fn test_deltas_append_to_last_assistant_line() {
        let mut log = ConversationLog::new();
        log.apply_json(r#"{"type":"response.text.start"}"#).unwrap();
        log.apply_json(r#"{"type":"response.text.delta","delta":"Hi"}"#).unwrap();
        log.apply_json(r#"{"type":"response.text.delta","delta":" there"}"#).unwrap();

        assert_eq!(texts(&log), vec![(Speaker::Assistant, "Hi there", false)]);
    }

    #[test]
    fn test_delta_after_other_line_is_dropped() {
        let mut log = ConversationLog::new();
        log.apply_json(r#"{"type":"response.text.start"}"#).unwrap();
        log.apply_json(r#"{"type":"response.text.delta","delta":"Hi"}"#).unwrap();
        log.apply_json(r#"{"type":"error","message":"rate limited"}"#).unwrap();
        log.apply_json(r#"{"type":"response.text.delta","delta":" later"}"#).unwrap();

        assert_eq!(
            texts(&log),
            vec![
                (Speaker::Assistant, "Hi", false),
                (Speaker::System, "Error: rate limited", false),
            ]
        );
    }

    #[test]
    fn test_delta_without_assistant_line_is_dropped() {
        let mut log = ConversationLog::new();
        log.apply_json(r#"{"type":"response.text.delta","delta":"orphan"}"#).unwrap();
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_error_and_unknown_events() {
        let mut log = ConversationLog::new();
        log.apply_json(r#"{"type":"error","message":"rate limited"}"#).unwrap();
        log.apply_json(r#"{"type":"error","error":{"message":"bad audio"}}"#).unwrap();
        log.apply_json(r#"{"type":"session.created","session":{}}"#).unwrap();

        assert_eq!(
            texts(&log),
            vec![
                (Speaker::System, "Error: rate limited", false),
                (Speaker::System, "Error: bad audio", false),
            ]
        );
    }

    #[test]
    fn test_unparsable_message_is_reported_and_ignored() {
        let mut log = ConversationLog::new();
        assert!(log.apply_json("not json").is_err());
        assert!(log.entries().is_empty());
    }
}
