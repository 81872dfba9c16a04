//! Twilio Media Streams WebSocket messages.

use serde::{Deserialize, Serialize};

/// Metadata sent once in the `start` event.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    #[serde(default)]
    pub stream_sid: Option<String>,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    /// Base64 μ-law 8 kHz audio.
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DtmfPayload {
    #[serde(default)]
    pub digit: String,
}

/// Messages received from the carrier.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InboundMessage {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        start: StreamStart,
    },
    Media {
        media: MediaPayload,
    },
    Mark {
        mark: MarkPayload,
    },
    Dtmf {
        dtmf: DtmfPayload,
    },
    Stop,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutboundMedia {
    pub payload: String,
}

/// Messages sent back to the carrier.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundMessage {
    Media {
        #[serde(rename = "streamSid", skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        media: OutboundMedia,
    },
    Mark {
        #[serde(rename = "streamSid", skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        mark: MarkPayload,
    },
    /// Drop audio queued on the carrier side.
    Clear {
        #[serde(rename = "streamSid", skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
    },
}

impl OutboundMessage {
    pub fn media(stream_sid: Option<String>, payload: String) -> Self {
        OutboundMessage::Media {
            stream_sid,
            media: OutboundMedia { payload },
        }
    }
}
