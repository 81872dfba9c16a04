use std::fmt;

use serde::{Deserialize, Serialize};

/// Peer connection state as reported by the WebRTC stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerState::New => "new",
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
            PeerState::Disconnected => "disconnected",
            PeerState::Failed => "failed",
            PeerState::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(PeerState::New),
            "connecting" => Some(PeerState::Connecting),
            "connected" => Some(PeerState::Connected),
            "disconnected" => Some(PeerState::Disconnected),
            "failed" => Some(PeerState::Failed),
            "closed" => Some(PeerState::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status line shown to the user for a peer state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// The session is live.
    Active(String),
    /// The session must be stopped and its resources released.
    Ended(String),
    /// Any intermediate state.
    Progress(String),
}

impl SessionStatus {
    pub fn message(&self) -> &str {
        match self {
            SessionStatus::Active(m) | SessionStatus::Ended(m) | SessionStatus::Progress(m) => m,
        }
    }

    pub fn should_stop(&self) -> bool {
        matches!(self, SessionStatus::Ended(_))
    }
}

impl From<PeerState> for SessionStatus {
    fn from(state: PeerState) -> Self {
        match state {
            PeerState::Connected => SessionStatus::Active("Connected! Start speaking...".to_string()),
            PeerState::Failed | PeerState::Closed => {
                SessionStatus::Ended(format!("Connection {state}"))
            }
            other => SessionStatus::Progress(format!("Connection state: {other}")),
        }
    }
}
