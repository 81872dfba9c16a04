pub mod audio;
pub mod negotiation;
pub mod openai;
pub mod realtime;

pub use negotiation::{
    ConversationLog, NegotiationConfig, NegotiationError, PeerState, PeerTransport,
    SessionStatus, TokenSource, negotiate,
};
pub use openai::{OpenAIClient, OpenAIError, SessionSettings};
pub use realtime::{BaseRealtime, BoxedRealtime, OpenAIRealtime, RealtimeConfig, RealtimeError};
