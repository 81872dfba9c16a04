//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `session` - Realtime session tokens and SDP exchange
//! - `chat` - Chat completion relay
//! - `assistants` - Assistant and speech relays
//! - `calls` - Outbound calls and status callbacks
//! - `voice` - TwiML webhook
//! - `stream` - Carrier media stream WebSocket
//! - `extract` - JSON body extractor with `AppError` rejections

pub mod api;
pub mod assistants;
pub mod calls;
pub mod chat;
pub mod extract;
pub mod session;
pub mod stream;
pub mod voice;

pub use stream::stream_handler;
