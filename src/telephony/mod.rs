//! Twilio telephony: call control documents, the REST client, the Media
//! Streams protocol and the call bridge to the realtime provider.

pub mod bridge;
pub mod media;
pub mod twilio;
pub mod twiml;

pub use bridge::{BridgeConfig, BridgeError, OpenAIProviderFactory, ProviderFactory, run_bridge};
pub use media::{InboundMessage, OutboundMessage};
pub use twilio::{CallInstructions, CallResource, CreateCall, TwilioClient, TwilioError};
pub use twiml::{Stream, VoiceResponse, provider_call_document, voice_webhook_document};

/// Status callback events requested for calls placed through `/callback`.
pub const CALLBACK_STATUS_EVENTS: &[&str] = &["initiated", "ringing", "answered", "completed"];

/// Status callback events requested for provider-streamed calls.
pub const PROVIDER_CALL_STATUS_EVENTS: &[&str] =
    &["completed", "failed", "answered", "ringing", "in-progress"];

/// Accepts E.164 numbers: `+` followed by 8 to 15 digits.
pub fn validate_phone_number(number: &str) -> Result<&str, String> {
    let number = number.trim();
    let Some(digits) = number.strip_prefix('+') else {
        return Err(format!("Invalid phone number '{number}': must start with '+'"));
    };
    if !(8..=15).contains(&digits.len()) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!(
            "Invalid phone number '{number}': expected 8 to 15 digits after '+'"
        ));
    }
    Ok(number)
}
