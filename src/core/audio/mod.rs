//! Audio conversion between the telephony leg and the realtime provider leg.
//!
//! - Carrier: G.711 μ-law, 8 kHz, mono
//! - Provider: PCM 16-bit signed little-endian, 24 kHz, mono

pub mod g711;
pub mod resample;

pub use g711::{linear_to_ulaw, ulaw_decode, ulaw_encode, ulaw_to_linear};
pub use resample::{pcm16_from_le_bytes, pcm16_to_le_bytes, resample_linear};

/// Sample rate of carrier media streams.
pub const CARRIER_SAMPLE_RATE: u32 = 8000;

/// Sample rate of the provider's PCM16 audio.
pub const PROVIDER_SAMPLE_RATE: u32 = crate::core::realtime::openai::OPENAI_REALTIME_SAMPLE_RATE;

/// μ-law 8 kHz from the carrier to PCM16 LE bytes at the provider rate.
pub fn carrier_to_provider(ulaw: &[u8]) -> Vec<u8> {
    let samples = ulaw_decode(ulaw);
    let resampled = resample_linear(&samples, CARRIER_SAMPLE_RATE, PROVIDER_SAMPLE_RATE);
    pcm16_to_le_bytes(&resampled)
}

/// PCM16 LE bytes at the provider rate to μ-law 8 kHz for the carrier.
pub fn provider_to_carrier(pcm: &[u8]) -> Vec<u8> {
    let samples = pcm16_from_le_bytes(pcm);
    let resampled = resample_linear(&samples, PROVIDER_SAMPLE_RATE, CARRIER_SAMPLE_RATE);
    ulaw_encode(&resampled)
}
