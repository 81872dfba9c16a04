use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3000
///   tls:
///     cert_path: "/etc/callbridge/cert.pem"
///     key_path: "/etc/callbridge/key.pem"
///
/// openai:
///   api_key: "sk-..."
///   api_base_url: "https://api.openai.com/v1"
///   realtime_url: "wss://api.openai.com/v1/realtime"
///   realtime_model: "gpt-4o-realtime-preview-2024-12-17"
///   realtime_voice: "alloy"
///   chat_model: "gpt-4o"
///
/// twilio:
///   account_sid: "AC..."
///   auth_token: "..."
///   phone_number: "+15550001111"
///   api_base_url: "https://api.twilio.com"
///   base_url: "https://calls.example.com"
///   public_host: "calls.example.com"
///
/// realtime:
///   ice_gathering_timeout_seconds: 10
///   max_provider_reconnects: 3
///   keepalive_interval_seconds: 5
///
/// security:
///   cors_allowed_origins: "https://example.com,https://app.example.com"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 1000
///   max_connections_per_ip: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub openai: Option<OpenAIYaml>,
    pub twilio: Option<TwilioYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub realtime_url: Option<String>,
    pub realtime_model: Option<String>,
    pub realtime_voice: Option<String>,
    pub chat_model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TwilioYaml {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub phone_number: Option<String>,
    pub api_base_url: Option<String>,
    /// Public base URL for webhooks
    pub base_url: Option<String>,
    pub public_host: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub ice_gathering_timeout_seconds: Option<u64>,
    pub max_provider_reconnects: Option<u32>,
    pub keepalive_interval_seconds: Option<u64>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
    /// Maximum concurrent WebSocket connections
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;

        let config: YamlConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}
