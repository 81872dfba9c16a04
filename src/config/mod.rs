//! Configuration module for the callbridge gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use callbridge_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use thiserror::Error;

mod env;
mod merge;
mod validation;
mod yaml;

/// Default OpenAI REST base URL.
pub const DEFAULT_OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Twilio REST base URL.
pub const DEFAULT_TWILIO_API_BASE_URL: &str = "https://api.twilio.com";

/// Default realtime model requested for new sessions.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// Default chat completions model.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("{0} is not configured")]
    Missing(&'static str),
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Borrowed Twilio account credentials.
#[derive(Debug, Clone, Copy)]
pub struct TwilioCredentials<'a> {
    pub account_sid: &'a str,
    pub auth_token: &'a str,
    pub phone_number: &'a str,
}

/// Server configuration
///
/// Secrets (OpenAI key, Twilio auth token) are zeroized when the config is dropped.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,

    // OpenAI
    pub openai_api_key: Option<String>,
    pub openai_api_base_url: String,
    pub openai_realtime_url: String,
    pub realtime_model: String,
    pub realtime_voice: String,
    pub chat_model: String,

    // Twilio
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_phone_number: Option<String>,
    pub twilio_api_base_url: String,

    /// Public https base URL used for Twilio webhooks (e.g. `https://calls.example.com`)
    pub base_url: Option<String>,
    /// Public host name used to build the `wss://<host>/stream` media URL.
    /// Falls back to the host of `base_url`.
    pub public_host: Option<String>,

    // Security settings
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: u32,
    pub rate_limit_burst_size: u32,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: u32,

    // Realtime behaviour
    pub ice_gathering_timeout_seconds: u64,
    pub max_provider_reconnects: u32,
    pub keepalive_interval_seconds: u64,
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut token) = self.twilio_auth_token {
            token.zeroize();
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            tls: None,
            openai_api_key: None,
            openai_api_base_url: DEFAULT_OPENAI_API_BASE_URL.to_string(),
            openai_realtime_url: crate::core::realtime::openai::OPENAI_REALTIME_URL.to_string(),
            realtime_model: DEFAULT_REALTIME_MODEL.to_string(),
            realtime_voice: "alloy".to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_phone_number: None,
            twilio_api_base_url: DEFAULT_TWILIO_API_BASE_URL.to_string(),
            base_url: None,
            public_host: None,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
            ice_gathering_timeout_seconds: 10,
            max_provider_reconnects: 3,
            keepalive_interval_seconds: 5,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and defaults).
    ///
    /// The `.env` file is loaded in `main.rs` before this is called.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// OpenAI secret key, or an error naming the missing setting.
    pub fn openai_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))
    }

    /// Twilio account credentials, all three values required.
    pub fn twilio_credentials(&self) -> Result<TwilioCredentials<'_>, ConfigError> {
        let account_sid = self
            .twilio_account_sid
            .as_deref()
            .ok_or(ConfigError::Missing("TWILIO_ACCOUNT_SID"))?;
        let auth_token = self
            .twilio_auth_token
            .as_deref()
            .ok_or(ConfigError::Missing("TWILIO_AUTH_TOKEN"))?;
        let phone_number = self
            .twilio_phone_number
            .as_deref()
            .ok_or(ConfigError::Missing("TWILIO_PHONE_NUMBER"))?;

        Ok(TwilioCredentials {
            account_sid,
            auth_token,
            phone_number,
        })
    }

    /// Public base URL without a trailing slash.
    pub fn public_base_url(&self) -> Result<&str, ConfigError> {
        self.base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::Missing("BASE_URL"))
    }

    /// Host name reachable by the carrier, from `public_host` or the host of `base_url`.
    pub fn public_stream_host(&self) -> Result<String, ConfigError> {
        if let Some(host) = self.public_host.as_deref().filter(|h| !h.is_empty()) {
            return Ok(host.to_string());
        }

        let base = self.public_base_url()?;
        let parsed = url::Url::parse(base).map_err(|_| ConfigError::InvalidValue {
            key: "BASE_URL",
            value: base.to_string(),
        })?;

        let host = parsed.host_str().ok_or(ConfigError::InvalidValue {
            key: "BASE_URL",
            value: base.to_string(),
        })?;

        Ok(match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// `wss://<public host>/stream`
    pub fn stream_url(&self) -> Result<String, ConfigError> {
        Ok(format!("wss://{}/stream", self.public_stream_host()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            for key in [
                "HOST",
                "PORT",
                "OPENAI_API_KEY",
                "OPENAI_API_BASE_URL",
                "REALTIME_MODEL",
                "TWILIO_ACCOUNT_SID",
                "TWILIO_AUTH_TOKEN",
                "TWILIO_PHONE_NUMBER",
                "BASE_URL",
                "PUBLIC_HOST",
                "MAX_PROVIDER_RECONNECTS",
                "ICE_GATHERING_TIMEOUT_SECONDS",
                "TLS_CERT_PATH",
                "TLS_KEY_PATH",
            ] {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_address_and_tls() {
        let mut config = ServerConfig::default();
        config.host = "127.0.0.1".to_string();
        config.port = 8080;
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert!(!config.is_tls_enabled());
    }

    #[test]
    fn test_openai_key_missing_and_empty() {
        let mut config = ServerConfig::default();
        assert!(matches!(
            config.openai_key(),
            Err(ConfigError::Missing("OPENAI_API_KEY"))
        ));

        config.openai_api_key = Some(String::new());
        assert!(config.openai_key().is_err());

        config.openai_api_key = Some("sk-test".to_string());
        assert_eq!(config.openai_key().unwrap(), "sk-test");
    }

    #[test]
    fn test_twilio_credentials_require_all_fields() {
        let mut config = ServerConfig::default();
        config.twilio_account_sid = Some("AC123".to_string());
        config.twilio_auth_token = Some("token".to_string());

        let err = config.twilio_credentials().unwrap_err();
        assert!(err.to_string().contains("TWILIO_PHONE_NUMBER"));

        config.twilio_phone_number = Some("+15550001111".to_string());
        let creds = config.twilio_credentials().unwrap();
        assert_eq!(creds.account_sid, "AC123");
        assert_eq!(creds.phone_number, "+15550001111");
    }

    #[test]
    fn test_stream_url_from_base_url() {
        let mut config = ServerConfig::default();
        config.base_url = Some("https://calls.example.com/".to_string());
        assert_eq!(config.public_base_url().unwrap(), "https://calls.example.com");
        assert_eq!(
            config.stream_url().unwrap(),
            "wss://calls.example.com/stream"
        );
    }

    #[test]
    fn test_stream_url_prefers_public_host() {
        let mut config = ServerConfig::default();
        config.base_url = Some("https://calls.example.com".to_string());
        config.public_host = Some("abc123.ngrok.io".to_string());
        assert_eq!(config.stream_url().unwrap(), "wss://abc123.ngrok.io/stream");
    }

    #[test]
    fn test_stream_url_keeps_port() {
        let mut config = ServerConfig::default();
        config.base_url = Some("http://localhost:3000".to_string());
        assert_eq!(config.stream_url().unwrap(), "wss://localhost:3000/stream");
    }

    #[test]
    fn test_stream_url_missing_base() {
        let config = ServerConfig::default();
        assert!(matches!(
            config.stream_url(),
            Err(ConfigError::Missing("BASE_URL"))
        ));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.realtime_model, DEFAULT_REALTIME_MODEL);
        assert_eq!(config.max_provider_reconnects, 3);
        assert_eq!(config.ice_gathering_timeout_seconds, 10);
        assert!(config.openai_api_key.is_none());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "4100");
            env::set_var("OPENAI_API_KEY", "sk-env");
            env::set_var("TWILIO_ACCOUNT_SID", "AC-env");
            env::set_var("MAX_PROVIDER_RECONNECTS", "5");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 4100);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.twilio_account_sid.as_deref(), Some("AC-env"));
        assert_eq!(config.max_provider_reconnects, 5);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "not-a-port");
        }

        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("PORT"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080

openai:
  api_key: "yaml-key"
  realtime_model: "gpt-4o-mini-realtime-preview"

twilio:
  account_sid: "AC-yaml"
  base_url: "https://calls.example.com"
"#;

        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "0.0.0.0");
            env::set_var("OPENAI_API_KEY", "env-key");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.openai_api_key.as_deref(), Some("yaml-key"));
        assert_eq!(config.realtime_model, "gpt-4o-mini-realtime-preview");
        assert_eq!(config.twilio_account_sid.as_deref(), Some("AC-yaml"));
        assert_eq!(
            config.base_url.as_deref(),
            Some("https://calls.example.com")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/config.yaml");
        let result = ServerConfig::from_file(&config_path);

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    #[serial]
    fn test_from_file_invalid_yaml() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: [content").unwrap();

        let result = ServerConfig::from_file(&config_path);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
