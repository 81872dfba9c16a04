use std::path::PathBuf;

use super::env::{env_parse, env_var};
use super::yaml::YamlConfig;
use super::{ConfigError, ServerConfig, TlsConfig};

/// Build the final configuration: defaults, then environment, then YAML.
pub(super) fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let mut config = ServerConfig::default();

    apply_env(&mut config)?;

    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml);
    }

    Ok(config)
}

fn apply_env(config: &mut ServerConfig) -> Result<(), ConfigError> {
    if let Some(host) = env_var("HOST") {
        config.host = host;
    }
    if let Some(port) = env_parse("PORT")? {
        config.port = port;
    }

    let cert = env_var("TLS_CERT_PATH");
    let key = env_var("TLS_KEY_PATH");
    config.tls = tls_from_paths(cert, key)?;

    config.openai_api_key = env_var("OPENAI_API_KEY");
    if let Some(v) = env_var("OPENAI_API_BASE_URL") {
        config.openai_api_base_url = v;
    }
    if let Some(v) = env_var("OPENAI_REALTIME_URL") {
        config.openai_realtime_url = v;
    }
    if let Some(v) = env_var("REALTIME_MODEL") {
        config.realtime_model = v;
    }
    if let Some(v) = env_var("REALTIME_VOICE") {
        config.realtime_voice = v;
    }
    if let Some(v) = env_var("CHAT_MODEL") {
        config.chat_model = v;
    }

    config.twilio_account_sid = env_var("TWILIO_ACCOUNT_SID");
    config.twilio_auth_token = env_var("TWILIO_AUTH_TOKEN");
    config.twilio_phone_number = env_var("TWILIO_PHONE_NUMBER");
    if let Some(v) = env_var("TWILIO_API_BASE_URL") {
        config.twilio_api_base_url = v;
    }
    config.base_url = env_var("BASE_URL");
    config.public_host = env_var("PUBLIC_HOST");

    config.cors_allowed_origins = env_var("CORS_ALLOWED_ORIGINS");
    if let Some(v) = env_parse("RATE_LIMIT_REQUESTS_PER_SECOND")? {
        config.rate_limit_requests_per_second = v;
    }
    if let Some(v) = env_parse("RATE_LIMIT_BURST_SIZE")? {
        config.rate_limit_burst_size = v;
    }
    config.max_websocket_connections = env_parse("MAX_WEBSOCKET_CONNECTIONS")?;
    if let Some(v) = env_parse("MAX_CONNECTIONS_PER_IP")? {
        config.max_connections_per_ip = v;
    }

    if let Some(v) = env_parse("ICE_GATHERING_TIMEOUT_SECONDS")? {
        config.ice_gathering_timeout_seconds = v;
    }
    if let Some(v) = env_parse("MAX_PROVIDER_RECONNECTS")? {
        config.max_provider_reconnects = v;
    }
    if let Some(v) = env_parse("KEEPALIVE_INTERVAL_SECONDS")? {
        config.keepalive_interval_seconds = v;
    }

    Ok(())
}

fn apply_yaml(config: &mut ServerConfig, yaml: YamlConfig) {
    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls
            && let (Some(cert), Some(key)) = (tls.cert_path, tls.key_path)
        {
            config.tls = Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            });
        }
    }

    if let Some(openai) = yaml.openai {
        if openai.api_key.is_some() {
            config.openai_api_key = openai.api_key;
        }
        if let Some(v) = openai.api_base_url {
            config.openai_api_base_url = v;
        }
        if let Some(v) = openai.realtime_url {
            config.openai_realtime_url = v;
        }
        if let Some(v) = openai.realtime_model {
            config.realtime_model = v;
        }
        if let Some(v) = openai.realtime_voice {
            config.realtime_voice = v;
        }
        if let Some(v) = openai.chat_model {
            config.chat_model = v;
        }
    }

    if let Some(twilio) = yaml.twilio {
        if twilio.account_sid.is_some() {
            config.twilio_account_sid = twilio.account_sid;
        }
        if twilio.auth_token.is_some() {
            config.twilio_auth_token = twilio.auth_token;
        }
        if twilio.phone_number.is_some() {
            config.twilio_phone_number = twilio.phone_number;
        }
        if let Some(v) = twilio.api_base_url {
            config.twilio_api_base_url = v;
        }
        if twilio.base_url.is_some() {
            config.base_url = twilio.base_url;
        }
        if twilio.public_host.is_some() {
            config.public_host = twilio.public_host;
        }
    }

    if let Some(realtime) = yaml.realtime {
        if let Some(v) = realtime.ice_gathering_timeout_seconds {
            config.ice_gathering_timeout_seconds = v;
        }
        if let Some(v) = realtime.max_provider_reconnects {
            config.max_provider_reconnects = v;
        }
        if let Some(v) = realtime.keepalive_interval_seconds {
            config.keepalive_interval_seconds = v;
        }
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if let Some(v) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = v;
        }
        if let Some(v) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = v;
        }
        if security.max_websocket_connections.is_some() {
            config.max_websocket_connections = security.max_websocket_connections;
        }
        if let Some(v) = security.max_connections_per_ip {
            config.max_connections_per_ip = v;
        }
    }
}

fn tls_from_paths(
    cert: Option<String>,
    key: Option<String>,
) -> Result<Option<TlsConfig>, ConfigError> {
    match (cert, key) {
        (Some(cert), Some(key)) => Ok(Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        })),
        (None, None) => Ok(None),
        _ => Err(ConfigError::Invalid(
            "TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string(),
        )),
    }
}
