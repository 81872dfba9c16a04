use super::{ConfigError, ServerConfig};

/// Accepted range for the ICE gathering wait, in seconds.
const ICE_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 5..=10;

pub(super) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    if !ICE_TIMEOUT_RANGE.contains(&config.ice_gathering_timeout_seconds) {
        return Err(ConfigError::Invalid(format!(
            "ice_gathering_timeout_seconds must be between {} and {}, got {}",
            ICE_TIMEOUT_RANGE.start(),
            ICE_TIMEOUT_RANGE.end(),
            config.ice_gathering_timeout_seconds
        )));
    }

    if config.keepalive_interval_seconds == 0 {
        return Err(ConfigError::Invalid(
            "keepalive_interval_seconds must be greater than 0".to_string(),
        ));
    }

    if config.rate_limit_requests_per_second == 0 || config.rate_limit_burst_size == 0 {
        return Err(ConfigError::Invalid(
            "rate limit values must be greater than 0".to_string(),
        ));
    }

    for (key, value) in [
        ("OPENAI_API_BASE_URL", &config.openai_api_base_url),
        ("OPENAI_REALTIME_URL", &config.openai_realtime_url),
        ("TWILIO_API_BASE_URL", &config.twilio_api_base_url),
    ] {
        if url::Url::parse(value).is_err() {
            return Err(ConfigError::InvalidValue {
                key,
                value: value.clone(),
            });
        }
    }

    if let Some(base) = config.base_url.as_deref()
        && url::Url::parse(base).is_err()
    {
        return Err(ConfigError::InvalidValue {
            key: "BASE_URL",
            value: base.to_string(),
        });
    }

    Ok(())
}
