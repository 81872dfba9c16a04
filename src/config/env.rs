use std::str::FromStr;

use super::ConfigError;

/// Read a non-empty environment variable.
pub(super) fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an environment variable, returning `None` when unset.
pub(super) fn env_parse<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env_var(key) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_var_trims_and_skips_empty() {
        unsafe {
            std::env::set_var("CALLBRIDGE_TEST_VAR", "  value ");
        }
        assert_eq!(env_var("CALLBRIDGE_TEST_VAR").as_deref(), Some("value"));

        unsafe {
            std::env::set_var("CALLBRIDGE_TEST_VAR", "   ");
        }
        assert!(env_var("CALLBRIDGE_TEST_VAR").is_none());

        unsafe {
            std::env::remove_var("CALLBRIDGE_TEST_VAR");
        }
    }

    #[test]
    #[serial]
    fn test_env_parse_reports_key() {
        unsafe {
            std::env::set_var("CALLBRIDGE_TEST_NUM", "abc");
        }
        let err = env_parse::<u32>("CALLBRIDGE_TEST_NUM").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for CALLBRIDGE_TEST_NUM: 'abc'"
        );

        unsafe {
            std::env::set_var("CALLBRIDGE_TEST_NUM", "42");
        }
        assert_eq!(env_parse::<u32>("CALLBRIDGE_TEST_NUM").unwrap(), Some(42));

        unsafe {
            std::env::remove_var("CALLBRIDGE_TEST_NUM");
        }
    }
}
