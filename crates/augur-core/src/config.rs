use std::env;
use std::str::FromStr;

use augur_harness::AiConfig;

/// Default capacity of the per-call downstream event channel.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Load `.env` files into the process environment.
///
/// The working directory's `.env` is read first; values already set are never
/// overwritten.
pub fn init() {
    dotenvy::dotenv().ok();
}

/// Read and parse an environment variable.
///
/// Unset or blank values give `None`; values that fail to parse are logged
/// and also give `None`.
pub fn get_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::error!(key, "error parsing environment variable");
            None
        }
    }
}

/// Service-wide settings.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub ai: AiConfig,
    /// Redis URL for the shared cache; an in-process cache is used when unset.
    pub redis_url: Option<String>,
    /// Capacity of each streaming call's event channel.
    pub stream_buffer: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ai: AiConfig::default(),
            redis_url: None,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            ai: AiConfig::from_env(),
            redis_url: get_env("AUGUR_REDIS_URL"),
            stream_buffer: get_env("AUGUR_STREAM_BUFFER")
                .filter(|capacity: &usize| *capacity > 0)
                .unwrap_or(DEFAULT_STREAM_BUFFER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_env_parses_and_rejects() {
        // SAFETY: the variables are unique to this test.
        unsafe {
            env::set_var("AUGUR_TEST_GET_ENV_OK", " 42 ");
            env::set_var("AUGUR_TEST_GET_ENV_BAD", "forty-two");
        }
        assert_eq!(get_env::<u32>("AUGUR_TEST_GET_ENV_OK"), Some(42));
        assert_eq!(get_env::<u32>("AUGUR_TEST_GET_ENV_BAD"), None);
        assert_eq!(get_env::<u32>("AUGUR_TEST_GET_ENV_MISSING"), None);
    }

    #[test]
    fn default_buffer() {
        assert_eq!(ServiceConfig::default().stream_buffer, 64);
        assert!(ServiceConfig::default().redis_url.is_none());
    }
}
