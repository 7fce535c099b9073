use std::time::Duration;

use crate::errors::HarnessError;

pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-reasoner";
pub const DEEPSEEK_MAX_TOKENS: u32 = 4096;

/// Configuration for the DeepSeek client.
#[derive(Clone, Debug)]
pub struct DeepseekClientConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
    /// Default HTTP timeout for a whole request, body included.
    pub timeout: Duration,
    /// Completion token cap.
    pub max_tokens: u32,
}

impl DeepseekClientConfig {
    /// Creates a config with defaults and the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_DEEPSEEK_BASE_URL.to_string(),
            model: DEFAULT_DEEPSEEK_MODEL.to_string(),
            timeout: Duration::from_secs(120),
            max_tokens: DEEPSEEK_MAX_TOKENS,
        }
    }

    /// Builds a config from `AI_DEEPSEEK_API_KEY`.
    pub fn from_env() -> Result<Self, HarnessError> {
        let api_key = std::env::var("AI_DEEPSEEK_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(HarnessError::Config(
                "missing AI_DEEPSEEK_API_KEY for DeepSeek provider".into(),
            ));
        }
        Ok(Self::new(api_key))
    }

    /// Overrides the API base URL (for proxies or test servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the default HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_hosted_api() {
        let config = DeepseekClientConfig::new("sk");
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.model, "deepseek-reasoner");
        assert_eq!(
            config.completions_url(),
            "https://api.deepseek.com/v1/chat/completions"
        );
    }

    #[test]
    fn trailing_slash_is_not_doubled() {
        let config = DeepseekClientConfig::new("sk").base_url("http://127.0.0.1:9000/");
        assert_eq!(
            config.completions_url(),
            "http://127.0.0.1:9000/v1/chat/completions"
        );
    }
}
