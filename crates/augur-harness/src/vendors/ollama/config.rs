use std::time::Duration;

use crate::errors::HarnessError;

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5:7b";
pub const DEFAULT_OLLAMA_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration for the local runtime client.
#[derive(Clone, Debug)]
pub struct OllamaClientConfig {
    /// Base URL of the runtime.
    pub base_url: String,
    /// Model tag to generate with.
    pub model: String,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Deadline for a whole generate call, body included, when the request
    /// carries none of its own.
    pub request_timeout: Duration,
}

impl Default for OllamaClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: DEFAULT_OLLAMA_REQUEST_TIMEOUT,
        }
    }
}

impl OllamaClientConfig {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Checks the settings without touching the network.
    pub fn validate(&self) -> Result<(), HarnessError> {
        reqwest::Url::parse(&self.base_url).map_err(|e| {
            HarnessError::Config(format!("invalid Ollama base url `{}`: {e}", self.base_url))
        })?;
        if self.model.trim().is_empty() {
            return Err(HarnessError::Config("Ollama model must not be empty".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(HarnessError::Config("Ollama request timeout must be positive".into()));
        }
        Ok(())
    }

    pub(crate) fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}
