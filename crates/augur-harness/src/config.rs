use std::time::Duration;

use crate::model::ProviderIdentity;
use crate::vendors::deepseek::DeepseekClientConfig;
use crate::vendors::ollama::OllamaClientConfig;

/// Backend settings read once at startup.
#[derive(Clone, Debug)]
pub struct AiConfig {
    pub deepseek_enabled: bool,
    pub deepseek: DeepseekClientConfig,
    pub ollama_enabled: bool,
    pub ollama: OllamaClientConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            deepseek_enabled: false,
            deepseek: DeepseekClientConfig::new(""),
            ollama_enabled: false,
            ollama: OllamaClientConfig::default(),
        }
    }
}

impl AiConfig {
    /// Reads the `AI_*` variables.
    ///
    /// Never fails: a missing API key only surfaces when the selector tries to
    /// construct that backend.
    pub fn from_env() -> Self {
        let mut deepseek = DeepseekClientConfig::new(env_string("AI_DEEPSEEK_API_KEY").unwrap_or_default());
        if let Some(base) = env_string("AI_DEEPSEEK_API_BASE") {
            deepseek = deepseek.base_url(base);
        }
        if let Some(model) = env_string("AI_DEEPSEEK_MODEL") {
            deepseek = deepseek.model(model);
        }

        let mut ollama = OllamaClientConfig::default();
        if let Some(base) = env_string("AI_OLLAMA_API_BASE") {
            ollama = ollama.base_url(base);
        }
        if let Some(model) = env_string("AI_OLLAMA_MODEL") {
            ollama = ollama.model(model);
        }
        if let Some(secs) = env_string("AI_OLLAMA_TIMEOUT").and_then(|v| parse_timeout_secs(&v)) {
            ollama = ollama.request_timeout(Duration::from_secs(secs));
        }

        Self {
            deepseek_enabled: env_flag("AI_DEEPSEEK_ENABLED"),
            deepseek,
            ollama_enabled: env_flag("AI_OLLAMA_ENABLED"),
            ollama,
        }
    }

    /// Enables the hosted backend with the given settings.
    pub fn with_deepseek(mut self, config: DeepseekClientConfig) -> Self {
        self.deepseek_enabled = true;
        self.deepseek = config;
        self
    }

    /// Enables the local backend with the given settings.
    pub fn with_ollama(mut self, config: OllamaClientConfig) -> Self {
        self.ollama_enabled = true;
        self.ollama = config;
        self
    }

    /// Enabled backends in selection order.
    pub fn enabled_providers(&self) -> Vec<ProviderIdentity> {
        ProviderIdentity::PRIORITY
            .into_iter()
            .filter(|identity| match identity {
                ProviderIdentity::DeepseekRemote => self.deepseek_enabled,
                ProviderIdentity::OllamaLocal => self.ollama_enabled,
            })
            .collect()
    }
}

/// Parses a boolean flag value (`1/true/yes/on`, `0/false/no/off`).
pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses a positive whole number of seconds.
fn parse_timeout_secs(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok().filter(|secs| *secs > 0)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false)
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
