use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which backend serves analysis requests.
///
/// The set is closed at compile time; a process adopts exactly one value at
/// startup and never changes it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ProviderIdentity {
    /// Model runtime on the local host, reached through its generate API.
    #[serde(rename = "ollama")]
    OllamaLocal,
    /// Hosted chat-completions API.
    #[serde(rename = "deepseek")]
    DeepseekRemote,
}

impl ProviderIdentity {
    /// Selection order: the hosted API wins when it is enabled and constructible.
    pub const PRIORITY: [ProviderIdentity; 2] = [Self::DeepseekRemote, Self::OllamaLocal];

    /// Returns the stable wire/config name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OllamaLocal => "ollama",
            Self::DeepseekRemote => "deepseek",
        }
    }
}

impl fmt::Display for ProviderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderIdentity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::OllamaLocal),
            "deepseek" => Ok(Self::DeepseekRemote),
            other => Err(format!("unknown provider `{other}`")),
        }
    }
}

/// Per-request behavior options.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RequestOptions {
    /// Caller-supplied deadline for the whole call. Overrides the backend's
    /// default client timeout when set.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Sets the per-request deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
