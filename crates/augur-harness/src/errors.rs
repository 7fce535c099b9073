use crate::model::ProviderIdentity;

/// Errors returned by a provider backend.
///
/// `Upstream` and `Transport` both mean the model service failed us; `Parse`
/// is reserved for whole-document decode failures. Per-line stream decode
/// failures are logged and skipped by the adapters instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Upstream answered with a non-success status or an in-band failure.
    #[error("upstream error ({provider}): {message}")]
    Upstream {
        provider: ProviderIdentity,
        message: String,
        status_code: Option<u16>,
    },
    /// Upstream could not be reached, timed out, or the body read failed.
    #[error("transport error ({provider}): {message}")]
    Transport {
        provider: ProviderIdentity,
        message: String,
    },
    /// The upstream response document could not be decoded.
    #[error("parse error ({provider}): {message}")]
    Parse {
        provider: ProviderIdentity,
        message: String,
    },
}

impl ProviderError {
    /// Creates an upstream (application-level) error.
    pub fn upstream(
        provider: ProviderIdentity,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Upstream {
            provider,
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(provider: ProviderIdentity, message: impl Into<String>) -> Self {
        Self::Transport {
            provider,
            message: message.into(),
        }
    }

    /// Creates a response decode error.
    pub fn parse(provider: ProviderIdentity, message: impl Into<String>) -> Self {
        Self::Parse {
            provider,
            message: message.into(),
        }
    }

    /// Returns the backend that produced this error.
    pub fn provider(&self) -> ProviderIdentity {
        match self {
            Self::Upstream { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Parse { provider, .. } => *provider,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Upstream { message, .. }
            | Self::Transport { message, .. }
            | Self::Parse { message, .. } => message,
        }
    }

    /// HTTP status reported by the upstream, when there was one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Upstream { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

/// Top-level error type for provider construction and selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HarnessError {
    /// Invalid or missing provider configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Provider failure surfaced outside of a stream.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_cover_every_variant() {
        let err = ProviderError::upstream(ProviderIdentity::DeepseekRemote, "rate limited", Some(429));
        assert_eq!(err.provider(), ProviderIdentity::DeepseekRemote);
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(err.to_string(), "upstream error (deepseek): rate limited");

        let err = ProviderError::transport(ProviderIdentity::OllamaLocal, "connection refused");
        assert_eq!(err.message(), "connection refused");
        assert_eq!(err.status_code(), None);

        let err = ProviderError::parse(ProviderIdentity::DeepseekRemote, "no choices");
        assert!(matches!(err, ProviderError::Parse { .. }));
    }

    #[test]
    fn harness_error_wraps_provider_error_transparently() {
        let err: HarnessError =
            ProviderError::transport(ProviderIdentity::OllamaLocal, "refused").into();
        assert_eq!(err.to_string(), "transport error (ollama): refused");
    }
}
