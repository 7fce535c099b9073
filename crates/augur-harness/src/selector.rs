use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use tracing::{info, warn};

use crate::config::AiConfig;
use crate::errors::HarnessError;
use crate::model::ProviderIdentity;
use crate::provider::AnalysisProvider;
use crate::vendors::deepseek::DeepseekProvider;
use crate::vendors::ollama::OllamaProvider;

/// Builds one backend from configuration.
pub type ProviderFactory = Box<
    dyn Fn(ProviderIdentity, &AiConfig) -> Result<Arc<dyn AnalysisProvider>, HarnessError>
        + Send
        + Sync,
>;

static GLOBAL_SELECTOR: Lazy<ProviderSelector> = Lazy::new(ProviderSelector::new);

/// Picks the process-wide backend once and hands out the same instance after.
pub struct ProviderSelector {
    factory: ProviderFactory,
    selected: OnceCell<Arc<dyn AnalysisProvider>>,
}

impl Default for ProviderSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderSelector {
    /// Selector that constructs the real vendor backends.
    pub fn new() -> Self {
        Self::with_factory(build_provider)
    }

    /// Selector with an injected construction function.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(ProviderIdentity, &AiConfig) -> Result<Arc<dyn AnalysisProvider>, HarnessError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            factory: Box::new(factory),
            selected: OnceCell::new(),
        }
    }

    /// Returns the selected backend, constructing it on first use.
    ///
    /// Concurrent first callers block until one of them finishes construction;
    /// all of them observe the same instance. A failed selection is not cached.
    pub fn select(&self, config: &AiConfig) -> Result<Arc<dyn AnalysisProvider>, HarnessError> {
        self.selected
            .get_or_try_init(|| self.construct(config))
            .cloned()
    }

    /// Identity of the adopted backend, if selection already happened.
    pub fn selected(&self) -> Option<ProviderIdentity> {
        self.selected.get().map(|provider| provider.identity())
    }

    fn construct(&self, config: &AiConfig) -> Result<Arc<dyn AnalysisProvider>, HarnessError> {
        let candidates = config.enabled_providers();
        if candidates.is_empty() {
            return Err(HarnessError::Config(
                "no AI provider is enabled (set AI_DEEPSEEK_ENABLED or AI_OLLAMA_ENABLED)".into(),
            ));
        }

        let mut failures = Vec::with_capacity(candidates.len());
        for identity in candidates {
            match (self.factory)(identity, config) {
                Ok(provider) => {
                    info!(event = "ai.provider_selected", provider = %identity, "AI provider selected");
                    return Ok(provider);
                }
                Err(err) => {
                    warn!(event = "ai.provider_init_failed", provider = %identity, error = %err, "AI provider construction failed; trying next");
                    failures.push(format!("{identity}: {err}"));
                }
            }
        }

        Err(HarnessError::Config(format!(
            "no AI provider could be constructed ({})",
            failures.join("; ")
        )))
    }
}

/// Constructs the vendor backend for `identity`.
pub fn build_provider(
    identity: ProviderIdentity,
    config: &AiConfig,
) -> Result<Arc<dyn AnalysisProvider>, HarnessError> {
    match identity {
        ProviderIdentity::DeepseekRemote => {
            Ok(Arc::new(DeepseekProvider::new(config.deepseek.clone())?))
        }
        ProviderIdentity::OllamaLocal => Ok(Arc::new(OllamaProvider::new(config.ollama.clone())?)),
    }
}

/// Process-wide selection shared by every caller.
pub fn global_provider(config: &AiConfig) -> Result<Arc<dyn AnalysisProvider>, HarnessError> {
    GLOBAL_SELECTOR.select(config)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::content::{Analysis, AnalysisRequest};
    use crate::errors::ProviderError;
    use crate::provider::ChunkStream;
    use crate::vendors::deepseek::DeepseekClientConfig;
    use crate::vendors::ollama::OllamaClientConfig;

    struct StubProvider(ProviderIdentity);

    #[async_trait::async_trait]
    impl AnalysisProvider for StubProvider {
        fn identity(&self) -> ProviderIdentity {
            self.0
        }

        async fn analyze(&self, _request: &AnalysisRequest) -> Result<Analysis, ProviderError> {
            Ok(Analysis::default())
        }

        async fn stream_analyze(
            &self,
            _request: &AnalysisRequest,
        ) -> Result<ChunkStream, ProviderError> {
            Ok(Box::pin(futures::stream::empty()))
        }
    }

    fn both_enabled() -> AiConfig {
        AiConfig::default()
            .with_deepseek(DeepseekClientConfig::new("sk-test"))
            .with_ollama(OllamaClientConfig::default())
    }

    #[test]
    fn prefers_hosted_backend() {
        let selector = ProviderSelector::with_factory(|identity, _| {
            Ok(Arc::new(StubProvider(identity)) as Arc<dyn AnalysisProvider>)
        });
        let provider = selector.select(&both_enabled()).expect("selected");
        assert_eq!(provider.identity(), ProviderIdentity::DeepseekRemote);
        assert_eq!(selector.selected(), Some(ProviderIdentity::DeepseekRemote));
    }

    #[test]
    fn falls_back_when_construction_fails() {
        let selector = ProviderSelector::with_factory(|identity, _| match identity {
            ProviderIdentity::DeepseekRemote => Err(HarnessError::Config("boom".into())),
            ProviderIdentity::OllamaLocal => {
                Ok(Arc::new(StubProvider(identity)) as Arc<dyn AnalysisProvider>)
            }
        });
        let provider = selector.select(&both_enabled()).expect("selected");
        assert_eq!(provider.identity(), ProviderIdentity::OllamaLocal);
    }

    #[test]
    fn nothing_enabled_is_a_config_error() {
        let selector = ProviderSelector::with_factory(|identity, _| {
            Ok(Arc::new(StubProvider(identity)) as Arc<dyn AnalysisProvider>)
        });
        let err = selector.select(&AiConfig::default()).err().expect("error");
        assert!(matches!(err, HarnessError::Config(_)));
        assert_eq!(selector.selected(), None);
    }

    #[test]
    fn all_failures_are_reported() {
        let selector = ProviderSelector::with_factory(|identity, _| {
            Err(HarnessError::Config(format!("{identity} unavailable")))
        });
        let err = selector.select(&both_enabled()).err().expect("error");
        let message = err.to_string();
        assert!(message.contains("deepseek unavailable"));
        assert!(message.contains("ollama unavailable"));
    }

    #[test]
    fn concurrent_callers_share_one_construction() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&constructions);
        let selector = ProviderSelector::with_factory(move |identity, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            Ok(Arc::new(StubProvider(identity)) as Arc<dyn AnalysisProvider>)
        });
        let config = both_enabled();

        let providers: Vec<Arc<dyn AnalysisProvider>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| selector.select(&config).expect("selected")))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread"))
                .collect()
        });

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        let first = &providers[0];
        assert!(providers.iter().all(|p| Arc::ptr_eq(p, first)));
    }

    #[test]
    fn real_factory_skips_deepseek_without_key() {
        let config = AiConfig::default()
            .with_deepseek(DeepseekClientConfig::new(""))
            .with_ollama(OllamaClientConfig::default());
        let provider = ProviderSelector::new().select(&config).expect("selected");
        assert_eq!(provider.identity(), ProviderIdentity::OllamaLocal);
    }
}
