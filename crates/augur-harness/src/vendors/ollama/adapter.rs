use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use once_cell::sync::OnceCell;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::content::{Analysis, AnalysisRequest, NormalizedChunk};
use crate::errors::{HarnessError, ProviderError};
use crate::model::ProviderIdentity;
use crate::provider::{AnalysisProvider, ChunkStream};

use super::client::OllamaClient;
use super::config::OllamaClientConfig;

const PROVIDER: ProviderIdentity = ProviderIdentity::OllamaLocal;

type ChunkResult = Result<NormalizedChunk, ProviderError>;

/// Backend for a model runtime on the local host.
///
/// The HTTP client is created on first use and shared by every call after.
pub struct OllamaProvider {
    config: OllamaClientConfig,
    client: OnceCell<Arc<OllamaClient>>,
}

impl OllamaProvider {
    pub fn new(config: OllamaClientConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        Ok(Self {
            config,
            client: OnceCell::new(),
        })
    }

    fn client(&self) -> Result<Arc<OllamaClient>, ProviderError> {
        self.client
            .get_or_try_init(|| OllamaClient::new(self.config.clone()).map(Arc::new))
            .cloned()
            .map_err(|e| {
                ProviderError::transport(PROVIDER, format!("failed to initialize Ollama client: {e}"))
            })
    }
}

#[async_trait::async_trait]
impl AnalysisProvider for OllamaProvider {
    fn identity(&self) -> ProviderIdentity {
        PROVIDER
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, ProviderError> {
        let client = self.client()?;
        let content = client
            .generate(&request.prompt_text(), request.options.timeout, None)
            .await?;
        Ok(Analysis {
            reasoning: String::new(),
            content,
        })
    }

    async fn stream_analyze(&self, request: &AnalysisRequest) -> Result<ChunkStream, ProviderError> {
        let client = self.client()?;
        let prompt = request.prompt_text();
        let timeout = request.options.timeout;
        let (tx, rx) = mpsc::unbounded_channel::<ChunkResult>();
        debug!(provider = %PROVIDER, model = %client.model(), "starting local generation");

        let task = tokio::spawn(async move {
            let token_tx = tx.clone();
            let mut forward = move |token: &str| -> Result<(), ProviderError> {
                token_tx
                    .send(Ok(NormalizedChunk::content(token)))
                    .map_err(|_| ProviderError::transport(PROVIDER, "chunk receiver dropped"))
            };
            let callback: &mut (dyn FnMut(&str) -> Result<(), ProviderError> + Send) = &mut forward;
            match client.generate(&prompt, timeout, Some(callback)).await {
                Ok(_) => {
                    let _ = tx.send(Ok(NormalizedChunk::terminal()));
                }
                Err(err) => {
                    let _ = tx.send(Err(err));
                }
            }
        });

        Ok(Box::pin(CallbackChunkStream { rx, task }))
    }
}

/// Channel-backed chunk stream that aborts the generating task when dropped.
struct CallbackChunkStream {
    rx: mpsc::UnboundedReceiver<ChunkResult>,
    task: JoinHandle<()>,
}

impl futures::Stream for CallbackChunkStream {
    type Item = ChunkResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for CallbackChunkStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
