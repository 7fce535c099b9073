use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::content::{Analysis, AnalysisRequest, NormalizedChunk};
use crate::errors::{HarnessError, ProviderError};
use crate::model::ProviderIdentity;
use crate::provider::{AnalysisProvider, ChunkStream};
use crate::vendors::lines::LineDecoder;

use super::config::DeepseekClientConfig;
use super::transport::{ChatMessage, ChatRequest, DeltaNormalizer, parse_completion};

const PROVIDER: ProviderIdentity = ProviderIdentity::DeepseekRemote;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Backend for DeepSeek's chat-completions API.
pub struct DeepseekProvider {
    client: reqwest::Client,
    config: DeepseekClientConfig,
}

impl DeepseekProvider {
    /// Creates a provider from explicit client configuration.
    pub fn new(config: DeepseekClientConfig) -> Result<Self, HarnessError> {
        if config.api_key.trim().is_empty() {
            return Err(HarnessError::Config(
                "DeepSeek client config api_key must not be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build DeepSeek client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a provider using `AI_DEEPSEEK_API_KEY`.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::new(DeepseekClientConfig::from_env()?)
    }

    async fn send(
        &self,
        request: &AnalysisRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let prompt = request.prompt_text();
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            max_tokens: self.config.max_tokens,
            stream,
        };
        debug!(provider = %PROVIDER, model = %self.config.model, stream, prompt_chars = prompt.chars().count(), "sending chat completion request");

        let mut http_req = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body);
        if stream {
            http_req = http_req.header(reqwest::header::ACCEPT, "text/event-stream");
        }
        if let Some(timeout) = request.options.timeout {
            http_req = http_req.timeout(timeout);
        }

        let response = http_req.send().await.map_err(|e| {
            ProviderError::transport(PROVIDER, format!("DeepSeek request failed: {e}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::upstream(
                PROVIDER,
                format!("DeepSeek request failed with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl AnalysisProvider for DeepseekProvider {
    fn identity(&self) -> ProviderIdentity {
        PROVIDER
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, ProviderError> {
        let response = self.send(request, false).await?;
        let body = response.text().await.map_err(|e| {
            ProviderError::transport(PROVIDER, format!("DeepSeek response read failed: {e}"))
        })?;
        parse_completion(&body)
    }

    async fn stream_analyze(&self, request: &AnalysisRequest) -> Result<ChunkStream, ProviderError> {
        let response = self.send(request, true).await?;
        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(Box::pin(deepseek_chunk_stream(bytes_stream)))
    }
}

fn deepseek_chunk_stream(
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<NormalizedChunk, ProviderError>> + Send {
    struct State {
        bytes_stream: ByteStream,
        decoder: LineDecoder,
        normalizer: DeltaNormalizer,
        pending: VecDeque<NormalizedChunk>,
        exhausted: bool,
    }

    stream::try_unfold(
        State {
            bytes_stream,
            decoder: LineDecoder::default(),
            normalizer: DeltaNormalizer::default(),
            pending: VecDeque::new(),
            exhausted: false,
        },
        |mut state| async move {
            loop {
                if let Some(chunk) = state.pending.pop_front() {
                    return Ok(Some((chunk, state)));
                }
                if state.normalizer.is_finished() {
                    return Ok(None);
                }
                if state.exhausted {
                    return Err(ProviderError::transport(
                        PROVIDER,
                        "DeepSeek stream ended before a stop reason",
                    ));
                }

                match state.bytes_stream.next().await {
                    Some(Ok(bytes)) => {
                        for line in state.decoder.push_chunk(&bytes) {
                            state.pending.extend(state.normalizer.push_line(&line));
                        }
                    }
                    Some(Err(e)) => {
                        return Err(ProviderError::transport(
                            PROVIDER,
                            format!("DeepSeek streaming read failed: {e}"),
                        ));
                    }
                    None => {
                        if let Some(line) = state.decoder.finish() {
                            state.pending.extend(state.normalizer.push_line(&line));
                        }
                        state.exhausted = true;
                    }
                }
            }
        },
    )
}
