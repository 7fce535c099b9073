use std::time::Duration;

use futures::StreamExt as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{HarnessError, ProviderError};
use crate::model::ProviderIdentity;
use crate::vendors::lines::LineDecoder;

use super::config::OllamaClientConfig;

const PROVIDER: ProviderIdentity = ProviderIdentity::OllamaLocal;

/// Receives each generated text fragment. Returning an error aborts generation.
pub type TokenCallback<'a> = &'a mut (dyn FnMut(&str) -> Result<(), ProviderError> + Send);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Thin client over the runtime's `/api/generate` endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    config: OllamaClientConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaClientConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build Ollama client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Generates a completion for `prompt`.
    ///
    /// With a callback the body is read as NDJSON and every non-empty fragment
    /// is handed to it in order; the full text is returned either way. The
    /// deadline covers the whole call and defaults to the configured
    /// `request_timeout`.
    pub async fn generate(
        &self,
        prompt: &str,
        timeout: Option<Duration>,
        on_token: Option<TokenCallback<'_>>,
    ) -> Result<String, ProviderError> {
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: on_token.is_some(),
        };
        debug!(provider = %PROVIDER, model = %self.config.model, stream = body.stream, "sending generate request");

        let response = self
            .http
            .post(self.config.generate_url())
            .json(&body)
            .timeout(timeout.unwrap_or(self.config.request_timeout))
            .send()
            .await.map_err(|e| {
            ProviderError::transport(PROVIDER, format!("Ollama request failed: {e}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::upstream(
                PROVIDER,
                format!("Ollama generate failed with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }

        let Some(on_token) = on_token else {
            let text = response.text().await.map_err(|e| {
                ProviderError::transport(PROVIDER, format!("Ollama response read failed: {e}"))
            })?;
            let parsed: GenerateResponse = serde_json::from_str(&text).map_err(|e| {
                ProviderError::parse(PROVIDER, format!("invalid generate response: {e}"))
            })?;
            if let Some(error) = parsed.error {
                return Err(ProviderError::upstream(PROVIDER, error, None));
            }
            return Ok(parsed.response);
        };

        let mut full = String::new();
        let mut decoder = LineDecoder::default();
        let mut bytes_stream = Box::pin(response.bytes_stream());
        let mut exhausted = false;
        while !exhausted {
            let lines = match bytes_stream.next().await {
                Some(Ok(bytes)) => decoder.push_chunk(&bytes),
                Some(Err(e)) => {
                    return Err(ProviderError::transport(
                        PROVIDER,
                        format!("Ollama streaming read failed: {e}"),
                    ));
                }
                None => {
                    exhausted = true;
                    decoder.finish().into_iter().collect()
                }
            };
            for line in lines {
                let Some(fragment) = decode_stream_line(&line)? else {
                    continue;
                };
                if !fragment.response.is_empty() {
                    full.push_str(&fragment.response);
                    on_token(&fragment.response)?;
                }
                if fragment.done {
                    return Ok(full);
                }
            }
        }
        Err(ProviderError::transport(
            PROVIDER,
            "Ollama stream ended before completion",
        ))
    }
}

fn decode_stream_line(line: &str) -> Result<Option<GenerateResponse>, ProviderError> {
    let fragment: GenerateResponse = match serde_json::from_str(line) {
        Ok(fragment) => fragment,
        Err(err) => {
            warn!(provider = %PROVIDER, error = %err, "skipping malformed stream line");
            return Ok(None);
        }
    };
    if let Some(error) = fragment.error {
        return Err(ProviderError::upstream(PROVIDER, error, None));
    }
    Ok(Some(fragment))
}
