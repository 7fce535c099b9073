#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use augur_core::prelude::*;
use augur_core::store::MessageCounter;
use augur_core::StoreError;
use augur_harness::{
    Analysis, AnalysisProvider, AnalysisRequest, ChunkStream, NormalizedChunk, ProviderError,
    ProviderIdentity,
};
use futures::stream;

pub type ChunkResult = Result<NormalizedChunk, ProviderError>;

/// Scripted provider.
pub struct FakeProvider {
    chunks: Vec<ChunkResult>,
    answer: Result<Analysis, ProviderError>,
    open_error: Option<ProviderError>,
    hang: bool,
    pub stream_dropped: Arc<AtomicBool>,
    pub prompts: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl FakeProvider {
    pub fn streaming(chunks: Vec<ChunkResult>) -> Self {
        let content: String = chunks
            .iter()
            .filter_map(|chunk| chunk.as_ref().ok())
            .map(|chunk| chunk.content.clone())
            .collect();
        Self {
            chunks,
            answer: Ok(Analysis {
                reasoning: String::new(),
                content,
            }),
            open_error: None,
            hang: false,
            stream_dropped: Arc::new(AtomicBool::new(false)),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answering(content: &str) -> Self {
        Self::streaming(vec![
            Ok(NormalizedChunk::content(content)),
            Ok(NormalizedChunk::terminal()),
        ])
    }

    pub fn failing(error: ProviderError) -> Self {
        let mut provider = Self::streaming(Vec::new());
        provider.answer = Err(error.clone());
        provider.open_error = Some(error);
        provider
    }

    /// Streams the scripted chunks, then never finishes.
    pub fn hanging(chunks: Vec<ChunkResult>) -> Self {
        let mut provider = Self::streaming(chunks);
        provider.hang = true;
        provider
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().ok().and_then(|p| p.last().cloned())
    }
}

struct TrackedStream {
    inner: ChunkStream,
    dropped: Arc<AtomicBool>,
}

impl futures::Stream for TrackedStream {
    type Item = ChunkResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalysisProvider for FakeProvider {
    fn identity(&self) -> ProviderIdentity {
        ProviderIdentity::DeepseekRemote
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt_text());
        }
        self.answer.clone()
    }

    async fn stream_analyze(&self, request: &AnalysisRequest) -> Result<ChunkStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt_text());
        }
        if let Some(err) = self.open_error.clone() {
            return Err(err);
        }
        let scripted = stream::iter(self.chunks.clone());
        let inner: ChunkStream = if self.hang {
            Box::pin(futures::StreamExt::chain(scripted, stream::pending()))
        } else {
            Box::pin(scripted)
        };
        Ok(Box::pin(TrackedStream {
            inner,
            dropped: Arc::clone(&self.stream_dropped),
        }))
    }
}

/// Counter store whose every call fails.
pub struct BrokenCounters;

#[async_trait]
impl CounterStore for BrokenCounters {
    async fn find(&self, _user_id: i64) -> Result<Option<MessageCounter>, StoreError> {
        Err(StoreError::Unavailable("database down".into()))
    }

    async fn create(&self, _counter: MessageCounter) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database down".into()))
    }

    async fn update(&self, _counter: MessageCounter) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database down".into()))
    }
}

/// Cache whose every call fails.
pub struct BrokenCache;

#[async_trait]
impl CacheStore for BrokenCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("cache down".into()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("cache down".into()))
    }
}

/// Orchestrator over in-memory stores, with handles to inspect them.
pub struct Harness {
    pub orchestrator: ConversationOrchestrator,
    pub provider: Arc<FakeProvider>,
    pub counters: Arc<MemoryCounterStore>,
    pub cache: Arc<MemoryCache>,
    pub transcripts: Arc<MemoryTranscriptStore>,
}

pub fn harness(provider: FakeProvider) -> Harness {
    let provider = Arc::new(provider);
    let counters = Arc::new(MemoryCounterStore::new());
    let cache = Arc::new(MemoryCache::new());
    let transcripts = Arc::new(MemoryTranscriptStore::new());
    let sequencer = Arc::new(MessageSequencer::new(counters.clone(), cache.clone()));
    let orchestrator =
        ConversationOrchestrator::new(provider.clone(), sequencer, transcripts.clone(), cache.clone());
    Harness {
        orchestrator,
        provider,
        counters,
        cache,
        transcripts,
    }
}

/// Parsed `data:` payload of an event.
pub fn payload(event: &DownstreamEvent) -> serde_json::Value {
    serde_json::from_str(&event.data_json().expect("json")).expect("value")
}

/// Waits until `condition` holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
