use std::pin::Pin;

use futures::Stream;

use crate::content::{Analysis, AnalysisRequest, NormalizedChunk};
use crate::errors::ProviderError;
use crate::model::ProviderIdentity;

/// Normalized chunk stream returned by streaming backends.
pub type ChunkStream =
    Pin<Box<dyn Stream<Item = Result<NormalizedChunk, ProviderError>> + Send + 'static>>;

/// Backend contract used by the conversation layer.
///
/// Implementations hold no per-call mutable state and may be invoked
/// concurrently from many tasks.
#[async_trait::async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Which backend this is.
    fn identity(&self) -> ProviderIdentity;

    /// Produces a complete answer in one call.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Analysis, ProviderError>;

    /// Starts a streamed answer.
    ///
    /// Errors returned here happen before any chunk; errors inside the stream
    /// end it. Dropping the stream cancels the upstream call.
    async fn stream_analyze(&self, request: &AnalysisRequest) -> Result<ChunkStream, ProviderError>;
}
