//! Common imports for typical harness usage.
pub use crate::{
    AiConfig, Analysis, AnalysisProvider, AnalysisRequest, ChunkStream, HarnessError,
    KnowledgeMap, NormalizedChunk, ProviderError, ProviderIdentity, ProviderSelector,
    RequestOptions, Subject, collect_analysis, global_provider,
};
