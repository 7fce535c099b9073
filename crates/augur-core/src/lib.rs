//! Conversation service core: message-id sequencing, the downstream event
//! protocol, and the orchestration of provider calls into event streams.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use augur_core::prelude::*;
//! use augur_harness::{AnalysisRequest, global_provider};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! augur_core::config::init();
//! augur_core::observability::init_observability();
//! let config = ServiceConfig::from_env();
//!
//! let cache = Arc::new(MemoryCache::new());
//! let sequencer = Arc::new(MessageSequencer::new(Arc::new(MemoryCounterStore::new()), cache.clone()));
//! let orchestrator = ConversationOrchestrator::new(
//!     global_provider(&config.ai)?,
//!     sequencer,
//!     Arc::new(MemoryTranscriptStore::new()),
//!     cache,
//! );
//!
//! let mut events = orchestrator
//!     .stream_analyze(1, AnalysisRequest::raw_prompt("Say hello"))
//!     .await;
//! while let Some(event) = events.next_event().await {
//!     print!("{}", event.to_sse_frame()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod emitter;
pub mod error;
pub mod observability;
pub mod orchestrator;
pub mod protocol;
pub mod sequencer;
pub mod store;

pub use config::ServiceConfig;
pub use emitter::{EmitterOptions, EmitterState, EventEmitter, StreamSession, estimate_tokens};
pub use error::{ConversationError, EmitterError, PersistenceError, SequencerError, StoreError};
pub use orchestrator::{AnalysisReply, ConversationOrchestrator, EventStream, FollowUp};
pub use protocol::DownstreamEvent;
pub use sequencer::{MessageIds, MessageSequencer};

/// Common imports for wiring the service.
pub mod prelude {
    pub use crate::store::{
        CacheStore, CounterStore, MemoryCache, MemoryCounterStore, MemoryTranscriptStore,
        RedisCache, TranscriptStore,
    };
    pub use crate::{
        AnalysisReply, ConversationError, ConversationOrchestrator, DownstreamEvent, EventStream,
        FollowUp, MessageIds, MessageSequencer, ServiceConfig,
    };
}
