//! Model backends for the analysis service.
//!
//! Every backend implements [`AnalysisProvider`] and produces the same
//! normalized chunk stream, so the conversation layer never sees vendor wire
//! formats. Vendor-specific APIs are namespaced under `vendors::*`.
//!
//! # Selecting a backend
//!
//! ```no_run
//! use augur_harness::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), HarnessError> {
//! let provider = global_provider(&AiConfig::from_env())?;
//! let analysis = provider
//!     .analyze(&AnalysisRequest::raw_prompt("Say hello"))
//!     .await?;
//!
//! println!("{} answered: {}", provider.identity(), analysis.content);
//! # Ok(())
//! # }
//! ```

/// Backend settings read from the environment.
pub mod config;
/// Request, answer, and chunk types.
pub mod content;
/// Public error types.
pub mod errors;
/// Provider identity and per-request options.
pub mod model;
/// Common imports for typical usage.
pub mod prelude;
/// Prompt rendering.
pub mod prompt;
/// The backend contract.
pub mod provider;
/// One-time backend selection.
pub mod selector;
/// Chunk stream helpers.
pub mod stream;
/// Vendor-specific backends.
pub mod vendors;

pub use config::AiConfig;
pub use content::{Analysis, AnalysisRequest, KnowledgeMap, NormalizedChunk, Subject};
pub use errors::{HarnessError, ProviderError};
pub use model::{ProviderIdentity, RequestOptions};
pub use provider::{AnalysisProvider, ChunkStream};
pub use selector::{ProviderFactory, ProviderSelector, build_provider, global_provider};
pub use stream::collect_analysis;
