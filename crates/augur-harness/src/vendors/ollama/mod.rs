//! Local model runtime backend (Ollama generate API).
mod adapter;
mod client;
mod config;

pub use adapter::OllamaProvider;
pub use client::{OllamaClient, TokenCallback};
pub use config::{DEFAULT_OLLAMA_BASE_URL, DEFAULT_OLLAMA_MODEL, OllamaClientConfig};
