//! Hosted chat-completions backend (DeepSeek API).
mod adapter;
mod config;
pub(crate) mod transport;

pub use adapter::DeepseekProvider;
pub use config::{
    DEEPSEEK_MAX_TOKENS, DEFAULT_DEEPSEEK_BASE_URL, DEFAULT_DEEPSEEK_MODEL, DeepseekClientConfig,
};
