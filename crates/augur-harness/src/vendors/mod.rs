//! Vendor backends.
//!
//! Each vendor keeps its wire types private and only exposes the provider and
//! its client configuration.
pub mod deepseek;
pub(crate) mod lines;
pub mod ollama;
