//! 多供应商 LLM 统一调用库
//!
//! One [`LLMClient`] per model: the provider is picked from the model name, the request is
//! reshaped into that provider's dialect, and the answer comes back as plain text or as a
//! stream of [`Fragment`] values.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod provider;
pub mod stream;
pub mod types;

pub use client::LLMClient;
pub use config::ClientConfig;
pub use error::LLMError;
pub use provider::{ChatStream, ProviderKind};
pub use types::*;
