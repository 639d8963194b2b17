//! Static provider registry: model-name prefixes, credentials, auth placement and dialects.
//!
//! Adding a provider means adding a [`ProviderKind`] variant, a prefix in
//! [`MODEL_PREFIXES`] and an arm in [`profile`]; the exhaustive `match` keeps the two
//! tables from drifting apart.

use std::fmt;
use std::pin::Pin;

use futures_core::Stream;
use serde::Serialize;

use crate::error::LLMError;
use crate::types::Fragment;

pub mod request;
pub mod response;

pub use request::RequestDialect;
pub use response::{ResponseAdapter, ResponseDialect};

/// Streamed answer returned by [`crate::client::LLMClient::stream_chat`].
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<Fragment, LLMError>> + Send>>;

/// Known vendor API families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    Zhipu,
    Volcengine,
    Qwen,
    Anthropic,
    Google,
}

impl ProviderKind {
    /// Every provider, in registry order.
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::OpenAi,
        ProviderKind::Zhipu,
        ProviderKind::Volcengine,
        ProviderKind::Qwen,
        ProviderKind::Anthropic,
        ProviderKind::Google,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Zhipu => "zhipu",
            ProviderKind::Volcengine => "volcengine",
            ProviderKind::Qwen => "qwen",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
        }
    }

    pub fn profile(&self) -> &'static ProviderProfile {
        profile(*self)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the credential goes on the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// Raw key in a dedicated header, e.g. `x-api-key`.
    Header(&'static str),
    /// Raw key appended as a URL query parameter; no auth header is sent.
    Query(&'static str),
}

/// Read-only description of how to talk to one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderProfile {
    /// Configuration variable holding the credential.
    pub key_env: &'static str,
    /// Configuration variable holding the full endpoint URL.
    pub url_env: &'static str,
    pub auth: AuthStyle,
    /// Static headers merged last; they win over generic ones on collision.
    pub headers: &'static [(&'static str, &'static str)],
    pub request: RequestDialect,
    pub response: ResponseDialect,
}

/// Prefix table consulted in order by [`resolve`]; the first match wins.
pub const MODEL_PREFIXES: &[(&str, ProviderKind)] = &[
    ("gpt-", ProviderKind::OpenAi),
    ("glm", ProviderKind::Zhipu),
    ("zhipu", ProviderKind::Zhipu),
    ("doubao", ProviderKind::Volcengine),
    ("qwen", ProviderKind::Qwen),
    ("claude", ProviderKind::Anthropic),
    ("gemini", ProviderKind::Google),
];

/// Maps a model name to its provider by prefix.
///
/// # Examples
///
/// ```
/// use omnichat::provider::{resolve, ProviderKind};
///
/// assert_eq!(resolve("doubao-1.5-pro-32k-250115").unwrap(), ProviderKind::Volcengine);
/// assert!(resolve("llama-3").is_err());
/// ```
///
/// # Errors
///
/// Returns [`LLMError::UnrecognizedModel`] when no prefix matches.
pub fn resolve(model: &str) -> Result<ProviderKind, LLMError> {
    MODEL_PREFIXES
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, kind)| *kind)
        .ok_or_else(|| LLMError::UnrecognizedModel {
            model: model.to_string(),
        })
}

const OPENAI: ProviderProfile = ProviderProfile {
    key_env: "OPENAI_KEY",
    url_env: "OPENAI_URL",
    auth: AuthStyle::Bearer,
    headers: &[],
    request: RequestDialect::Default,
    response: ResponseDialect::OpenAi,
};

const ZHIPU: ProviderProfile = ProviderProfile {
    key_env: "ZHIPU_KEY",
    url_env: "ZHIPU_URL",
    ..OPENAI
};

const VOLCENGINE: ProviderProfile = ProviderProfile {
    key_env: "VOLCENGINE_KEY",
    url_env: "VOLCENGINE_URL",
    request: RequestDialect::Volcengine,
    ..OPENAI
};

const QWEN: ProviderProfile = ProviderProfile {
    key_env: "QWEN_KEY",
    url_env: "QWEN_URL",
    ..OPENAI
};

const ANTHROPIC: ProviderProfile = ProviderProfile {
    key_env: "ANTHROPIC_KEY",
    url_env: "ANTHROPIC_URL",
    auth: AuthStyle::Header("x-api-key"),
    headers: &[("anthropic-version", "2023-06-01")],
    request: RequestDialect::Anthropic,
    response: ResponseDialect::Anthropic,
};

const GOOGLE: ProviderProfile = ProviderProfile {
    key_env: "GOOGLE_KEY",
    url_env: "GOOGLE_URL",
    auth: AuthStyle::Query("key"),
    headers: &[],
    request: RequestDialect::Default,
    response: ResponseDialect::Gemini,
};

/// Returns the profile of a provider. Total over [`ProviderKind`].
pub fn profile(kind: ProviderKind) -> &'static ProviderProfile {
    match kind {
        ProviderKind::OpenAi => &OPENAI,
        ProviderKind::Zhipu => &ZHIPU,
        ProviderKind::Volcengine => &VOLCENGINE,
        ProviderKind::Qwen => &QWEN,
        ProviderKind::Anthropic => &ANTHROPIC,
        ProviderKind::Google => &GOOGLE,
    }
}
