//! Provider-agnostic data structures exchanged between callers and [`crate::client::LLMClient`].
//!
//! Messages go in, text (or a stream of [`Fragment`] values) comes out. Everything
//! provider-specific lives under [`crate::provider`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::provider::ChatStream;

/// Chat role understood by every supported provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Role-tagged chat message.
///
/// Conversations are plain ordered `Vec<Message>` values; the order is preserved through
/// every payload transformation.
///
/// # Examples
///
/// ```
/// # use omnichat::types::{Message, Role};
/// let msg = Message::user("Summarize Rust traits.");
/// assert_eq!(msg.role, Role::User);
/// assert_eq!(
///     serde_json::to_value(&msg).unwrap(),
///     serde_json::json!({"role": "user", "content": "Summarize Rust traits."})
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Value of the `deep_think` option understood by Volcengine models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeepThink {
    Enabled,
    #[default]
    Disabled,
    Auto,
}

impl DeepThink {
    /// Parses the option value, returning `None` for anything unrecognized.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "enabled" => Some(Self::Enabled),
            "disabled" => Some(Self::Disabled),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Auto => "auto",
        }
    }
}

/// Free-form request options such as `temperature`, `top_p` or `max_tokens`.
///
/// Keys are forwarded into the provider payload verbatim, except for the few that a
/// dialect consumes itself (`deep_think` for Volcengine, for example).
///
/// # Examples
///
/// ```
/// # use omnichat::types::{ChatOptions, DeepThink};
/// let options = ChatOptions::new()
///     .temperature(0.5)
///     .max_tokens(2000)
///     .deep_think(DeepThink::Auto)
///     .with("top_p", 0.9);
/// assert_eq!(options.get("max_tokens"), Some(&serde_json::json!(2000)));
/// assert_eq!(options.len(), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatOptions(Map<String, Value>);

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an arbitrary option, replacing any previous value for `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn temperature(self, temperature: f64) -> Self {
        self.with("temperature", temperature)
    }

    pub fn max_tokens(self, max_tokens: u64) -> Self {
        self.with("max_tokens", max_tokens)
    }

    pub fn deep_think(self, mode: DeepThink) -> Self {
        self.with("deep_think", mode.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for ChatOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One item of a streamed answer.
///
/// Only [`Fragment::Text`] carries model output. The other variants are produced by the
/// decoder itself so callers never mistake a diagnostic for generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Incremental answer text.
    Text(String),
    /// A stream line could not be decoded; the stream continues after it.
    Diagnostic(String),
    /// The stream finished without producing any text.
    Warning(String),
}

impl Fragment {
    /// Returns the answer text, or `None` for decoder-generated fragments.
    pub fn text(&self) -> Option<&str> {
        match self {
            Fragment::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::Text(text) => f.write_str(text),
            Fragment::Diagnostic(message) => write!(f, "[stream decode error] {message}"),
            Fragment::Warning(message) => write!(f, "[warning] {message}"),
        }
    }
}

/// Result of [`crate::client::LLMClient::send`], depending on the requested mode.
pub enum ChatOutput {
    Text(String),
    Stream(ChatStream),
}

impl fmt::Debug for ChatOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatOutput::Text(text) => f.debug_tuple("Text").field(text).finish(),
            ChatOutput::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Snapshot of a client's binding, safe to print (the credential itself is omitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub model: String,
    pub provider: &'static str,
    pub api_url: String,
    pub has_api_key: bool,
}
