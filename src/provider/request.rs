use serde_json::{Map, Value, json};
use tracing::warn;

use crate::types::{ChatOptions, DeepThink, Message, Role};

/// `max_tokens` sent to Anthropic-family models when the caller does not set one.
pub const DEFAULT_ANTHROPIC_MAX_TOKENS: u64 = 4000;

/// Request payload shape expected by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDialect {
    /// OpenAI chat-completions shape: `{model, stream, ...options, messages}`.
    Default,
    /// Messages API shape: system prompt hoisted to a top-level `system` field.
    Anthropic,
    /// OpenAI shape plus a `thinking` object derived from the `deep_think` option.
    Volcengine,
}

impl RequestDialect {
    /// Top-level keys produced by the builder itself; options cannot override them.
    fn owned_keys(&self) -> &'static [&'static str] {
        match self {
            RequestDialect::Default => &["model", "stream", "messages"],
            RequestDialect::Anthropic => &["model", "stream", "messages"],
            RequestDialect::Volcengine => &["model", "stream", "messages", "thinking"],
        }
    }

    /// Option keys translated by the builder instead of being forwarded.
    fn consumed_keys(&self) -> &'static [&'static str] {
        match self {
            RequestDialect::Volcengine => &["deep_think"],
            _ => &[],
        }
    }

    /// Builds a fresh provider payload. The caller's messages and options are only read.
    ///
    /// # Examples
    ///
    /// ```
    /// use omnichat::provider::RequestDialect;
    /// use omnichat::types::{ChatOptions, Message};
    ///
    /// let messages = vec![Message::system("be brief"), Message::user("hi")];
    /// let body = RequestDialect::Anthropic.build("claude-3-5-sonnet", &messages, false, &ChatOptions::new());
    /// assert_eq!(body["system"], "be brief");
    /// assert_eq!(body["max_tokens"], 4000);
    /// assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    /// ```
    pub fn build(
        &self,
        model: &str,
        messages: &[Message],
        stream: bool,
        options: &ChatOptions,
    ) -> Value {
        let mut body = Map::new();

        // 1. 透传调用方参数，跳过构建器自身负责的字段
        for (key, value) in options.iter() {
            if self.consumed_keys().contains(&key.as_str()) {
                continue;
            }
            if self.owned_keys().contains(&key.as_str()) {
                warn!(option = %key, "ignoring option that collides with a payload field");
                continue;
            }
            body.insert(key.clone(), value.clone());
        }

        body.insert("model".to_string(), Value::String(model.to_string()));
        body.insert("stream".to_string(), Value::Bool(stream));

        // 2. 按方言整理 messages
        match self {
            RequestDialect::Default => {
                body.insert("messages".to_string(), convert_messages(messages));
            }
            RequestDialect::Anthropic => {
                let (system, turns) = split_system(messages);
                body.entry("max_tokens")
                    .or_insert_with(|| Value::from(DEFAULT_ANTHROPIC_MAX_TOKENS));
                // 调用方的 system 参数仅在没有系统消息时保留
                if let Some(system) = system.filter(|text| !text.is_empty()) {
                    body.insert("system".to_string(), Value::String(system.to_string()));
                }
                body.insert("messages".to_string(), convert_messages(turns));
            }
            RequestDialect::Volcengine => {
                let mode = options
                    .get("deep_think")
                    .and_then(Value::as_str)
                    .and_then(DeepThink::parse)
                    .unwrap_or_default();
                body.insert("thinking".to_string(), json!({ "type": mode.as_str() }));
                body.insert("messages".to_string(), convert_messages(messages));
            }
        }

        Value::Object(body)
    }
}

/// Hoists the first system message and returns the remaining turns in order.
///
/// Further system messages are dropped; they have no place in the Messages API turn list.
fn split_system(messages: &[Message]) -> (Option<&str>, Vec<&Message>) {
    let mut system = None;
    let mut turns = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role != Role::System {
            turns.push(message);
        } else if system.is_none() {
            system = Some(message.content.as_str());
        } else {
            warn!("dropping additional system message; only the first one is sent");
        }
    }
    (system, turns)
}

fn convert_messages<'a>(messages: impl IntoIterator<Item = &'a Message>) -> Value {
    Value::Array(
        messages
            .into_iter()
            .map(|message| {
                json!({
                    "role": message.role.as_str(),
                    "content": message.content,
                })
            })
            .collect(),
    )
}
