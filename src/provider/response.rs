use serde_json::Value;

/// Extracts assistant text from a provider's JSON bodies.
///
/// `parse_fragment` returns an empty string when a streaming event carries no visible
/// text; that is not an end-of-stream signal.
pub trait ResponseAdapter {
    /// Answer text of a complete response, `None` when the body has an unexpected shape.
    fn parse_complete(&self, body: &Value) -> Option<String>;

    /// Answer text carried by one streaming event.
    fn parse_fragment(&self, event: &Value) -> String;

    /// Reasoning text carried next to the answer, if the provider emits any.
    fn parse_reasoning(&self, _event: &Value) -> Option<String> {
        None
    }
}

/// OpenAI chat-completions shape, shared by every OpenAI-compatible vendor.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl ResponseAdapter for OpenAiAdapter {
    fn parse_complete(&self, body: &Value) -> Option<String> {
        body.get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
            .map(str::to_string)
    }

    fn parse_fragment(&self, event: &Value) -> String {
        event
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn parse_reasoning(&self, event: &Value) -> Option<String> {
        let choice = event.get("choices")?.get(0)?;
        choice
            .get("delta")
            .or_else(|| choice.get("message"))?
            .get("reasoning_content")?
            .as_str()
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

/// Anthropic Messages API shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl AnthropicAdapter {
    fn is_content_delta(event: &Value) -> bool {
        event.get("type").and_then(Value::as_str) == Some("content_block_delta")
    }
}

impl ResponseAdapter for AnthropicAdapter {
    fn parse_complete(&self, body: &Value) -> Option<String> {
        body.get("content")?
            .get(0)?
            .get("text")?
            .as_str()
            .map(str::to_string)
    }

    fn parse_fragment(&self, event: &Value) -> String {
        if !Self::is_content_delta(event) {
            return String::new();
        }
        event
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn parse_reasoning(&self, event: &Value) -> Option<String> {
        if !Self::is_content_delta(event) {
            return None;
        }
        event
            .pointer("/delta/thinking")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

/// Google Gemini `generateContent` shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiAdapter;

impl ResponseAdapter for GeminiAdapter {
    fn parse_complete(&self, body: &Value) -> Option<String> {
        body.pointer("/candidates/0/content/parts/0/text")?
            .as_str()
            .map(str::to_string)
    }

    fn parse_fragment(&self, event: &Value) -> String {
        let Some(candidates) = event.get("candidates").and_then(Value::as_array) else {
            return String::new();
        };
        candidates
            .iter()
            .filter_map(|candidate| candidate.pointer("/content/parts")?.as_array())
            .flatten()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .find(|text| !text.is_empty())
            .unwrap_or_default()
            .to_string()
    }
}

/// Closed set of response dialects; each variant delegates to its adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDialect {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ResponseAdapter for ResponseDialect {
    fn parse_complete(&self, body: &Value) -> Option<String> {
        match self {
            ResponseDialect::OpenAi => OpenAiAdapter.parse_complete(body),
            ResponseDialect::Anthropic => AnthropicAdapter.parse_complete(body),
            ResponseDialect::Gemini => GeminiAdapter.parse_complete(body),
        }
    }

    fn parse_fragment(&self, event: &Value) -> String {
        match self {
            ResponseDialect::OpenAi => OpenAiAdapter.parse_fragment(event),
            ResponseDialect::Anthropic => AnthropicAdapter.parse_fragment(event),
            ResponseDialect::Gemini => GeminiAdapter.parse_fragment(event),
        }
    }

    fn parse_reasoning(&self, event: &Value) -> Option<String> {
        match self {
            ResponseDialect::OpenAi => OpenAiAdapter.parse_reasoning(event),
            ResponseDialect::Anthropic => AnthropicAdapter.parse_reasoning(event),
            ResponseDialect::Gemini => GeminiAdapter.parse_reasoning(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn openai_complete_and_fragment() {
        let body = json!({"choices": [{"message": {"content": "hello"}}]});
        assert_eq!(
            ResponseDialect::OpenAi.parse_complete(&body).as_deref(),
            Some("hello")
        );

        let event = json!({"choices": [{"delta": {"content": "he"}}]});
        assert_eq!(ResponseDialect::OpenAi.parse_fragment(&event), "he");

        let role_only = json!({"choices": [{"delta": {"role": "assistant"}}]});
        assert_eq!(ResponseDialect::OpenAi.parse_fragment(&role_only), "");
        assert_eq!(ResponseDialect::OpenAi.parse_fragment(&json!({"choices": []})), "");
    }

    #[test]
    fn openai_complete_rejects_unexpected_shapes() {
        for body in [
            json!({}),
            json!({"choices": []}),
            json!({"choices": [{"message": {}}]}),
            json!({"choices": [{"message": {"content": 42}}]}),
            json!({"error": {"message": "quota exceeded"}}),
        ] {
            assert!(ResponseDialect::OpenAi.parse_complete(&body).is_none(), "{body}");
        }
    }

    #[test]
    fn openai_reasoning_is_kept_apart_from_answer() {
        let event = json!({"choices": [{"delta": {"reasoning_content": "thinking...", "content": ""}}]});
        assert_eq!(ResponseDialect::OpenAi.parse_fragment(&event), "");
        assert_eq!(
            ResponseDialect::OpenAi.parse_reasoning(&event).as_deref(),
            Some("thinking...")
        );

        let body = json!({"choices": [{"message": {"content": "42", "reasoning_content": "6*7"}}]});
        assert_eq!(ResponseDialect::OpenAi.parse_complete(&body).as_deref(), Some("42"));
        assert_eq!(ResponseDialect::OpenAi.parse_reasoning(&body).as_deref(), Some("6*7"));
    }

    #[test]
    fn anthropic_complete_and_fragment() {
        let body = json!({"content": [{"text": "hi"}]});
        assert_eq!(
            ResponseDialect::Anthropic.parse_complete(&body).as_deref(),
            Some("hi")
        );

        let delta = json!({"type": "content_block_delta", "delta": {"text": "!"}});
        assert_eq!(ResponseDialect::Anthropic.parse_fragment(&delta), "!");

        for other in [
            json!({"type": "message_start", "message": {"content": []}}),
            json!({"type": "content_block_start", "delta": {"text": "ignored"}}),
            json!({"type": "message_stop"}),
            json!({"delta": {"text": "untyped"}}),
        ] {
            assert_eq!(ResponseDialect::Anthropic.parse_fragment(&other), "", "{other}");
        }
    }

    #[test]
    fn anthropic_thinking_delta_is_reasoning_only() {
        let event = json!({
            "type": "content_block_delta",
            "delta": {"type": "thinking_delta", "thinking": "Let me see"}
        });
        assert_eq!(ResponseDialect::Anthropic.parse_fragment(&event), "");
        assert_eq!(
            ResponseDialect::Anthropic.parse_reasoning(&event).as_deref(),
            Some("Let me see")
        );
    }

    #[test]
    fn gemini_complete_and_fragment() {
        let body = json!({"candidates": [{"content": {"parts": [{"text": "bonjour"}]}}]});
        assert_eq!(
            ResponseDialect::Gemini.parse_complete(&body).as_deref(),
            Some("bonjour")
        );

        let event = json!({
            "candidates": [
                {"content": {"parts": [{"text": ""}, {"inlineData": {}}]}},
                {"content": {"parts": [{"text": "second"}, {"text": "third"}]}}
            ]
        });
        assert_eq!(ResponseDialect::Gemini.parse_fragment(&event), "second");
        assert_eq!(ResponseDialect::Gemini.parse_fragment(&json!({"usageMetadata": {}})), "");
        assert!(ResponseDialect::Gemini.parse_complete(&json!({"candidates": []})).is_none());
    }
}
