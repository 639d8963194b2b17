use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::LLMError;
use crate::http::reqwest::default_dyn_transport;
use crate::http::{
    DynHttpTransport, JSON_CONTENT_TYPE, post_json_stream_with_headers, post_json_with_headers,
};
use crate::provider::{AuthStyle, ChatStream, ProviderKind, ResponseAdapter, resolve};
use crate::stream::create_stream;
use crate::types::{ChatOptions, ChatOutput, Message, ModelInfo};

/// LLM 调用入口 一个实例绑定一个模型与供应商
///
/// The provider is derived from the model name once, at construction, together with the
/// credential and endpoint; none of them change afterwards. Instances are cheap, so
/// creating one per conversation (or per call) is fine.
///
/// # Examples
///
/// ```
/// use omnichat::LLMClient;
/// use omnichat::config::ClientConfig;
/// use omnichat::http::reqwest::default_dyn_transport;
/// use omnichat::provider::ProviderKind;
///
/// let config = ClientConfig::new()
///     .with_var("VOLCENGINE_KEY", "ark-key")
///     .with_var("VOLCENGINE_URL", "https://ark.cn-beijing.volces.com/api/v3/chat/completions");
/// let client = LLMClient::new("doubao-1.5-pro-32k-250115", &config, default_dyn_transport().unwrap()).unwrap();
/// assert_eq!(client.provider(), ProviderKind::Volcengine);
/// ```
pub struct LLMClient {
    model: String,
    provider: ProviderKind,
    api_key: String,
    base_url: String,
    timeout: Duration,
    transport: DynHttpTransport,
}

impl LLMClient {
    /// Binds a client to `model` using explicitly injected configuration and transport.
    ///
    /// # Errors
    ///
    /// [`LLMError::UnrecognizedModel`] for an unknown model prefix,
    /// [`LLMError::MissingCredential`] when the provider's key or URL is not configured,
    /// [`LLMError::InvalidConfig`] when the URL is malformed.
    pub fn new(
        model: impl Into<String>,
        config: &ClientConfig,
        transport: DynHttpTransport,
    ) -> Result<Self, LLMError> {
        let model = model.into();
        let provider = resolve(&model)?;
        let endpoint = config.resolve(provider)?;
        debug!(model = %model, provider = %provider, "chat client created");

        Ok(Self {
            model,
            provider,
            api_key: endpoint.api_key,
            base_url: endpoint.base_url,
            timeout: config.timeout(),
            transport,
        })
    }

    /// Convenience constructor: `.env` plus process environment, reqwest transport.
    pub fn from_env(model: impl Into<String>) -> Result<Self, LLMError> {
        Self::new(model, &ClientConfig::from_dotenv(), default_dyn_transport()?)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Describes the binding without exposing the credential.
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            model: self.model.clone(),
            provider: self.provider.name(),
            api_url: self.base_url.clone(),
            has_api_key: !self.api_key.is_empty(),
        }
    }

    /// Sends the conversation and waits for the complete answer.
    ///
    /// # Errors
    ///
    /// [`LLMError::Transport`] for network failures, timeouts and non-2xx statuses;
    /// [`LLMError::Parse`] when the body does not match the provider's response shape.
    pub async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<String, LLMError> {
        let payload = self.build_payload(messages, false, options);
        debug!(provider = %self.provider, stream = false, "dispatching chat request");
        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.request_url()?,
            self.build_headers(),
            &payload,
            self.timeout,
        )
        .await?;

        let text = response.text();
        if !response.is_success() {
            warn!(provider = %self.provider, status = response.status, "chat request failed");
            return Err(LLMError::status(response.status, &text));
        }
        self.parse_complete(&text)
    }

    /// Sends the conversation and returns the answer as a stream of fragments.
    ///
    /// The HTTP status is checked before the stream is handed out, so a non-2xx answer
    /// surfaces here rather than as a stream item.
    ///
    /// # Errors
    ///
    /// [`LLMError::Transport`] for network failures, timeouts and non-2xx statuses.
    pub async fn stream_chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatStream, LLMError> {
        let payload = self.build_payload(messages, true, options);
        debug!(provider = %self.provider, stream = true, "dispatching chat request");
        let response = post_json_stream_with_headers(
            self.transport.as_ref(),
            self.request_url()?,
            self.build_headers(),
            &payload,
            self.timeout,
        )
        .await?;

        if !response.is_success() {
            let status = response.status;
            warn!(provider = %self.provider, status, "streaming chat request failed");
            let text = response
                .collect_text()
                .await
                .unwrap_or_else(|err| err.to_string());
            return Err(LLMError::status(status, &text));
        }
        Ok(create_stream(response.body, self.provider.profile().response))
    }

    /// Single entry point routing on `stream`, for callers that pick the mode at runtime.
    pub async fn send(
        &self,
        messages: &[Message],
        stream: bool,
        options: &ChatOptions,
    ) -> Result<ChatOutput, LLMError> {
        if stream {
            self.stream_chat(messages, options).await.map(ChatOutput::Stream)
        } else {
            self.chat(messages, options).await.map(ChatOutput::Text)
        }
    }

    /// Builds the provider payload exactly as it would be sent.
    pub fn build_payload(&self, messages: &[Message], stream: bool, options: &ChatOptions) -> Value {
        self.provider
            .profile()
            .request
            .build(&self.model, messages, stream, options)
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let profile = self.provider.profile();
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string());
        match profile.auth {
            AuthStyle::Bearer => {
                headers.insert(
                    "Authorization".to_string(),
                    format!("Bearer {}", self.api_key),
                );
            }
            AuthStyle::Header(name) => {
                headers.insert(name.to_string(), self.api_key.clone());
            }
            AuthStyle::Query(_) => {}
        }
        for (name, value) in profile.headers {
            headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            headers.insert(name.to_string(), value.to_string());
        }
        headers
    }

    fn request_url(&self) -> Result<String, LLMError> {
        let profile = self.provider.profile();
        let AuthStyle::Query(param) = profile.auth else {
            return Ok(self.base_url.clone());
        };
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|err| LLMError::InvalidConfig {
            field: profile.url_env.to_string(),
            reason: err.to_string(),
        })?;
        url.query_pairs_mut().append_pair(param, &self.api_key);
        Ok(url.into())
    }

    fn parse_complete(&self, text: &str) -> Result<String, LLMError> {
        let dialect = self.provider.profile().response;
        let body: Value = serde_json::from_str(text)
            .map_err(|err| LLMError::parse(format!("response is not valid JSON: {err}"), text))?;
        if let Some(reasoning) = dialect.parse_reasoning(&body) {
            debug!(provider = %self.provider, reasoning = %reasoning, "reasoning content");
        }
        dialect.parse_complete(&body).ok_or_else(|| {
            LLMError::parse(
                format!("unexpected {} response shape", self.provider),
                text,
            )
        })
    }
}
