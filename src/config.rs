use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LLMError;
use crate::provider::{ProviderKind, profile};

/// Default bound on one chat call, sized for long generations.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;

/// 客户端配置 保存各供应商的密钥与地址
///
/// Values are keyed by the variable names listed in each provider profile
/// (`OPENAI_KEY`, `OPENAI_URL`, `ANTHROPIC_KEY`, ...). Build it once at process start and
/// hand it to [`crate::client::LLMClient::new`]; nothing in the crate reads the process
/// environment behind the caller's back.
///
/// # Examples
///
/// ```
/// use omnichat::config::ClientConfig;
///
/// let config = ClientConfig::new()
///     .with_var("OPENAI_KEY", "sk-test")
///     .with_var("OPENAI_URL", "https://api.openai.com/v1/chat/completions");
/// assert_eq!(config.get("OPENAI_KEY"), Some("sk-test"));
/// assert_eq!(config.get("QWEN_KEY"), None);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    vars: HashMap<String, String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Credential and endpoint resolved for one provider.
#[derive(Clone)]
pub(crate) struct ResolvedEndpoint {
    pub api_key: String,
    pub base_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            vars: HashMap::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects every provider variable through `lookup`.
    pub fn from_lookup<F>(mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut config = Self::new();
        for kind in ProviderKind::ALL {
            let profile = profile(kind);
            for key in [profile.key_env, profile.url_env] {
                if let Some(value) = lookup(key) {
                    config = config.with_var(key, value);
                }
            }
        }
        config
    }

    /// Reads every provider variable from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads a `.env` file (if any) into the environment, then behaves like [`Self::from_env`].
    pub fn from_dotenv() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env file"),
            Err(err) => debug!(error = %err, "no .env file loaded"),
        }
        Self::from_env()
    }

    /// Sets one variable. Blank values are ignored, as if the variable were unset.
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.vars.insert(key.into(), value);
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns a variable's value. Blank values read as unset, however the config was loaded.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Looks up the credential and base URL a provider needs.
    ///
    /// # Errors
    ///
    /// [`LLMError::MissingCredential`] names the first absent variable;
    /// [`LLMError::InvalidConfig`] reports a credential that cannot travel in an HTTP header
    /// or a base URL that is not an absolute URL.
    pub(crate) fn resolve(&self, kind: ProviderKind) -> Result<ResolvedEndpoint, LLMError> {
        let profile = profile(kind);
        let require = |key: &'static str| {
            self.get(key)
                .map(str::to_string)
                .ok_or(LLMError::MissingCredential {
                    provider: kind.name(),
                    key,
                })
        };
        let api_key = require(profile.key_env)?;
        let base_url = require(profile.url_env)?;

        reqwest::header::HeaderValue::from_str(&api_key).map_err(|_| LLMError::InvalidConfig {
            field: profile.key_env.to_string(),
            reason: "credential contains characters not allowed in an HTTP header".to_string(),
        })?;

        reqwest::Url::parse(&base_url).map_err(|err| LLMError::InvalidConfig {
            field: profile.url_env.to_string(),
            reason: format!("{base_url:?} is not an absolute URL: {err}"),
        })?;

        Ok(ResolvedEndpoint { api_key, base_url })
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.vars.keys().collect();
        keys.sort();
        f.debug_struct("ClientConfig")
            .field("vars", &keys)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
