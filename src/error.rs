use thiserror::Error;

/// Maximum number of characters of a raw response body kept inside an error.
pub(crate) const BODY_EXCERPT_CHARS: usize = 500;

/// Aggregates every failure mode exposed by the unified chat client.
///
/// Configuration failures ([`LLMError::UnrecognizedModel`], [`LLMError::MissingCredential`],
/// [`LLMError::InvalidConfig`]) are only ever produced while constructing a client. Transport
/// and parse failures are produced per call and can be logged and skipped by the caller.
#[derive(Debug, Error)]
pub enum LLMError {
    /// The model name does not start with any known provider prefix.
    #[error("unrecognized model: {model}")]
    UnrecognizedModel { model: String },
    /// A credential or base URL required by the resolved provider is not configured.
    #[error("missing configuration for {provider}: {key} is not set")]
    MissingCredential {
        /// Provider the client was being built for, such as `anthropic`.
        provider: &'static str,
        /// Name of the absent configuration variable, such as `ANTHROPIC_KEY`.
        key: &'static str,
    },
    /// Raised when a configured value is present but unusable.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Name of the configuration field that failed validation.
        field: String,
        /// Additional context explaining why the field is invalid.
        reason: String,
    },
    /// Non-2xx status, timeout or connection failure.
    #[error("transport error{}: {message}", .status.map(|code| format!(" (status {code})")).unwrap_or_default())]
    Transport {
        /// HTTP status when the server answered, `None` for network-level failures.
        status: Option<u16>,
        message: String,
    },
    /// The response body did not match the provider's response dialect.
    #[error("parse error: {message}; raw response: {body}")]
    Parse {
        message: String,
        /// Truncated raw body kept for diagnosis.
        body: String,
    },
    /// Signals that the request payload could not be produced.
    #[error("invalid request: {message}")]
    Validation { message: String },
}

impl LLMError {
    /// Creates a network-level [`LLMError::Transport`] without an HTTP status.
    ///
    /// # Examples
    ///
    /// ```
    /// use omnichat::error::LLMError;
    ///
    /// let err = LLMError::transport("dns lookup failed");
    /// assert!(matches!(err, LLMError::Transport { status: None, .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Transport`] for an unsuccessful HTTP status, embedding a
    /// truncated excerpt of the response body.
    ///
    /// # Examples
    ///
    /// ```
    /// use omnichat::error::LLMError;
    ///
    /// let err = LLMError::status(429, "slow down");
    /// assert_eq!(err.to_string(), "transport error (status 429): slow down");
    /// ```
    pub fn status(status: u16, body: &str) -> Self {
        Self::Transport {
            status: Some(status),
            message: truncate_body(body),
        }
    }

    /// Creates an [`LLMError::Parse`] carrying a truncated copy of the raw body.
    pub fn parse<T: Into<String>>(message: T, body: &str) -> Self {
        Self::Parse {
            message: message.into(),
            body: truncate_body(body),
        }
    }

    /// Returns `true` for errors that can only happen while building a client.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::UnrecognizedModel { .. }
                | Self::MissingCredential { .. }
                | Self::InvalidConfig { .. }
        )
    }
}

/// Cuts `body` down to [`BODY_EXCERPT_CHARS`] characters on a char boundary.
pub(crate) fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
