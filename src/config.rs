//! Configuration for the intake pipeline and dialog.
//!
//! Every knob lives in [`IntakeConfig`], built via [`IntakeConfigBuilder`].
//! The same config value is handed to the extractor, the handoff encoder and
//! the dialog engine, so one struct describes a whole deployment.

use crate::error::IntakeError;
use edgequake_llm::LLMProvider;
use reqwest::Url;
use std::fmt;
use std::sync::Arc;

/// Default vision model. Small and cheap; invoices are short documents.
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

/// Configuration for document intake.
///
/// # Example
/// ```rust
/// use docintake::IntakeConfig;
///
/// let config = IntakeConfig::builder()
///     .model("claude-3-haiku-20240307")
///     .api_timeout_secs(30)
///     .max_document_attempts(5)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct IntakeConfig {
    /// LLM model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// LLM provider name (e.g. "anthropic", "openai", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Token budget for one extraction reply. Default: 1024.
    ///
    /// Eight short fields fit in well under 300 tokens; the rest is headroom
    /// for models that wrap the JSON in prose.
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Ceiling for one model call in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Failed document submissions allowed per flow before the dialog gives
    /// up and returns to idle. Default: None (unbounded).
    pub max_document_attempts: Option<u32>,

    /// Total commit attempts against the store (first try + resends). Default: 2.
    pub sink_attempts: u32,

    /// Delay before a commit resend in milliseconds. Default: 250.
    pub sink_retry_backoff_ms: u64,

    /// Base address of the profile confirmation form.
    pub profile_form_url: String,

    /// Base address of the invoice confirmation form.
    pub invoice_form_url: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            provider: None,
            max_tokens: 1024,
            temperature: 0.0,
            api_timeout_secs: 60,
            max_document_attempts: None,
            sink_attempts: 2,
            sink_retry_backoff_ms: 250,
            profile_form_url: "http://localhost:8080/settings.html".to_string(),
            invoice_form_url: "http://localhost:8080/create_invoice.html".to_string(),
        }
    }
}

impl fmt::Debug for IntakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_document_attempts", &self.max_document_attempts)
            .field("sink_attempts", &self.sink_attempts)
            .field("profile_form_url", &self.profile_form_url)
            .field("invoice_form_url", &self.invoice_form_url)
            .finish()
    }
}

impl IntakeConfig {
    pub fn builder() -> IntakeConfigBuilder {
        IntakeConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IntakeConfig`].
#[derive(Debug)]
pub struct IntakeConfigBuilder {
    config: IntakeConfig,
}

impl IntakeConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_document_attempts(mut self, n: u32) -> Self {
        self.config.max_document_attempts = Some(n);
        self
    }

    pub fn sink_attempts(mut self, n: u32) -> Self {
        self.config.sink_attempts = n;
        self
    }

    pub fn sink_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.sink_retry_backoff_ms = ms;
        self
    }

    pub fn profile_form_url(mut self, url: impl Into<String>) -> Self {
        self.config.profile_form_url = url.into();
        self
    }

    pub fn invoice_form_url(mut self, url: impl Into<String>) -> Self {
        self.config.invoice_form_url = url.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IntakeConfig, IntakeError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(IntakeError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(IntakeError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.sink_attempts == 0 {
            return Err(IntakeError::InvalidConfig("sink_attempts must be ≥ 1".into()));
        }
        if c.max_document_attempts == Some(0) {
            return Err(IntakeError::InvalidConfig(
                "max_document_attempts must be ≥ 1 when set".into(),
            ));
        }
        for url in [&c.profile_form_url, &c.invoice_form_url] {
            Url::parse(url).map_err(|e| {
                IntakeError::InvalidConfig(format!("form URL '{url}' is not absolute: {e}"))
            })?;
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let c = IntakeConfig::builder().build().unwrap();
        assert_eq!(c.model, DEFAULT_MODEL);
        assert_eq!(c.max_tokens, 1024);
        assert_eq!(c.sink_attempts, 2);
        assert_eq!(c.max_document_attempts, None);
    }

    #[test]
    fn rejects_zero_sink_attempts() {
        let err = IntakeConfig::builder().sink_attempts(0).build().unwrap_err();
        assert!(err.to_string().contains("sink_attempts"));
    }

    #[test]
    fn rejects_zero_attempt_cap() {
        assert!(IntakeConfig::builder()
            .max_document_attempts(0)
            .build()
            .is_err());
    }

    #[test]
    fn rejects_relative_form_url() {
        let err = IntakeConfig::builder()
            .profile_form_url("settings.html")
            .build()
            .unwrap_err();
        assert!(matches!(err, IntakeError::InvalidConfig(_)));
    }

    #[test]
    fn debug_hides_provider() {
        let c = IntakeConfig::default();
        let s = format!("{c:?}");
        assert!(s.contains("provider: None"));
    }
}
