//! Extraction client: one bounded model call per document.
//!
//! [`ExtractionModel`] is the seam to the external vision/text model. The
//! production implementation, [`LlmModel`], drives any `edgequake-llm`
//! provider; tests plug in scripted models.
//!
//! The client does not retry. A failed or timed-out call surfaces as
//! [`IntakeError::ExtractionService`] and the user resubmits; the dialog
//! owns that loop.

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::pipeline::document::ExtractionRequest;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The external model, reduced to the single extraction contract.
#[async_trait]
pub trait ExtractionModel: Send + Sync {
    /// Identifier reported in logs.
    fn model_id(&self) -> &str;

    /// Send `request` as the sole user message and return the reply text.
    async fn complete(
        &self,
        request: &ExtractionRequest,
        max_tokens: usize,
    ) -> Result<String, IntakeError>;
}

/// Unstructured reply text from the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtraction {
    pub text: String,
    pub duration_ms: u64,
}

/// Issues exactly one model call per request, bounded by a fixed ceiling.
#[derive(Clone)]
pub struct ExtractionClient {
    model: Arc<dyn ExtractionModel>,
    max_tokens: usize,
    timeout: Duration,
}

impl ExtractionClient {
    pub fn new(model: Arc<dyn ExtractionModel>, max_tokens: usize, timeout: Duration) -> Self {
        Self {
            model,
            max_tokens,
            timeout,
        }
    }

    pub fn from_config(model: Arc<dyn ExtractionModel>, config: &IntakeConfig) -> Self {
        Self::new(
            model,
            config.max_tokens,
            Duration::from_secs(config.api_timeout_secs),
        )
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub async fn extract(&self, request: &ExtractionRequest) -> Result<RawExtraction, IntakeError> {
        let start = Instant::now();
        info!(
            "Calling {} ({} parts, budget {} tokens)",
            self.model.model_id(),
            request.parts().len(),
            self.max_tokens
        );

        let text = match tokio::time::timeout(
            self.timeout,
            self.model.complete(request, self.max_tokens),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Model call failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                warn!("Model call exceeded {:?}", self.timeout);
                return Err(IntakeError::timeout(self.timeout.as_secs()));
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!("Raw model reply ({}ms):\n{}", duration_ms, text);
        Ok(RawExtraction { text, duration_ms })
    }
}

/// [`ExtractionModel`] backed by an `edgequake-llm` provider.
pub struct LlmModel {
    provider: Arc<dyn LLMProvider>,
    model: String,
    temperature: f32,
}

impl LlmModel {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
        }
    }

    /// Resolve the provider described by `config`.
    pub fn from_config(config: &IntakeConfig) -> Result<Self, IntakeError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config.model.clone(), config.temperature))
    }
}

#[async_trait]
impl ExtractionModel for LlmModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &ExtractionRequest,
        max_tokens: usize,
    ) -> Result<String, IntakeError> {
        let images: Vec<ImageData> = request
            .image()
            .map(|(media_type, data)| vec![ImageData::new(STANDARD.encode(data), media_type)])
            .unwrap_or_default();

        let messages = vec![ChatMessage::user_with_images(request.instruction(), images)];

        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| IntakeError::provider(e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`): used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model`.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &IntakeConfig) -> Result<Arc<dyn LLMProvider>, IntakeError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, &config.model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    // The default model is an Anthropic one; prefer that key when present.
    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        if !key.is_empty() {
            return create_provider("anthropic", &config.model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| IntakeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, IntakeError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        IntakeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
