//! Model backends: who actually reads the page.
//!
//! [`ModelBackend`] is the seam between the extraction client and a hosted
//! model. Two implementations ship with the crate:
//!
//! * [`GeminiBackend`]: Gemini `generateContent` over REST, sending the
//!   page inline (PDF or JPEG) with the full generation config. Default.
//! * [`LlmProviderBackend`]: any `edgequake_llm::LLMProvider`, for users who
//!   already route their models through edgequake-llm.
//!
//! Backends report failures as plain strings in [`ProviderError`]. The only
//! condition the client reacts to is a rate limit, recognised by the text
//! `rate limit exceeded` (any case).

mod edgequake;
mod gemini;

pub use edgequake::LlmProviderBackend;
pub use gemini::GeminiBackend;

use crate::config::{ExtractionConfig, API_KEY_ENV};
use crate::error::Pdf2CsvError;
use async_trait::async_trait;
use edgequake_llm::ProviderFactory;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const RATE_LIMIT_MARKER: &str = "rate limit exceeded";

/// One non-streaming generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    /// Standard base64 of the page bytes.
    pub payload_base64: String,
    pub mime_type: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

/// Generated text plus token usage when the backend reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    /// `None` when the model produced no text part at all.
    pub text: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A backend failure, as text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// An error the client will treat as retryable.
    pub fn rate_limited(detail: impl AsRef<str>) -> Self {
        Self::new(format!("Rate limit exceeded: {}", detail.as_ref()))
    }

    pub fn is_rate_limited(&self) -> bool {
        self.message.to_lowercase().contains(RATE_LIMIT_MARKER)
    }
}

/// A hosted generative model that accepts an inline document.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short identifier for logs (`"gemini"`, `"edgequake:openai"`, …).
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError>;
}

/// Pick the backend for a batch, from most to least specific:
///
/// 1. a pre-built `config.backend`;
/// 2. a named edgequake-llm provider (`config.provider_name`);
/// 3. the built-in Gemini client with the configured or environment API key.
///
/// Fails with [`Pdf2CsvError::MissingApiKey`] before any work starts when
/// none of these is available.
pub fn resolve_backend(config: &ExtractionConfig) -> Result<Arc<dyn ModelBackend>, Pdf2CsvError> {
    if let Some(backend) = &config.backend {
        return Ok(Arc::clone(backend));
    }

    if let Some(name) = &config.provider_name {
        let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            Pdf2CsvError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        })?;
        debug!("Using edgequake-llm provider '{}'", name);
        return Ok(Arc::new(LlmProviderBackend::new(name.clone(), provider)));
    }

    let api_key = config.resolve_api_key().ok_or_else(|| Pdf2CsvError::MissingApiKey {
        hint: format!("Set {API_KEY_ENV} or pass --api-key."),
    })?;
    let backend = GeminiBackend::new(api_key, &config.api_base_url, config.api_timeout_secs)
        .map_err(|e| Pdf2CsvError::Internal(format!("HTTP client: {e}")))?;
    Ok(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_marker_is_case_insensitive() {
        assert!(ProviderError::new("429 RATE LIMIT EXCEEDED").is_rate_limited());
        assert!(ProviderError::rate_limited("quota").is_rate_limited());
        assert!(!ProviderError::new("invalid argument").is_rate_limited());
    }

    #[test]
    fn explicit_key_resolves_gemini() {
        let config = ExtractionConfig::builder().api_key("k").build().unwrap();
        let backend = resolve_backend(&config).unwrap();
        assert_eq!(backend.name(), "gemini");
    }

    #[test]
    fn prebuilt_backend_wins() {
        struct Fixed;
        #[async_trait]
        impl ModelBackend for Fixed {
            fn name(&self) -> &str {
                "fixed"
            }
            async fn generate(&self, _: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
                Ok(GenerateResponse::default())
            }
        }

        let config = ExtractionConfig::builder()
            .backend(Arc::new(Fixed))
            .build()
            .unwrap();
        assert_eq!(resolve_backend(&config).unwrap().name(), "fixed");
    }
}
