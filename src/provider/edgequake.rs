//! Adapter running extraction through an edgequake-llm provider.
//!
//! The page is attached as an image part with the prompt as the user text.
//! Sampling options edgequake-llm does not expose (top-p, top-k, response
//! MIME type) are left to the provider's defaults.

use super::{GenerateRequest, GenerateResponse, ModelBackend, ProviderError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError};
use std::sync::Arc;

/// [`ModelBackend`] over any `edgequake_llm::LLMProvider`.
pub struct LlmProviderBackend {
    name: String,
    provider: Arc<dyn LLMProvider>,
}

impl LlmProviderBackend {
    pub fn new(provider_name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: format!("edgequake:{}", provider_name.into()),
            provider,
        }
    }
}

fn build_options(request: &GenerateRequest) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(request.temperature),
        max_tokens: Some(request.max_output_tokens as usize),
        ..Default::default()
    }
}

/// Only the typed rate-limit variant is retryable.
fn provider_error(e: LlmError) -> ProviderError {
    match e {
        LlmError::RateLimited(detail) => ProviderError::rate_limited(detail),
        other => ProviderError::new(other.to_string()),
    }
}

#[async_trait]
impl ModelBackend for LlmProviderBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let messages = vec![ChatMessage::user_with_images(
            request.prompt.as_str(),
            vec![ImageData::new(request.payload_base64.clone(), request.mime_type.clone())],
        )];

        let response = self
            .provider
            .chat(&messages, Some(&build_options(request)))
            .await
            .map_err(provider_error)?;

        let text = Some(response.content).filter(|c| !c.trim().is_empty());
        Ok(GenerateResponse {
            text,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
        })
    }
}
