//! Model interaction: submit one page unit and collect the raw answer.
//!
//! All prompt wording lives in [`crate::prompts`] and all transport details
//! in [`crate::provider`]; this module owns only the call sequence.
//!
//! ## Retry Strategy
//!
//! Only a provider-signalled rate limit is retried. The wait is drawn
//! uniformly from 60–120 s (configurable) so that several clients sharing a
//! quota do not retry in lockstep. Three attempts in total by default, and
//! no wait follows the final attempt. Every other error ends the unit at
//! once: a malformed page will not get better by asking again.

use crate::config::{ExtractionConfig, PromptVersion, RetryPolicy};
use crate::document::PageUnit;
use crate::error::{Pdf2CsvError, UnitError};
use crate::output::ExtractionResult;
use crate::pipeline::encode::encode_payload;
use crate::progress::ProgressCallback;
use crate::prompts::build_prompt_with;
use crate::provider::{resolve_backend, GenerateRequest, ModelBackend};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Submits page units to a model backend.
///
/// Each client owns its backend and sampling settings; several clients with
/// different models can run side by side.
pub struct ExtractionClient {
    backend: Arc<dyn ModelBackend>,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
    retry: RetryPolicy,
    prompt_version: PromptVersion,
    prompt_template: Option<String>,
    progress: Option<ProgressCallback>,
}

impl ExtractionClient {
    /// Client over an explicit backend, with settings from `config`.
    pub fn new(backend: Arc<dyn ModelBackend>, config: &ExtractionConfig) -> Self {
        Self {
            backend,
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            top_p: config.top_p,
            top_k: config.top_k,
            retry: config.retry_policy(),
            prompt_version: config.prompt_version,
            prompt_template: config.prompt_template.clone(),
            progress: config.progress_callback.clone(),
        }
    }

    /// Resolve the backend from `config` and build a client.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, Pdf2CsvError> {
        Ok(Self::new(resolve_backend(config)?, config))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Extract the table of one unit.
    ///
    /// Never returns `Err`: failures are carried in
    /// [`ExtractionResult::outcome`] so one bad page cannot abort a batch.
    pub async fn extract(&self, unit: &PageUnit) -> ExtractionResult {
        let start = Instant::now();
        let label = unit.label();
        let payload = encode_payload(unit);
        let page_label = unit.page_index.map(|i| (i + 1).to_string());
        let request = GenerateRequest {
            model: self.model.clone(),
            payload_base64: payload.data,
            mime_type: payload.mime_type.to_string(),
            prompt: build_prompt_with(
                self.prompt_version,
                self.prompt_template.as_deref(),
                unit.media_type.label(),
                page_label.as_deref(),
            ),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            top_p: self.top_p,
            top_k: self.top_k,
        };

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        let (outcome, input_tokens, output_tokens) = loop {
            attempt += 1;
            match self.backend.generate(&request).await {
                Ok(resp) => {
                    let outcome = match resp.text.filter(|t| !t.trim().is_empty()) {
                        Some(text) => Ok(text),
                        None => Err(UnitError::EmptyResult),
                    };
                    break (outcome, resp.input_tokens, resp.output_tokens);
                }
                Err(e) if e.is_rate_limited() => {
                    if attempt >= max_attempts {
                        warn!("{}: rate limited, giving up after {} attempts", label, attempt);
                        let err = UnitError::RateLimited {
                            attempts: attempt,
                            detail: e.message,
                        };
                        break (Err(err), 0, 0);
                    }
                    let wait = self.retry.next_wait();
                    warn!(
                        "{}: rate limited (attempt {}/{}), waiting {}s",
                        label,
                        attempt,
                        max_attempts,
                        wait.as_secs()
                    );
                    if let Some(cb) = &self.progress {
                        cb.on_rate_limited(&label, attempt, wait.as_secs());
                    }
                    sleep(wait).await;
                }
                Err(e) => {
                    warn!("{}: provider error: {}", label, e);
                    break (Err(UnitError::ProviderFailed { detail: e.message }), 0, 0);
                }
            }
        };

        let duration = start.elapsed();
        debug!(
            "{}: {} attempt(s), {} in / {} out tokens, {:?}",
            label, attempt, input_tokens, output_tokens, duration
        );

        ExtractionResult {
            page_index: unit.page_index,
            attempts: attempt,
            outcome,
            input_tokens,
            output_tokens,
            duration_ms: duration.as_millis() as u64,
        }
    }
}
