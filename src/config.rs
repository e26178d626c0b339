//! Configuration types for table extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. The config is an explicit value handed to
//! each batch: two batches with different models or prompts can run side by
//! side in the same process, and nothing is cached globally between them.

use crate::error::Pdf2CsvError;
use crate::progress::ProgressCallback;
use crate::provider::ModelBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable consulted when no API key is set explicitly.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Default Gemini REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration for a table-extraction batch.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2csv::{ExtractionConfig, ModelTier};
///
/// let config = ExtractionConfig::builder()
///     .api_key("test-key")
///     .model_tier(ModelTier::Accurate)
///     .max_attempts(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gemini-1.5-pro");
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// API key for the built-in Gemini backend.
    ///
    /// When `None`, [`API_KEY_ENV`] is read at batch start. Not needed when
    /// [`ExtractionConfig::backend`] or [`ExtractionConfig::provider_name`] is set.
    pub api_key: Option<String>,

    /// Model identifier passed through to the provider. Default: `gemini-1.5-flash`.
    pub model: String,

    /// Base URL of the Gemini REST API. Override for proxies and tests.
    pub api_base_url: String,

    /// edgequake-llm provider name (e.g. "openai", "anthropic").
    ///
    /// When set, extraction goes through `edgequake_llm::ProviderFactory`
    /// instead of the built-in Gemini client.
    pub provider_name: Option<String>,

    /// Pre-constructed backend. Takes precedence over everything else.
    pub backend: Option<Arc<dyn ModelBackend>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcribing a table is not a creative task; near-zero keeps repeated
    /// runs over the same scan close to identical.
    pub temperature: f32,

    /// Maximum tokens generated per unit. Default: 8192.
    ///
    /// A dense tabular page easily runs past 4 000 tokens of CSV. Truncation
    /// silently drops trailing rows, so the default is generous.
    pub max_output_tokens: u32,

    /// Nucleus sampling cut-off. Default: 0.1.
    pub top_p: f32,

    /// Top-k sampling cut-off. Default: 16.
    pub top_k: u32,

    /// Total attempts per unit when the provider signals a rate limit. Default: 3.
    pub max_attempts: u32,

    /// Lower bound of the randomised rate-limit wait. Default: 60 s.
    pub rate_limit_wait_min: Duration,

    /// Upper bound of the randomised rate-limit wait. Default: 120 s.
    pub rate_limit_wait_max: Duration,

    /// Fixed pause after every unit that called the model. Default: 1 s.
    pub item_delay: Duration,

    /// Per-request HTTP timeout in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// How output files are named. Default: [`NamingStrategy::SourceName`].
    pub naming: NamingStrategy,

    /// Built-in prompt wording. Default: [`PromptVersion::V2`].
    pub prompt_version: PromptVersion,

    /// Custom prompt template overriding the built-in versions.
    ///
    /// `{document_type}` and `{page_info}` are substituted.
    pub prompt_template: Option<String>,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: ModelTier::default().model_id().to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            provider_name: None,
            backend: None,
            temperature: 0.1,
            max_output_tokens: 8192,
            top_p: 0.1,
            top_k: 16,
            max_attempts: 3,
            rate_limit_wait_min: Duration::from_secs(60),
            rate_limit_wait_max: Duration::from_secs(120),
            item_delay: Duration::from_secs(1),
            api_timeout_secs: 300,
            naming: NamingStrategy::default(),
            prompt_version: PromptVersion::default(),
            prompt_template: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_base_url", &self.api_base_url)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("rate_limit_wait_min", &self.rate_limit_wait_min)
            .field("rate_limit_wait_max", &self.rate_limit_wait_max)
            .field("item_delay", &self.item_delay)
            .field("naming", &self.naming)
            .field("prompt_version", &self.prompt_version)
            .field("prompt_template", &self.prompt_template.is_some())
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured API key, falling back to [`API_KEY_ENV`].
    ///
    /// Blank values count as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// The rate-limit retry policy derived from this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            wait_min: self.rate_limit_wait_min,
            wait_max: self.rate_limit_wait_max,
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn model_tier(mut self, tier: ModelTier) -> Self {
        self.config.model = tier.model_id().to_string();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn top_k(mut self, k: u32) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn rate_limit_wait(mut self, min: Duration, max: Duration) -> Self {
        self.config.rate_limit_wait_min = min;
        self.config.rate_limit_wait_max = max;
        self
    }

    pub fn item_delay(mut self, delay: Duration) -> Self {
        self.config.item_delay = delay;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn naming(mut self, naming: NamingStrategy) -> Self {
        self.config.naming = naming;
        self
    }

    pub fn prompt_version(mut self, version: PromptVersion) -> Self {
        self.config.prompt_version = version;
        self
    }

    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = Some(template.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2CsvError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(Pdf2CsvError::InvalidConfig("Model identifier must not be empty".into()));
        }
        if c.max_attempts == 0 {
            return Err(Pdf2CsvError::InvalidConfig("max_attempts must be ≥ 1".into()));
        }
        if c.max_output_tokens == 0 {
            return Err(Pdf2CsvError::InvalidConfig("max_output_tokens must be ≥ 1".into()));
        }
        if c.rate_limit_wait_min > c.rate_limit_wait_max {
            return Err(Pdf2CsvError::InvalidConfig(format!(
                "Rate-limit wait range is inverted: {:?} > {:?}",
                c.rate_limit_wait_min, c.rate_limit_wait_max
            )));
        }
        Ok(self.config)
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// Reactive backoff applied only to provider-signalled rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub wait_min: Duration,
    pub wait_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            wait_min: Duration::from_secs(60),
            wait_max: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Draw a wait uniformly from `[wait_min, wait_max]`.
    pub fn next_wait(&self) -> Duration {
        use rand::Rng;
        let lo = self.wait_min.as_millis() as u64;
        let hi = self.wait_max.as_millis() as u64;
        if hi <= lo {
            return self.wait_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The two model strengths offered to users.
///
/// | Tier | Model | Trade-off |
/// |------|-------|-----------|
/// | Fast | `gemini-1.5-flash` | cheap, good for clean scans (default) |
/// | Accurate | `gemini-1.5-pro` | slower, better on faded or handwritten tables |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelTier {
    #[default]
    Fast,
    Accurate,
}

impl ModelTier {
    pub fn model_id(&self) -> &'static str {
        match self {
            ModelTier::Fast => "gemini-1.5-flash",
            ModelTier::Accurate => "gemini-1.5-pro",
        }
    }
}

/// How output file names are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NamingStrategy {
    /// `<base>[_page<N>].csv` from the source name only. (default)
    #[default]
    SourceName,
    /// Insert the collection date and station code from the `#METADATA`
    /// line: `<base>[_<date>][_<station>][_page<N>].csv`.
    ///
    /// The name is only known after extraction, so sources cannot be skipped
    /// before the model call under this strategy.
    WithMetadata,
}

/// Built-in prompt wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PromptVersion {
    /// Table-only wording, no metadata line.
    V1,
    /// Full contract with the reserved `#METADATA` first line. (default)
    #[default]
    V2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_extraction_contract() {
        let c = ExtractionConfig::default();
        assert_eq!(c.model, "gemini-1.5-flash");
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.max_output_tokens, 8192);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.item_delay, Duration::from_secs(1));
        assert_eq!(c.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn builder_rejects_zero_attempts() {
        let err = ExtractionConfig::builder().max_attempts(0).build();
        assert!(matches!(err, Err(Pdf2CsvError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_inverted_wait_range() {
        let err = ExtractionConfig::builder()
            .rate_limit_wait(Duration::from_secs(10), Duration::from_secs(5))
            .build();
        assert!(matches!(err, Err(Pdf2CsvError::InvalidConfig(_))));
    }

    #[test]
    fn model_tier_sets_model_id() {
        let c = ExtractionConfig::builder()
            .model_tier(ModelTier::Accurate)
            .build()
            .unwrap();
        assert_eq!(c.model, "gemini-1.5-pro");
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ExtractionConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn explicit_blank_key_is_absent() {
        let c = ExtractionConfig::builder().api_key("   ").build().unwrap();
        assert_eq!(c.resolve_api_key(), None);
    }

    #[test]
    fn retry_wait_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..200 {
            let w = policy.next_wait();
            assert!(w >= Duration::from_secs(60) && w <= Duration::from_secs(120), "{w:?}");
        }
    }

    #[test]
    fn degenerate_wait_range_returns_min() {
        let policy = RetryPolicy {
            max_attempts: 3,
            wait_min: Duration::ZERO,
            wait_max: Duration::ZERO,
        };
        assert_eq!(policy.next_wait(), Duration::ZERO);
    }
}
