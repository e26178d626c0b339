//! Gemini `generateContent` REST client.

use super::{GenerateRequest, GenerateResponse, ModelBackend, ProviderError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Built-in backend talking to the Gemini REST API.
#[derive(Clone)]
pub struct GeminiBackend {
    http: Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiBackend {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("edgequake-pdf2csv/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn body(request: &GenerateRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "inline_data": { "mime_type": request.mime_type, "data": request.payload_base64 } },
                    { "text": request.prompt }
                ]
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_output_tokens,
                "topP": request.top_p,
                "topK": request.top_k,
                "responseMimeType": "text/plain"
            }
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let texts: Vec<&str> = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::body(request))
            .send()
            .await
            .map_err(|e| ProviderError::new(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::new(format!("reading response: {e}")))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::rate_limited(text));
        }
        if !status.is_success() {
            return Err(ProviderError::new(format!("HTTP {}: {}", status.as_u16(), text)));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::new(format!("invalid response: {e}")))?;
        let usage = parsed.usage_metadata.as_ref();
        debug!(
            "{}: {} input tokens, {} output tokens",
            request.model,
            usage.map_or(0, |u| u.prompt_token_count),
            usage.map_or(0, |u| u.candidates_token_count)
        );

        Ok(GenerateResponse {
            text: parsed.text(),
            input_tokens: usage.map_or(0, |u| u.prompt_token_count),
            output_tokens: usage.map_or(0, |u| u.candidates_token_count),
        })
    }
}
