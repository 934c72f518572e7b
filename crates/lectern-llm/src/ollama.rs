//! Ollama Provider Implementation
//!
//! Provides integration with Ollama's local LLM API.
//!
//! # Features
//!
//! - Blocking HTTP communication with the Ollama API (callers run it on a blocking pool)
//! - Configurable endpoint, model and context window (`num_ctx`)
//! - Retry logic with exponential backoff
//! - Timeout handling
//!
//! # Examples
//!
//! ```no_run
//! use lectern_llm::OllamaProvider;
//! use lectern_domain::traits::LlmProvider;
//!
//! let provider = OllamaProvider::new("http://localhost:11434", "llama3")
//!     .unwrap()
//!     .with_num_ctx(8192);
//! let text = provider.generate("Summarize lockout/tagout").unwrap();
//! ```

use crate::LlmError;
use lectern_domain::traits::LlmProvider as LlmProviderTrait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default timeout for LLM requests (120 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default number of retry attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Ollama API provider for local LLM inference
///
/// This provider communicates with a local Ollama instance to generate text.
/// Requests block the calling thread.
pub struct OllamaProvider {
    endpoint: String,
    model: String,
    num_ctx: Option<u32>,
    client: reqwest::blocking::Client,
    max_retries: u32,
}

/// Request body for Ollama generate API
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_ctx: u32,
}

/// Response from Ollama generate API
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Parameters
    ///
    /// - `endpoint`: Ollama API endpoint (e.g., "http://localhost:11434")
    /// - `model`: Model to use (e.g., "llama3", "mistral")
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        Self::with_timeout(endpoint, model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a new Ollama provider with a custom request timeout
    pub fn with_timeout(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Communication(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            num_ctx: None,
            client,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Create a new Ollama provider with default settings
    ///
    /// Uses `http://localhost:11434` as endpoint and requires a model name.
    pub fn default_endpoint(model: impl Into<String>) -> Result<Self, LlmError> {
        Self::new(DEFAULT_ENDPOINT, model)
    }

    /// Set the maximum number of retry attempts
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set the context window passed to the model as `num_ctx`
    pub fn with_num_ctx(mut self, num_ctx: u32) -> Self {
        self.num_ctx = Some(num_ctx);
        self
    }

    /// Model this provider talks to
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_once(&self, url: &str, body: &OllamaGenerateRequest<'_>) -> Attempt {
        let response = match self.client.post(url).json(body).send() {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(LlmError::Communication(format!("Request failed: {}", e))),
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<OllamaGenerateResponse>() {
                Ok(parsed) => Attempt::Done(Ok(parsed.response)),
                Err(e) => Attempt::Done(Err(LlmError::InvalidResponse(format!(
                    "Failed to parse response: {}",
                    e
                )))),
            };
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Attempt::Done(Err(LlmError::ModelNotAvailable(self.model.clone())));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retry(LlmError::RateLimitExceeded);
        }

        let error_text = response
            .text()
            .unwrap_or_else(|_| "Unknown error".to_string());
        Attempt::Retry(LlmError::Communication(format!(
            "HTTP {}: {}",
            status, error_text
        )))
    }
}

enum Attempt {
    Done(Result<String, LlmError>),
    Retry(LlmError),
}

impl LlmProviderTrait for OllamaProvider {
    type Error = LlmError;

    fn generate(&self, prompt: &str) -> Result<String, Self::Error> {
        let url = format!("{}/api/generate", self.endpoint);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self.num_ctx.map(|num_ctx| OllamaOptions { num_ctx }),
        };

        // Retry logic with exponential backoff
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.max_retries {
            match self.request_once(&url, &body) {
                Attempt::Done(result) => return result,
                Attempt::Retry(e) => {
                    warn!(model = %self.model, attempt = attempts + 1, error = %e, "Ollama request failed");
                    last_error = Some(e);
                }
            }

            attempts += 1;
            if attempts < self.max_retries {
                // Exponential backoff: 1s, 2s, 4s, etc.
                let delay = Duration::from_secs(2u64.pow(attempts - 1));
                debug!(delay_secs = delay.as_secs(), "Backing off before retry");
                std::thread::sleep(delay);
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Communication("Max retries exceeded".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_provider_creation() {
        let provider = OllamaProvider::new("http://localhost:11434/", "llama3").unwrap();
        assert_eq!(provider.endpoint, "http://localhost:11434");
        assert_eq!(provider.model(), "llama3");
        assert_eq!(provider.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(provider.num_ctx, None);
    }

    #[test]
    fn test_ollama_provider_default_endpoint() {
        let provider = OllamaProvider::default_endpoint("mistral").unwrap();
        assert_eq!(provider.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(provider.model, "mistral");
    }

    #[test]
    fn test_builder_settings() {
        let provider = OllamaProvider::default_endpoint("llama3")
            .unwrap()
            .with_max_retries(0)
            .with_num_ctx(16384);
        assert_eq!(provider.max_retries, 1);
        assert_eq!(provider.num_ctx, Some(16384));
    }

    #[test]
    fn test_request_body_includes_num_ctx_only_when_set() {
        let body = OllamaGenerateRequest {
            model: "llama3",
            prompt: "hi",
            stream: false,
            options: Some(OllamaOptions { num_ctx: 8192 }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["options"]["num_ctx"], 8192);

        let body = OllamaGenerateRequest {
            model: "llama3",
            prompt: "hi",
            stream: false,
            options: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("options").is_none());
    }

    #[test]
    #[ignore] // Only run when Ollama is available
    fn test_ollama_generate_live() {
        let provider = OllamaProvider::default_endpoint("llama3").unwrap();
        let result = provider.generate("Say 'test' and nothing else");
        assert!(result.is_ok());
    }
}
