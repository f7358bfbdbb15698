//! AI service transport for Gleaner
//!
//! Provides an `AiBackend` trait with one implementation:
//! - **Ollama**: text and vision generation over `/api/generate`
//!
//! The backend only moves prompts and text. Prompt wording, response
//! decoding and the per-capability fallbacks live in `gleaner-ingest`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::AiConfig;

// ============================================================================
// AiBackend trait
// ============================================================================

/// Abstraction over a text/vision model service. One request, one response.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Send a text prompt and return the model's raw answer.
    async fn generate(&self, prompt: &str) -> Result<String, AiError>;

    /// Send a prompt together with one image and return the raw answer.
    async fn generate_with_vision(&self, prompt: &str, image: &[u8]) -> Result<String, AiError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum AiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Malformed response body: {0}")]
    MalformedResponse(String),

    #[error("All {attempts} retry attempts failed: {last}")]
    RetryExhausted { attempts: usize, last: String },
}

// ============================================================================
// Ollama API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

// ============================================================================
// OllamaClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    config: AiConfig,
}

impl OllamaClient {
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate_with_retry(
        &self,
        prompt: &str,
        images: Option<Vec<String>>,
    ) -> Result<String, AiError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, || self.generate_once(prompt, images.clone())).await;

        result.map_err(|e| {
            tracing::warn!(
                attempts = self.config.max_retries + 1,
                model = %self.config.model,
                error = %e,
                "All AI generation attempts failed"
            );
            AiError::RetryExhausted {
                attempts: self.config.max_retries + 1,
                last: e.to_string(),
            }
        })
    }

    async fn generate_once(
        &self,
        prompt: &str,
        images: Option<Vec<String>>,
    ) -> Result<String, AiError> {
        let url = format!("{}/api/generate", self.config.base_url.trim_end_matches('/'));

        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            images,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::debug!(code = status.as_u16(), message = %message, "AI service returned an error status");
            return Err(AiError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        let body: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;
        Ok(body.response)
    }
}

#[async_trait]
impl AiBackend for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        self.generate_with_retry(prompt, None).await
    }

    async fn generate_with_vision(&self, prompt: &str, image: &[u8]) -> Result<String, AiError> {
        let encoded = STANDARD.encode(image);
        self.generate_with_retry(prompt, Some(vec![encoded])).await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Build the configured backend. `Ok(None)` means AI is switched off and
/// every augmentation runs its deterministic fallback.
pub fn create_backend(config: &AiConfig) -> Result<Option<Arc<dyn AiBackend>>, AiError> {
    if !config.enabled {
        tracing::info!("AI augmentation disabled via config; using rule-based fallbacks");
        return Ok(None);
    }
    let client = OllamaClient::new(config.clone())?;
    tracing::info!(model = %client.model(), base_url = %config.base_url, "AI backend configured");
    Ok(Some(Arc::new(client)))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> AiConfig {
        AiConfig {
            enabled: true,
            base_url,
            model: "test-model".to_string(),
            timeout_seconds: 5,
            max_retries: 1,
            retry_delay_ms: 10,
        }
    }

    fn ollama_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": "test-model",
            "created_at": "2024-01-01T00:00:00Z",
            "response": text,
            "done": true
        })
    }

    #[tokio::test]
    async fn test_generate_posts_prompt_and_returns_response_text() {
        let mock_server = MockServer::start().await;
        let client = OllamaClient::new(test_config(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "model": "test-model",
                "prompt": "hello",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ollama_response("world")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client.generate("hello").await;
        assert_eq!(result.unwrap(), "world");
    }

    #[tokio::test]
    async fn test_vision_sends_base64_image() {
        let mock_server = MockServer::start().await;
        let client = OllamaClient::new(test_config(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_json(serde_json::json!({
                "model": "test-model",
                "prompt": "describe",
                "stream": false,
                "images": [STANDARD.encode(b"\x89PNG")]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(ollama_response("a picture")))
            .mount(&mock_server)
            .await;

        let result = client.generate_with_vision("describe", b"\x89PNG").await;
        assert_eq!(result.unwrap(), "a picture");
    }

    #[tokio::test]
    async fn test_generate_returns_error_after_retries_on_500() {
        let mock_server = MockServer::start().await;
        let client = OllamaClient::new(test_config(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .expect(2)
            .mount(&mock_server)
            .await;

        match client.generate("hello").await {
            Err(AiError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(last.contains("500"), "last error should carry status: {}", last);
            }
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_retries_then_succeeds() {
        let mock_server = MockServer::start().await;
        let client = OllamaClient::new(test_config(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ollama_response("ok")))
            .mount(&mock_server)
            .await;

        assert_eq!(client.generate("hello").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_body_without_response_field_is_malformed() {
        let mock_server = MockServer::start().await;
        let mut config = test_config(mock_server.uri());
        config.max_retries = 0;
        let client = OllamaClient::new(config).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"done": true})))
            .mount(&mock_server)
            .await;

        match client.generate("hello").await {
            Err(AiError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 1);
                assert!(last.starts_with("Malformed response body"), "{}", last);
            }
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_create_backend_disabled_returns_none() {
        let mut config = test_config("http://localhost:1".to_string());
        config.enabled = false;
        assert!(create_backend(&config).unwrap().is_none());

        config.enabled = true;
        let backend = create_backend(&config).unwrap().expect("backend");
        assert_eq!(backend.name(), "ollama");
    }
}
