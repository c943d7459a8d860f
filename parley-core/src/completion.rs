//! Completion client: text continuation via an OpenAI-compatible API
//!
//! The session manager only sees the `CompletionClient` trait. The shipped
//! implementation posts to `{base_url}/v1/completions`.
//!
//! Completions are not retried: a failed turn is reported to the user, who
//! can simply resend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::CompletionConfig;

/// Stop sequences that keep the model from writing further turns itself.
pub const STOP_SEQUENCES: [&str; 2] = ["\nUser:", "\nBot:"];

// ============================================================================
// CompletionClient trait
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop: Vec<String>,
}

impl CompletionRequest {
    /// Request with the transcript stop sequences.
    pub fn new(prompt: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            temperature,
            stop: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate the continuation of `request.prompt`.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;

    /// Model name, shown by `/help` and `/info`.
    fn model(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing completion choice in response")]
    MissingChoice,

    #[error("Missing API key")]
    MissingApiKey,
}

// ============================================================================
// OpenAI API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    stop: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    text: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: Option<OpenAiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
}

// ============================================================================
// OpenAiCompletionClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiCompletionClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiCompletionClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, CompletionError> {
        Self::with_base_url(config, config.base_url.clone())
    }

    /// Create a client with a custom base URL (for testing / proxies)
    pub fn with_base_url(
        config: &CompletionConfig,
        base_url: String,
    ) -> Result<Self, CompletionError> {
        if config.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let url = format!("{}/v1/completions", self.base_url);
        let body = OpenAiRequest {
            model: &self.model,
            prompt: &request.prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stop: &request.stop,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "Completion API error");

            return Err(CompletionError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: OpenAiResponse = response.json().await?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or(CompletionError::MissingChoice)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: &str) -> CompletionConfig {
        CompletionConfig {
            api_key: api_key.to_string(),
            base_url: "https://api.openai.com".to_string(),
            model: "text-curie-001".to_string(),
            max_tokens: 150,
            temperature: 0.5,
            timeout_seconds: 5,
        }
    }

    fn completion_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "cmpl-test",
            "object": "text_completion",
            "choices": [{ "text": text, "index": 0, "finish_reason": "stop" }]
        })
    }

    #[tokio::test]
    async fn test_complete_posts_prompt_with_stop_sequences() {
        let mock_server = MockServer::start().await;
        let client = OpenAiCompletionClient::with_base_url(&test_config("sk-test"), mock_server.uri())
            .expect("Failed to create client");

        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(serde_json::json!({
                "model": "text-curie-001",
                "prompt": "User: Hello\nBot:",
                "max_tokens": 150,
                "temperature": 0.5,
                "stop": ["\nUser:", "\nBot:"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_response(" Hi!")))
            .mount(&mock_server)
            .await;

        let request = CompletionRequest::new("User: Hello\nBot:", 150, 0.5);
        let text = client.complete(&request).await;

        assert!(text.is_ok(), "Expected Ok, got Err: {:?}", text.err());
        assert_eq!(text.unwrap(), " Hi!");
    }

    #[tokio::test]
    async fn test_complete_surfaces_api_error_message() {
        let mock_server = MockServer::start().await;
        let client =
            OpenAiCompletionClient::with_base_url(&test_config("sk-test"), mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "message": "Rate limit reached", "type": "requests" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = client.complete(&CompletionRequest::new("User: hi\nBot:", 10, 0.7)).await;

        match result {
            Err(CompletionError::Api { code, message }) => {
                assert_eq!(code, 429);
                assert_eq!(message, "Rate limit reached");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_with_no_choices_is_error() {
        let mock_server = MockServer::start().await;
        let client =
            OpenAiCompletionClient::with_base_url(&test_config("sk-test"), mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&mock_server)
            .await;

        let result = client.complete(&CompletionRequest::new("x", 10, 0.7)).await;
        assert!(matches!(result, Err(CompletionError::MissingChoice)));
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let result = OpenAiCompletionClient::new(&test_config(""));
        assert!(matches!(result, Err(CompletionError::MissingApiKey)));
    }

    #[test]
    fn test_request_carries_transcript_stop_sequences() {
        let request = CompletionRequest::new("p", 1, 0.0);
        assert_eq!(request.stop, vec!["\nUser:".to_string(), "\nBot:".to_string()]);
    }
}
