//! AnthropicProvider -- [`TextGenerationProvider`] for the Anthropic Messages API.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and only exposed when
//! building the request headers.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use agentflow_core::llm::provider::{
    Completion, GenerationError, GenerationRequest, TextGenerationProvider,
};

use super::types::{
    AnthropicContentBlock, AnthropicErrorResponse, AnthropicMessage, AnthropicRequest,
    AnthropicResponse,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic Claude text-generation provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(api_key: SecretString, model: String, max_tokens: u32) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| GenerationError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Override the base URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_anthropic_request(&self, request: &GenerationRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            system: request.system.clone(),
        }
    }
}

// No Debug: keeps the client and key out of logs entirely.

impl TextGenerationProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Completion, GenerationError> {
        let body = self.to_anthropic_request(request);
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicErrorResponse>(&error_body)
                .map(|e| format!("{}: {}", e.error.error_type, e.error.message))
                .unwrap_or(error_body);
            tracing::warn!(status = status.as_u16(), %message, "anthropic request failed");

            return Err(match status.as_u16() {
                401 => GenerationError::AuthenticationFailed,
                429 => GenerationError::RateLimited { retry_after_ms },
                _ => GenerationError::Provider {
                    message: format!("HTTP {status}: {message}"),
                },
            });
        }

        let resp: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(format!("failed to parse response: {e}")))?;

        let text = resp
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text.as_str()),
                AnthropicContentBlock::Other => None,
            })
            .collect::<String>();
        if text.trim().is_empty() {
            return Err(GenerationError::InvalidResponse(
                "response contained no text".to_string(),
            ));
        }

        tracing::debug!(
            model = %resp.model,
            input_tokens = resp.usage.input_tokens,
            output_tokens = resp.usage.output_tokens,
            "anthropic completion"
        );

        Ok(Completion {
            text,
            model: resp.model,
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::respond_once;

    fn make_provider(base_url: &str) -> AnthropicProvider {
        AnthropicProvider::new(
            SecretString::from("test-key-not-real"),
            "claude-sonnet-4-20250514".to_string(),
            256,
        )
        .unwrap()
        .with_base_url(base_url)
    }

    #[test]
    fn test_request_uses_configured_limits() {
        let provider = make_provider(DEFAULT_BASE_URL);
        let request = GenerationRequest::new("Draft an update").with_system("Be brief");
        let body = provider.to_anthropic_request(&request);
        assert_eq!(body.max_tokens, 256);
        assert_eq!(body.system.as_deref(), Some("Be brief"));
        assert_eq!(body.messages[0].content, "Draft an update");

        let mut request = request;
        request.max_tokens = Some(64);
        assert_eq!(provider.to_anthropic_request(&request).max_tokens, 64);
    }

    #[tokio::test]
    async fn test_generate_sends_headers_and_joins_text() {
        let (base_url, server) = respond_once(
            200,
            r#"{"id":"msg_1","model":"claude-sonnet-4-20250514","stop_reason":"end_turn",
                "content":[{"type":"text","text":"Hello "},{"type":"text","text":"Dana"}],
                "usage":{"input_tokens":20,"output_tokens":4}}"#,
        )
        .await;

        let completion = make_provider(&base_url)
            .generate(&GenerationRequest::new("Greet the client"))
            .await
            .unwrap();
        assert_eq!(completion.text, "Hello Dana");
        assert_eq!(completion.output_tokens, 4);

        let captured = server.await.unwrap();
        assert!(captured.request_line.starts_with("POST /v1/messages"));
        assert_eq!(captured.header("x-api-key"), Some("test-key-not-real"));
        assert_eq!(captured.header("anthropic-version"), Some("2023-06-01"));
        assert!(captured.body.contains("Greet the client"));
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_authentication_failed() {
        let (base_url, _server) = respond_once(
            401,
            r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
        )
        .await;

        let err = make_provider(&base_url)
            .generate(&GenerationRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn test_server_error_keeps_message() {
        let (base_url, _server) = respond_once(
            500,
            r#"{"type":"error","error":{"type":"api_error","message":"boom"}}"#,
        )
        .await;

        let err = make_provider(&base_url)
            .generate(&GenerationRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("api_error: boom"));
    }
}
