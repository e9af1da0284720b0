use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::client::{CompletionOptions, LlmClient};
use crate::util::SecretString;

fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

// ============================================================================
// Anthropic Client
// ============================================================================

pub struct AnthropicClient {
    api_key: SecretString,
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}

impl AnthropicClient {
    pub fn new(api_key: SecretString, model: String, timeout_secs: u64) -> Result<Self> {
        Self::with_base_url(
            api_key,
            model,
            "https://api.anthropic.com/v1".to_string(),
            timeout_secs,
        )
    }

    pub fn with_base_url(
        api_key: SecretString,
        model: String,
        base_url: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            model,
            base_url,
            client: build_http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop_sequences: options.stop_sequences.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        debug!("Calling Anthropic API with model: {}", self.model);

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!("Anthropic API error {}: {}", status, error_text);
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic API response")?;

        api_response
            .content
            .first()
            .map(|c| c.text.clone())
            .context("No content in Anthropic response")
    }
}

// ============================================================================
// OpenAI Client
// ============================================================================

pub struct OpenAIClient {
    api_key: SecretString,
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

impl OpenAIClient {
    pub fn new(api_key: SecretString, model: String, timeout_secs: u64) -> Result<Self> {
        Self::with_base_url(
            api_key,
            model,
            "https://api.openai.com/v1".to_string(),
            timeout_secs,
        )
    }

    pub fn with_base_url(
        api_key: SecretString,
        model: String,
        base_url: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            model,
            base_url,
            client: build_http_client(timeout_secs)?,
        })
    }

    fn build_request(&self, prompt: &str, options: &CompletionOptions) -> OpenAIRequest {
        // GPT-5+ models use max_completion_tokens instead of max_tokens
        let (max_tokens, max_completion_tokens) = if self.model.starts_with("gpt-5") {
            (None, Some(options.max_tokens))
        } else {
            (Some(options.max_tokens), None)
        };

        OpenAIRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: options.temperature,
            n: 1,
            max_tokens,
            max_completion_tokens,
            stop: options.stop_sequences.clone(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let request = self.build_request(prompt, options);

        debug!(
            "Calling OpenAI-compatible API at {} with model: {}",
            self.base_url, self.model
        );

        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&request);

        // Only add authorization if an API key was supplied
        if !self.api_key.is_absent() {
            req = req.header("authorization", format!("Bearer {}", self.api_key.expose()));
        }

        let response = req
            .send()
            .await
            .context("Failed to send request to OpenAI API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, error_text);
        }

        let api_response: OpenAIResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI API response")?;

        api_response
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .context("No choices in OpenAI response")
    }
}

// ============================================================================
// Gemini Client (Google Generative AI)
// ============================================================================

pub struct GeminiClient {
    api_key: SecretString,
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "stopSequences", skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: String,
}

impl GeminiClient {
    pub fn new(api_key: SecretString, model: String, timeout_secs: u64) -> Result<Self> {
        Self::with_base_url(
            api_key,
            model,
            "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs,
        )
    }

    pub fn with_base_url(
        api_key: SecretString,
        model: String,
        base_url: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            model,
            base_url,
            client: build_http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
                stop_sequences: options.stop_sequences.clone(),
            },
        };

        debug!("Calling Gemini API with model: {}", self.model);

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("x-goog-api-key", self.api_key.expose())
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, error_text);
        }

        let api_response: GeminiResponse = response
            .json()
            .await
            .context("Failed to parse Gemini API response")?;

        api_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .context("No content in Gemini response")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> CompletionOptions {
        CompletionOptions {
            temperature: 0.3,
            max_tokens: 2048,
            stop_sequences: vec!["<END>".to_string()],
        }
    }

    #[test]
    fn test_openai_request_gpt5_uses_max_completion_tokens() {
        let client =
            OpenAIClient::new("key".into(), "gpt-5-turbo".to_string(), 30).unwrap();
        let json = serde_json::to_value(client.build_request("test", &options())).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["max_completion_tokens"], 2048);
        assert_eq!(json["stop"][0], "<END>");
    }

    #[test]
    fn test_openai_request_non_gpt5_uses_max_tokens() {
        let client = OpenAIClient::new("key".into(), "gpt-4o".to_string(), 30).unwrap();
        let json = serde_json::to_value(
            client.build_request("test", &CompletionOptions::default()),
        )
        .unwrap();
        assert_eq!(json["max_tokens"], 1500);
        assert_eq!(json["n"], 1);
        assert!(json.get("max_completion_tokens").is_none());
        assert!(json.get("stop").is_none());
    }

    #[test]
    fn test_gemini_request_serialization() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: "test".to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.5,
                max_output_tokens: 16384,
                stop_sequences: Vec::new(),
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "test");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 16384);
        assert!(json["generationConfig"].get("stopSequences").is_none());
    }

    #[test]
    fn test_gemini_response_empty_parts() {
        let json = r#"{"candidates": [{"content": {"parts": []}}]}"#;
        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        let first_text = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone());
        assert!(first_text.is_none());
    }

    #[tokio::test]
    async fn test_openai_complete_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "  def test_a(): pass  "}}]}"#)
            .create_async()
            .await;

        let client = OpenAIClient::with_base_url(
            "sk-test".into(),
            "gpt-4o".to_string(),
            server.url(),
            30,
        )
        .unwrap();
        let text = client.complete("prompt", &options()).await.unwrap();
        assert_eq!(text, "def test_a(): pass");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_error_status_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let client =
            OpenAIClient::with_base_url("k".into(), "gpt-4o".to_string(), server.url(), 30)
                .unwrap();
        let err = client.complete("prompt", &options()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("OpenAI API error 429"));
        assert!(msg.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_anthropic_complete_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "ak")
            .with_status(200)
            .with_body(r#"{"content": [{"type": "text", "text": "hello"}]}"#)
            .create_async()
            .await;

        let client = AnthropicClient::with_base_url(
            "ak".into(),
            "claude-sonnet-4-20250514".to_string(),
            server.url(),
            30,
        )
        .unwrap();
        assert_eq!(client.complete("p", &options()).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_anthropic_empty_content_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .with_status(200)
            .with_body(r#"{"content": []}"#)
            .create_async()
            .await;

        let client =
            AnthropicClient::with_base_url("ak".into(), "m".to_string(), server.url(), 30)
                .unwrap();
        let err = client.complete("p", &options()).await.unwrap_err();
        assert!(err.to_string().contains("No content in Anthropic response"));
    }

    #[tokio::test]
    async fn test_gemini_complete_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/gemini-pro:generateContent")
            .match_header("x-goog-api-key", "gk")
            .with_status(200)
            .with_body(r#"{"candidates": [{"content": {"parts": [{"text": "Hello, world!"}]}}]}"#)
            .create_async()
            .await;

        let client = GeminiClient::with_base_url(
            "gk".into(),
            "gemini-pro".to_string(),
            server.url(),
            30,
        )
        .unwrap();
        assert_eq!(
            client.complete("p", &options()).await.unwrap(),
            "Hello, world!"
        );
    }
}
