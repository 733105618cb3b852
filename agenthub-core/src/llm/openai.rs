//! OpenAI-compatible chat completions generator
//!
//! Streams `chat/completions` over server-sent events. Defaults target
//! OpenRouter, which fronts many hosted models behind the OpenAI wire format.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;

use super::{ChunkStream, ModelInfo, TextGenerator};
use crate::context::{ConversationContext, Message};
use crate::error::{HubError, Result};

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Generator configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// API base URL (without `/chat/completions`)
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// API key (falls back to `OPENROUTER_API_KEY`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Sampling temperature (0.0-2.0)
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "anthropic/claude-3.5-sonnet".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Streaming generator for OpenAI-compatible APIs
pub struct OpenAICompatibleGenerator {
    client: reqwest::Client,
    api_key: String,
    config: GeneratorConfig,
}

impl std::fmt::Debug for OpenAICompatibleGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAICompatibleGenerator")
            .field("config", &self.config)
            .finish()
    }
}

impl OpenAICompatibleGenerator {
    /// Create a generator
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured and
    /// `OPENROUTER_API_KEY` is not set.
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let api_key = match &config.api_key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => std::env::var(API_KEY_ENV).map_err(|_| {
                HubError::Configuration(format!(
                    "No generator API key configured and {} is not set",
                    API_KEY_ENV
                ))
            })?,
        };

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

/// Interpret one SSE line
///
/// Returns `None` for comments, keep-alives, empty deltas and `[DONE]`.
fn parse_sse_line(line: &str) -> Option<Result<String>> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
            .map(Ok),
        Err(e) => {
            if let Ok(error) = serde_json::from_str::<ApiError>(data) {
                return Some(Err(HubError::Generation(error.error.message)));
            }
            Some(Err(HubError::Generation(format!(
                "Failed to parse stream chunk: {}",
                e
            ))))
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAICompatibleGenerator {
    async fn generate(
        &self,
        context: &ConversationContext,
        cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        let messages = context.render_messages();
        let request = ChatRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        tracing::debug!(
            model = %self.config.model,
            messages = messages.len(),
            "Opening generation stream"
        );

        let send = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(HubError::Cancelled),
            response = send => response.map_err(|e| {
                HubError::Generation(format!("Failed to send request: {}", e))
            })?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if let Ok(error) = serde_json::from_str::<ApiError>(&text) {
                return Err(HubError::Generation(format!(
                    "API error ({}): {}",
                    error.error.error_type.unwrap_or_else(|| status.to_string()),
                    error.error.message
                )));
            }
            return Err(HubError::Generation(format!("API error ({}): {}", status, text)));
        }

        let bytes_stream = response.bytes_stream();
        let reader = tokio_util::io::StreamReader::new(
            bytes_stream.map(|r| r.map_err(std::io::Error::other)),
        );
        let lines = LinesStream::new(tokio::io::BufReader::new(reader).lines());

        let stream = lines
            .filter_map(|line| {
                futures::future::ready(match line {
                    Ok(line) => parse_sse_line(&line),
                    Err(e) => Some(Err(HubError::Generation(format!("Stream read error: {}", e)))),
                })
            })
            .take_until(cancel.cancelled_owned());

        Ok(Box::pin(stream))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "openai-compatible".to_string(),
            model_name: self.config.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> GeneratorConfig {
        GeneratorConfig {
            api_key: Some("test-key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_target_openrouter() {
        let generator = OpenAICompatibleGenerator::new(config_with_key()).unwrap();
        assert_eq!(generator.base_url(), "https://openrouter.ai/api/v1");
        assert_eq!(generator.model(), "anthropic/claude-3.5-sonnet");
        assert_eq!(
            generator.completions_url(),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn test_trailing_slash_in_base_url() {
        let generator = OpenAICompatibleGenerator::new(GeneratorConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..config_with_key()
        })
        .unwrap();
        assert_eq!(generator.completions_url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_missing_key() {
        unsafe {
            std::env::remove_var(API_KEY_ENV);
        }
        let result = OpenAICompatibleGenerator::new(GeneratorConfig::default());
        assert!(matches!(result, Err(HubError::Configuration(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", config_with_key());
        assert!(!rendered.contains("test-key"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_parse_sse_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap().unwrap(), "Hel");

        let compact = r#"data:{"choices":[{"delta":{"content":"lo"}}]}"#;
        assert_eq!(parse_sse_line(compact).unwrap().unwrap(), "lo");
    }

    #[test]
    fn test_parse_sse_skips_noise() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(": OPENROUTER PROCESSING").is_none());
        assert!(parse_sse_line("data: [DONE]").is_none());
        assert!(parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).is_none());
        assert!(parse_sse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#).is_none());
        assert!(parse_sse_line(r#"data: {"choices":[]}"#).is_none());
    }

    #[test]
    fn test_parse_sse_errors() {
        let err = parse_sse_line(r#"data: {"error":{"message":"overloaded"}}"#)
            .unwrap()
            .unwrap_err();
        assert!(err.to_string().contains("overloaded"));

        assert!(parse_sse_line("data: not json").unwrap().is_err());
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![Message::system("Be brief."), Message::user("hi")];
        let request = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.7,
            max_tokens: None,
            stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["stream"], true);
        assert!(json.get("max_tokens").is_none());
    }
}
