//! Vision analysis via Groq's OpenAI-compatible chat completions API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Instrument};

use crate::error::{AiError, AiResult};
use crate::metrics::record_request;

pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_VISION_MODEL: &str = "meta-llama/llama-4-maverick-17b-128e-instruct";

/// Describes a set of images as text.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// Send `images` (JPEG bytes) with `instruction` and return the model's text.
    async fn analyze(&self, images: &[Vec<u8>], instruction: &str) -> AiResult<String>;
}

/// Groq client configuration.
#[derive(Debug, Clone)]
pub struct GroqConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl GroqConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_VISION_MODEL.to_string(),
            base_url: DEFAULT_GROQ_BASE_URL.to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            timeout: Duration::from_secs(60),
        }
    }

    /// Load from `GROQ_*` environment variables.
    pub fn from_env() -> AiResult<Self> {
        let api_key = std::env::var("GROQ_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AiError::config_error("GROQ_API_KEY not set"))?;
        let defaults = Self::new(api_key);

        Ok(Self {
            model: std::env::var("GROQ_VISION_MODEL").unwrap_or(defaults.model.clone()),
            base_url: std::env::var("GROQ_BASE_URL").unwrap_or(defaults.base_url.clone()),
            max_tokens: std::env::var("GROQ_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tokens),
            temperature: std::env::var("GROQ_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.temperature),
            timeout: std::env::var("GROQ_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            ..defaults
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Groq vision client.
pub struct GroqVisionClient {
    config: GroqConfig,
    client: Client,
}

impl GroqVisionClient {
    pub fn new(config: GroqConfig) -> AiResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("vscore-ai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiError::config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> AiResult<Self> {
        Self::new(GroqConfig::from_env()?)
    }

    fn build_request<'a>(&'a self, images: &[Vec<u8>], instruction: &str) -> ChatRequest<'a> {
        let mut content = vec![ContentPart::Text {
            text: instruction.to_string(),
        }];
        content.extend(images.iter().map(|jpeg| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg)),
            },
        }));

        ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage { role: "user", content }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    async fn send(&self, url: &str, request: &ChatRequest<'_>, image_count: usize) -> AiResult<String> {
        info!("Sending {} frames for vision analysis", image_count);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout(self.config.timeout.as_secs())
                } else {
                    AiError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::request_failed(
                status.as_u16(),
                format!("vision API returned {}: {}", status, body),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::invalid_response(format!("Failed to parse vision response: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .ok_or_else(|| AiError::invalid_response("No content in vision response"))?;
        debug!(chars = text.len(), "Vision analysis returned");
        Ok(text)
    }
}

#[async_trait]
impl VisionAnalyzer for GroqVisionClient {
    async fn analyze(&self, images: &[Vec<u8>], instruction: &str) -> AiResult<String> {
        if images.is_empty() {
            return Err(AiError::invalid_response("no images to analyze"));
        }

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = self.build_request(images, instruction);
        let span = info_span!("vision_analyze", model = %self.config.model, images = images.len());
        let start = Instant::now();

        let result = self.send(&url, &request, images.len()).instrument(span).await;

        record_request("groq", result.is_ok(), start.elapsed());
        result
    }
}
