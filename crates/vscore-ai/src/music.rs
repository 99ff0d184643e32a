//! Music generation via Vertex AI Lyria.

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use gcp_auth::TokenProvider;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Instrument};

use crate::error::{AiError, AiResult};
use crate::metrics::record_request;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
pub const DEFAULT_LYRIA_LOCATION: &str = "us-central1";
pub const DEFAULT_LYRIA_MODEL: &str = "lyria-002";

/// Audio returned by a generator.
#[derive(Debug, Clone)]
pub struct GeneratedAudio {
    /// WAV file bytes
    pub bytes: Vec<u8>,
    pub duration_secs: f64,
}

impl GeneratedAudio {
    /// Wrap WAV bytes, measuring their duration from the header.
    pub fn from_wav(bytes: Vec<u8>) -> AiResult<Self> {
        let duration_secs = wav_duration(&bytes)?;
        Ok(Self { bytes, duration_secs })
    }
}

/// Generates an audio track from a text prompt.
#[async_trait]
pub trait MusicGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> AiResult<GeneratedAudio>;
}

/// Duration of a WAV file in seconds.
///
/// Empty or undecodable audio is an error.
pub fn wav_duration(bytes: &[u8]) -> AiResult<f64> {
    if bytes.is_empty() {
        return Err(AiError::invalid_audio("generated audio is empty"));
    }
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| AiError::invalid_audio(format!("not a WAV file: {}", e)))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(AiError::invalid_audio("WAV header has a zero sample rate"));
    }
    Ok(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

/// A silent 16-bit mono WAV of the given length.
pub fn silent_wav(duration_secs: f64, sample_rate: u32) -> AiResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let samples = (duration_secs.max(0.0) * f64::from(sample_rate)).round() as u64;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| AiError::invalid_audio(e.to_string()))?;
        for _ in 0..samples {
            writer
                .write_sample(0i16)
                .map_err(|e| AiError::invalid_audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| AiError::invalid_audio(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Lyria client configuration.
#[derive(Debug, Clone)]
pub struct LyriaConfig {
    pub project_id: String,
    pub location: String,
    pub model: String,
    pub negative_prompt: String,
    pub timeout: Duration,
}

impl LyriaConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: DEFAULT_LYRIA_LOCATION.to_string(),
            model: DEFAULT_LYRIA_MODEL.to_string(),
            negative_prompt: String::new(),
            timeout: Duration::from_secs(180),
        }
    }

    /// Load from `LYRIA_*` and `GCP_PROJECT_ID`.
    pub fn from_env() -> AiResult<Self> {
        let project_id = std::env::var("LYRIA_PROJECT_ID")
            .or_else(|_| std::env::var("GCP_PROJECT_ID"))
            .ok()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AiError::config_error("LYRIA_PROJECT_ID or GCP_PROJECT_ID must be set"))?;
        let defaults = Self::new(project_id);

        Ok(Self {
            location: std::env::var("LYRIA_LOCATION").unwrap_or(defaults.location.clone()),
            model: std::env::var("LYRIA_MODEL").unwrap_or(defaults.model.clone()),
            negative_prompt: std::env::var("LYRIA_NEGATIVE_PROMPT").unwrap_or_default(),
            timeout: std::env::var("LYRIA_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            ..defaults
        })
    }

    /// Vertex AI predict endpoint for the configured model.
    pub fn endpoint(&self) -> String {
        format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{project}/locations/{loc}/publishers/google/models/{model}:predict",
            loc = self.location,
            project = self.project_id,
            model = self.model
        )
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: [Instance<'a>; 1],
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct Instance<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    sample_count: u32,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(rename = "bytesBase64Encoded")]
    bytes_base64_encoded: Option<String>,
}

enum Credentials {
    Provider(Arc<dyn TokenProvider>),
    Static(String),
}

/// Lyria music generation client.
pub struct LyriaClient {
    config: LyriaConfig,
    endpoint: String,
    client: Client,
    credentials: Credentials,
}

impl LyriaClient {
    /// Client using application default credentials.
    pub async fn new(config: LyriaConfig) -> AiResult<Self> {
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| AiError::AuthError(format!("No Google credentials available: {}", e)))?;
        let endpoint = config.endpoint();
        Self::build(config, endpoint, Credentials::Provider(provider))
    }

    pub async fn from_env() -> AiResult<Self> {
        Self::new(LyriaConfig::from_env()?).await
    }

    /// Client against an explicit endpoint with a fixed bearer token.
    pub fn with_static_token(
        config: LyriaConfig,
        endpoint: impl Into<String>,
        token: impl Into<String>,
    ) -> AiResult<Self> {
        Self::build(config, endpoint.into(), Credentials::Static(token.into()))
    }

    fn build(config: LyriaConfig, endpoint: String, credentials: Credentials) -> AiResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("vscore-ai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiError::config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            endpoint,
            client,
            credentials,
        })
    }

    async fn access_token(&self) -> AiResult<String> {
        match &self.credentials {
            Credentials::Static(token) => Ok(token.clone()),
            Credentials::Provider(provider) => provider
                .token(&[CLOUD_PLATFORM_SCOPE])
                .await
                .map(|t| t.as_str().to_string())
                .map_err(|e| AiError::AuthError(format!("Failed to obtain access token: {}", e))),
        }
    }

    async fn predict(&self, prompt: &str) -> AiResult<GeneratedAudio> {
        let token = self.access_token().await?;
        let request = PredictRequest {
            instances: [Instance {
                prompt,
                negative_prompt: &self.config.negative_prompt,
                sample_count: 1,
            }],
            parameters: serde_json::json!({}),
        };

        info!(chars = prompt.len(), "Requesting music generation");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout(self.config.timeout.as_secs())
                } else if e.is_connect() {
                    AiError::unavailable(format!("music service unreachable: {}", e))
                } else {
                    AiError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::request_failed(
                status.as_u16(),
                format!("music API returned {}: {}", status, body),
            ));
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| AiError::invalid_response(format!("Failed to parse music response: {}", e)))?;
        let encoded = parsed
            .predictions
            .into_iter()
            .find_map(|p| p.bytes_base64_encoded)
            .ok_or_else(|| AiError::invalid_response("No audio in music response"))?;
        let bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| AiError::invalid_audio(format!("audio is not valid base64: {}", e)))?;

        GeneratedAudio::from_wav(bytes)
    }
}

#[async_trait]
impl MusicGenerator for LyriaClient {
    async fn generate(&self, prompt: &str) -> AiResult<GeneratedAudio> {
        let span = info_span!("music_generate", model = %self.config.model);
        let start = Instant::now();
        let result = self.predict(prompt).instrument(span).await;
        record_request("lyria", result.is_ok(), start.elapsed());
        if let Ok(audio) = &result {
            info!(duration_secs = audio.duration_secs, bytes = audio.bytes.len(), "Music generated");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_wav_duration_measures_header() {
        let wav = silent_wav(2.5, 8000).unwrap();
        assert!((wav_duration(&wav).unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_wav_duration_rejects_garbage() {
        assert!(matches!(wav_duration(&[]), Err(AiError::InvalidAudio(_))));
        assert!(matches!(wav_duration(b"not audio"), Err(AiError::InvalidAudio(_))));
    }

    #[test]
    fn test_endpoint_format() {
        let config = LyriaConfig::new("proj");
        assert_eq!(
            config.endpoint(),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/proj/locations/us-central1/publishers/google/models/lyria-002:predict"
        );
    }

    #[tokio::test]
    async fn test_generate_decodes_prediction() {
        let server = MockServer::start().await;
        let wav = silent_wav(4.0, 8000).unwrap();
        Mock::given(method("POST"))
            .and(path("/predict"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(serde_json::json!({
                "instances": [{"prompt": "Calm piano.", "negative_prompt": "", "sample_count": 1}],
                "parameters": {}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "predictions": [{"bytesBase64Encoded": BASE64.encode(&wav), "mimeType": "audio/wav"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LyriaClient::with_static_token(
            LyriaConfig::new("proj"),
            format!("{}/predict", server.uri()),
            "tok",
        )
        .unwrap();
        let audio = client.generate("Calm piano.").await.unwrap();
        assert_eq!(audio.bytes, wav);
        assert!((audio.duration_secs - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_prediction_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"predictions": []})))
            .mount(&server)
            .await;

        let client =
            LyriaClient::with_static_token(LyriaConfig::new("proj"), server.uri(), "tok").unwrap();
        let err = client.generate("x").await.unwrap_err();
        assert!(matches!(err, AiError::InvalidResponse(_)));
    }
}
