//! Speech synthesis provider.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

/// Speech synthesis capability: narration text in, audio bytes out.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> ProviderResult<Vec<u8>>;
}

/// HTTP speech synthesis client (ElevenLabs-style per-voice endpoint).
pub struct HttpSpeechSynthesizer {
    base_url: String,
    api_key: String,
    client: Client,
}

impl HttpSpeechSynthesizer {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Ok(Self::new(
            std::env::var("SPEECH_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.elevenlabs.io/v1".to_string()),
            std::env::var("SPEECH_API_KEY")
                .map_err(|_| ProviderError::config_error("SPEECH_API_KEY not set"))?,
        ))
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> ProviderResult<Vec<u8>> {
        let url = format!("{}/text-to-speech/{}", self.base_url, voice);
        debug!("synthesizing {} chars with voice {}", text.len(), voice);

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": "eleven_multilingual_v2",
            }))
            .send()
            .await
            .map_err(|e| ProviderError::request_failed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError { status, body });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::request_failed(e.to_string()))?;

        if bytes.is_empty() {
            return Err(ProviderError::unexpected("empty audio response"));
        }
        Ok(bytes.to_vec())
    }
}
