//! Video generation provider: create a prediction, poll it to a terminal
//! state, fetch the resulting media URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

/// A request for one generated video segment.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    /// Visual prompt
    pub prompt: String,
    /// Target duration in seconds
    pub duration_secs: f64,
    /// Aspect ratio, e.g. "9:16"
    pub aspect_ratio: String,
    /// Image the clip should open on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame_url: Option<String>,
    /// Image the clip should close on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_url: Option<String>,
    /// Negative prompt (face-quality terms plus safety addendum)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Output resolution, e.g. "1080p"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Generation seed for reproducibility
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Terminal-or-not state of a prediction poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionPoll {
    /// Still queued or rendering
    Processing,
    /// Done; `output_url` present when the provider inlines it
    Succeeded { output_url: Option<String> },
    /// Failed terminally
    Failed {
        error: String,
        /// True when the failure is a moderation rejection, which the
        /// orchestrator may retry once with a safer prompt
        moderation_flagged: bool,
    },
}

/// Video generation capability.
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Submit a generation request, returning the provider prediction id.
    async fn create(&self, request: &GenerationRequest) -> ProviderResult<String>;

    /// Poll a prediction for its current state.
    async fn poll(&self, prediction_id: &str) -> ProviderResult<PredictionPoll>;

    /// Fetch the media URL for a succeeded prediction.
    async fn fetch_result(&self, prediction_id: &str) -> ProviderResult<String>;
}

/// Moderation-style rejections are coded or worded as flagged/sensitive.
pub fn is_moderation_error(code: Option<&str>, message: &str) -> bool {
    if let Some(code) = code {
        let code = code.to_ascii_lowercase();
        if code.contains("flagged") || code.contains("sensitive") {
            return true;
        }
    }
    let message = message.to_ascii_lowercase();
    message.contains("flagged") || message.contains("sensitive")
}

/// The narrow set of prediction statuses we recognize. Anything else is
/// a hard `UnexpectedResponse`, never a silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireStatus {
    Starting,
    Queued,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

#[derive(Debug, Deserialize)]
struct WirePrediction {
    id: String,
    status: WireStatus,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

impl WirePrediction {
    /// The output field may be a bare URL string or a list of URLs.
    fn output_url(&self) -> ProviderResult<Option<String>> {
        match &self.output {
            None => Ok(None),
            Some(serde_json::Value::String(url)) => Ok(Some(url.clone())),
            Some(serde_json::Value::Array(items)) => match items.first() {
                Some(serde_json::Value::String(url)) => Ok(Some(url.clone())),
                None => Ok(None),
                Some(other) => Err(ProviderError::unexpected(format!(
                    "output array element is not a URL: {other}"
                ))),
            },
            Some(other) => Err(ProviderError::unexpected(format!(
                "output is neither URL nor URL list: {other}"
            ))),
        }
    }

    fn into_poll(self) -> ProviderResult<PredictionPoll> {
        match self.status {
            WireStatus::Starting | WireStatus::Queued | WireStatus::Processing => {
                Ok(PredictionPoll::Processing)
            }
            WireStatus::Succeeded => Ok(PredictionPoll::Succeeded {
                output_url: self.output_url()?,
            }),
            WireStatus::Failed | WireStatus::Canceled => {
                let error = self
                    .error
                    .unwrap_or_else(|| "prediction failed without error detail".to_string());
                let moderation_flagged = is_moderation_error(self.error_code.as_deref(), &error);
                Ok(PredictionPoll::Failed {
                    error,
                    moderation_flagged,
                })
            }
        }
    }
}

/// HTTP video generation client (Replicate-style prediction API).
pub struct HttpVideoGenerator {
    base_url: String,
    api_token: String,
    model: String,
    client: Client,
}

impl HttpVideoGenerator {
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            model: model.into(),
            client: Client::new(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Ok(Self::new(
            std::env::var("VIDEO_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.replicate.com/v1".to_string()),
            std::env::var("VIDEO_API_TOKEN")
                .map_err(|_| ProviderError::config_error("VIDEO_API_TOKEN not set"))?,
            std::env::var("VIDEO_MODEL").unwrap_or_else(|_| "kling-v1.6-pro".to_string()),
        ))
    }

    async fn get_prediction(&self, prediction_id: &str) -> ProviderResult<WirePrediction> {
        let url = format!("{}/predictions/{}", self.base_url, prediction_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| ProviderError::request_failed(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Err(ProviderError::PredictionNotFound(prediction_id.to_string()));
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::request_failed(e.to_string()))?;
        parse_prediction(&body)
    }
}

/// Parse a prediction response body strictly.
fn parse_prediction(body: &str) -> ProviderResult<WirePrediction> {
    serde_json::from_str(body)
        .map_err(|e| ProviderError::unexpected(format!("{e} in prediction body: {body}")))
}

#[async_trait]
impl VideoGenerator for HttpVideoGenerator {
    async fn create(&self, request: &GenerationRequest) -> ProviderResult<String> {
        let url = format!("{}/models/{}/predictions", self.base_url, self.model);
        debug!("submitting generation request to {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "input": request }))
            .send()
            .await
            .map_err(|e| ProviderError::request_failed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError { status, body });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::request_failed(e.to_string()))?;
        let prediction = parse_prediction(&body)?;
        info!("created prediction {}", prediction.id);
        Ok(prediction.id)
    }

    async fn poll(&self, prediction_id: &str) -> ProviderResult<PredictionPoll> {
        self.get_prediction(prediction_id).await?.into_poll()
    }

    async fn fetch_result(&self, prediction_id: &str) -> ProviderResult<String> {
        let prediction = self.get_prediction(prediction_id).await?;
        match prediction.into_poll()? {
            PredictionPoll::Succeeded {
                output_url: Some(url),
            } => Ok(url),
            PredictionPoll::Succeeded { output_url: None } => Err(ProviderError::unexpected(
                format!("prediction {prediction_id} succeeded without output"),
            )),
            other => Err(ProviderError::request_failed(format!(
                "prediction {prediction_id} is not succeeded: {other:?}"
            ))),
        }
    }
}
