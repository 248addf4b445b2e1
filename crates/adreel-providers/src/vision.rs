//! Vision providers: the frame content classifier and the multimodal
//! frame judge used by the continuity re-cut service.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

/// Frame content classification capability. Used defensively: a flagged
/// input frame augments the generation negative prompt.
#[async_trait]
pub trait FrameClassifier: Send + Sync {
    /// Whether the image appears to contain a minor.
    async fn contains_minor(&self, image_url: &str) -> ProviderResult<bool>;
}

/// The judge's verdict on which candidate frame best matches the target.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FrameJudgment {
    /// Index into the candidate list
    pub selected_index: usize,
    /// Similarity of the selected frame to the target, [0,1]
    pub similarity: f64,
    /// Notable visual differences, free text
    #[serde(default)]
    pub differences: Vec<String>,
    /// Why this frame was chosen
    #[serde(default)]
    pub reasoning: String,
}

/// Multimodal frame judging capability.
#[async_trait]
pub trait FrameJudge: Send + Sync {
    /// Pick the candidate frame most visually continuous with `target`.
    async fn select_best_frame(
        &self,
        candidates: &[std::path::PathBuf],
        target: &Path,
    ) -> ProviderResult<FrameJudgment>;
}

const JUDGE_PROMPT: &str = r#"You are given a target frame (the first frame of the next video segment) followed by numbered candidate frames from the end of the current segment.

Pick the candidate that would make the most seamless cut into the target frame: closest subject position, pose, camera framing, and lighting.

Return ONLY a single JSON object:
{
  "selected_index": 0,
  "similarity": 0.0,
  "differences": ["..."],
  "reasoning": "..."
}
selected_index is the 0-based candidate number. similarity is your 0-1 estimate of visual continuity."#;

const CLASSIFIER_PROMPT: &str = r#"Does this image contain a person who appears to be a minor (under 18)? Answer ONLY with a single JSON object: {"contains_minor": true} or {"contains_minor": false}."#;

/// Gemini-style multimodal request/response shapes.
#[derive(Debug, Serialize)]
struct VisionRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ClassifierVerdict {
    contains_minor: bool,
}

/// Multimodal HTTP client implementing both vision capabilities.
pub struct HttpVisionClient {
    api_key: String,
    base_url: String,
    model: String,
    client: Client,
}

impl HttpVisionClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Ok(Self::new(
            std::env::var("VISION_API_BASE_URL").unwrap_or_else(|_| {
                "https://generativelanguage.googleapis.com/v1beta".to_string()
            }),
            std::env::var("VISION_API_KEY")
                .map_err(|_| ProviderError::config_error("VISION_API_KEY not set"))?,
            std::env::var("VISION_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
        ))
    }

    async fn generate(&self, parts: Vec<Part>) -> ProviderResult<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request = VisionRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::request_failed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError { status, body });
        }

        let parsed: VisionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::unexpected(format!("vision response: {e}")))?;

        parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| ProviderError::unexpected("no content in vision response"))
    }

    fn image_part(bytes: &[u8], mime_type: &str) -> Part {
        Part::Image {
            inline_data: InlineData {
                mime_type: mime_type.to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        }
    }

    async fn fetch_image(&self, url: &str) -> ProviderResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::request_failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::request_failed(format!(
                "image fetch {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response
            .bytes()
            .await
            .map_err(|e| ProviderError::request_failed(e.to_string()))?
            .to_vec())
    }
}

/// Strip optional markdown code fences around a JSON payload.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text.strip_prefix("```json").unwrap_or(text);
    let text = text.strip_prefix("```").unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Parse and validate a judgment against the candidate count.
fn parse_judgment(text: &str, candidate_count: usize) -> ProviderResult<FrameJudgment> {
    let mut judgment: FrameJudgment = serde_json::from_str(strip_json_fences(text))
        .map_err(|e| ProviderError::unexpected(format!("judgment: {e} in {text}")))?;

    if judgment.selected_index >= candidate_count {
        return Err(ProviderError::unexpected(format!(
            "selected_index {} out of range for {} candidates",
            judgment.selected_index, candidate_count
        )));
    }
    judgment.similarity = judgment.similarity.clamp(0.0, 1.0);
    Ok(judgment)
}

#[async_trait]
impl FrameClassifier for HttpVisionClient {
    async fn contains_minor(&self, image_url: &str) -> ProviderResult<bool> {
        debug!("classifying frame {}", image_url);
        let bytes = self.fetch_image(image_url).await?;

        let parts = vec![
            Part::Text {
                text: CLASSIFIER_PROMPT.to_string(),
            },
            Self::image_part(&bytes, "image/png"),
        ];

        let text = self.generate(parts).await?;
        let verdict: ClassifierVerdict = serde_json::from_str(strip_json_fences(&text))
            .map_err(|e| ProviderError::unexpected(format!("classifier verdict: {e}")))?;
        Ok(verdict.contains_minor)
    }
}

#[async_trait]
impl FrameJudge for HttpVisionClient {
    async fn select_best_frame(
        &self,
        candidates: &[std::path::PathBuf],
        target: &Path,
    ) -> ProviderResult<FrameJudgment> {
        if candidates.is_empty() {
            return Err(ProviderError::request_failed("no candidate frames"));
        }

        let mut parts = vec![
            Part::Text {
                text: JUDGE_PROMPT.to_string(),
            },
            Part::Text {
                text: "Target frame:".to_string(),
            },
            Self::image_part(&std::fs::read(target)?, "image/png"),
        ];
        for (i, candidate) in candidates.iter().enumerate() {
            parts.push(Part::Text {
                text: format!("Candidate {i}:"),
            });
            parts.push(Self::image_part(&std::fs::read(candidate)?, "image/png"));
        }

        let text = self.generate(parts).await?;
        let judgment = parse_judgment(&text, candidates.len())?;
        info!(
            "judge selected frame {} with similarity {:.3}",
            judgment.selected_index, judgment.similarity
        );
        Ok(judgment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_code_fences() {
        assert_eq!(strip_json_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_json_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn parses_judgment_and_clamps_similarity() {
        let text = r#"{"selected_index":2,"similarity":1.4,"differences":["lighting"],"reasoning":"closest pose"}"#;
        let judgment = parse_judgment(text, 5).unwrap();
        assert_eq!(judgment.selected_index, 2);
        assert_eq!(judgment.similarity, 1.0);
        assert_eq!(judgment.differences, vec!["lighting"]);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let text = r#"{"selected_index":9,"similarity":0.5}"#;
        let err = parse_judgment(text, 3).unwrap_err();
        assert!(matches!(err, ProviderError::UnexpectedResponse(_)));
    }

    #[test]
    fn malformed_judgment_is_rejected() {
        let err = parse_judgment("not json at all", 3).unwrap_err();
        assert!(matches!(err, ProviderError::UnexpectedResponse(_)));
    }
}
