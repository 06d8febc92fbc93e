//! Google Gemini Image Provider
//!
//! Synchronous adapter returning inline base64 images. Several candidate
//! models are tried in preference order with quota-aware fallback.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::generative::fallback::first_successful_model;
use crate::core::generative::http;
use crate::core::generative::image::{GeneratedMedia, ImageRequest};
use crate::core::generative::providers::{
    GenerativeProvider, ProviderFailure, ProviderId, ProviderResult,
};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Constants
// =============================================================================

pub(crate) const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Candidate models in preference order
pub const IMAGE_MODELS: &[&str] = &[
    "gemini-2.0-flash-exp-image-generation",
    "gemini-2.5-flash-image",
    "gemini-3-pro-image-preview",
    "nano-banana-pro-preview",
];

/// The experimental flash model must be asked for text alongside the image
fn response_modalities(model: &str) -> &'static [&'static str] {
    if model == "gemini-2.0-flash-exp-image-generation" {
        &["TEXT", "IMAGE"]
    } else {
        &["IMAGE"]
    }
}

// =============================================================================
// API Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
    response_modalities: &'static [&'static str],
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

// =============================================================================
// GeminiImageProvider
// =============================================================================

pub struct GeminiImageProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    models: Vec<&'static str>,
}

impl std::fmt::Debug for GeminiImageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiImageProvider")
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .finish_non_exhaustive()
    }
}

impl GeminiImageProvider {
    pub fn new(api_key: impl Into<String>) -> CoreResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CoreError::ProviderUnavailable(
                "gemini: GOOGLE_AI_API_KEY is not configured".to_string(),
            ));
        }

        Ok(Self {
            client: http::build_client(REQUEST_TIMEOUT)?,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            models: IMAGE_MODELS.to_vec(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn full_prompt(prompt: &str, style: Option<&str>) -> String {
        match style {
            Some(style) => format!("{}. Style: {}", prompt, style),
            None => prompt.to_string(),
        }
    }

    /// Extracts the first inline image, mapping safety stops to rejections
    fn extract_image(model: &str, response: GenerateContentResponse) -> ProviderResult<String> {
        let Some(candidate) = response.candidates.into_iter().next() else {
            return Err(ProviderFailure::failed(format!(
                "No candidates in response from {}",
                model
            )));
        };

        match candidate.finish_reason.as_deref() {
            Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("IMAGE_SAFETY") => {
                return Err(ProviderFailure::rejected(
                    "Image was blocked by the provider safety filter",
                ))
            }
            Some("NO_IMAGE") => {
                return Err(ProviderFailure::failed(format!(
                    "Model {} could not generate an image for this prompt",
                    model
                )))
            }
            _ => {}
        }

        candidate
            .content
            .into_iter()
            .flat_map(|content| content.parts)
            .find_map(|part| part.inline_data)
            .filter(|inline| !inline.data.is_empty())
            .map(|inline| {
                let mime = inline.mime_type.unwrap_or_else(|| "image/jpeg".to_string());
                format!("data:{};base64,{}", mime, inline.data)
            })
            .ok_or_else(|| {
                ProviderFailure::failed(format!("No image found in response from {}", model))
            })
    }

    async fn try_model(&self, model: &str, prompt: &str) -> ProviderResult<GeneratedMedia> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![TextPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 1.0,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens: 8192,
                response_modalities: response_modalities(model),
            },
        };
        let url = self.model_url(model);

        let request = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body);
        let response: GenerateContentResponse = http::send_json("gemini", request).await?;

        let image_url = Self::extract_image(model, response)?;
        Ok(GeneratedMedia::new(image_url).with_model(model))
    }
}

#[async_trait]
impl GenerativeProvider for GeminiImageProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<GeneratedMedia> {
        let prompt = Self::full_prompt(&request.prompt, request.style.as_deref());
        let prompt = prompt.as_str();
        first_successful_model("gemini", &self.models, |model| self.try_model(model, prompt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generative::providers::FailureKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GeminiImageProvider {
        GeminiImageProvider::new("g-key")
            .unwrap()
            .with_base_url(server.uri())
    }

    fn model_path(model: &str) -> String {
        format!("/models/{}:generateContent", model)
    }

    fn image_body() -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "finishReason": "STOP",
                "content": {"parts": [
                    {"text": "here you go"},
                    {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
                ]}
            }]
        })
    }

    #[tokio::test]
    async fn test_quota_falls_through_to_next_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(model_path(IMAGE_MODELS[0])))
            .and(query_param("key", "g-key"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Quota exceeded", "code": 429, "status": "RESOURCE_EXHAUSTED"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(model_path(IMAGE_MODELS[1])))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_body()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(model_path(IMAGE_MODELS[2])))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_body()))
            .expect(0)
            .mount(&server)
            .await;

        let media = provider(&server)
            .generate_image(&ImageRequest::new("a fox", 1024, 768))
            .await
            .unwrap();

        assert_eq!(media.url, "data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(media.model.as_deref(), Some(IMAGE_MODELS[1]));
        assert!(media.is_inline());
    }

    #[tokio::test]
    async fn test_safety_block_stops_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(model_path(IMAGE_MODELS[0])))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"finishReason": "SAFETY"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(model_path(IMAGE_MODELS[1])))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_body()))
            .expect(0)
            .mount(&server)
            .await;

        let failure = provider(&server)
            .generate_image(&ImageRequest::new("p", 1024, 768))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::ContentRejected);
    }

    #[tokio::test]
    async fn test_all_models_quota_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string(""))
            .mount(&server)
            .await;

        let failure = provider(&server)
            .generate_image(&ImageRequest::new("p", 1024, 768))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::QuotaExhausted);
    }

    #[test]
    fn test_prompt_and_modalities() {
        assert_eq!(
            GeminiImageProvider::full_prompt("a fox", Some("anime")),
            "a fox. Style: anime"
        );
        assert_eq!(response_modalities(IMAGE_MODELS[0]), &["TEXT", "IMAGE"]);
        assert_eq!(response_modalities(IMAGE_MODELS[3]), &["IMAGE"]);
    }

    #[test]
    fn test_no_image_part_is_failure() {
        let response: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "sorry"}]}}]
        }))
        .unwrap();
        let failure = GeminiImageProvider::extract_image("m", response).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Failed);
    }
}
