//! OpenAI DALL-E Image Provider
//!
//! Synchronous adapter: one request returns a hosted image URL.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::generative::http;
use crate::core::generative::image::{GeneratedMedia, ImageRequest};
use crate::core::generative::providers::{
    GenerativeProvider, ProviderFailure, ProviderId, ProviderResult,
};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Constants
// =============================================================================

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// DALL-E 2 is the default; it accepts square sizes only
const DEFAULT_MODEL: &str = "dall-e-2";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// API Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
struct GenerateImageRequest {
    model: String,
    prompt: String,
    n: u32,
    size: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

// =============================================================================
// DalleProvider
// =============================================================================

pub struct DalleProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for DalleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DalleProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl DalleProvider {
    pub fn new(api_key: impl Into<String>) -> CoreResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CoreError::ProviderUnavailable(
                "dalle: OPENAI_API_KEY is not configured".to_string(),
            ));
        }

        Ok(Self {
            client: http::build_client(REQUEST_TIMEOUT)?,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn generations_url(&self) -> String {
        format!("{}/images/generations", self.base_url)
    }

    /// Appends the project style to the scene prompt
    fn full_prompt(prompt: &str, style: Option<&str>) -> String {
        match style {
            Some(style) => format!("{}, {} style, cinematic lighting, high quality", prompt, style),
            None => prompt.to_string(),
        }
    }

    /// Closest size the model accepts for the requested dimensions
    fn size_for(model: &str, request: &ImageRequest) -> &'static str {
        if model == "dall-e-3" {
            if request.is_landscape() {
                "1792x1024"
            } else if request.is_portrait() {
                "1024x1792"
            } else {
                "1024x1024"
            }
        } else {
            "1024x1024"
        }
    }
}

#[async_trait]
impl GenerativeProvider for DalleProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Dalle
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<GeneratedMedia> {
        let body = GenerateImageRequest {
            model: self.model.clone(),
            prompt: Self::full_prompt(&request.prompt, request.style.as_deref()),
            n: 1,
            size: Self::size_for(&self.model, request),
            quality: (self.model == "dall-e-3").then_some("standard"),
        };
        let url = self.generations_url();

        let request = self.client.post(&url).bearer_auth(&self.api_key).json(&body);
        let response: GenerateImageResponse = http::send_json("dalle", request).await?;

        let datum = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderFailure::failed("No image data in DALL-E response"))?;

        let image_url = match (datum.url, datum.b64_json) {
            (Some(url), _) => url,
            (None, Some(b64)) => format!("data:image/png;base64,{}", b64),
            (None, None) => {
                return Err(ProviderFailure::failed(
                    "DALL-E response contained neither url nor b64_json",
                ))
            }
        };

        info!("DALL-E image generated with model {}", self.model);
        Ok(GeneratedMedia::new(image_url).with_model(self.model.clone()))
    }
}
