//! Google Veo Video Provider
//!
//! Long-running operation adapter for Veo 3.1. Submission returns an
//! operation name that doubles as the task id; the operation is polled
//! until `done`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::generative::http::{self, RetryPolicy};
use crate::core::generative::providers::{
    DownloadAuth, GenerativeProvider, ProviderFailure, ProviderId, ProviderResult,
};
use crate::core::generative::video::{
    VideoGenMode, VideoJobHandle, VideoJobStatus, VideoRequest, VideoSubmission,
};
use crate::core::{CoreError, CoreResult};

use super::gemini::DEFAULT_BASE_URL;

// =============================================================================
// Constants
// =============================================================================

const DEFAULT_MODEL: &str = "veo-3.1-generate-preview";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Header carrying the API key on generated-file downloads
const API_KEY_HEADER: &str = "x-goog-api-key";

// =============================================================================
// API Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
struct PredictRequest {
    instances: Vec<Instance>,
    parameters: Parameters,
}

#[derive(Debug, Serialize)]
struct Instance {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<InlineImage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    duration_seconds: u32,
    aspect_ratio: String,
    person_generation: &'static str,
}

#[derive(Debug, Deserialize)]
struct OperationRef {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    #[serde(default)]
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
    #[serde(default)]
    rai_media_filtered_count: Option<u32>,
    #[serde(default)]
    rai_media_filtered_reasons: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    #[serde(default)]
    video: Option<SampleVideo>,
}

#[derive(Debug, Deserialize)]
struct SampleVideo {
    #[serde(default)]
    uri: Option<String>,
}

// =============================================================================
// VeoProvider
// =============================================================================

pub struct VeoProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for VeoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VeoProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl VeoProvider {
    pub fn new(api_key: impl Into<String>) -> CoreResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CoreError::ProviderUnavailable(
                "veo: GOOGLE_AI_API_KEY is not configured".to_string(),
            ));
        }

        Ok(Self {
            client: http::build_client(REQUEST_TIMEOUT)?,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Retry budget for status polls; submissions are always sent once
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn predict_url(&self) -> String {
        format!("{}/models/{}:predictLongRunning", self.base_url, self.model)
    }

    fn operation_url(&self, operation: &str) -> String {
        format!("{}/{}", self.base_url, operation.trim_start_matches('/'))
    }

    /// Veo renders 4, 6 or 8 second clips
    fn snap_duration(duration_sec: f64) -> u32 {
        if duration_sec <= 4.0 {
            4
        } else if duration_sec <= 6.0 {
            6
        } else {
            8
        }
    }

    fn build_instance(request: &VideoRequest) -> ProviderResult<Instance> {
        let image = match request.mode {
            VideoGenMode::TextToVideo => None,
            VideoGenMode::ImageToVideo => {
                let source = request
                    .image
                    .as_ref()
                    .ok_or_else(|| ProviderFailure::invalid("Veo requires a source image"))?;
                let bytes = source.bytes.as_ref().ok_or_else(|| {
                    ProviderFailure::invalid(format!(
                        "Veo needs the source image bytes; none loaded for {}",
                        source.url
                    ))
                })?;
                Some(InlineImage {
                    bytes_base64_encoded: base64::engine::general_purpose::STANDARD.encode(bytes),
                    mime_type: source.mime_type.clone(),
                })
            }
        };

        Ok(Instance {
            prompt: request.effective_prompt(),
            image,
        })
    }

    fn classify(operation: Operation) -> VideoJobStatus {
        if !operation.done {
            return VideoJobStatus::Processing { progress: None };
        }
        if let Some(error) = operation.error {
            return VideoJobStatus::Failed {
                error: error
                    .message
                    .unwrap_or_else(|| "Veo operation failed".to_string()),
            };
        }

        let Some(result) = operation
            .response
            .and_then(|response| response.generate_video_response)
        else {
            return VideoJobStatus::Failed {
                error: "No response in completed operation".to_string(),
            };
        };

        let uri = result
            .generated_samples
            .into_iter()
            .find_map(|sample| sample.video.and_then(|video| video.uri));

        match uri {
            Some(uri) => VideoJobStatus::Completed { video_url: uri },
            None if result.rai_media_filtered_count.unwrap_or(0) > 0 => VideoJobStatus::Rejected {
                reason: format!(
                    "Video filtered by safety filters: {}",
                    result.rai_media_filtered_reasons.join(", ")
                ),
            },
            None => VideoJobStatus::Failed {
                error: "No video generated".to_string(),
            },
        }
    }
}

#[async_trait]
impl GenerativeProvider for VeoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Veo
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Generated file URIs need the API key to download
    fn download_auth(&self) -> Option<DownloadAuth> {
        Some(DownloadAuth::header(API_KEY_HEADER, self.api_key.clone()))
    }

    async fn submit_video(&self, request: &VideoRequest) -> ProviderResult<VideoSubmission> {
        let duration_seconds = Self::snap_duration(request.duration_sec);
        let body = PredictRequest {
            instances: vec![Self::build_instance(request)?],
            parameters: Parameters {
                duration_seconds,
                aspect_ratio: request.aspect_ratio.clone(),
                person_generation: "allow_adult",
            },
        };
        let url = self.predict_url();

        let request = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body);
        let response: OperationRef = http::send_json("veo", request).await?;

        let operation = response
            .name
            .ok_or_else(|| ProviderFailure::failed("Veo returned no operation name"))?;

        info!(
            "Veo video generation submitted: operation={} duration={}s",
            operation, duration_seconds
        );
        Ok(VideoSubmission::Queued(VideoJobHandle::new(
            ProviderId::Veo,
            operation,
        )))
    }

    async fn poll_video(&self, handle: &VideoJobHandle) -> ProviderResult<VideoJobStatus> {
        let url = self.operation_url(&handle.task_id);

        let operation: Operation = http::execute_with_retry("veo", "poll", self.retry, || {
            let request = self
                .client
                .get(&url)
                .query(&[("key", self.api_key.as_str())]);
            http::send_json("veo", request)
        })
        .await?;

        debug!("Veo poll for {}: done={}", handle.task_id, operation.done);
        Ok(Self::classify(operation))
    }
}
