//! OpenAI Sora Video Provider
//!
//! Text-to-video and image-to-video. A submission either returns the clip
//! directly or a job id to poll.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::generative::http::{self, RetryPolicy};
use crate::core::generative::image::GeneratedMedia;
use crate::core::generative::providers::{
    GenerativeProvider, ProviderFailure, ProviderId, ProviderResult,
};
use crate::core::generative::video::{
    VideoGenMode, VideoJobHandle, VideoJobStatus, VideoRequest, VideoSubmission,
};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Constants
// =============================================================================

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_MODEL: &str = "sora-2";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

// =============================================================================
// API Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateVideoRequest<'a> {
    model: &'a str,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    duration: f64,
    aspect_ratio: &'a str,
}

/// Job payload; the clip URL appears under several keys depending on the
/// API revision
#[derive(Debug, Default, Deserialize)]
struct VideoJob {
    #[serde(default, alias = "task_id", alias = "job_id")]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    data: Vec<UrlRef>,
    #[serde(default)]
    output: Option<UrlRef>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct UrlRef {
    #[serde(default)]
    url: Option<String>,
}

impl VideoJob {
    fn take_url(&mut self) -> Option<String> {
        self.video_url
            .take()
            .or_else(|| self.url.take())
            .or_else(|| self.data.first_mut().and_then(|d| d.url.take()))
            .or_else(|| self.output.as_mut().and_then(|o| o.url.take()))
    }

    fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Object(map)) => map
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Sora generation failed")
                .to_string(),
            _ => "Sora generation failed".to_string(),
        }
    }
}

// =============================================================================
// SoraProvider
// =============================================================================

pub struct SoraProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for SoraProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoraProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl SoraProvider {
    pub fn new(api_key: impl Into<String>) -> CoreResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CoreError::ProviderUnavailable(
                "sora: OPENAI_API_KEY is not configured".to_string(),
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

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Retry budget for status polls; submissions are always sent once
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn videos_url(&self) -> String {
        format!("{}/videos", self.base_url)
    }

    fn video_url(&self, id: &str) -> String {
        format!("{}/videos/{}", self.base_url, id)
    }

    fn classify(mut job: VideoJob) -> VideoJobStatus {
        let status = job.status.clone().unwrap_or_else(|| "processing".to_string());
        match status.as_str() {
            "completed" | "succeeded" => match job.take_url() {
                Some(video_url) => VideoJobStatus::Completed { video_url },
                None => VideoJobStatus::Failed {
                    error: "Sora job completed without a video URL".to_string(),
                },
            },
            "failed" | "error" | "cancelled" => VideoJobStatus::Failed {
                error: job.error_message(),
            },
            "queued" => VideoJobStatus::Queued,
            "in_progress" | "processing" => VideoJobStatus::Processing { progress: None },
            other => {
                warn!("Unknown Sora job status: {}", other);
                VideoJobStatus::Processing { progress: None }
            }
        }
    }
}

#[async_trait]
impl GenerativeProvider for SoraProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Sora
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn submit_video(&self, request: &VideoRequest) -> ProviderResult<VideoSubmission> {
        let image_url = match request.mode {
            VideoGenMode::TextToVideo => None,
            VideoGenMode::ImageToVideo => Some(
                request
                    .image
                    .as_ref()
                    .map(|image| image.url.as_str())
                    .ok_or_else(|| ProviderFailure::invalid("Sora image-to-video needs an image"))?,
            ),
        };
        let body = CreateVideoRequest {
            model: &self.model,
            prompt: request.effective_prompt(),
            image_url,
            duration: request.duration_sec,
            aspect_ratio: &request.aspect_ratio,
        };
        let url = self.videos_url();

        let request = self.client.post(&url).bearer_auth(&self.api_key).json(&body);
        let mut job: VideoJob = http::send_json("sora", request).await?;

        if let Some(video_url) = job.take_url() {
            info!("Sora returned a finished clip synchronously");
            return Ok(VideoSubmission::Completed(
                GeneratedMedia::new(video_url).with_model(self.model.clone()),
            ));
        }

        let id = job
            .id
            .ok_or_else(|| ProviderFailure::failed("Sora response has neither a video URL nor a job id"))?;
        info!("Sora video generation submitted: job_id={}", id);
        Ok(VideoSubmission::Queued(VideoJobHandle::new(ProviderId::Sora, id)))
    }

    async fn poll_video(&self, handle: &VideoJobHandle) -> ProviderResult<VideoJobStatus> {
        let url = self.video_url(&handle.task_id);

        let job: VideoJob = http::execute_with_retry("sora", "poll", self.retry, || {
            let request = self.client.get(&url).bearer_auth(&self.api_key);
            http::send_json("sora", request)
        })
        .await?;

        debug!("Sora poll for job {}: status={:?}", handle.task_id, job.status);
        Ok(Self::classify(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generative::providers::ProviderCapability;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> SoraProvider {
        SoraProvider::new("sk-sora")
            .unwrap()
            .with_base_url(server.uri())
            .with_retry_policy(RetryPolicy::none())
    }

    #[test]
    fn test_capabilities() {
        let provider = SoraProvider::new("k").unwrap();
        assert!(provider.supports(ProviderCapability::TextToVideo));
        assert!(provider.supports(ProviderCapability::ImageToVideo));
        assert!(!provider.supports(ProviderCapability::ImageGeneration));
    }

    #[tokio::test]
    async fn test_synchronous_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/videos"))
            .and(body_partial_json(serde_json::json!({
                "model": "sora-2",
                "prompt": "a paper boat in the rain",
                "duration": 6.0,
                "aspect_ratio": "16:9"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "vid-1",
                "status": "completed",
                "data": [{"url": "https://cdn.openai.example/vid-1.mp4"}]
            })))
            .mount(&server)
            .await;

        let submission = provider(&server)
            .submit_video(&VideoRequest::text_to_video("a paper boat in the rain", 6.0))
            .await
            .unwrap();

        match submission {
            VideoSubmission::Completed(media) => {
                assert_eq!(media.url, "https://cdn.openai.example/vid-1.mp4");
            }
            other => panic!("expected synchronous result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_queued_then_polled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/videos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "vid-2", "status": "queued"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/videos/vid-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "vid-2", "status": "completed", "video_url": "https://cdn.openai.example/vid-2.mp4"
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let submission = provider
            .submit_video(&VideoRequest::text_to_video("dunes", 5.0))
            .await
            .unwrap();
        let VideoSubmission::Queued(handle) = submission else {
            panic!("expected a queued job");
        };
        assert_eq!(handle.task_id, "vid-2");

        let status = provider.poll_video(&handle).await.unwrap();
        assert_eq!(
            status,
            VideoJobStatus::Completed {
                video_url: "https://cdn.openai.example/vid-2.mp4".to_string()
            }
        );
    }

    #[test]
    fn test_status_mapping() {
        let failed: VideoJob = serde_json::from_value(serde_json::json!({
            "status": "failed", "error": {"message": "moderation"}
        }))
        .unwrap();
        assert_eq!(
            SoraProvider::classify(failed),
            VideoJobStatus::Failed {
                error: "moderation".to_string()
            }
        );

        let running: VideoJob =
            serde_json::from_value(serde_json::json!({"status": "in_progress"})).unwrap();
        assert!(!SoraProvider::classify(running).is_terminal());

        let no_url: VideoJob =
            serde_json::from_value(serde_json::json!({"status": "completed"})).unwrap();
        assert!(matches!(
            SoraProvider::classify(no_url),
            VideoJobStatus::Failed { .. }
        ));
    }
}
