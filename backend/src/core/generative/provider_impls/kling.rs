//! Kling AI Video Provider
//!
//! Image-to-video adapter. Submission queues a generation; status is
//! polled by generation id.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::generative::http::{self, RetryPolicy};
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

const DEFAULT_BASE_URL: &str = "https://api.klingai.com/v1";

const DEFAULT_MODEL: &str = "kling-video/v1/standard/image-to-video";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// API Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    model: &'a str,
    image_url: &'a str,
    duration: u32,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default, alias = "generation_id", alias = "task_id")]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    video: Option<VideoRef>,
    #[serde(default)]
    error: Option<ErrorRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorRef {
    Detail {
        #[serde(default)]
        message: Option<String>,
    },
    Text(String),
}

impl ErrorRef {
    fn into_message(self) -> String {
        match self {
            Self::Detail { message } => message.unwrap_or_else(|| "Unknown error".to_string()),
            Self::Text(text) => text,
        }
    }
}

// =============================================================================
// KlingProvider
// =============================================================================

pub struct KlingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for KlingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KlingProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl KlingProvider {
    pub fn new(api_key: impl Into<String>) -> CoreResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CoreError::ProviderUnavailable(
                "kling: KLING_API_KEY is not configured".to_string(),
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

    fn generations_url(&self) -> String {
        format!("{}/video/generations", self.base_url)
    }

    /// Kling renders 5 or 10 second clips
    fn snap_duration(duration_sec: f64) -> u32 {
        if duration_sec <= 5.0 {
            5
        } else {
            10
        }
    }

    fn classify(response: StatusResponse) -> VideoJobStatus {
        match response.status.as_str() {
            "queued" | "pending" => VideoJobStatus::Queued,
            "generating" | "processing" => VideoJobStatus::Processing { progress: None },
            "completed" => match response.video.and_then(|video| video.url) {
                Some(video_url) => VideoJobStatus::Completed { video_url },
                None => VideoJobStatus::Failed {
                    error: "Kling generation completed without a video URL".to_string(),
                },
            },
            "failed" => VideoJobStatus::Failed {
                error: response
                    .error
                    .map(ErrorRef::into_message)
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
            other => {
                warn!("Unknown Kling job status: {}", other);
                VideoJobStatus::Processing { progress: None }
            }
        }
    }
}

#[async_trait]
impl GenerativeProvider for KlingProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Kling
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn submit_video(&self, request: &VideoRequest) -> ProviderResult<VideoSubmission> {
        if request.mode != VideoGenMode::ImageToVideo {
            return Err(ProviderFailure::unsupported(
                "Kling only supports image-to-video",
            ));
        }
        let image = request
            .image
            .as_ref()
            .ok_or_else(|| ProviderFailure::invalid("Kling requires a source image URL"))?;

        let body = SubmitRequest {
            model: &self.model,
            image_url: &image.url,
            duration: Self::snap_duration(request.duration_sec),
            prompt: request.effective_prompt(),
        };
        let url = self.generations_url();

        // Submissions are sent once; a retried POST can queue a second paid job.
        let request = self.client.post(&url).bearer_auth(&self.api_key).json(&body);
        let response: SubmitResponse = http::send_json("kling", request).await?;

        let task_id = response
            .id
            .ok_or_else(|| ProviderFailure::failed("Kling response is missing a generation id"))?;

        info!("Kling video generation submitted: generation_id={}", task_id);
        Ok(VideoSubmission::Queued(VideoJobHandle::new(
            ProviderId::Kling,
            task_id,
        )))
    }

    async fn poll_video(&self, handle: &VideoJobHandle) -> ProviderResult<VideoJobStatus> {
        let url = self.generations_url();

        let response: StatusResponse =
            http::execute_with_retry("kling", "poll", self.retry, || {
                let request = self
                    .client
                    .get(&url)
                    .bearer_auth(&self.api_key)
                    .query(&[("generation_id", handle.task_id.as_str())]);
                http::send_json("kling", request)
            })
            .await?;

        debug!(
            "Kling poll for generation {}: status={}",
            handle.task_id, response.status
        );
        Ok(Self::classify(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generative::providers::{FailureKind, ProviderCapability};
    use crate::core::generative::video::MotionType;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> KlingProvider {
        KlingProvider::new("kl-key")
            .unwrap()
            .with_base_url(server.uri())
            .with_retry_policy(RetryPolicy::none())
    }

    #[test]
    fn test_capabilities_and_snapping() {
        let provider = KlingProvider::new("k").unwrap();
        assert!(provider.supports(ProviderCapability::ImageToVideo));
        assert!(!provider.supports(ProviderCapability::TextToVideo));
        assert_eq!(KlingProvider::snap_duration(3.0), 5);
        assert_eq!(KlingProvider::snap_duration(5.0), 5);
        assert_eq!(KlingProvider::snap_duration(7.5), 10);
    }

    #[tokio::test]
    async fn test_submit_returns_queued_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/video/generations"))
            .and(header("authorization", "Bearer kl-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "kling-video/v1/standard/image-to-video",
                "image_url": "http://localhost:8000/api/v1/assets/image/a.png",
                "duration": 10
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "gen-42", "status": "queued"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = VideoRequest::image_to_video(
            "http://localhost:8000/api/v1/assets/image/a.png",
            8.0,
            MotionType::PanLeft,
        );
        let submission = provider(&server).submit_video(&request).await.unwrap();
        assert_eq!(
            submission,
            VideoSubmission::Queued(VideoJobHandle::new(ProviderId::Kling, "gen-42"))
        );
    }

    #[tokio::test]
    async fn test_submit_is_not_retried_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/video/generations"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream busy"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/video/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "gen-dup"
            })))
            .expect(0)
            .mount(&server)
            .await;

        // Default policy: polls retry, the submission still goes out once.
        let provider = KlingProvider::new("kl-key").unwrap().with_base_url(server.uri());
        let request = VideoRequest::image_to_video("http://h/a.png", 5.0, MotionType::Auto);
        let failure = provider.submit_video(&request).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::TransientNetwork);
    }

    #[tokio::test]
    async fn test_poll_retries_transient_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video/generations"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/video/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "processing"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = KlingProvider::new("kl-key")
            .unwrap()
            .with_base_url(server.uri())
            .with_retry_policy(RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(5),
            });
        let status = provider
            .poll_video(&VideoJobHandle::new(ProviderId::Kling, "gen-3"))
            .await
            .unwrap();
        assert!(!status.is_terminal());
    }

    #[tokio::test]
    async fn test_text_to_video_is_unsupported() {
        let provider = KlingProvider::new("k").unwrap();
        let failure = provider
            .submit_video(&VideoRequest::text_to_video("storm", 5.0))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unsupported);
    }

    #[tokio::test]
    async fn test_poll_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video/generations"))
            .and(query_param("generation_id", "gen-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "completed",
                "video": {"url": "https://cdn.kling.example/gen-1.mp4"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/video/generations"))
            .and(query_param("generation_id", "gen-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "failed",
                "error": {"message": "image could not be processed"}
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        let done = provider
            .poll_video(&VideoJobHandle::new(ProviderId::Kling, "gen-1"))
            .await
            .unwrap();
        assert_eq!(
            done,
            VideoJobStatus::Completed {
                video_url: "https://cdn.kling.example/gen-1.mp4".to_string()
            }
        );

        let failed = provider
            .poll_video(&VideoJobHandle::new(ProviderId::Kling, "gen-2"))
            .await
            .unwrap();
        assert_eq!(
            failed,
            VideoJobStatus::Failed {
                error: "image could not be processed".to_string()
            }
        );
    }

    #[test]
    fn test_in_progress_statuses() {
        for status in ["queued", "generating", "processing", "warming_up"] {
            let response: StatusResponse =
                serde_json::from_value(serde_json::json!({ "status": status })).unwrap();
            assert!(!KlingProvider::classify(response).is_terminal());
        }
    }
}
