//! Higgsfield Soul Image Provider
//!
//! Asynchronous queue adapter. Submission returns a request id; the status
//! endpoint is polled every 3 seconds until the image is ready.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::generative::http;
use crate::core::generative::image::{GeneratedMedia, ImageRequest};
use crate::core::generative::polling::{poll_until_terminal, PollObservation, PollPolicy};
use crate::core::generative::providers::{
    GenerativeProvider, ProviderFailure, ProviderId, ProviderResult,
};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Constants
// =============================================================================

const DEFAULT_BASE_URL: &str = "https://platform.higgsfield.ai";

const DEFAULT_MODEL: &str = "higgsfield-ai/soul/standard";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

// =============================================================================
// API Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
struct SubmitRequest {
    prompt: String,
    aspect_ratio: String,
    resolution: &'static str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    status_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    images: Vec<MediaRef>,
    #[serde(default)]
    video: Option<MediaRef>,
}

#[derive(Debug, Deserialize)]
struct MediaRef {
    #[serde(default)]
    url: Option<String>,
}

// =============================================================================
// HiggsfieldProvider
// =============================================================================

pub struct HiggsfieldProvider {
    client: reqwest::Client,
    key_id: String,
    key_secret: String,
    base_url: String,
    model: String,
    poll_policy: Option<PollPolicy>,
}

impl std::fmt::Debug for HiggsfieldProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiggsfieldProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl HiggsfieldProvider {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> CoreResult<Self> {
        let key_id = key_id.into();
        let key_secret = key_secret.into();
        if key_id.trim().is_empty() || key_secret.trim().is_empty() {
            return Err(CoreError::ProviderUnavailable(
                "higgsfield: HIGGSFIELD_API_KEY_ID and HIGGSFIELD_API_KEY_SECRET are required"
                    .to_string(),
            ));
        }

        Ok(Self {
            client: http::build_client(REQUEST_TIMEOUT)?,
            key_id,
            key_secret,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            poll_policy: None,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = Some(policy);
        self
    }

    fn submit_url(&self) -> String {
        format!("{}/{}", self.base_url, self.model)
    }

    fn status_url(&self, request_id: &str) -> String {
        format!("{}/requests/{}/status", self.base_url, request_id)
    }

    fn auth_header(&self) -> String {
        format!("Key {}:{}", self.key_id, self.key_secret)
    }

    fn full_prompt(prompt: &str, style: Option<&str>) -> String {
        match style {
            Some(style) => format!("{}, {} style", prompt, style),
            None => prompt.to_string(),
        }
    }

    /// Named ratio for the common sizes, raw `W:H` otherwise
    fn aspect_ratio(width: u32, height: u32) -> String {
        match (width, height) {
            (1920, 1080) => "16:9".to_string(),
            (1024, 768) => "4:3".to_string(),
            (1024, 1024) => "1:1".to_string(),
            (w, h) => format!("{}:{}", w, h),
        }
    }

    fn resolution(width: u32, height: u32) -> &'static str {
        if width.max(height) >= 1920 {
            "1080p"
        } else {
            "720p"
        }
    }

    fn classify(status: StatusResponse) -> PollObservation<String> {
        match status.status.to_ascii_lowercase().as_str() {
            "completed" => {
                let url = status
                    .images
                    .into_iter()
                    .find_map(|image| image.url)
                    .or_else(|| status.video.and_then(|video| video.url));
                match url {
                    Some(url) => PollObservation::Completed(url),
                    None => PollObservation::Failed(
                        "Higgsfield generation completed without an image URL".to_string(),
                    ),
                }
            }
            "nsfw" => PollObservation::Rejected(
                "Content failed moderation checks (NSFW)".to_string(),
            ),
            "failed" => PollObservation::Failed("Higgsfield generation failed".to_string()),
            "queued" | "in_progress" => PollObservation::InProgress,
            other => {
                warn!("Unknown Higgsfield status: {}", other);
                PollObservation::InProgress
            }
        }
    }

    async fn poll_once(&self, status_url: &str) -> PollObservation<String> {
        let request = self
            .client
            .get(status_url)
            .header("Authorization", self.auth_header());
        match http::send_json::<StatusResponse>("higgsfield", request).await {
            Ok(status) => Self::classify(status),
            Err(failure) => PollObservation::TransientError(failure.message),
        }
    }
}

#[async_trait]
impl GenerativeProvider for HiggsfieldProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Higgsfield
    }

    fn is_available(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.is_empty()
    }

    fn poll_policy(&self) -> PollPolicy {
        self.poll_policy
            .unwrap_or_else(|| self.descriptor().poll_policy())
    }

    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<GeneratedMedia> {
        let body = SubmitRequest {
            prompt: Self::full_prompt(&request.prompt, request.style.as_deref()),
            aspect_ratio: Self::aspect_ratio(request.width, request.height),
            resolution: Self::resolution(request.width, request.height),
        };
        let url = self.submit_url();

        let request = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .json(&body);
        let submitted: SubmitResponse = http::send_json("higgsfield", request).await?;

        let request_id = submitted
            .request_id
            .ok_or_else(|| ProviderFailure::failed("No request_id returned from Higgsfield API"))?;
        let status_url = submitted
            .status_url
            .unwrap_or_else(|| self.status_url(&request_id));

        info!("Higgsfield image generation submitted: request_id={}", request_id);

        let label = format!("Higgsfield request {}", request_id);
        let image_url = poll_until_terminal(self.poll_policy(), &label, |attempt| {
            debug!("Polling Higgsfield request {} (attempt {})", request_id, attempt);
            self.poll_once(&status_url)
        })
        .await?;

        Ok(GeneratedMedia::new(image_url).with_model(self.model.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generative::providers::FailureKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> HiggsfieldProvider {
        HiggsfieldProvider::new("kid", "ksecret")
            .unwrap()
            .with_base_url(server.uri())
            .with_poll_policy(PollPolicy::new(
                Duration::from_millis(10),
                Duration::from_millis(50),
            ))
    }

    async fn mount_submit(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/higgsfield-ai/soul/standard"))
            .and(header("authorization", "Key kid:ksecret"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "request_id": "req-1"
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_sizing_helpers() {
        assert_eq!(HiggsfieldProvider::aspect_ratio(1024, 768), "4:3");
        assert_eq!(HiggsfieldProvider::aspect_ratio(1920, 1080), "16:9");
        assert_eq!(HiggsfieldProvider::aspect_ratio(800, 600), "800:600");
        assert_eq!(HiggsfieldProvider::resolution(1920, 1080), "1080p");
        assert_eq!(HiggsfieldProvider::resolution(1024, 768), "720p");
    }

    #[test]
    fn test_requires_both_keys() {
        assert!(HiggsfieldProvider::new("id", "").is_err());
        assert!(HiggsfieldProvider::new("id", "secret").is_ok());
    }

    #[test]
    fn test_default_poll_policy_matches_catalog() {
        let provider = HiggsfieldProvider::new("id", "secret").unwrap();
        let policy = provider.poll_policy();
        assert_eq!(policy.interval, Duration::from_secs(3));
        assert_eq!(policy.max_attempts(), 60);
    }

    #[tokio::test]
    async fn test_submit_then_poll_to_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/higgsfield-ai/soul/standard"))
            .and(body_partial_json(serde_json::json!({
                "prompt": "harbor at dawn, noir style",
                "aspect_ratio": "4:3",
                "resolution": "720p"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "request_id": "req-1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/requests/req-1/status"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "in_progress"})),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/requests/req-1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "completed",
                "images": [{"url": "https://cdn.higgsfield.example/req-1.png"}]
            })))
            .mount(&server)
            .await;

        let request = ImageRequest::new("harbor at dawn", 1024, 768)
            .with_style(Some("noir".to_string()));
        let media = provider(&server).generate_image(&request).await.unwrap();
        assert_eq!(media.url, "https://cdn.higgsfield.example/req-1.png");
    }

    #[tokio::test]
    async fn test_nsfw_is_rejection() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        Mock::given(method("GET"))
            .and(path("/requests/req-1/status"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "nsfw"})),
            )
            .mount(&server)
            .await;

        let failure = provider(&server)
            .generate_image(&ImageRequest::new("p", 1024, 768))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::ContentRejected);
    }

    #[tokio::test]
    async fn test_bad_polls_then_timeout() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        Mock::given(method("GET"))
            .and(path("/requests/req-1/status"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let failure = provider(&server)
            .generate_image(&ImageRequest::new("p", 1024, 768))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Timeout);
    }

    #[test]
    fn test_completed_without_url_fails() {
        let status: StatusResponse =
            serde_json::from_str(r#"{"status":"completed","images":[]}"#).unwrap();
        assert!(matches!(
            HiggsfieldProvider::classify(status),
            PollObservation::Failed(_)
        ));
    }
}
