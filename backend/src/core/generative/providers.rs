//! Generative AI Providers
//!
//! Provider abstraction for the image and video generation services, the
//! closed provider catalog, and the normalized failure taxonomy every
//! adapter reports through.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::image::{GeneratedMedia, ImageRequest};
use super::polling::PollPolicy;
use super::video::{MotionType, VideoJobHandle, VideoJobStatus, VideoRequest, VideoSubmission};
use crate::core::CoreError;

// =============================================================================
// Capabilities
// =============================================================================

/// Capabilities supported by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderCapability {
    /// Still image from a text prompt
    ImageGeneration,
    /// Animate a still image into a short clip
    ImageToVideo,
    /// Clip from a text prompt alone
    TextToVideo,
}

impl ProviderCapability {
    /// Wire name (`image-generation`, `image-to-video`, `text-to-video`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageGeneration => "image-generation",
            Self::ImageToVideo => "image-to-video",
            Self::TextToVideo => "text-to-video",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::ImageToVideo | Self::TextToVideo)
    }
}

impl fmt::Display for ProviderCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImageGeneration => write!(f, "Image Generation"),
            Self::ImageToVideo => write!(f, "Image-to-Video"),
            Self::TextToVideo => write!(f, "Text-to-Video"),
        }
    }
}

// =============================================================================
// Provider Catalog
// =============================================================================

/// Closed set of known providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Dalle,
    Higgsfield,
    Gemini,
    Kling,
    Veo,
    Sora,
}

impl ProviderId {
    pub const ALL: [ProviderId; 6] = [
        ProviderId::Dalle,
        ProviderId::Higgsfield,
        ProviderId::Gemini,
        ProviderId::Kling,
        ProviderId::Veo,
        ProviderId::Sora,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dalle => "dalle",
            Self::Higgsfield => "higgsfield",
            Self::Gemini => "gemini",
            Self::Kling => "kling",
            Self::Veo => "veo",
            Self::Sora => "sora",
        }
    }

    /// Static capability and limits table for this provider
    pub fn descriptor(&self) -> &'static ProviderDescriptor {
        match self {
            Self::Dalle => &DALLE,
            Self::Higgsfield => &HIGGSFIELD,
            Self::Gemini => &GEMINI,
            Self::Kling => &KLING,
            Self::Veo => &VEO,
            Self::Sora => &SORA,
        }
    }
}

impl FromStr for ProviderId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dalle" | "dall-e" | "openai" => Ok(Self::Dalle),
            "higgsfield" => Ok(Self::Higgsfield),
            "gemini" => Ok(Self::Gemini),
            "kling" => Ok(Self::Kling),
            "veo" => Ok(Self::Veo),
            "sora" => Ok(Self::Sora),
            _ => Err(CoreError::UnknownProvider(s.to_string())),
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared capabilities and limits of a provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub display_name: &'static str,
    pub capabilities: &'static [ProviderCapability],
    /// Longest clip the provider accepts (video providers only)
    pub max_duration_sec: Option<f64>,
    pub resolutions: &'static [&'static str],
    pub aspect_ratios: &'static [&'static str],
    pub motion_types: &'static [MotionType],
    #[serde(skip)]
    pub poll_interval_secs: u64,
    #[serde(skip)]
    pub poll_ceiling_secs: u64,
    pub note: &'static str,
}

impl ProviderDescriptor {
    pub fn supports(&self, capability: ProviderCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.poll_ceiling_secs),
        )
    }

    /// Checks a requested clip against declared limits before any network call
    pub fn check_video_request(&self, duration_sec: f64, motion: MotionType) -> Result<(), CoreError> {
        if let Some(max) = self.max_duration_sec {
            if duration_sec > max {
                return Err(CoreError::NotSupported(format!(
                    "{} supports clips up to {}s (requested {}s)",
                    self.display_name, max, duration_sec
                )));
            }
        }
        if !self.motion_types.is_empty() && !self.motion_types.contains(&motion) {
            return Err(CoreError::NotSupported(format!(
                "{} does not support motion type '{}'",
                self.display_name,
                motion.as_str()
            )));
        }
        Ok(())
    }
}

const ALL_MOTIONS: &[MotionType] = &[
    MotionType::Auto,
    MotionType::ZoomIn,
    MotionType::ZoomOut,
    MotionType::PanLeft,
    MotionType::PanRight,
    MotionType::TiltUp,
    MotionType::TiltDown,
];

static DALLE: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::Dalle,
    display_name: "OpenAI DALL-E",
    capabilities: &[ProviderCapability::ImageGeneration],
    max_duration_sec: None,
    resolutions: &["1024x1024", "1792x1024", "1024x1792"],
    aspect_ratios: &[],
    motion_types: &[],
    poll_interval_secs: 0,
    poll_ceiling_secs: 0,
    note: "Synchronous image generation",
};

static HIGGSFIELD: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::Higgsfield,
    display_name: "Higgsfield Soul",
    capabilities: &[ProviderCapability::ImageGeneration],
    max_duration_sec: None,
    resolutions: &["720p", "1080p"],
    aspect_ratios: &["16:9", "4:3", "1:1"],
    motion_types: &[],
    poll_interval_secs: 3,
    poll_ceiling_secs: 180,
    note: "Queued image generation",
};

static GEMINI: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::Gemini,
    display_name: "Google Gemini Image",
    capabilities: &[ProviderCapability::ImageGeneration],
    max_duration_sec: None,
    resolutions: &[],
    aspect_ratios: &[],
    motion_types: &[],
    poll_interval_secs: 0,
    poll_ceiling_secs: 0,
    note: "Inline image generation with model fallback",
};

static KLING: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::Kling,
    display_name: "Kling AI",
    capabilities: &[ProviderCapability::ImageToVideo],
    max_duration_sec: Some(10.0),
    resolutions: &["720p", "1080p"],
    aspect_ratios: &["16:9"],
    motion_types: &[
        MotionType::Auto,
        MotionType::ZoomIn,
        MotionType::ZoomOut,
        MotionType::PanLeft,
        MotionType::PanRight,
    ],
    poll_interval_secs: 15,
    poll_ceiling_secs: 600,
    note: "High quality image-to-video animation",
};

static VEO: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::Veo,
    display_name: "Google Veo 3.1",
    capabilities: &[ProviderCapability::ImageToVideo, ProviderCapability::TextToVideo],
    max_duration_sec: Some(8.0),
    resolutions: &["720p", "1080p", "4k"],
    aspect_ratios: &["16:9", "9:16"],
    motion_types: ALL_MOTIONS,
    poll_interval_secs: 10,
    poll_ceiling_secs: 360,
    note: "Clips snap to 4, 6 or 8 seconds",
};

static SORA: ProviderDescriptor = ProviderDescriptor {
    id: ProviderId::Sora,
    display_name: "OpenAI Sora",
    capabilities: &[ProviderCapability::TextToVideo, ProviderCapability::ImageToVideo],
    max_duration_sec: None,
    resolutions: &[],
    aspect_ratios: &["16:9", "9:16"],
    motion_types: ALL_MOTIONS,
    poll_interval_secs: 10,
    poll_ceiling_secs: 300,
    note: "Text-to-video and image-to-video",
};

// =============================================================================
// Failure Taxonomy
// =============================================================================

/// Normalized failure categories shared by all adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Safety or moderation filter refused the content
    ContentRejected,
    QuotaExhausted,
    TransientNetwork,
    Timeout,
    /// Request was malformed or missing required inputs
    InvalidRequest,
    /// Provider does not offer the requested operation
    Unsupported,
    Failed,
}

/// A provider call that did not produce a result
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ContentRejected, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(FailureKind::QuotaExhausted, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientNetwork, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidRequest, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unsupported, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Failed, message)
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ProviderFailure {}

/// Result type returned by provider adapters
pub type ProviderResult<T> = Result<T, ProviderFailure>;

// =============================================================================
// Download Credentials
// =============================================================================

/// Header a provider's result files must be fetched with.
///
/// Kept out of result URLs so the credential never reaches callers or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct DownloadAuth {
    pub header: &'static str,
    pub value: String,
}

impl DownloadAuth {
    pub fn header(header: &'static str, value: impl Into<String>) -> Self {
        Self {
            header,
            value: value.into(),
        }
    }
}

impl fmt::Debug for DownloadAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadAuth")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Trait for generative AI providers
///
/// Operations a provider does not offer keep the default implementation,
/// which reports [`FailureKind::Unsupported`].
#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    /// Returns the provider identity
    fn id(&self) -> ProviderId;

    /// Returns the provider name
    fn name(&self) -> &'static str {
        self.id().as_str()
    }

    fn descriptor(&self) -> &'static ProviderDescriptor {
        self.id().descriptor()
    }

    /// Checks if provider supports a capability
    fn supports(&self, capability: ProviderCapability) -> bool {
        self.descriptor().supports(capability)
    }

    /// Checks if the provider is available (configured correctly)
    fn is_available(&self) -> bool;

    /// Poll cadence for asynchronous jobs
    fn poll_policy(&self) -> PollPolicy {
        self.descriptor().poll_policy()
    }

    /// Credential needed to download this provider's result files
    fn download_auth(&self) -> Option<DownloadAuth> {
        None
    }

    /// Generates a still image; the result URL may be remote or a data URI
    async fn generate_image(&self, _request: &ImageRequest) -> ProviderResult<GeneratedMedia> {
        Err(ProviderFailure::unsupported(format!(
            "{} does not support image generation",
            self.name()
        )))
    }

    /// Submits a video job
    async fn submit_video(&self, _request: &VideoRequest) -> ProviderResult<VideoSubmission> {
        Err(ProviderFailure::unsupported(format!(
            "{} does not support video generation",
            self.name()
        )))
    }

    /// Polls a video job once
    async fn poll_video(&self, _handle: &VideoJobHandle) -> ProviderResult<VideoJobStatus> {
        Err(ProviderFailure::unsupported(format!(
            "{} does not support video generation",
            self.name()
        )))
    }
}

// ============================================================================
// Mock Provider for Testing
// ============================================================================

/// Scripted outcome of one mock call
#[derive(Debug, Clone)]
pub enum MockOutcome<T> {
    Ok(T),
    Fail(ProviderFailure),
    Panic,
}

/// Mock provider with per-call scripted outcomes
///
/// When a script runs out, image calls return a fixed data URI and video
/// submissions return a queued handle.
pub struct MockProvider {
    id: ProviderId,
    available: bool,
    image_script: Mutex<VecDeque<MockOutcome<String>>>,
    submit_script: Mutex<VecDeque<MockOutcome<VideoSubmission>>>,
    poll_script: Mutex<VecDeque<MockOutcome<VideoJobStatus>>>,
    image_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    last_video_request: Mutex<Option<VideoRequest>>,
    poll_policy: Option<PollPolicy>,
    download_auth: Option<DownloadAuth>,
}

/// 1x1 transparent PNG
pub const MOCK_PNG_DATA_URI: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

impl MockProvider {
    /// Creates a new mock provider
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            available: true,
            image_script: Mutex::new(VecDeque::new()),
            submit_script: Mutex::new(VecDeque::new()),
            poll_script: Mutex::new(VecDeque::new()),
            image_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            last_video_request: Mutex::new(None),
            poll_policy: None,
            download_auth: None,
        }
    }

    /// Sets availability
    pub fn with_available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    pub fn with_image_outcomes(self, outcomes: Vec<MockOutcome<String>>) -> Self {
        if let Ok(mut script) = self.image_script.lock() {
            script.extend(outcomes);
        }
        self
    }

    pub fn with_submit_outcomes(self, outcomes: Vec<MockOutcome<VideoSubmission>>) -> Self {
        if let Ok(mut script) = self.submit_script.lock() {
            script.extend(outcomes);
        }
        self
    }

    pub fn with_poll_outcomes(self, outcomes: Vec<MockOutcome<VideoJobStatus>>) -> Self {
        if let Ok(mut script) = self.poll_script.lock() {
            script.extend(outcomes);
        }
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = Some(policy);
        self
    }

    pub fn with_download_auth(mut self, auth: DownloadAuth) -> Self {
        self.download_auth = Some(auth);
        self
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn last_video_request(&self) -> Option<VideoRequest> {
        self.last_video_request
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    fn next<T>(script: &Mutex<VecDeque<MockOutcome<T>>>) -> Option<MockOutcome<T>> {
        script.lock().ok().and_then(|mut s| s.pop_front())
    }
}

fn resolve_outcome<T>(outcome: MockOutcome<T>) -> ProviderResult<T> {
    match outcome {
        MockOutcome::Ok(value) => Ok(value),
        MockOutcome::Fail(failure) => Err(failure),
        MockOutcome::Panic => panic!("mock provider scripted panic"),
    }
}

#[async_trait]
impl GenerativeProvider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn poll_policy(&self) -> PollPolicy {
        self.poll_policy
            .unwrap_or_else(|| self.descriptor().poll_policy())
    }

    fn download_auth(&self) -> Option<DownloadAuth> {
        self.download_auth.clone()
    }

    async fn generate_image(&self, _request: &ImageRequest) -> ProviderResult<GeneratedMedia> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let url = match Self::next(&self.image_script) {
            Some(outcome) => resolve_outcome(outcome)?,
            None => MOCK_PNG_DATA_URI.to_string(),
        };
        Ok(GeneratedMedia::new(url).with_model("mock-model"))
    }

    async fn submit_video(&self, request: &VideoRequest) -> ProviderResult<VideoSubmission> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_video_request.lock() {
            *last = Some(request.clone());
        }
        match Self::next(&self.submit_script) {
            Some(outcome) => resolve_outcome(outcome),
            None => Ok(VideoSubmission::Queued(VideoJobHandle::new(
                self.id,
                format!("mock-task-{}", n + 1),
            ))),
        }
    }

    async fn poll_video(&self, _handle: &VideoJobHandle) -> ProviderResult<VideoJobStatus> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        match Self::next(&self.poll_script) {
            Some(outcome) => resolve_outcome(outcome),
            None => Ok(VideoJobStatus::Processing { progress: None }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_parsing() {
        assert_eq!("veo".parse::<ProviderId>().unwrap(), ProviderId::Veo);
        assert_eq!(" Kling ".parse::<ProviderId>().unwrap(), ProviderId::Kling);
        assert_eq!("dall-e".parse::<ProviderId>().unwrap(), ProviderId::Dalle);

        let err = "runway".parse::<ProviderId>().unwrap_err();
        assert!(matches!(err, CoreError::UnknownProvider(ref n) if n == "runway"));
    }

    #[test]
    fn test_capability_wire_names() {
        let json = serde_json::to_string(&ProviderCapability::ImageToVideo).unwrap();
        assert_eq!(json, "\"image-to-video\"");
        assert_eq!(ProviderCapability::TextToVideo.as_str(), "text-to-video");
        assert!(ProviderCapability::TextToVideo.is_video());
        assert!(!ProviderCapability::ImageGeneration.is_video());
    }

    #[test]
    fn test_descriptors_match_catalog() {
        assert!(ProviderId::Kling.descriptor().supports(ProviderCapability::ImageToVideo));
        assert!(!ProviderId::Kling.descriptor().supports(ProviderCapability::TextToVideo));
        assert!(ProviderId::Sora.descriptor().supports(ProviderCapability::TextToVideo));
        assert!(ProviderId::Veo.descriptor().supports(ProviderCapability::TextToVideo));
        assert_eq!(ProviderId::Veo.descriptor().max_duration_sec, Some(8.0));

        let higgs = ProviderId::Higgsfield.descriptor().poll_policy();
        assert_eq!(higgs.interval, Duration::from_secs(3));
        assert_eq!(higgs.max_attempts(), 60);

        for id in ProviderId::ALL {
            assert_eq!(id.descriptor().id, id);
        }
    }

    #[test]
    fn test_check_video_request_limits() {
        let kling = ProviderId::Kling.descriptor();
        assert!(kling.check_video_request(10.0, MotionType::ZoomIn).is_ok());

        let err = kling.check_video_request(10.5, MotionType::Auto).unwrap_err();
        assert!(matches!(err, CoreError::NotSupported(_)));

        let err = kling.check_video_request(5.0, MotionType::TiltUp).unwrap_err();
        assert!(matches!(err, CoreError::NotSupported(_)));

        let sora = ProviderId::Sora.descriptor();
        assert!(sora.check_video_request(10.0, MotionType::TiltDown).is_ok());
    }

    #[tokio::test]
    async fn test_default_methods_report_unsupported() {
        struct ImageOnly;

        #[async_trait]
        impl GenerativeProvider for ImageOnly {
            fn id(&self) -> ProviderId {
                ProviderId::Dalle
            }
            fn is_available(&self) -> bool {
                true
            }
        }

        let request = VideoRequest::image_to_video("https://x/y.png", 5.0, MotionType::Auto);
        let failure = ImageOnly.submit_video(&request).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unsupported);
        assert!(failure.message.contains("dalle"));
    }

    #[tokio::test]
    async fn test_mock_provider_follows_script() {
        let mock = MockProvider::new(ProviderId::Gemini).with_image_outcomes(vec![
            MockOutcome::Ok("https://cdn.example/a.png".to_string()),
            MockOutcome::Fail(ProviderFailure::rejected("safety")),
        ]);
        let request = ImageRequest::new("castle", 1024, 768);

        let first = mock.generate_image(&request).await.unwrap();
        assert_eq!(first.url, "https://cdn.example/a.png");

        let second = mock.generate_image(&request).await.unwrap_err();
        assert_eq!(second.kind, FailureKind::ContentRejected);

        let third = mock.generate_image(&request).await.unwrap();
        assert_eq!(third.url, MOCK_PNG_DATA_URI);
        assert_eq!(mock.image_calls(), 3);
    }
}
