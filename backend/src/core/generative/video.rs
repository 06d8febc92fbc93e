//! Video Generation
//!
//! Request, job handle and job status types for image-to-video and
//! text-to-video providers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::image::GeneratedMedia;
use super::providers::{ProviderCapability, ProviderId};
use crate::core::{CoreError, CoreResult, TaskId};

/// Shortest clip a request may ask for (seconds)
pub const MIN_CLIP_DURATION: f64 = 1.0;

/// Longest clip a request may ask for (seconds)
pub const MAX_CLIP_DURATION: f64 = 10.0;

// =============================================================================
// Mode & Motion
// =============================================================================

/// Video generation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoGenMode {
    TextToVideo,
    ImageToVideo,
}

impl VideoGenMode {
    pub fn capability(&self) -> ProviderCapability {
        match self {
            Self::TextToVideo => ProviderCapability::TextToVideo,
            Self::ImageToVideo => ProviderCapability::ImageToVideo,
        }
    }
}

/// Camera motion requested for an animation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionType {
    #[default]
    Auto,
    ZoomIn,
    ZoomOut,
    PanLeft,
    PanRight,
    TiltUp,
    TiltDown,
}

impl MotionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::ZoomIn => "zoom_in",
            Self::ZoomOut => "zoom_out",
            Self::PanLeft => "pan_left",
            Self::PanRight => "pan_right",
            Self::TiltUp => "tilt_up",
            Self::TiltDown => "tilt_down",
        }
    }

    /// Camera direction phrased as a generation prompt
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::Auto => "Animate this image with natural, smooth cinematic movement. Add subtle depth and motion to bring the scene to life.",
            Self::ZoomIn => "Slowly zoom into this image with smooth camera movement, revealing more detail as we move closer",
            Self::ZoomOut => "Slowly zoom out from this image with smooth camera movement, revealing more of the surrounding scene",
            Self::PanLeft => "Pan the camera slowly to the left across this scene with smooth cinematic movement",
            Self::PanRight => "Pan the camera slowly to the right across this scene with smooth cinematic movement",
            Self::TiltUp => "Tilt the camera slowly upward revealing more of the scene above",
            Self::TiltDown => "Tilt the camera slowly downward revealing more of the scene below",
        }
    }
}

impl FromStr for MotionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "auto" => Ok(Self::Auto),
            "zoom_in" => Ok(Self::ZoomIn),
            "zoom_out" => Ok(Self::ZoomOut),
            "pan_left" => Ok(Self::PanLeft),
            "pan_right" => Ok(Self::PanRight),
            "tilt_up" => Ok(Self::TiltUp),
            "tilt_down" => Ok(Self::TiltDown),
            other => Err(CoreError::ValidationError(format!(
                "Unknown motion type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for MotionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Request
// =============================================================================

/// Still image an animation starts from
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    /// Retrieval URL of the stored image asset
    pub url: String,
    /// Raw bytes when the image is available locally
    pub bytes: Option<Vec<u8>>,
    pub mime_type: String,
}

impl SourceImage {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bytes: None,
            mime_type: "image/png".to_string(),
        }
    }

    pub fn with_bytes(mut self, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        self.bytes = Some(bytes);
        self.mime_type = mime_type.into();
        self
    }
}

/// Video generation request handed to an adapter
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub mode: VideoGenMode,
    /// Text prompt; required for text-to-video, optional scene hint otherwise
    pub prompt: Option<String>,
    pub image: Option<SourceImage>,
    pub duration_sec: f64,
    pub motion: MotionType,
    pub aspect_ratio: String,
}

impl VideoRequest {
    pub fn image_to_video(image_url: impl Into<String>, duration_sec: f64, motion: MotionType) -> Self {
        Self {
            mode: VideoGenMode::ImageToVideo,
            prompt: None,
            image: Some(SourceImage::from_url(image_url)),
            duration_sec,
            motion,
            aspect_ratio: "16:9".to_string(),
        }
    }

    pub fn text_to_video(prompt: impl Into<String>, duration_sec: f64) -> Self {
        Self {
            mode: VideoGenMode::TextToVideo,
            prompt: Some(prompt.into()),
            image: None,
            duration_sec,
            motion: MotionType::Auto,
            aspect_ratio: "16:9".to_string(),
        }
    }

    pub fn with_source_image(mut self, image: SourceImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = ratio.into();
        self
    }

    /// Prompt sent to the provider: explicit text, else the motion prompt
    pub fn effective_prompt(&self) -> String {
        match (&self.mode, &self.prompt) {
            (VideoGenMode::TextToVideo, Some(p)) => p.clone(),
            _ => self.motion.prompt().to_string(),
        }
    }

    /// Validates request shape independent of any provider
    pub fn validate(&self) -> CoreResult<()> {
        validate_clip_duration(self.duration_sec)?;
        match self.mode {
            VideoGenMode::ImageToVideo if self.image.is_none() => Err(CoreError::ValidationError(
                "Image-to-video requires a source image".to_string(),
            )),
            VideoGenMode::TextToVideo
                if self.prompt.as_deref().map_or(true, |p| p.trim().is_empty()) =>
            {
                Err(CoreError::ValidationError(
                    "Text-to-video requires a prompt".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Checks a requested clip duration against the accepted range
pub fn validate_clip_duration(duration_sec: f64) -> CoreResult<()> {
    if !duration_sec.is_finite() || !(MIN_CLIP_DURATION..=MAX_CLIP_DURATION).contains(&duration_sec)
    {
        return Err(CoreError::ValidationError(format!(
            "Duration must be between {} and {} seconds (got {})",
            MIN_CLIP_DURATION, MAX_CLIP_DURATION, duration_sec
        )));
    }
    Ok(())
}

// =============================================================================
// Job Handle & Status
// =============================================================================

/// Handle for tracking a submitted video generation job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoJobHandle {
    pub provider: ProviderId,
    /// Provider-assigned job ID
    pub task_id: TaskId,
}

impl VideoJobHandle {
    pub fn new(provider: ProviderId, task_id: impl Into<TaskId>) -> Self {
        Self {
            provider,
            task_id: task_id.into(),
        }
    }
}

/// Outcome of a submission: a queued job, or an immediate result
#[derive(Debug, Clone, PartialEq)]
pub enum VideoSubmission {
    Queued(VideoJobHandle),
    Completed(GeneratedMedia),
}

/// Status of a video generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VideoJobStatus {
    /// Job is queued but not yet started
    Queued,
    /// Job is actively being processed
    Processing { progress: Option<f64> },
    /// Job completed; `video_url` is remote or a data URI
    Completed { video_url: String },
    /// Job failed
    Failed { error: String },
    /// Safety or moderation filter refused the job
    Rejected { reason: String },
}

impl VideoJobStatus {
    /// Whether the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Rejected { .. }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing { .. } => "processing",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Rejected { .. } => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_type_parsing() {
        assert_eq!("zoom_in".parse::<MotionType>().unwrap(), MotionType::ZoomIn);
        assert_eq!(MotionType::default(), MotionType::Auto);
        assert!(matches!(
            "spin".parse::<MotionType>(),
            Err(CoreError::ValidationError(_))
        ));
        assert!(MotionType::PanLeft.prompt().contains("left"));
    }

    #[test]
    fn test_duration_validation() {
        assert!(validate_clip_duration(1.0).is_ok());
        assert!(validate_clip_duration(10.0).is_ok());
        assert!(validate_clip_duration(0.5).is_err());
        assert!(validate_clip_duration(10.01).is_err());
        assert!(validate_clip_duration(f64::NAN).is_err());
    }

    #[test]
    fn test_request_validation() {
        let ok = VideoRequest::image_to_video("http://h/a.png", 5.0, MotionType::ZoomOut);
        assert!(ok.validate().is_ok());
        assert_eq!(ok.effective_prompt(), MotionType::ZoomOut.prompt());

        let mut missing_image = ok.clone();
        missing_image.image = None;
        assert!(missing_image.validate().is_err());

        let text = VideoRequest::text_to_video("a comet over the sea", 6.0);
        assert!(text.validate().is_ok());
        assert_eq!(text.effective_prompt(), "a comet over the sea");
        assert_eq!(text.mode.capability(), ProviderCapability::TextToVideo);

        assert!(VideoRequest::text_to_video("  ", 6.0).validate().is_err());
    }

    #[test]
    fn test_status_serialization_and_terminality() {
        let done = VideoJobStatus::Completed {
            video_url: "https://cdn/v.mp4".into(),
        };
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["video_url"], "https://cdn/v.mp4");
        assert!(done.is_terminal());
        assert!(!VideoJobStatus::Queued.is_terminal());
        assert!(VideoJobStatus::Rejected {
            reason: "filtered".into()
        }
        .is_terminal());
    }
}
