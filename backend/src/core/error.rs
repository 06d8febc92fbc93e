//! StoryReel Error Definitions
//!
//! Defines error types used throughout the pipeline.

use thiserror::Error;

use super::generative::{FailureKind, ProviderFailure};
use super::{ProjectId, SceneId};

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Record Errors
    // =========================================================================
    #[error("Project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("Scene not found: {0}")]
    SceneNotFound(SceneId),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    // =========================================================================
    // Provider Errors
    // =========================================================================
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Content rejected by provider: {0}")]
    ContentRejected(String),

    #[error("Provider quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Provider request failed: {0}")]
    ProviderFailed(String),

    // =========================================================================
    // Asset Errors
    // =========================================================================
    #[error("Asset materialization failed: {0}")]
    MaterializationFailed(String),

    #[error("Access denied: {0}")]
    PathOutsideRoot(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Stable snake_case tag used in API error bodies and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProjectNotFound(_) => "project_not_found",
            Self::SceneNotFound(_) => "scene_not_found",
            Self::AssetNotFound(_) => "asset_not_found",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::ContentRejected(_) => "content_rejected",
            Self::QuotaExhausted(_) => "quota_exhausted",
            Self::TransientNetwork(_) => "transient_network",
            Self::ProviderFailed(_) => "provider_failed",
            Self::MaterializationFailed(_) => "materialization_failed",
            Self::PathOutsideRoot(_) => "access_denied",
            Self::NotSupported(_) => "not_supported",
            Self::ValidationError(_) => "validation_error",
            Self::Timeout(_) => "timeout",
            Self::Storage(_) => "storage_error",
            Self::IoError(_) => "io_error",
            Self::JsonError(_) => "json_error",
            Self::Internal(_) => "internal_error",
            Self::NotFound(_) => "not_found",
        }
    }

    /// Returns true for errors that originate from a provider call
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            Self::ContentRejected(_)
                | Self::QuotaExhausted(_)
                | Self::TransientNetwork(_)
                | Self::ProviderFailed(_)
                | Self::Timeout(_)
        )
    }
}

impl From<ProviderFailure> for CoreError {
    fn from(failure: ProviderFailure) -> Self {
        let message = failure.message;
        match failure.kind {
            FailureKind::ContentRejected => Self::ContentRejected(message),
            FailureKind::QuotaExhausted => Self::QuotaExhausted(message),
            FailureKind::TransientNetwork => Self::TransientNetwork(message),
            FailureKind::Timeout => Self::Timeout(message),
            FailureKind::InvalidRequest => Self::ValidationError(message),
            FailureKind::Unsupported => Self::NotSupported(message),
            FailureKind::Failed => Self::ProviderFailed(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_failure_maps_to_matching_variant() {
        let err: CoreError = ProviderFailure::quota("daily limit").into();
        assert!(matches!(err, CoreError::QuotaExhausted(ref m) if m == "daily limit"));

        let err: CoreError = ProviderFailure::rejected("nsfw").into();
        assert_eq!(err.kind(), "content_rejected");
        assert!(err.is_provider_error());

        let err: CoreError = ProviderFailure::timeout("poll ceiling").into();
        assert!(matches!(err, CoreError::Timeout(_)));
    }

    #[test]
    fn test_record_errors_are_not_provider_errors() {
        assert!(!CoreError::ProjectNotFound("p1".into()).is_provider_error());
        assert_eq!(
            CoreError::SceneNotFound("s1".into()).to_string(),
            "Scene not found: s1"
        );
    }
}
