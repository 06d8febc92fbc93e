//! Generative AI Integration
//!
//! Provider abstraction, adapters and registry for scene image generation
//! and image-to-video animation.

pub mod fallback;
pub mod http;
pub mod image;
pub mod polling;
pub mod provider_impls;
pub mod providers;
pub mod registry;
pub mod video;

// Re-export main types
pub use image::{GeneratedMedia, ImageRequest};
pub use polling::{poll_until_terminal, PollObservation, PollPolicy};
pub use providers::{
    DownloadAuth, FailureKind, GenerativeProvider, MockOutcome, MockProvider, ProviderCapability,
    ProviderDescriptor, ProviderFailure, ProviderId, ProviderResult, MOCK_PNG_DATA_URI,
};
pub use registry::{ProviderInfo, ProviderKind, ProviderRegistry};
pub use video::{
    MotionType, SourceImage, VideoGenMode, VideoJobHandle, VideoJobStatus, VideoRequest,
    VideoSubmission,
};
